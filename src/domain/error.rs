//! Domain error types.

/// Top-level error type for combotrader.
#[derive(Debug, thiserror::Error)]
pub enum CombotraderError {
    #[error("invalid configuration: {parameter} {reason}")]
    InvalidConfiguration {
        parameter: &'static str,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("unknown indicator: {name}")]
    UnknownIndicator { name: String },

    #[error("indicator universe is empty")]
    EmptyUniverse,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&CombotraderError> for std::process::ExitCode {
    fn from(err: &CombotraderError) -> Self {
        let code: u8 = match err {
            CombotraderError::Io(_) => 1,
            CombotraderError::InvalidConfiguration { .. }
            | CombotraderError::ConfigParse { .. }
            | CombotraderError::ConfigMissing { .. }
            | CombotraderError::ConfigInvalid { .. } => 2,
            CombotraderError::Data { .. } => 3,
            CombotraderError::UnknownIndicator { .. } | CombotraderError::EmptyUniverse => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_message_names_parameter() {
        let err = CombotraderError::InvalidConfiguration {
            parameter: "tp",
            reason: "must be positive, got 0".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration: tp must be positive, got 0"
        );
    }

    #[test]
    fn config_missing_message() {
        let err = CombotraderError::ConfigMissing {
            section: "data".into(),
            key: "bars_path".into(),
        };
        assert_eq!(err.to_string(), "missing config key [data] bars_path");
    }

    #[test]
    fn exit_codes_group_by_category() {
        let cases: Vec<(CombotraderError, std::process::ExitCode)> = vec![
            (
                CombotraderError::Io(std::io::Error::other("boom")),
                std::process::ExitCode::from(1),
            ),
            (
                CombotraderError::ConfigMissing {
                    section: "search".into(),
                    key: "seed".into(),
                },
                std::process::ExitCode::from(2),
            ),
            (
                CombotraderError::Data {
                    reason: "bad row".into(),
                },
                std::process::ExitCode::from(3),
            ),
            (
                CombotraderError::UnknownIndicator { name: "rsi".into() },
                std::process::ExitCode::from(4),
            ),
            (CombotraderError::EmptyUniverse, std::process::ExitCode::from(4)),
        ];
        for (err, expected) in cases {
            assert_eq!(
                format!("{:?}", std::process::ExitCode::from(&err)),
                format!("{expected:?}"),
                "{err}"
            );
        }
    }
}
