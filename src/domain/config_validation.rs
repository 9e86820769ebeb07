//! Configuration validation.
//!
//! Checks every config field a run depends on before any data is loaded.

use crate::domain::error::CombotraderError;
use crate::domain::metrics::BarFrequency;
use crate::domain::search::SamplerKind;
use crate::domain::simulator::LastBarEntry;
use crate::ports::config_port::ConfigPort;

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    validate_positive(config, "simulation", "take_profit", 0.05)?;
    validate_positive(config, "simulation", "stop_loss", 0.03)?;
    validate_fee_rate(config)?;
    validate_positive(config, "simulation", "initial_balance", 1000.0)?;
    validate_last_bar_entry(config)?;
    Ok(())
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    validate_min_pnl_sum(config)?;
    validate_at_least_one(config, "sessions", 5)?;
    validate_at_least_one(config, "rounds_per_session", 1)?;
    validate_seed(config)?;
    validate_sampler(config)?;
    validate_bar_frequency(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    validate_present(config, "data", "bars_path")?;
    validate_present(config, "data", "signals_path")?;
    Ok(())
}

/// A key that is present must parse as a number; an absent key takes its default.
fn numeric_value(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, CombotraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<f64>().map_err(|_| CombotraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{}' is not a number", raw.trim()),
        }),
    }
}

fn validate_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), CombotraderError> {
    let value = numeric_value(config, section, key, default)?;
    if value.is_nan() || value <= 0.0 {
        return Err(CombotraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be positive"),
        });
    }
    Ok(())
}

fn validate_fee_rate(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    let value = numeric_value(config, "simulation", "fee_rate", 0.0005)?;
    if value.is_nan() || value < 0.0 {
        return Err(CombotraderError::ConfigInvalid {
            section: "simulation".to_string(),
            key: "fee_rate".to_string(),
            reason: "fee_rate must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_last_bar_entry(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    if let Some(raw) = config.get_string("simulation", "last_bar_entry") {
        raw.parse::<LastBarEntry>()
            .map_err(|reason| CombotraderError::ConfigInvalid {
                section: "simulation".to_string(),
                key: "last_bar_entry".to_string(),
                reason,
            })?;
    }
    Ok(())
}

fn validate_min_pnl_sum(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    let value = numeric_value(config, "search", "min_pnl_sum", 100.0)?;
    if value.is_nan() {
        return Err(CombotraderError::ConfigInvalid {
            section: "search".to_string(),
            key: "min_pnl_sum".to_string(),
            reason: "min_pnl_sum must be a number".to_string(),
        });
    }
    Ok(())
}

fn validate_at_least_one(
    config: &dyn ConfigPort,
    key: &str,
    default: i64,
) -> Result<(), CombotraderError> {
    let value = match config.get_string("search", key) {
        None => default,
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| CombotraderError::ConfigInvalid {
            section: "search".to_string(),
            key: key.to_string(),
            reason: format!("'{}' is not an integer", raw.trim()),
        })?,
    };
    if value < 1 {
        return Err(CombotraderError::ConfigInvalid {
            section: "search".to_string(),
            key: key.to_string(),
            reason: format!("{key} must be at least 1"),
        });
    }
    Ok(())
}

fn validate_seed(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    if let Some(raw) = config.get_string("search", "seed") {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| CombotraderError::ConfigInvalid {
                section: "search".to_string(),
                key: "seed".to_string(),
                reason: "seed must be a non-negative integer".to_string(),
            })?;
    }
    Ok(())
}

fn validate_sampler(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    if let Some(raw) = config.get_string("search", "sampler") {
        raw.parse::<SamplerKind>()
            .map_err(|reason| CombotraderError::ConfigInvalid {
                section: "search".to_string(),
                key: "sampler".to_string(),
                reason,
            })?;
    }
    Ok(())
}

fn validate_bar_frequency(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    if let Some(raw) = config.get_string("search", "bar_frequency") {
        raw.parse::<BarFrequency>()
            .map_err(|reason| CombotraderError::ConfigInvalid {
                section: "search".to_string(),
                key: "bar_frequency".to_string(),
                reason,
            })?;
    }
    Ok(())
}

fn validate_present(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), CombotraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(CombotraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}
