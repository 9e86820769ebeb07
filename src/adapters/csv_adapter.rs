//! CSV file data adapter.
//!
//! Bars: a header row naming `datetime` (or `date`/`timestamp`), `open`,
//! `high`, `low`, `close` and optionally `volume`, in any column order.
//! Signals: a datetime column plus one column per indicator named
//! `sig_<indicator>` holding -1, 0 or 1. Other columns are ignored and empty
//! signal cells read as 0.

use crate::domain::aggregate::SignalFrame;
use crate::domain::error::CombotraderError;
use crate::domain::ohlcv::Bar;
use crate::domain::signal::Signal;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

pub const SIGNAL_PREFIX: &str = "sig_";

const DATETIME_COLUMNS: [&str; 3] = ["datetime", "date", "timestamp"];

pub struct CsvAdapter {
    bars_path: PathBuf,
    signals_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(bars_path: PathBuf, signals_path: PathBuf) -> Self {
        Self {
            bars_path,
            signals_path,
        }
    }

    fn reader(path: &Path) -> Result<csv::Reader<std::io::Cursor<String>>, CombotraderError> {
        let content = fs::read_to_string(path).map_err(|e| CombotraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Ok(csv::Reader::from_reader(std::io::Cursor::new(content)))
    }
}

/// Parse the datetime formats found in exported bar and signal files.
/// Offsets are converted to UTC and dropped.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn required_column(
    headers: &csv::StringRecord,
    names: &[&str],
    path: &Path,
) -> Result<usize, CombotraderError> {
    column_index(headers, names).ok_or_else(|| CombotraderError::Data {
        reason: format!("{}: missing {} column", path.display(), names[0]),
    })
}

fn parse_price(record: &csv::StringRecord, index: usize, name: &str, line: usize) -> Result<f64, CombotraderError> {
    let raw = record.get(index).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|e| CombotraderError::Data {
        reason: format!("line {line}: invalid {name} value '{raw}': {e}"),
    })
}

fn parse_signal(raw: &str, column: &str, line: usize) -> Result<Signal, CombotraderError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Signal::Hold);
    }
    let value = raw
        .parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0)
                .map(|v| v as i64)
        })
        .and_then(Signal::from_value);
    value.ok_or_else(|| CombotraderError::Data {
        reason: format!("line {line}: {column} must be -1, 0 or 1, got '{raw}'"),
    })
}

fn ensure_strictly_ascending(
    datetimes: impl Iterator<Item = NaiveDateTime>,
    path: &Path,
) -> Result<(), CombotraderError> {
    let mut previous: Option<NaiveDateTime> = None;
    for dt in datetimes {
        if previous == Some(dt) {
            return Err(CombotraderError::Data {
                reason: format!("{}: duplicate datetime {}", path.display(), dt),
            });
        }
        previous = Some(dt);
    }
    Ok(())
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self) -> Result<Vec<Bar>, CombotraderError> {
        let path = &self.bars_path;
        let mut rdr = Self::reader(path)?;
        let headers = rdr
            .headers()
            .map_err(|e| CombotraderError::Data {
                reason: format!("CSV header error in {}: {}", path.display(), e),
            })?
            .clone();

        let dt_idx = required_column(&headers, &DATETIME_COLUMNS, path)?;
        let open_idx = required_column(&headers, &["open"], path)?;
        let high_idx = required_column(&headers, &["high"], path)?;
        let low_idx = required_column(&headers, &["low"], path)?;
        let close_idx = required_column(&headers, &["close"], path)?;
        let volume_idx = column_index(&headers, &["volume"]);

        let mut bars = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| CombotraderError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let raw_dt = record.get(dt_idx).unwrap_or("");
            let datetime = parse_datetime(raw_dt).ok_or_else(|| CombotraderError::Data {
                reason: format!("line {line}: invalid datetime '{raw_dt}'"),
            })?;

            let bar = Bar::new(
                datetime,
                parse_price(&record, open_idx, "open", line)?,
                parse_price(&record, high_idx, "high", line)?,
                parse_price(&record, low_idx, "low", line)?,
                parse_price(&record, close_idx, "close", line)?,
            );
            let bar = match volume_idx {
                Some(idx) => bar.with_volume(parse_price(&record, idx, "volume", line)?),
                None => bar,
            };
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.datetime);
        ensure_strictly_ascending(bars.iter().map(|b| b.datetime), path)?;
        tracing::debug!(path = %path.display(), bars = bars.len(), "loaded bars");
        Ok(bars)
    }

    fn fetch_signal_frame(&self) -> Result<SignalFrame, CombotraderError> {
        let path = &self.signals_path;
        let mut rdr = Self::reader(path)?;
        let headers = rdr
            .headers()
            .map_err(|e| CombotraderError::Data {
                reason: format!("CSV header error in {}: {}", path.display(), e),
            })?
            .clone();

        let dt_idx = required_column(&headers, &DATETIME_COLUMNS, path)?;
        let signal_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| {
                h.trim()
                    .strip_prefix(SIGNAL_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (i, name.to_string()))
            })
            .collect();

        let mut rows: Vec<(NaiveDateTime, Vec<Signal>)> = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| CombotraderError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let raw_dt = record.get(dt_idx).unwrap_or("");
            let datetime = parse_datetime(raw_dt).ok_or_else(|| CombotraderError::Data {
                reason: format!("line {line}: invalid datetime '{raw_dt}'"),
            })?;

            let signals = signal_columns
                .iter()
                .map(|(idx, name)| parse_signal(record.get(*idx).unwrap_or(""), name, line))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push((datetime, signals));
        }

        rows.sort_by_key(|(dt, _)| *dt);
        ensure_strictly_ascending(rows.iter().map(|(dt, _)| *dt), path)?;

        let mut frame = SignalFrame::new(rows.iter().map(|(dt, _)| *dt).collect());
        for (col, (_, name)) in signal_columns.iter().enumerate() {
            let values = rows.iter().map(|(_, signals)| signals[col]).collect();
            frame.insert_column(name.clone(), values)?;
        }
        tracing::debug!(
            path = %path.display(),
            rows = frame.len(),
            indicators = signal_columns.len(),
            "loaded signal frame"
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup(bars: &str, signals: &str) -> (TempDir, CsvAdapter) {
        let dir = TempDir::new().unwrap();
        let bars_path = dir.path().join("bars.csv");
        let signals_path = dir.path().join("signals.csv");
        fs::write(&bars_path, bars).unwrap();
        fs::write(&signals_path, signals).unwrap();
        (dir, CsvAdapter::new(bars_path, signals_path))
    }

    const BARS: &str = "datetime,open,high,low,close,volume\n\
        2024-01-15 00:01:00,101.0,102.0,100.0,101.5,7\n\
        2024-01-15 00:00:00,100.0,110.0,90.0,105.0,5\n";

    const SIGNALS: &str = "datetime,sig_rsi,close,sig_macd\n\
        2024-01-15 01:00:00,-1,100.0,1\n\
        2024-01-15 00:00:00,1,99.0,\n";

    #[test]
    fn fetch_bars_sorts_and_reads_all_fields() {
        let (_dir, adapter) = setup(BARS, SIGNALS);
        let bars = adapter.fetch_bars().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].datetime, dt(0, 0));
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 5.0);
        assert_eq!(bars[1].datetime, dt(0, 1));
    }

    #[test]
    fn fetch_bars_without_volume_column() {
        let (_dir, adapter) = setup("date,close,open,low,high\n2024-01-15,1,2,0.5,3\n", SIGNALS);
        let bars = adapter.fetch_bars().unwrap();
        assert_eq!(bars[0].datetime, dt(0, 0));
        assert_eq!(bars[0].open, 2.0);
        assert_eq!(bars[0].high, 3.0);
        assert_eq!(bars[0].volume, 0.0);
    }

    #[test]
    fn fetch_bars_rejects_duplicate_datetimes() {
        let bars = "datetime,open,high,low,close\n\
            2024-01-15 00:00:00,1,1,1,1\n\
            2024-01-15 00:00:00,2,2,2,2\n";
        let (_dir, adapter) = setup(bars, SIGNALS);
        assert!(matches!(adapter.fetch_bars(), Err(CombotraderError::Data { .. })));
    }

    #[test]
    fn fetch_bars_rejects_missing_column() {
        let (_dir, adapter) = setup("datetime,open,high,low\n2024-01-15,1,1,1\n", SIGNALS);
        let err = adapter.fetch_bars().unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn fetch_bars_rejects_bad_price() {
        let (_dir, adapter) = setup("datetime,open,high,low,close\n2024-01-15,x,1,1,1\n", SIGNALS);
        assert!(matches!(adapter.fetch_bars(), Err(CombotraderError::Data { .. })));
    }

    #[test]
    fn missing_file_is_data_error() {
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent/bars.csv"), PathBuf::from("/nonexistent/s.csv"));
        assert!(matches!(adapter.fetch_bars(), Err(CombotraderError::Data { .. })));
        assert!(matches!(adapter.fetch_signal_frame(), Err(CombotraderError::Data { .. })));
    }

    #[test]
    fn signal_frame_strips_prefix_and_fills_blanks() {
        let (_dir, adapter) = setup(BARS, SIGNALS);
        let frame = adapter.fetch_signal_frame().unwrap();
        assert_eq!(frame.indicator_names(), vec!["macd", "rsi"]);
        assert_eq!(frame.datetimes(), &[dt(0, 0), dt(1, 0)]);
        assert_eq!(frame.column("rsi").unwrap(), &[Signal::Long, Signal::Short]);
        assert_eq!(frame.column("macd").unwrap(), &[Signal::Hold, Signal::Long]);
        assert!(!frame.contains("close"));
    }

    #[test]
    fn signal_values_accept_float_spelling() {
        let (_dir, adapter) = setup(BARS, "datetime,sig_obv\n2024-01-15 00:00:00,-1.0\n");
        let frame = adapter.fetch_signal_frame().unwrap();
        assert_eq!(frame.column("obv").unwrap(), &[Signal::Short]);
    }

    #[test]
    fn signal_values_out_of_range_fail() {
        let (_dir, adapter) = setup(BARS, "datetime,sig_obv\n2024-01-15 00:00:00,2\n");
        let err = adapter.fetch_signal_frame().unwrap_err();
        assert!(err.to_string().contains("obv"));
    }

    #[test]
    fn list_indicators_uses_signal_columns() {
        let (_dir, adapter) = setup(BARS, SIGNALS);
        assert_eq!(adapter.list_indicators().unwrap(), vec!["macd", "rsi"]);
    }

    #[test]
    fn parse_datetime_formats() {
        assert_eq!(parse_datetime("2024-01-15 01:00:00"), Some(dt(1, 0)));
        assert_eq!(parse_datetime("2024-01-15T01:00:00"), Some(dt(1, 0)));
        assert_eq!(parse_datetime("2024-01-15T03:00:00+02:00"), Some(dt(1, 0)));
        assert_eq!(parse_datetime("2024-01-15 01:00:00+00:00"), Some(dt(1, 0)));
        assert_eq!(parse_datetime("2024-01-15"), Some(dt(0, 0)));
        assert_eq!(parse_datetime("15/01/2024"), None);
    }
}
