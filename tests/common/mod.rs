#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use combotrader::domain::aggregate::SignalFrame;
use combotrader::domain::error::CombotraderError;
use combotrader::domain::ledger::Ledger;
pub use combotrader::domain::ohlcv::Bar;
pub use combotrader::domain::signal::Signal;
use combotrader::domain::simulator::SimulationParams;
use combotrader::ports::data_port::DataPort;
use combotrader::ports::report_port::{ReportPort, StrategyRow};
use std::sync::Mutex;

pub struct MockDataPort {
    pub bars: Vec<Bar>,
    pub frame: SignalFrame,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(bars: Vec<Bar>, frame: SignalFrame) -> Self {
        Self {
            bars,
            frame,
            error: None,
        }
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self) -> Result<Vec<Bar>, CombotraderError> {
        if let Some(reason) = &self.error {
            return Err(CombotraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.bars.clone())
    }

    fn fetch_signal_frame(&self) -> Result<SignalFrame, CombotraderError> {
        Ok(self.frame.clone())
    }
}

/// Keeps everything written to it in memory.
#[derive(Default)]
pub struct MemoryReportPort {
    pub ledgers: Mutex<Vec<(String, Ledger)>>,
    pub strategies: Mutex<Vec<StrategyRow>>,
}

impl ReportPort for MemoryReportPort {
    fn write_ledger(&self, name: &str, ledger: &Ledger) -> Result<(), CombotraderError> {
        self.ledgers
            .lock()
            .unwrap()
            .push((name.to_string(), ledger.clone()));
        Ok(())
    }

    fn write_strategies(&self, rows: &[StrategyRow]) -> Result<(), CombotraderError> {
        *self.strategies.lock().unwrap() = rows.to_vec();
        Ok(())
    }
}

pub fn hour(h: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::hours(h)
}

pub fn make_bar(h: i64, open: f64, high: f64, low: f64) -> Bar {
    Bar::new(hour(h), open, high, low, open)
}

pub fn flat_bar(h: i64, price: f64) -> Bar {
    make_bar(h, price, price, price)
}

/// Hourly bars with the open stepping by `step` and a +/-1 range.
pub fn generate_bars(count: usize, start_price: f64, step: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let open = start_price + step * i as f64;
            make_bar(i as i64, open, open + 1.0, open - 1.0)
        })
        .collect()
}

pub fn signals(values: &[i64]) -> Vec<Signal> {
    values
        .iter()
        .map(|&v| Signal::from_value(v).unwrap())
        .collect()
}

/// A frame on the bars' own timeline.
pub fn frame_for(bars: &[Bar], columns: &[(&str, Vec<Signal>)]) -> SignalFrame {
    let mut frame = SignalFrame::new(bars.iter().map(|b| b.datetime).collect());
    for (name, values) in columns {
        frame.insert_column(*name, values.clone()).unwrap();
    }
    frame
}

pub fn no_fee_params() -> SimulationParams {
    SimulationParams {
        fee_rate: 0.0,
        ..Default::default()
    }
}
