//! OHLCV bar representation.

use chrono::NaiveDateTime;

/// One price observation for a fixed interval. Datetimes are UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub datetime: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(datetime: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Bar {
            datetime,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }
}

/// True when datetimes are strictly increasing.
pub fn is_strictly_ascending(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].datetime < w[1].datetime)
}
