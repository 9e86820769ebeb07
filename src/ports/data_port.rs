//! Data access port trait.

use crate::domain::aggregate::SignalFrame;
use crate::domain::error::CombotraderError;
use crate::domain::ohlcv::Bar;

pub trait DataPort {
    /// Bars in strictly ascending datetime order.
    fn fetch_bars(&self) -> Result<Vec<Bar>, CombotraderError>;

    /// Per-indicator signal columns on the signal timeline.
    fn fetch_signal_frame(&self) -> Result<SignalFrame, CombotraderError>;

    /// Indicator names available in the signal frame, sorted.
    fn list_indicators(&self) -> Result<Vec<String>, CombotraderError> {
        Ok(self.fetch_signal_frame()?.indicator_names())
    }
}
