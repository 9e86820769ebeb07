//! Position state and exit-trigger evaluation.

use chrono::NaiveDateTime;

use super::ledger::TradeAction;
use super::ohlcv::Bar;
use super::signal::Signal;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_price: f64,
    /// Notional committed at entry (the whole balance at that time).
    pub size: f64,
    pub entry_time: NaiveDateTime,
}

/// At most one position is ever live; the variant makes a second one
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Position {
    #[default]
    Flat,
    Long(OpenPosition),
    Short(OpenPosition),
}

/// A fired exit condition: the price it fills at and how it is labelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub price: f64,
    pub action: TradeAction,
}

impl Position {
    /// Open a position in the direction of `signal`. Hold stays flat.
    pub fn open(signal: Signal, entry_price: f64, size: f64, entry_time: NaiveDateTime) -> Self {
        let open = OpenPosition {
            entry_price,
            size,
            entry_time,
        };
        match signal {
            Signal::Long => Position::Long(open),
            Signal::Short => Position::Short(open),
            Signal::Hold => Position::Flat,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long(_))
    }

    pub fn is_short(&self) -> bool {
        matches!(self, Position::Short(_))
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            Position::Flat => None,
            Position::Long(open) | Position::Short(open) => Some(open),
        }
    }

    /// Directional return as a fraction of the entry price.
    pub fn return_fraction(&self, exit_price: f64) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long(open) => (exit_price - open.entry_price) / open.entry_price,
            Position::Short(open) => (open.entry_price - exit_price) / open.entry_price,
        }
    }

    /// First matching exit for this bar: take-profit, then stop-loss, then
    /// an opposing signal at the bar's open.
    pub fn check_exit(&self, bar: &Bar, signal: Signal, tp: f64, sl: f64) -> Option<ExitTrigger> {
        match self {
            Position::Flat => None,
            Position::Long(open) => {
                if bar.high >= open.entry_price * (1.0 + tp) {
                    Some(ExitTrigger {
                        price: bar.high,
                        action: TradeAction::SellTakeProfit,
                    })
                } else if bar.low <= open.entry_price * (1.0 - sl) {
                    Some(ExitTrigger {
                        price: bar.low,
                        action: TradeAction::SellStopLoss,
                    })
                } else if signal == Signal::Short {
                    Some(ExitTrigger {
                        price: bar.open,
                        action: TradeAction::ChangeDirection,
                    })
                } else {
                    None
                }
            }
            Position::Short(open) => {
                if bar.low <= open.entry_price * (1.0 - tp) {
                    Some(ExitTrigger {
                        price: bar.low,
                        action: TradeAction::CoverTakeProfit,
                    })
                } else if bar.high >= open.entry_price * (1.0 + sl) {
                    Some(ExitTrigger {
                        price: bar.high,
                        action: TradeAction::CoverStopLoss,
                    })
                } else if signal == Signal::Long {
                    Some(ExitTrigger {
                        price: bar.open,
                        action: TradeAction::ChangeDirection,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Exit used when the series ends with the position still open.
    pub fn forced_close(&self, bar: &Bar) -> Option<ExitTrigger> {
        let action = match self {
            Position::Flat => return None,
            Position::Long(_) => TradeAction::SellClose,
            Position::Short(_) => TradeAction::CoverClose,
        };
        Some(ExitTrigger {
            price: bar.open,
            action,
        })
    }
}
