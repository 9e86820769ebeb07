//! Trade ledger produced by the simulator.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Buy,
    Short,
    SellTakeProfit,
    SellStopLoss,
    CoverTakeProfit,
    CoverStopLoss,
    ChangeDirection,
    SellClose,
    CoverClose,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Short => "short",
            TradeAction::SellTakeProfit => "sell-tp",
            TradeAction::SellStopLoss => "sell-sl",
            TradeAction::CoverTakeProfit => "cover-tp",
            TradeAction::CoverStopLoss => "cover-sl",
            TradeAction::ChangeDirection => "change_direction",
            TradeAction::SellClose => "sell-close",
            TradeAction::CoverClose => "cover-close",
        }
    }

    pub fn is_entry(self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Short)
    }

    pub fn is_exit(self) -> bool {
        !self.is_entry()
    }

    pub fn is_forced_close(self) -> bool {
        matches!(self, TradeAction::SellClose | TradeAction::CoverClose)
    }

    /// Exits counted as completed trades: take-profit, stop-loss and forced
    /// closes. Reversal exits are not counted.
    pub fn is_counted_trade(self) -> bool {
        self.is_exit() && self != TradeAction::ChangeDirection
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TradeAction::Buy),
            "short" => Ok(TradeAction::Short),
            "sell-tp" => Ok(TradeAction::SellTakeProfit),
            "sell-sl" => Ok(TradeAction::SellStopLoss),
            "cover-tp" => Ok(TradeAction::CoverTakeProfit),
            "cover-sl" => Ok(TradeAction::CoverStopLoss),
            "change_direction" => Ok(TradeAction::ChangeDirection),
            "sell-close" => Ok(TradeAction::SellClose),
            "cover-close" => Ok(TradeAction::CoverClose),
            other => Err(format!("unknown trade action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub datetime: NaiveDateTime,
    pub action: TradeAction,
    /// Entry price of the position.
    pub buy_price: f64,
    /// Exit price; 0 on entry records.
    pub sell_price: f64,
    /// Price return in percent; 0 on entry records.
    pub pnl_percent: f64,
    /// Running non-compounded sum in percentage points.
    pub pnl_sum: f64,
    /// Balance after this record.
    pub balance: f64,
}

/// Append-only while simulating, immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    initial_balance: f64,
    records: Vec<TradeRecord>,
}

impl Ledger {
    pub fn new(initial_balance: f64) -> Self {
        Ledger {
            initial_balance,
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: TradeRecord) {
        self.records.push(record);
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TradeRecord> {
        self.records.last()
    }

    /// Balance after the last record, or the initial balance.
    pub fn final_balance(&self) -> f64 {
        self.last().map_or(self.initial_balance, |r| r.balance)
    }

    pub fn pnl_sum(&self) -> f64 {
        self.last().map_or(0.0, |r| r.pnl_sum)
    }

    pub fn exits(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter(|r| r.action.is_exit())
    }
}
