//! Signal aggregation: reduce a chosen subset of indicator signals to one net
//! signal per row, then left-join the net series onto the bar timeline.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

use super::error::CombotraderError;
use super::ohlcv::Bar;
use super::signal::Signal;

/// Datetime index plus one signed column per indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFrame {
    datetimes: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<Signal>>,
}

impl SignalFrame {
    pub fn new(datetimes: Vec<NaiveDateTime>) -> Self {
        SignalFrame {
            datetimes,
            columns: BTreeMap::new(),
        }
    }

    /// Add (or replace) an indicator column. The column must match the index length.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Signal>,
    ) -> Result<(), CombotraderError> {
        let name = name.into();
        if values.len() != self.datetimes.len() {
            return Err(CombotraderError::Data {
                reason: format!(
                    "column {} has {} rows, index has {}",
                    name,
                    values.len(),
                    self.datetimes.len()
                ),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Signal>,
    ) -> Result<Self, CombotraderError> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.datetimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datetimes.is_empty()
    }

    pub fn datetimes(&self) -> &[NaiveDateTime] {
        &self.datetimes
    }

    /// Indicator names in sorted order.
    pub fn indicator_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Signal]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Net signal per row: sign of the row-wise sum over `subset`.
///
/// Balanced votes and all-zero rows resolve to hold. An empty subset yields
/// an all-hold series. No state is carried between rows.
pub fn aggregate<S: AsRef<str>>(
    frame: &SignalFrame,
    subset: &[S],
) -> Result<Vec<Signal>, CombotraderError> {
    let columns = subset
        .iter()
        .map(|name| {
            frame
                .column(name.as_ref())
                .ok_or_else(|| CombotraderError::UnknownIndicator {
                    name: name.as_ref().to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let net = (0..frame.len())
        .map(|row| {
            let vote: i64 = columns.iter().map(|col| col[row].value() as i64).sum();
            Signal::from_vote(vote)
        })
        .collect();
    Ok(net)
}

/// Left-join a signal series onto bars by exact datetime. Bars without a
/// matching signal row hold.
pub fn merge_onto_bars(
    bars: &[Bar],
    datetimes: &[NaiveDateTime],
    signals: &[Signal],
) -> Vec<Signal> {
    let by_time: HashMap<NaiveDateTime, Signal> = datetimes
        .iter()
        .copied()
        .zip(signals.iter().copied())
        .collect();
    bars.iter()
        .map(|bar| by_time.get(&bar.datetime).copied().unwrap_or_default())
        .collect()
}
