//! Report persistence port trait.

use crate::domain::error::CombotraderError;
use crate::domain::ledger::Ledger;
use crate::domain::metrics::MetricsRecord;

/// One accepted strategy as persisted in the strategies table.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRow {
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub metrics: MetricsRecord,
    /// Membership flag per indicator in the universe, in universe order.
    pub membership: Vec<(String, bool)>,
}

/// Port for writing ledgers and the accepted-strategy table.
pub trait ReportPort {
    fn write_ledger(&self, name: &str, ledger: &Ledger) -> Result<(), CombotraderError>;

    fn write_strategies(&self, rows: &[StrategyRow]) -> Result<(), CombotraderError>;
}
