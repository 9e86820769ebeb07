//! CSV report adapter: one file per ledger plus a strategies table.

use crate::domain::error::CombotraderError;
use crate::domain::ledger::Ledger;
use crate::ports::report_port::{ReportPort, StrategyRow};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STRATEGIES_FILE: &str = "strategies.csv";

const STRATEGY_COLUMNS: [&str; 9] = [
    "name",
    "exchange",
    "symbol",
    "final_balance",
    "pnl_sum",
    "sharpe_ratio",
    "total_trades",
    "win_rate",
    "max_drawdown",
];

pub struct CsvReportAdapter {
    directory: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ledger_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.csv"))
    }

    pub fn strategies_path(&self) -> PathBuf {
        self.directory.join(STRATEGIES_FILE)
    }

    fn writer(&self, path: &Path) -> Result<csv::Writer<fs::File>, CombotraderError> {
        fs::create_dir_all(&self.directory)?;
        Ok(csv::Writer::from_path(path).map_err(io::Error::from)?)
    }
}

impl ReportPort for CsvReportAdapter {
    /// Percentages are written with 4 decimals and balances with 2.
    fn write_ledger(&self, name: &str, ledger: &Ledger) -> Result<(), CombotraderError> {
        let path = self.ledger_path(name);
        let mut wtr = self.writer(&path)?;
        wtr.write_record([
            "datetime",
            "action",
            "buy_price",
            "sell_price",
            "pnl_percent",
            "pnl_sum",
            "balance",
        ])
        .map_err(io::Error::from)?;

        for r in ledger.records() {
            wtr.write_record([
                r.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.action.to_string(),
                r.buy_price.to_string(),
                r.sell_price.to_string(),
                format!("{:.4}", r.pnl_percent),
                format!("{:.4}", r.pnl_sum),
                format!("{:.2}", r.balance),
            ])
            .map_err(io::Error::from)?;
        }
        wtr.flush()?;
        tracing::debug!(path = %path.display(), records = ledger.len(), "wrote ledger");
        Ok(())
    }

    fn write_strategies(&self, rows: &[StrategyRow]) -> Result<(), CombotraderError> {
        let path = self.strategies_path();
        let mut wtr = self.writer(&path)?;

        let mut header: Vec<String> = STRATEGY_COLUMNS.iter().map(|c| c.to_string()).collect();
        if let Some(first) = rows.first() {
            header.extend(first.membership.iter().map(|(name, _)| name.clone()));
        }
        wtr.write_record(&header).map_err(io::Error::from)?;

        for row in rows {
            let m = &row.metrics;
            let mut record = vec![
                row.name.clone(),
                row.exchange.clone(),
                row.symbol.clone(),
                m.final_balance.to_string(),
                m.pnl_sum.to_string(),
                m.sharpe_ratio.to_string(),
                m.total_trades.to_string(),
                m.win_rate.to_string(),
                m.max_drawdown.to_string(),
            ];
            record.extend(row.membership.iter().map(|(_, included)| included.to_string()));
            wtr.write_record(&record).map_err(io::Error::from)?;
        }
        wtr.flush()?;
        tracing::debug!(path = %path.display(), strategies = rows.len(), "wrote strategies table");
        Ok(())
    }
}
