//! Performance metrics over a trade ledger.

use std::fmt;
use std::str::FromStr;

use super::ledger::Ledger;

const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Bar interval used to annualise Sharpe. Crypto markets trade every day,
/// so a year is 365 days of bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarFrequency {
    Minute,
    FiveMinutes,
    FifteenMinutes,
    Hour,
    FourHours,
    Day,
    /// Explicit number of bars per year.
    Custom(f64),
}

impl BarFrequency {
    pub fn periods_per_year(self) -> f64 {
        match self {
            BarFrequency::Minute => MINUTES_PER_YEAR,
            BarFrequency::FiveMinutes => MINUTES_PER_YEAR / 5.0,
            BarFrequency::FifteenMinutes => MINUTES_PER_YEAR / 15.0,
            BarFrequency::Hour => 365.0 * 24.0,
            BarFrequency::FourHours => 365.0 * 6.0,
            BarFrequency::Day => 365.0,
            BarFrequency::Custom(n) => n,
        }
    }
}

impl FromStr for BarFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(BarFrequency::Minute),
            "5m" => Ok(BarFrequency::FiveMinutes),
            "15m" => Ok(BarFrequency::FifteenMinutes),
            "1h" => Ok(BarFrequency::Hour),
            "4h" => Ok(BarFrequency::FourHours),
            "1d" => Ok(BarFrequency::Day),
            other => match other.parse::<f64>() {
                Ok(n) if n > 0.0 && n.is_finite() => Ok(BarFrequency::Custom(n)),
                _ => Err(format!(
                    "unknown bar frequency '{other}' (expected 1m, 5m, 15m, 1h, 4h, 1d or bars per year)"
                )),
            },
        }
    }
}

impl fmt::Display for BarFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarFrequency::Minute => f.write_str("1m"),
            BarFrequency::FiveMinutes => f.write_str("5m"),
            BarFrequency::FifteenMinutes => f.write_str("15m"),
            BarFrequency::Hour => f.write_str("1h"),
            BarFrequency::FourHours => f.write_str("4h"),
            BarFrequency::Day => f.write_str("1d"),
            BarFrequency::Custom(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub final_balance: f64,
    pub pnl_sum: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub max_drawdown: f64,
}

impl MetricsRecord {
    /// Zero-value record for a ledger with no trades.
    pub fn empty(initial_balance: f64) -> Self {
        MetricsRecord {
            final_balance: initial_balance,
            pnl_sum: 0.0,
            sharpe_ratio: 0.0,
            total_trades: 0,
            win_rate: 0.0,
            max_drawdown: 0.0,
        }
    }

    pub fn compute(ledger: &Ledger, bars_per_year: f64) -> Self {
        if ledger.is_empty() {
            return Self::empty(ledger.initial_balance());
        }

        let records = ledger.records();

        let total_trades = records
            .iter()
            .filter(|r| r.action.is_counted_trade())
            .count();
        let winning_trades = records
            .iter()
            .filter(|r| r.action.is_counted_trade() && r.pnl_percent > 0.0)
            .count();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let exit_returns: Vec<f64> = ledger.exits().map(|r| r.pnl_percent / 100.0).collect();
        let sharpe_ratio = compute_sharpe(&exit_returns, bars_per_year);

        let all_returns: Vec<f64> = records.iter().map(|r| r.pnl_percent / 100.0).collect();
        let max_drawdown = compute_drawdown(&all_returns);

        MetricsRecord {
            final_balance: ledger.final_balance(),
            pnl_sum: ledger.pnl_sum(),
            sharpe_ratio,
            total_trades,
            win_rate,
            max_drawdown,
        }
    }
}

/// Score a ledger. Pure; an empty ledger gives the zero-value record.
pub fn score(ledger: &Ledger, bars_per_year: f64) -> MetricsRecord {
    MetricsRecord::compute(ledger, bars_per_year)
}

/// Mean over sample standard deviation, annualised by `sqrt(bars_per_year)`.
fn compute_sharpe(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev > f64::EPSILON {
        mean / stddev * bars_per_year.sqrt()
    } else {
        0.0
    }
}

/// Most negative `(cum - peak) / peak` over the compounded return curve.
fn compute_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;

    for r in returns {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
        }
        if peak > 0.0 {
            let dd = (cumulative - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}
