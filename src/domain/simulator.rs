//! Single-asset trade simulator.
//!
//! Walks bars in order with one aligned signal per bar. Each bar first
//! evaluates exits for an open position (take-profit, stop-loss, reversal),
//! then entries, so a reversal exit and the opposite entry can share a bar.
//! Entries commit the whole balance at the bar's open. Anything still open
//! after the last bar is force-closed at that bar's open.

use std::fmt;
use std::str::FromStr;

use super::error::CombotraderError;
use super::ledger::{Ledger, TradeAction, TradeRecord};
use super::ohlcv::{is_strictly_ascending, Bar};
use super::position::{ExitTrigger, Position};
use super::signal::Signal;

/// Whether a one-bar series may open a position.
///
/// Longer series always evaluate entries on their final bar and force-close
/// whatever opened there. For a single bar, `Suppress` never opens, so the
/// ledger is empty. `ForceClose` opens and immediately force-closes at the
/// same open, producing an entry and a close record sharing the bar's datetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastBarEntry {
    #[default]
    Suppress,
    ForceClose,
}

impl FromStr for LastBarEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suppress" => Ok(LastBarEntry::Suppress),
            "force_close" | "force-close" => Ok(LastBarEntry::ForceClose),
            other => Err(format!(
                "unknown last_bar_entry '{other}' (expected suppress or force_close)"
            )),
        }
    }
}

impl fmt::Display for LastBarEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastBarEntry::Suppress => f.write_str("suppress"),
            LastBarEntry::ForceClose => f.write_str("force_close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    /// Take-profit as a fraction of entry price.
    pub take_profit: f64,
    /// Stop-loss as a fraction of entry price.
    pub stop_loss: f64,
    /// Fee as a fraction of notional, charged on entry and on exit.
    pub fee_rate: f64,
    pub initial_balance: f64,
    pub last_bar_entry: LastBarEntry,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            take_profit: 0.05,
            stop_loss: 0.03,
            fee_rate: 0.0005,
            initial_balance: 1000.0,
            last_bar_entry: LastBarEntry::Suppress,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), CombotraderError> {
        if self.take_profit.is_nan() || self.take_profit <= 0.0 {
            return Err(CombotraderError::InvalidConfiguration {
                parameter: "take_profit",
                reason: format!("must be positive, got {}", self.take_profit),
            });
        }
        if self.stop_loss.is_nan() || self.stop_loss <= 0.0 {
            return Err(CombotraderError::InvalidConfiguration {
                parameter: "stop_loss",
                reason: format!("must be positive, got {}", self.stop_loss),
            });
        }
        if self.fee_rate.is_nan() || self.fee_rate < 0.0 {
            return Err(CombotraderError::InvalidConfiguration {
                parameter: "fee_rate",
                reason: format!("must be non-negative, got {}", self.fee_rate),
            });
        }
        if self.initial_balance.is_nan() || self.initial_balance <= 0.0 {
            return Err(CombotraderError::InvalidConfiguration {
                parameter: "initial_balance",
                reason: format!("must be positive, got {}", self.initial_balance),
            });
        }
        Ok(())
    }
}

/// Mutable state for one simulation call.
struct Simulation<'p> {
    params: &'p SimulationParams,
    position: Position,
    balance: f64,
    pnl_sum: f64,
    last_acted: Signal,
    ledger: Ledger,
}

impl<'p> Simulation<'p> {
    fn new(params: &'p SimulationParams) -> Self {
        Simulation {
            params,
            position: Position::Flat,
            balance: params.initial_balance,
            pnl_sum: 0.0,
            last_acted: Signal::Hold,
            ledger: Ledger::new(params.initial_balance),
        }
    }

    fn evaluate_exit(&mut self, bar: &Bar, signal: Signal) {
        let trigger = self.position.check_exit(
            bar,
            signal,
            self.params.take_profit,
            self.params.stop_loss,
        );
        if let Some(trigger) = trigger {
            self.close(bar, trigger);
        }
    }

    fn evaluate_entry(&mut self, bar: &Bar, signal: Signal) {
        if !self.position.is_flat() || signal.is_hold() || signal == self.last_acted {
            return;
        }

        let size = self.balance;
        self.position = Position::open(signal, bar.open, size, bar.datetime);
        self.balance -= size * self.params.fee_rate;
        self.pnl_sum -= self.params.fee_rate * 100.0;
        self.last_acted = signal;

        let action = if signal == Signal::Long {
            TradeAction::Buy
        } else {
            TradeAction::Short
        };
        tracing::trace!(datetime = %bar.datetime, %action, price = bar.open, size, "entry");
        self.ledger.push(TradeRecord {
            datetime: bar.datetime,
            action,
            buy_price: bar.open,
            sell_price: 0.0,
            pnl_percent: 0.0,
            pnl_sum: self.pnl_sum,
            balance: self.balance,
        });
    }

    fn force_close(&mut self, bar: &Bar) {
        if let Some(trigger) = self.position.forced_close(bar) {
            self.close(bar, trigger);
        }
    }

    fn close(&mut self, bar: &Bar, trigger: ExitTrigger) {
        let Some(open) = self.position.open_position() else {
            return;
        };
        let entry_price = open.entry_price;
        let size = open.size;

        let pnl_fraction = self.position.return_fraction(trigger.price);
        let pnl_money = size * pnl_fraction - size * self.params.fee_rate;
        self.balance += pnl_money;
        self.pnl_sum += pnl_fraction * 100.0;

        tracing::trace!(
            datetime = %bar.datetime,
            action = %trigger.action,
            price = trigger.price,
            pnl_money,
            "exit"
        );
        self.ledger.push(TradeRecord {
            datetime: bar.datetime,
            action: trigger.action,
            buy_price: entry_price,
            sell_price: trigger.price,
            pnl_percent: pnl_fraction * 100.0,
            pnl_sum: self.pnl_sum,
            balance: self.balance,
        });

        self.position = Position::Flat;
        self.last_acted = Signal::Hold;
    }
}

/// Simulate `bars` against their aligned `signals`.
///
/// Bars must be strictly ascending and `signals` must be 1:1 with `bars`;
/// this is the caller's responsibility and is only checked in debug builds.
/// In release builds a length mismatch simulates the common prefix.
pub fn simulate(
    bars: &[Bar],
    signals: &[Signal],
    params: &SimulationParams,
) -> Result<Ledger, CombotraderError> {
    params.validate()?;
    debug_assert!(is_strictly_ascending(bars), "bars must be strictly ascending");
    debug_assert_eq!(bars.len(), signals.len(), "signals must align 1:1 with bars");

    let n = bars.len().min(signals.len());
    let mut sim = Simulation::new(params);

    for (i, (bar, &signal)) in bars[..n].iter().zip(signals).enumerate() {
        sim.evaluate_exit(bar, signal);
        let only_bar = i == 0 && n == 1;
        if only_bar && params.last_bar_entry == LastBarEntry::Suppress {
            continue;
        }
        sim.evaluate_entry(bar, signal);
    }

    if let Some(last) = bars[..n].last() {
        sim.force_close(last);
    }

    Ok(sim.ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::hours(hour)
    }

    /// Bars from (open, high, low) triples, one hour apart.
    fn bars(ohl: &[(f64, f64, f64)]) -> Vec<Bar> {
        ohl.iter()
            .enumerate()
            .map(|(i, &(o, h, l))| Bar::new(at(i as i64), o, h, l, o))
            .collect()
    }

    fn signals(values: &[i64]) -> Vec<Signal> {
        values
            .iter()
            .map(|&v| Signal::from_value(v).unwrap())
            .collect()
    }

    fn no_fee() -> SimulationParams {
        SimulationParams {
            fee_rate: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let p = SimulationParams::default();
        assert_eq!(p.take_profit, 0.05);
        assert_eq!(p.stop_loss, 0.03);
        assert_eq!(p.fee_rate, 0.0005);
        assert_eq!(p.initial_balance, 1000.0);
        assert_eq!(p.last_bar_entry, LastBarEntry::Suppress);
    }

    #[test]
    fn invalid_parameters_rejected_before_simulating() {
        let b = bars(&[(100.0, 100.0, 100.0), (100.0, 100.0, 100.0)]);
        let s = signals(&[1, 0]);
        for params in [
            SimulationParams {
                take_profit: 0.0,
                ..Default::default()
            },
            SimulationParams {
                stop_loss: -0.01,
                ..Default::default()
            },
            SimulationParams {
                fee_rate: -0.0001,
                ..Default::default()
            },
            SimulationParams {
                initial_balance: 0.0,
                ..Default::default()
            },
            SimulationParams {
                take_profit: f64::NAN,
                ..Default::default()
            },
        ] {
            let result = simulate(&b, &s, &params);
            assert!(
                matches!(result, Err(CombotraderError::InvalidConfiguration { .. })),
                "{params:?}"
            );
        }
    }

    #[test]
    fn empty_input_gives_empty_ledger() {
        let ledger = simulate(&[], &[], &SimulationParams::default()).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.final_balance(), 1000.0);
    }

    #[test]
    fn all_hold_gives_empty_ledger() {
        let b = bars(&[(100.0, 120.0, 80.0); 5]);
        let ledger = simulate(&b, &signals(&[0; 5]), &SimulationParams::default()).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.final_balance(), 1000.0);
    }

    #[test]
    fn long_take_profit_scenario() {
        let b = bars(&[(100.0, 100.0, 100.0), (110.0, 115.0, 108.0)]);
        let ledger = simulate(&b, &signals(&[1, 1]), &no_fee()).unwrap();

        // the still-long signal re-enters at t1 and is force-closed there
        assert_eq!(ledger.len(), 4);
        let entry = &ledger.records()[0];
        assert_eq!(entry.action, TradeAction::Buy);
        assert_eq!(entry.buy_price, 100.0);
        assert_eq!(entry.pnl_percent, 0.0);

        let exit = &ledger.records()[1];
        assert_eq!(exit.action, TradeAction::SellTakeProfit);
        assert_eq!(exit.datetime, at(1));
        assert_eq!(exit.sell_price, 115.0);
        assert!((exit.pnl_percent - 15.0).abs() < 1e-9);
        assert!((exit.balance - 1150.0).abs() < 1e-9);
        assert_eq!(ledger.records()[2].action, TradeAction::Buy);
        assert_eq!(ledger.records()[3].action, TradeAction::SellClose);
        assert!((ledger.final_balance() - 1150.0).abs() < 1e-9);
    }

    #[test]
    fn take_profit_wins_when_both_thresholds_touched() {
        let b = bars(&[(100.0, 100.0, 100.0), (100.0, 130.0, 70.0)]);
        let ledger = simulate(&b, &signals(&[1, 0]), &no_fee()).unwrap();
        assert_eq!(ledger.records()[1].action, TradeAction::SellTakeProfit);
        assert_eq!(ledger.records()[1].sell_price, 130.0);
    }

    #[test]
    fn short_stop_loss_fills_at_high() {
        let b = bars(&[(100.0, 100.0, 100.0), (101.0, 104.0, 99.0)]);
        let ledger = simulate(&b, &signals(&[-1, 0]), &no_fee()).unwrap();
        let exit = &ledger.records()[1];
        assert_eq!(exit.action, TradeAction::CoverStopLoss);
        assert_eq!(exit.sell_price, 104.0);
        assert!((exit.pnl_percent - (-4.0)).abs() < 1e-9);
        assert!((exit.balance - 960.0).abs() < 1e-9);
    }

    #[test]
    fn same_bar_reversal_produces_two_records() {
        let b = bars(&[
            (100.0, 100.0, 100.0),
            (101.0, 102.0, 99.0),
            (101.0, 101.0, 101.0),
        ]);
        let ledger = simulate(&b, &signals(&[1, -1, 0]), &no_fee()).unwrap();
        let records = ledger.records();

        assert_eq!(records[1].action, TradeAction::ChangeDirection);
        assert_eq!(records[2].action, TradeAction::Short);
        assert_eq!(records[1].datetime, at(1));
        assert_eq!(records[2].datetime, at(1));
        assert_eq!(records[2].buy_price, 101.0);
        // then force-closed on the last bar
        assert_eq!(records[3].action, TradeAction::CoverClose);
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn same_signal_reenters_after_take_profit() {
        // last_acted resets on exit, so the still-active signal re-enters.
        let b = bars(&[
            (100.0, 100.0, 100.0),
            (110.0, 115.0, 108.0),
            (112.0, 113.0, 111.0),
        ]);
        let ledger = simulate(&b, &signals(&[1, 1, 1]), &no_fee()).unwrap();
        let actions: Vec<_> = ledger.records().iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                TradeAction::Buy,
                TradeAction::SellTakeProfit,
                TradeAction::Buy,
                TradeAction::SellClose,
            ]
        );
    }

    #[test]
    fn held_signal_does_not_stack_entries() {
        let b = bars(&[(100.0, 100.5, 99.5); 4]);
        let ledger = simulate(&b, &signals(&[1, 1, 1, 1]), &no_fee()).unwrap();
        let entries = ledger.records().iter().filter(|r| r.action.is_entry()).count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn open_position_force_closed_at_last_open() {
        let b = bars(&[
            (100.0, 100.0, 100.0),
            (101.0, 102.0, 99.0),
            (103.0, 104.0, 102.0),
        ]);
        let ledger = simulate(&b, &signals(&[1, 0, 0]), &no_fee()).unwrap();
        let last = ledger.last().unwrap();
        assert_eq!(last.action, TradeAction::SellClose);
        assert!(last.action.is_forced_close());
        assert_eq!(last.sell_price, 103.0);
        assert_eq!(last.datetime, at(2));
        assert!((last.pnl_percent - 3.0).abs() < 1e-9);
    }

    #[test]
    fn fees_charged_on_entry_and_exit() {
        let b = bars(&[(100.0, 100.0, 100.0), (110.0, 115.0, 108.0)]);
        let params = SimulationParams {
            fee_rate: 0.001,
            ..Default::default()
        };
        let ledger = simulate(&b, &signals(&[1, 0]), &params).unwrap();
        let entry = &ledger.records()[0];
        assert!((entry.balance - 999.0).abs() < 1e-9);
        assert!((entry.pnl_sum - (-0.1)).abs() < 1e-9);

        // size stays at the pre-fee balance: 999 + 1000 * 0.15 - 1000 * 0.001
        let exit = &ledger.records()[1];
        assert!((exit.balance - 1148.0).abs() < 1e-9);
        assert!((exit.pnl_sum - 14.9).abs() < 1e-9);
    }

    #[test]
    fn next_entry_reinvests_current_balance() {
        let b = bars(&[
            (100.0, 100.0, 100.0),
            (100.0, 111.0, 100.0),
            (110.0, 110.0, 110.0),
            (110.0, 110.0, 110.0),
        ]);
        let params = SimulationParams {
            take_profit: 0.1,
            ..no_fee()
        };
        let ledger = simulate(&b, &signals(&[1, 0, -1, 0]), &params).unwrap();
        // 1000 -> 1110 on take-profit, then short with the whole 1110
        let short = &ledger.records()[2];
        assert_eq!(short.action, TradeAction::Short);
        assert!((short.balance - 1110.0).abs() < 1e-9);
        assert!((ledger.final_balance() - 1110.0).abs() < 1e-9);
    }

    #[test]
    fn single_bar_suppressed_entry_is_empty() {
        let b = bars(&[(100.0, 101.0, 99.0)]);
        let ledger = simulate(&b, &signals(&[1]), &SimulationParams::default()).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.final_balance(), 1000.0);
    }

    #[test]
    fn single_bar_force_close_policy_opens_and_closes() {
        let b = bars(&[(100.0, 101.0, 99.0)]);
        let params = SimulationParams {
            last_bar_entry: LastBarEntry::ForceClose,
            ..Default::default()
        };
        let ledger = simulate(&b, &signals(&[1]), &params).unwrap();
        let records = ledger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, TradeAction::Buy);
        assert_eq!(records[1].action, TradeAction::SellClose);
        assert_eq!(records[0].datetime, records[1].datetime);
        assert_eq!(records[1].pnl_percent, 0.0);
        // round trip costs both fees on the full notional
        assert!((ledger.final_balance() - 999.0).abs() < 1e-9);
    }

    #[test]
    fn entry_on_final_bar_is_force_closed() {
        let b = bars(&[(100.0, 100.0, 100.0); 3]);
        let ledger = simulate(&b, &signals(&[0, 0, 1]), &SimulationParams::default()).unwrap();
        let records = ledger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, TradeAction::Buy);
        assert_eq!(records[1].action, TradeAction::SellClose);
        assert_eq!(records[0].datetime, at(2));
        assert_eq!(records[1].datetime, at(2));
        assert!((ledger.pnl_sum() + 0.05).abs() < 1e-9);
        assert!((ledger.final_balance() - 999.0).abs() < 1e-9);
    }

    #[test]
    fn reversal_on_final_bar_keeps_opposite_entry() {
        let b = bars(&[(100.0, 100.0, 100.0); 3]);
        let ledger = simulate(&b, &signals(&[1, 0, -1]), &SimulationParams::default()).unwrap();
        let actions: Vec<_> = ledger.records().iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                TradeAction::Buy,
                TradeAction::ChangeDirection,
                TradeAction::Short,
                TradeAction::CoverClose,
            ]
        );
        assert!(ledger.records()[1..].iter().all(|r| r.datetime == at(2)));
    }

    #[test]
    fn last_bar_entry_parses() {
        assert_eq!("suppress".parse::<LastBarEntry>(), Ok(LastBarEntry::Suppress));
        assert_eq!("Force_Close".parse::<LastBarEntry>(), Ok(LastBarEntry::ForceClose));
        assert_eq!("force-close".parse::<LastBarEntry>(), Ok(LastBarEntry::ForceClose));
        assert!("sometimes".parse::<LastBarEntry>().is_err());
        assert_eq!(LastBarEntry::ForceClose.to_string(), "force_close");
    }

    #[test]
    fn stop_loss_can_exceed_nominal_fraction_after_fees() {
        let b = bars(&[(100.0, 100.0, 100.0), (100.0, 100.0, 50.0)]);
        let params = SimulationParams {
            stop_loss: 0.5,
            fee_rate: 0.001,
            ..Default::default()
        };
        let ledger = simulate(&b, &signals(&[1, 0]), &params).unwrap();
        let loss = 1.0 - ledger.final_balance() / 1000.0;
        assert!(loss > params.stop_loss);
    }
}
