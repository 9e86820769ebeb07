//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::aggregate::{aggregate, merge_onto_bars, SignalFrame};
use crate::domain::config_validation::{
    validate_data_config, validate_search_config, validate_simulation_config,
};
use crate::domain::error::CombotraderError;
use crate::domain::ledger::Ledger;
use crate::domain::metrics::{score, BarFrequency, MetricsRecord};
use crate::domain::search::{
    run_sessions, SamplerKind, SearchConfig, SearchInputs, SearchSpace, SessionConfig,
};
use crate::domain::simulator::{simulate, LastBarEntry, SimulationParams};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, StrategyRow};

#[derive(Parser, Debug)]
#[command(
    name = "combotrader",
    about = "Search indicator combinations for a profitable combined signal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate and score one fixed indicator subset
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated indicator names (default: every indicator)
        #[arg(short, long)]
        indicators: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search indicator subsets across independent seeded sessions
    Search {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        sampler: Option<String>,
        #[arg(long)]
        sessions: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List indicators found in the signal file
    ListIndicators {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            indicators,
            output,
        } => run_backtest(&config, indicators.as_deref(), output.as_deref()),
        Command::Search {
            config,
            output,
            sampler,
            sessions,
            seed,
        } => run_search(
            &config,
            output.as_deref(),
            SearchOverrides {
                sampler,
                sessions,
                seed,
            },
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListIndicators { config } => run_list_indicators(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, CombotraderError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Check every section a run reads.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), CombotraderError> {
    validate_simulation_config(config)?;
    validate_search_config(config)?;
    validate_data_config(config)?;
    Ok(())
}

fn config_invalid(section: &str, key: &str, reason: String) -> CombotraderError {
    CombotraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

pub fn build_simulation_params(
    config: &dyn ConfigPort,
) -> Result<SimulationParams, CombotraderError> {
    let defaults = SimulationParams::default();
    let last_bar_entry = match config.get_string("simulation", "last_bar_entry") {
        Some(raw) => raw
            .parse::<LastBarEntry>()
            .map_err(|reason| config_invalid("simulation", "last_bar_entry", reason))?,
        None => defaults.last_bar_entry,
    };

    let params = SimulationParams {
        take_profit: config.get_double("simulation", "take_profit", defaults.take_profit),
        stop_loss: config.get_double("simulation", "stop_loss", defaults.stop_loss),
        fee_rate: config.get_double("simulation", "fee_rate", defaults.fee_rate),
        initial_balance: config.get_double(
            "simulation",
            "initial_balance",
            defaults.initial_balance,
        ),
        last_bar_entry,
    };
    params.validate()?;
    Ok(params)
}

pub fn build_search_config(config: &dyn ConfigPort) -> Result<SearchConfig, CombotraderError> {
    let defaults = SearchConfig::default();
    let frequency = match config.get_string("search", "bar_frequency") {
        Some(raw) => raw
            .parse::<BarFrequency>()
            .map_err(|reason| config_invalid("search", "bar_frequency", reason))?,
        None => defaults.frequency,
    };
    Ok(SearchConfig {
        min_pnl_sum: config.get_double("search", "min_pnl_sum", defaults.min_pnl_sum),
        frequency,
    })
}

pub fn build_session_config(config: &dyn ConfigPort) -> SessionConfig {
    let defaults = SessionConfig::default();
    let count = |key: &str, default: usize| {
        usize::try_from(config.get_int("search", key, default as i64)).unwrap_or(default)
    };
    SessionConfig {
        sessions: count("sessions", defaults.sessions),
        rounds_per_session: count("rounds_per_session", defaults.rounds_per_session),
        base_seed: config
            .get_string("search", "seed")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(defaults.base_seed),
        parallel: config.get_bool("search", "parallel", defaults.parallel),
    }
}

pub fn build_sampler_kind(config: &dyn ConfigPort) -> Result<SamplerKind, CombotraderError> {
    match config.get_string("search", "sampler") {
        Some(raw) => raw
            .parse::<SamplerKind>()
            .map_err(|reason| config_invalid("search", "sampler", reason)),
        None => Ok(SamplerKind::default()),
    }
}

pub fn build_data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, CombotraderError> {
    let path = |key: &str| {
        config
            .get_string("data", key)
            .filter(|s| !s.trim().is_empty())
            .map(|s| PathBuf::from(s.trim()))
            .ok_or_else(|| CombotraderError::ConfigMissing {
                section: "data".into(),
                key: key.into(),
            })
    };
    Ok(CsvAdapter::new(path("bars_path")?, path("signals_path")?))
}

pub fn resolve_output_dir(output_override: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    if let Some(dir) = output_override {
        return dir.to_path_buf();
    }
    config
        .get_string("output", "directory")
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(s.trim()))
        .unwrap_or_else(|| PathBuf::from("out"))
}

/// Explicit comma-separated names, or every indicator in the frame.
pub fn resolve_indicators(
    requested: Option<&str>,
    frame: &SignalFrame,
) -> Result<Vec<String>, CombotraderError> {
    let names: Vec<String> = match requested {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => frame.indicator_names(),
    };
    if names.is_empty() {
        return Err(CombotraderError::EmptyUniverse);
    }
    if let Some(missing) = names.iter().find(|name| !frame.contains(name)) {
        return Err(CombotraderError::UnknownIndicator {
            name: missing.clone(),
        });
    }
    Ok(names)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    pub indicators: Vec<String>,
    pub ledger: Ledger,
    pub metrics: MetricsRecord,
}

/// Load data, aggregate the chosen subset, simulate and score it.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    params: &SimulationParams,
    frequency: BarFrequency,
    indicators: Option<&str>,
) -> Result<BacktestOutcome, CombotraderError> {
    let bars = data_port.fetch_bars()?;
    let frame = data_port.fetch_signal_frame()?;
    let indicators = resolve_indicators(indicators, &frame)?;

    tracing::info!(
        bars = bars.len(),
        indicators = ?indicators,
        "running backtest"
    );
    let net = aggregate(&frame, &indicators)?;
    let aligned = merge_onto_bars(&bars, frame.datetimes(), &net);
    let ledger = simulate(&bars, &aligned, params)?;
    let metrics = score(&ledger, frequency.periods_per_year());

    Ok(BacktestOutcome {
        indicators,
        ledger,
        metrics,
    })
}

/// Everything a search run needs besides its ports.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub params: SimulationParams,
    pub search: SearchConfig,
    pub sessions: SessionConfig,
    pub sampler: SamplerKind,
    pub exchange: String,
    pub symbol: String,
}

/// Run every session, then persist each accepted candidate's ledger as
/// `backtest_<n>` and the accepted set as the strategies table.
pub fn run_search_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    plan: &SearchPlan,
) -> Result<Vec<StrategyRow>, CombotraderError> {
    let bars = data_port.fetch_bars()?;
    let frame = data_port.fetch_signal_frame()?;
    let space = SearchSpace::new(frame.indicator_names())?;

    tracing::info!(
        bars = bars.len(),
        indicators = space.len(),
        sessions = plan.sessions.sessions,
        sampler = %plan.sampler,
        "starting search"
    );

    let inputs = SearchInputs {
        bars: &bars,
        frame: &frame,
        space: &space,
        params: &plan.params,
        config: &plan.search,
    };
    let outcomes = run_sessions(inputs, &plan.sessions, |seed| plan.sampler.build(seed))?;

    let mut rows = Vec::new();
    for accepted in outcomes.into_iter().flat_map(|o| o.accepted) {
        let n = rows.len() + 1;
        report_port.write_ledger(&format!("backtest_{n}"), &accepted.ledger)?;
        let membership = space
            .indicators()
            .iter()
            .map(|name| (name.clone(), accepted.indicators.contains(name)))
            .collect();
        rows.push(StrategyRow {
            name: format!("strategy_{n}"),
            exchange: plan.exchange.clone(),
            symbol: plan.symbol.clone(),
            metrics: accepted.metrics,
            membership,
        });
    }
    report_port.write_strategies(&rows)?;

    tracing::info!(accepted = rows.len(), "search finished");
    Ok(rows)
}

pub fn print_metrics(metrics: &MetricsRecord) {
    println!("Final Balance:    {:.2}", metrics.final_balance);
    println!("PnL Sum:          {:.4}", metrics.pnl_sum);
    println!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    println!("Total Trades:     {}", metrics.total_trades);
    println!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    println!("Max Drawdown:     {:.1}%", metrics.max_drawdown * 100.0);
}

fn run_backtest(
    config_path: &Path,
    indicators: Option<&str>,
    output: Option<&Path>,
) -> Result<(), CombotraderError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let params = build_simulation_params(&config)?;
    let search = build_search_config(&config)?;
    let data = build_data_adapter(&config)?;

    let outcome = run_backtest_pipeline(&data, &params, search.frequency, indicators)?;

    let report = CsvReportAdapter::new(resolve_output_dir(output, &config));
    report.write_ledger("backtest", &outcome.ledger)?;

    println!("Indicators:       {}", outcome.indicators.join(", "));
    print_metrics(&outcome.metrics);
    tracing::info!(path = %report.ledger_path("backtest").display(), "ledger written");
    Ok(())
}

/// Command-line values that take precedence over the `[search]` section.
#[derive(Debug, Default)]
struct SearchOverrides {
    sampler: Option<String>,
    sessions: Option<usize>,
    seed: Option<u64>,
}

fn run_search(
    config_path: &Path,
    output: Option<&Path>,
    overrides: SearchOverrides,
) -> Result<(), CombotraderError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let mut sessions = build_session_config(&config);
    if let Some(n) = overrides.sessions {
        if n == 0 {
            return Err(config_invalid(
                "search",
                "sessions",
                "sessions must be at least 1".to_string(),
            ));
        }
        sessions.sessions = n;
    }
    if let Some(seed) = overrides.seed {
        sessions.base_seed = seed;
    }
    let sampler = match overrides.sampler {
        Some(raw) => raw
            .parse::<SamplerKind>()
            .map_err(|reason| config_invalid("search", "sampler", reason))?,
        None => build_sampler_kind(&config)?,
    };

    let plan = SearchPlan {
        params: build_simulation_params(&config)?,
        search: build_search_config(&config)?,
        sessions,
        sampler,
        exchange: config.get_string("data", "exchange").unwrap_or_default(),
        symbol: config.get_string("data", "symbol").unwrap_or_default(),
    };
    let data = build_data_adapter(&config)?;
    let report = CsvReportAdapter::new(resolve_output_dir(output, &config));

    let rows = run_search_pipeline(&data, &report, &plan)?;

    if rows.is_empty() {
        println!("No subset cleared the pnl floor of {}", plan.search.min_pnl_sum);
    }
    for row in &rows {
        let members: Vec<&str> = row
            .membership
            .iter()
            .filter(|(_, included)| *included)
            .map(|(name, _)| name.as_str())
            .collect();
        println!(
            "{}: pnl_sum {:.4}, final balance {:.2}, {} trades [{}]",
            row.name,
            row.metrics.pnl_sum,
            row.metrics.final_balance,
            row.metrics.total_trades,
            members.join(", ")
        );
    }
    tracing::info!(path = %report.strategies_path().display(), "strategies written");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), CombotraderError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let params = build_simulation_params(&config)?;
    let search = build_search_config(&config)?;
    let sessions = build_session_config(&config);
    let sampler = build_sampler_kind(&config)?;

    println!("Simulation:");
    println!("  take_profit:     {}", params.take_profit);
    println!("  stop_loss:       {}", params.stop_loss);
    println!("  fee_rate:        {}", params.fee_rate);
    println!("  initial_balance: {}", params.initial_balance);
    println!("  last_bar_entry:  {}", params.last_bar_entry);
    println!("Search:");
    println!("  min_pnl_sum:     {}", search.min_pnl_sum);
    println!("  bar_frequency:   {}", search.frequency);
    println!("  sampler:         {}", sampler);
    println!(
        "  sessions:        {} x {} rounds, seed {}",
        sessions.sessions, sessions.rounds_per_session, sessions.base_seed
    );
    println!("\nConfiguration is valid.");
    Ok(())
}

fn run_list_indicators(config_path: &Path) -> Result<(), CombotraderError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    let data = build_data_adapter(&config)?;

    let indicators = data.list_indicators()?;
    if indicators.is_empty() {
        tracing::warn!("no sig_ columns found in the signal file");
    }
    for name in &indicators {
        println!("{name}");
    }
    Ok(())
}
