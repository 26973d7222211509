use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::America::New_York;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use ict_premarket::config::IctConfig;
use ict_premarket::trading_core::analyzer::{AnalysisMode, Analyzer};
use ict_premarket::trading_core::bars::{load_bars_csv, parse_timestamp};
use ict_premarket::trading_core::cache::ContextCache;
use ict_premarket::trading_core::plan_status::{validate_plan, StoredPlan};
use ict_premarket::trading_core::routine::{CsvBarSource, PreMarketRoutine, RoutineOutput};
use ict_premarket::trading_core::scenario::Direction;
use ict_premarket::trading_core::simulate::{simulate_scenario, summarize, SimulationResult, SimulationSummary};

#[derive(Parser, Debug)]
#[command(name = "ict-premarket")]
#[command(about = "ICT pre-market routine: bias, dealing range and trade scenarios from OHLCV bars")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// JSON file overriding any subset of the default thresholds
    #[arg(short, long, env = "ICT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Write JSON output here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the detectors over one bar file and print the snapshot
    Analyze {
        /// CSV file with timestamp,open,high,low,close[,volume]
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "QQQ")]
        symbol: String,

        /// full, structure_only or bias_only
        #[arg(short, long, default_value = "full")]
        mode: AnalysisMode,
    },

    /// Build the daily pre-market plan for each symbol
    Routine {
        /// Directory holding <SYMBOL>_<timeframe>.csv files
        #[arg(short, long, env = "ICT_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Symbols to analyze (comma-separated)
        #[arg(short, long, default_value = "QQQ")]
        symbols: String,

        /// Analysis date (YYYY-MM-DD), today in New York when omitted
        #[arg(short = 'D', long)]
        date: Option<NaiveDate>,

        /// Ignore bars after this instant (RFC3339 or New York local time)
        #[arg(long)]
        cutoff: Option<String>,

        /// ADR in points when daily history is too short
        #[arg(long)]
        default_adr: Option<f64>,
    },

    /// Check a stored plan against the current price
    Validate {
        /// Scenario or stored plan JSON
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(long)]
        price: f64,

        /// long or short
        #[arg(short, long)]
        direction: Direction,
    },

    /// Replay routine scenarios over intraday bars
    Simulate {
        /// Output of the routine command
        #[arg(short, long)]
        routine: PathBuf,

        /// Intraday CSV bars covering the plan dates
        #[arg(short, long)]
        bars: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "ict_premarket=debug" } else { "ict_premarket=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = IctConfig::load(args.config.as_deref())?;
    let output = args.output.as_deref();

    match args.command {
        Commands::Analyze { file, symbol, mode } => run_analyze(&config, &file, &symbol, mode, output),
        Commands::Routine {
            data_dir,
            symbols,
            date,
            cutoff,
            default_adr,
        } => run_routine(config, data_dir, &symbols, date, cutoff.as_deref(), default_adr, output),
        Commands::Validate { plan, price, direction } => run_validate(&plan, price, direction, output),
        Commands::Simulate { routine, bars } => run_simulate(&routine, &bars, output),
    }
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_analyze(config: &IctConfig, file: &Path, symbol: &str, mode: AnalysisMode, output: Option<&Path>) -> Result<()> {
    let bars = load_bars_csv(file).with_context(|| format!("Failed to load {}", file.display()))?;
    info!("Loaded {} bars from {:?}", bars.len(), file);

    let snapshot = Analyzer::new(config).analyze(symbol, &bars, mode);
    info!("{}", snapshot.summary());
    emit(&snapshot, output)
}

fn run_routine(
    mut config: IctConfig,
    data_dir: PathBuf,
    symbols: &str,
    date: Option<NaiveDate>,
    cutoff: Option<&str>,
    default_adr: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    if let Some(adr) = default_adr {
        config.scenario.default_adr = adr;
    }
    let date = date.unwrap_or_else(|| Utc::now().with_timezone(&New_York).date_naive());
    let cutoff = match cutoff {
        Some(raw) => Some(parse_timestamp(raw).with_context(|| format!("Bad cutoff '{}'", raw))?),
        None => None,
    };
    let symbols: Vec<String> = symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    info!("=== PRE-MARKET ROUTINE ===");
    info!("Data directory: {:?}", data_dir);
    info!("Date: {}, symbols: {}", date, symbols.join(","));

    let source = CsvBarSource::new(data_dir);
    let cache = ContextCache::from_config(&config.cache);
    let routine = PreMarketRoutine::new(&source, &config).with_cache(&cache);

    let mut outputs: Vec<RoutineOutput> = Vec::new();
    for (symbol, result) in routine.run_many(&symbols, date, cutoff) {
        match result {
            Ok(out) => outputs.push(out),
            Err(e) => error!("Routine failed for {}: {:#}", symbol, e),
        }
    }

    if outputs.is_empty() {
        bail!("No routine output for {}", symbols.join(","));
    }
    emit(&outputs, output)
}

fn run_validate(plan: &Path, price: f64, direction: Direction, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(plan).with_context(|| format!("Failed to read {}", plan.display()))?;
    let stored = StoredPlan::from_json(&raw).with_context(|| format!("Failed to parse plan {}", plan.display()))?;

    let validation = validate_plan(Some(&stored), price, direction);
    info!("{} plan at {:.2}: {} ({})", direction, price, validation.status, validation.reason);
    emit(&validation, output)
}

#[derive(Serialize)]
struct SimulationReport {
    results: Vec<SimulationResult>,
    summary: SimulationSummary,
}

fn run_simulate(routine: &Path, bars: &Path, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(routine).with_context(|| format!("Failed to read {}", routine.display()))?;
    let plans = RoutineOutput::list_from_json(&raw)
        .with_context(|| format!("Failed to parse routine output {}", routine.display()))?;
    let bars = load_bars_csv(bars).with_context(|| format!("Failed to load {}", bars.display()))?;

    let mut results = Vec::new();
    for plan in &plans {
        for scenario in [&plan.long_scenario, &plan.short_scenario] {
            if !scenario.is_valid() {
                warn!("Skipping invalid {} scenario for {} {}", scenario.direction, plan.symbol, plan.date);
                continue;
            }
            let result = simulate_scenario(&bars, scenario, plan.date)?;
            info!(
                "{} {} {}: {} ({:+.2}R)",
                plan.symbol, plan.date, scenario.direction, result.outcome, result.r_multiple
            );
            results.push(result);
        }
    }

    let summary = summarize(&results);
    info!(
        "Filled {}/{}, win rate {:.1}%, avg win {:.2}R",
        summary.filled,
        summary.total,
        summary.win_rate * 100.0,
        summary.avg_win_r
    );
    emit(&SimulationReport { results, summary }, output)
}
