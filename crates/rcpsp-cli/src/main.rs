//! rcpsp-tabu CLI - parallel tabu-search solver for resource-constrained
//! project scheduling.
//!
//! Parses one or more PSP-SFX/PSPLIB instance files, runs the tabu-search
//! driver on each, and reports the resulting schedule.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rcpsp_core::Instance;
use rcpsp_io::progress::{ProgressRow, ProgressWriter};
use rcpsp_io::result_file::{write_result_file, ScheduleResult};
use rcpsp_solver::evaluator::precedence_penalty;
use rcpsp_solver::search::{solve, SearchConfig};
use rcpsp_solver::TabuKind;

const DEFAULT_TABU_LIST_SIZE: usize = 800;
const DEFAULT_RANDOMIZE_ERASE_AMOUNT: f64 = 0.3;
const DEFAULT_SWAP_LIFE: u32 = 80;
const DEFAULT_SHIFT_LIFE: u32 = 120;
const DEFAULT_NUMBER_OF_ITERATIONS: u32 = 1000;
const DEFAULT_MAX_ITER_SINCE_BEST: u32 = 300;
const DEFAULT_SWAP_RANGE: u32 = 60;
const DEFAULT_SHIFT_RANGE: u32 = 0;
const DEFAULT_DIVERSIFICATION_SWAPS: u32 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Parallel tabu-search solver for the resource-constrained project
/// scheduling problem.
///
/// Long-form flags are primary; the short mnemonics (`stl`, `noi`, `swr`,
/// ...) are kept as long-style aliases for familiarity with prior tooling.
#[derive(Parser, Debug)]
#[command(name = "rcpsp-tabu", author, version, about, long_about = None)]
struct Cli {
    /// One or more PSP-SFX or PSPLIB/max instance files, solved in sequence.
    #[arg(
        short = 'f',
        long = "input-files",
        visible_alias = "if",
        value_name = "FILE",
        num_args = 1..,
        required = true
    )]
    input_files: Vec<PathBuf>,

    /// Use the fixed-size FIFO tabu memory.
    #[arg(long = "simple-tabu-list", visible_alias = "stl", conflicts_with = "advanced_tabu_list")]
    simple_tabu_list: bool,

    /// Use the aging tabu memory with elite restart.
    #[arg(long = "advanced-tabu-list", visible_alias = "atl")]
    advanced_tabu_list: bool,

    /// Total tabu-search iterations.
    #[arg(long = "number-of-iterations", visible_alias = "noi")]
    number_of_iterations: Option<u32>,

    /// Iterations without improvement before diversification triggers.
    #[arg(long = "max-iter-since-best", visible_alias = "misb")]
    max_iter_since_best: Option<u32>,

    /// Simple tabu memory's ring-buffer capacity (simple variant only).
    #[arg(long = "tabu-list-size", visible_alias = "tls")]
    tabu_list_size: Option<usize>,

    /// Fraction of the aging tabu memory erased on elite restart (0..=1).
    #[arg(long = "randomize-erase-amount", visible_alias = "rea")]
    randomize_erase_amount: Option<f64>,

    /// Aging tabu swap-move life factor.
    #[arg(long = "swap-life-factor", visible_alias = "swlf")]
    swap_life_factor: Option<u32>,

    /// Aging tabu shift-move life factor.
    #[arg(long = "shift-life-factor", visible_alias = "shlf")]
    shift_life_factor: Option<u32>,

    /// Maximal distance between swapped activities.
    #[arg(long = "swap-range", visible_alias = "swr")]
    swap_range: Option<u32>,

    /// Maximal shift distance for any activity.
    #[arg(long = "shift-range", visible_alias = "shr")]
    shift_range: Option<u32>,

    /// Number of random precedence-feasible swaps applied on diversification.
    #[arg(long = "diversification-swaps", visible_alias = "ds")]
    diversification_swaps: Option<u32>,

    /// Seeds the diversification/pruning RNG stream.
    #[arg(long)]
    seed: Option<u64>,

    /// Caps the rayon worker-pool thread count.
    #[arg(long)]
    threads: Option<usize>,

    /// Writes `<instance>.csv`: one `iter; iterCost; bestCost;` row per iteration.
    #[arg(long = "write-makespan-graph", visible_alias = "wmg")]
    write_makespan_graph: bool,

    /// Writes `<instance>.res`, a binary dump of the instance and best schedule.
    #[arg(long = "write-result-file", visible_alias = "wrf")]
    write_result_file: bool,

    /// Structured-log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// TOML file providing any of the tunables above (CLI flags win on conflict).
    #[arg(long, env = "UTF8PROJ_RCPSP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Mirrors [`Cli`]'s optional tunables for TOML deserialization; everything
/// is optional since a config file may set only a subset.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileConfig {
    simple_tabu_list: Option<bool>,
    advanced_tabu_list: Option<bool>,
    number_of_iterations: Option<u32>,
    max_iter_since_best: Option<u32>,
    tabu_list_size: Option<usize>,
    randomize_erase_amount: Option<f64>,
    swap_life_factor: Option<u32>,
    shift_life_factor: Option<u32>,
    swap_range: Option<u32>,
    shift_range: Option<u32>,
    diversification_swaps: Option<u32>,
    seed: Option<u64>,
    threads: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}' as TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("randomize-erase-amount must be within [0, 1], got {0}")]
    EraseAmountOutOfRange(f64),
}

fn load_config(path: &Path) -> std::result::Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Fully resolved tunables after merging CLI flags over config-file values
/// over built-in defaults.
struct ResolvedSettings {
    tabu: TabuKind,
    search: SearchConfig,
    write_makespan_graph: bool,
    write_result_file: bool,
    threads: Option<usize>,
}

fn resolve_settings(cli: &Cli, file: &FileConfig) -> std::result::Result<ResolvedSettings, ConfigError> {
    let advanced = cli.advanced_tabu_list || (!cli.simple_tabu_list && file.advanced_tabu_list.unwrap_or(false));

    let randomize_erase_amount = cli
        .randomize_erase_amount
        .or(file.randomize_erase_amount)
        .unwrap_or(DEFAULT_RANDOMIZE_ERASE_AMOUNT);
    if !(0.0..=1.0).contains(&randomize_erase_amount) {
        return Err(ConfigError::EraseAmountOutOfRange(randomize_erase_amount));
    }

    let tabu = if advanced {
        TabuKind::Aging {
            swap_life: cli.swap_life_factor.or(file.swap_life_factor).unwrap_or(DEFAULT_SWAP_LIFE),
            shift_life: cli.shift_life_factor.or(file.shift_life_factor).unwrap_or(DEFAULT_SHIFT_LIFE),
            max_iter_since_best: cli
                .max_iter_since_best
                .or(file.max_iter_since_best)
                .unwrap_or(DEFAULT_MAX_ITER_SINCE_BEST),
            randomize_erase_amount_millis: (randomize_erase_amount * 1000.0) as u32,
        }
    } else {
        TabuKind::Simple {
            capacity: cli.tabu_list_size.or(file.tabu_list_size).unwrap_or(DEFAULT_TABU_LIST_SIZE),
        }
    };

    let search = SearchConfig {
        max_iterations: cli
            .number_of_iterations
            .or(file.number_of_iterations)
            .unwrap_or(DEFAULT_NUMBER_OF_ITERATIONS),
        max_iter_since_best: cli
            .max_iter_since_best
            .or(file.max_iter_since_best)
            .unwrap_or(DEFAULT_MAX_ITER_SINCE_BEST),
        swap_range: cli.swap_range.or(file.swap_range).unwrap_or(DEFAULT_SWAP_RANGE),
        shift_range: cli.shift_range.or(file.shift_range).unwrap_or(DEFAULT_SHIFT_RANGE),
        diversification_swaps: cli
            .diversification_swaps
            .or(file.diversification_swaps)
            .unwrap_or(DEFAULT_DIVERSIFICATION_SWAPS),
        seed: cli.seed.or(file.seed).unwrap_or(0),
    };

    Ok(ResolvedSettings {
        tabu,
        search,
        write_makespan_graph: cli.write_makespan_graph,
        write_result_file: cli.write_result_file,
        threads: cli.threads.or(file.threads),
    })
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env();
    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
        }
    }

    match run(&cli) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// Argument/config problems exit 1; everything else (instance loading,
/// solving, writing results) exits 2, per the documented exit-code contract.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        1
    } else {
        2
    }
}

fn run(cli: &Cli) -> Result<()> {
    let file_config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading config file '{}'", path.display()))?,
        None => FileConfig::default(),
    };
    let settings = resolve_settings(cli, &file_config).context("resolving CLI/config settings")?;

    if let Some(threads) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("building rayon thread pool")?;
    }

    let multi_instance = cli.input_files.len() > 1;
    for path in &cli.input_files {
        solve_one(path, &settings, multi_instance)
            .with_context(|| format!("solving instance '{}'", path.display()))?;
    }

    Ok(())
}

fn solve_one(path: &Path, settings: &ResolvedSettings, multi_instance: bool) -> Result<()> {
    let instance =
        rcpsp_io::load_instance_file(path).with_context(|| format!("loading instance '{}'", path.display()))?;

    let mut tabu = settings.tabu.build(instance.num_activities());
    let cancel = AtomicBool::new(false);

    let mut progress_writer = if settings.write_makespan_graph {
        let csv_path = path.with_extension("csv");
        Some(ProgressWriter::create(&csv_path).with_context(|| format!("creating '{}'", csv_path.display()))?)
    } else {
        None
    };

    let start = Instant::now();
    let outcome = solve(&instance, tabu.as_mut(), &settings.search, None, &cancel, |record| {
        if let Some(writer) = progress_writer.as_mut() {
            let _ = writer.write_row(ProgressRow {
                iteration: record.iteration,
                iteration_cost: record.iteration_cost,
                best_cost: record.best_cost,
            });
        }
    });
    let elapsed = start.elapsed();

    if let Some(mut writer) = progress_writer {
        writer.flush().context("flushing makespan graph")?;
    }

    tracing::info!(
        instance = %path.display(),
        best_cost = outcome.best_cost,
        iterations = outcome.iterations_run,
        "search finished"
    );

    report(path, &instance, &outcome, elapsed.as_secs_f64(), multi_instance);

    if settings.write_result_file {
        let schedule = ScheduleResult {
            best_makespan: outcome.best_cost,
            best_order: outcome.best_order.clone(),
            start_time_by_id: outcome.start_time_by_id.clone(),
        };
        let res_path = path.with_extension("res");
        write_result_file(&res_path, &instance, &schedule)
            .with_context(|| format!("writing result file '{}'", res_path.display()))?;
        if !multi_instance {
            println!("result written to: {}", res_path.display());
        }
    }

    Ok(())
}

fn report(
    path: &Path,
    instance: &Instance,
    outcome: &rcpsp_solver::SolveOutcome,
    seconds: f64,
    multi_instance: bool,
) {
    let prec_penalty = precedence_penalty(instance, &outcome.start_time_by_id);
    let lower_bound = instance.lower_bound();

    if multi_instance {
        println!(
            "{} {}+{} {} [{:.2} s] {}",
            path.display(),
            outcome.best_cost,
            prec_penalty,
            lower_bound,
            seconds,
            outcome.evaluations
        );
        return;
    }

    println!("instance: {}", path.display());
    println!("activities: {}, resources: {}", instance.num_activities(), instance.num_resources());
    println!();

    let mut by_start: Vec<(usize, u32)> = outcome
        .start_time_by_id
        .iter()
        .enumerate()
        .map(|(id, &start)| (id, start))
        .collect();
    by_start.sort_by_key(|&(_, start)| start);

    let mut i = 0;
    while i < by_start.len() {
        let t = by_start[i].1;
        let mut group = Vec::new();
        while i < by_start.len() && by_start[i].1 == t {
            group.push(by_start[i].0);
            i += 1;
        }
        println!("  t={t:>5}: {group:?}");
    }

    println!();
    println!(
        "best makespan: {} (precedence penalty {}, lower bound {})",
        outcome.best_cost, prec_penalty, lower_bound
    );
    println!(
        "iterations: {}, evaluations: {}, elapsed: {seconds:.2} s",
        outcome.iterations_run, outcome.evaluations
    );
}
