use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use flash_attention::DType;
use flash_attention::config::{KernelConfig, load_config};
use logforth::append;
use logforth::layout::TextLayout;
use logforth::record::LevelFilter;

mod commands;
mod random;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl From<LogLevel> for logforth::record::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::Trace,
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warn => Self::Warn,
            LogLevel::Error => Self::Error,
        }
    }
}

/// Top-level CLI argument parser for the `fa` command
#[derive(Parser)]
#[command(
    name = "fa",
    about = "flash-attention: batched scaled dot-product attention kernels",
    version
)]
struct Cli {
    /// Kernel configuration YAML (backend, tile size, parallelism)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level; messages go to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `fa` CLI
#[derive(Subcommand)]
enum Commands {
    /// Time the naive and flash backends on random inputs and compare them
    Bench {
        #[arg(long, default_value_t = 16)]
        batch: usize,
        #[arg(long, default_value_t = 12)]
        heads: usize,
        /// Query and key length
        #[arg(long, default_value_t = 64)]
        seq: usize,
        /// Head width (D and Dv)
        #[arg(long, default_value_t = 64)]
        dim: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Absolute tolerance of the sanity check
        #[arg(long, default_value_t = 1e-2)]
        atol: f64,
        /// Element type: f32 or f64
        #[arg(long, default_value_t = DType::F32)]
        dtype: DType,
    },
    /// Randomized parity between backends and execution modes
    Check {
        #[arg(long, default_value_t = 32)]
        trials: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Highest tensor rank to draw (at least 2)
        #[arg(long, default_value_t = 4)]
        max_rank: usize,
        #[arg(long, default_value_t = 1e-4)]
        atol: f64,
    },
    /// Run forward on q, k, v read from a YAML file and print the output
    Run {
        /// Path to the input YAML file
        input: PathBuf,
    },
    /// Print the effective kernel configuration
    Config,
}

/// Dispatch a parsed CLI subcommand to its handler
fn run_command(config: &KernelConfig, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Bench {
            batch,
            heads,
            seq,
            dim,
            seed,
            atol,
            dtype,
        } => commands::bench::run(
            config,
            &commands::bench::BenchArgs {
                shape: [batch, heads, seq, dim],
                seed,
                atol,
                dtype,
            },
        ),
        Commands::Check {
            trials,
            seed,
            max_rank,
            atol,
        } => commands::check::run(config, trials, seed, max_rank, atol),
        Commands::Run { input } => commands::run::run(config, &input),
        Commands::Config => commands::config::run(config),
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> Result<KernelConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(load_config(p)?),
        None => Ok(KernelConfig::default()),
    }
}

fn init_logging(level: LogLevel) {
    let level: logforth::record::Level = level.into();
    logforth::starter_log::builder()
        .dispatch(|d| {
            d.filter(LevelFilter::MoreSevereEqual(level))
                .append(append::Stderr::default().with_layout(TextLayout::default()))
        })
        .apply();
}

/// Entry point: parse CLI arguments and run the selected subcommand
fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let result = resolve_config(cli.config.as_deref())
        .and_then(|config| run_command(&config, cli.command));
    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
