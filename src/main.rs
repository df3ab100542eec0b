use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use iperf_bench::benchmark::iperf;
use iperf_bench::config::BenchConfig;
use iperf_bench::policy::{FlagPolicy, IpAddressMode};
use iperf_bench::runner::{self, Stage};

#[derive(Parser)]
#[command(
    name = "iperf-bench",
    about = "Measure network throughput between two machines with iperf",
    version,
    long_about = None
)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show benchmark metadata
    Info {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the benchmark against the configured machines
    Run {
        /// Config file (falls back to /etc/iperf-bench/iperf-bench.toml)
        #[arg(long, env = "IPERF_BENCH_CONFIG")]
        config: Option<PathBuf>,

        /// Stages to execute (default: all)
        #[arg(long = "stage", value_enum, value_delimiter = ',')]
        stages: Vec<Stage>,

        /// Override the configured address policy
        #[arg(long, value_enum)]
        ip_addresses: Option<IpAddressMode>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Parse captured iperf client output and print the throughput
    Parse {
        /// File with iperf output (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<BenchConfig> {
    match explicit {
        Some(path) => Ok(BenchConfig::load(path)?),
        None => Ok(BenchConfig::load_or_default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { json } => {
            init_logging("info", cli.log_format);
            let info = iperf::get_info();
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Name:         {}", info.name);
                println!("Description:  {}", info.description);
                println!("Scratch disk: {}", if info.scratch_disk { "yes" } else { "no" });
                println!("Machines:     {}", info.num_machines);
            }
        }
        Commands::Run {
            config,
            stages,
            ip_addresses,
            json,
        } => {
            let cfg = load_config(config.as_deref())?;
            init_logging(&cfg.logging.level, cli.log_format);
            tracing::info!(machines = cfg.machines.len(), "loaded configuration");

            let mode = ip_addresses.unwrap_or(cfg.policy.ip_addresses);
            let stages = if stages.is_empty() {
                Stage::ALL.to_vec()
            } else {
                stages
            };
            tracing::info!(%mode, ?stages, "Running iperf benchmark");

            let spec = iperf_bench::build_spec(&cfg)?;
            let report = runner::execute(&spec, &FlagPolicy::new(mode), &stages).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", iperf_bench::report::format_report(&report));
            }
        }
        Commands::Parse { file } => {
            init_logging("warn", cli.log_format);
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };
            let value = iperf::parse_throughput(&text)?;
            println!("{} {}", value, iperf::UNIT);
        }
    }

    Ok(())
}
