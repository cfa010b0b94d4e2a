//! lsid-resolve - resolve a Life Science Identifier from the command line
//!
//! Prints the metadata or data payload of an LSID to standard output.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lsid_resolver::{OperationKind, ResolutionResult, Resolver, ResolverConfig, StalePolicy};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Longest accepted cache lifetime, one hundred years
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Metadata,
    Data,
    Services,
}

/// Resolve an LSID, e.g. urn:lsid:ipni.org:names:20012728-1
#[derive(Parser, Debug)]
#[command(name = "lsid-resolve")]
#[command(version, about, long_about = None)]
struct Cli {
    /// The LSID to resolve
    lsid: String,

    /// What to fetch for the identified object
    #[arg(short, long, value_enum, default_value = "metadata")]
    mode: Mode,

    /// Directory for cached authority descriptions
    #[arg(long, env = "LSID_CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// Keep descriptions in memory only
    #[arg(long)]
    no_cache: bool,

    /// Lifetime of cached descriptions in seconds
    #[arg(
        long,
        env = "LSID_CACHE_TTL_SECS",
        default_value_t = 172_800,
        value_parser = clap::value_parser!(u64).range(..=MAX_TTL_SECS)
    )]
    ttl_secs: u64,

    /// Timeout for every network call in seconds
    #[arg(long, env = "LSID_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Serve an expired description when refreshing it fails
    #[arg(long, env = "LSID_SERVE_STALE")]
    serve_stale: bool,

    /// Do not fall back to https://<authority>/authority/ without an SRV record
    #[arg(long, env = "LSID_NO_FALLBACK")]
    no_fallback: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> Result<ResolverConfig> {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| format!("Cache lifetime of {} seconds is out of range", self.ttl_secs))?;
        let mut config = ResolverConfig::default()
            .with_ttl(ttl)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_well_known_fallback(!self.no_fallback);
        if self.serve_stale {
            config = config.with_stale_policy(StalePolicy::ServeStale);
        }
        if !self.no_cache {
            config = config.with_cache_dir(self.cache_dir.clone());
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the payload
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let resolver = Resolver::new(cli.config()?).context("Failed to create resolver")?;
        let operation = match cli.mode {
            Mode::Metadata => OperationKind::Metadata,
            Mode::Data => OperationKind::Data,
            Mode::Services => OperationKind::AvailableServices,
        };

        match resolver.resolve(&cli.lsid, operation).await {
            Ok(result) => {
                print_result(&result).context("Failed to write output")?;
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                eprintln!("error[{}]: {}", err.kind(), err);
                Ok(ExitCode::from(err.exit_code()))
            }
        }
    })
}

fn print_result(result: &ResolutionResult) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    match result {
        ResolutionResult::Metadata(payload) | ResolutionResult::Data(payload) => {
            out.write_all(&payload.bytes)?;
        }
        ResolutionResult::AvailableServices(services) => {
            for (operation, binding) in services.operations() {
                writeln!(out, "{}\t{}\t{}", operation, binding.style(), binding.location())?;
            }
        }
    }
    out.flush()
}
