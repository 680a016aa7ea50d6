use anyhow::{Context, Result};
use azinfo::azure::AzCliQuery;
use azinfo::config::Config;
use azinfo::resource::{QueryErrorPolicy, Resolver};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Give all available info about an Azure resource, as JSON.
///
/// Nested resource references are looked up and merged in place.
/// Run `az login` before using this.
#[derive(Parser, Debug)]
#[command(name = "azinfo", version = azinfo::VERSION, about, long_about = None)]
struct Args {
    /// The resource id to get info for. `all` pulls every resource visible to this account
    #[arg(short, long)]
    id: String,

    /// Print debug info (same as --log-level debug)
    #[arg(short, long)]
    debug: bool,

    /// Log level for diagnostics (written to stderr unless --log-file is set)
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Azure CLI program to run
    #[arg(long)]
    az_path: Option<String>,

    /// Per-query timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum number of queries in flight
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// What to do when a nested query fails
    #[arg(long, value_enum)]
    on_query_error: Option<QueryErrorPolicy>,

    /// With `all`, list resources without expanding their references
    #[arg(long)]
    shallow_all: bool,

    /// Print single-line JSON instead of indented output
    #[arg(long)]
    compact: bool,

    /// Persist the effective settings to the config file and continue
    #[arg(long)]
    save_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

impl Args {
    fn effective_log_level(&self) -> LogLevel {
        if self.debug && self.log_level != LogLevel::Trace {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

/// Log filter: `RUST_LOG` directives when given, otherwise the requested level
fn build_filter(level: Level, env: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::default().add_directive(LevelFilter::from_level(level).into());
    match env {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .unwrap_or_else(|e| {
                eprintln!("Ignoring invalid RUST_LOG ({}): {}", directives, e);
                default()
            }),
        _ => default(),
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(tracing_level, env.as_deref()))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azinfo {} started with log level: {:?}", azinfo::VERSION, level);

    Ok(Some(guard))
}

/// Copy of `value` with object keys in sorted order at every level
fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}

/// Serialize with sorted keys and 4-space indentation
fn render_json(value: &serde_json::Value, compact: bool) -> Result<String> {
    let value = sort_keys(value);
    if compact {
        return Ok(serde_json::to_string(&value)?);
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.effective_log_level(), args.log_file.as_ref())?;

    let mut config = Config::load();
    let az_path = config.effective_az_path(args.az_path.as_deref());
    let timeout = config.effective_timeout(args.timeout);
    let options = config.effective_options(args.concurrency, args.on_query_error, args.shallow_all);

    tracing::info!(
        "Using az: {}, timeout: {:?}, concurrency: {}, on error: {:?}",
        az_path,
        timeout,
        options.concurrency,
        options.on_query_error
    );

    if args.save_config {
        config.az_path = Some(az_path.clone());
        config.timeout_secs = Some(timeout.as_secs());
        config.concurrency = Some(options.concurrency);
        config.on_query_error = Some(options.on_query_error);
        config.expand_wildcard = Some(options.expand_wildcard);
        config.save().context("Failed to save config")?;
    }

    let resolver = Resolver::new(AzCliQuery::new(az_path, timeout)).with_options(options);
    let resolution = resolver
        .resolve(&args.id)
        .await
        .with_context(|| format!("Failed to resolve {}", args.id))?;

    let rendered = render_json(&resolution.document, args.compact)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered)?;
    stdout.flush()?;

    Ok(())
}
