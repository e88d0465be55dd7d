//! # OSCAR Current Service Entry Point
//!
//! This binary resolves the OSCAR snapshot to use, opens it once, and then
//! serves either a single query or a stream of position updates.
//!
//! ```text
//! oscar-current [--config <path>] query <lat> <lon> <alt> [<timestamp>|now]
//! oscar-current [--config <path>] follow     # positions on stdin
//! ```
//!
//! `follow` reads one position per line, `<timestamp|now> <lat> <lon> <alt>`,
//! and prints every approved current update as a JSON line.

use anyhow::{bail, Context};
use std::env;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use oscar_current_lib::catalog::{self, Catalog, TimeUnits};
use oscar_current_lib::config::{Config, CONFIG_FILE};
use oscar_current_lib::dataset::{DatasetSession, VariableNames};
use oscar_current_lib::fetch::download_dataset;
use oscar_current_lib::notify;
use oscar_current_lib::service::{CurrentService, QueryResponse, QueryTime};
use oscar_current_lib::Query;

const USAGE: &str = "usage: oscar-current [--config <path>] (query <lat> <lon> <alt> [<time>|now] | follow)";

/// Install the global log subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries query results and updates; logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Pick the snapshot file name: explicit override, else closest catalog entry.
async fn resolve_filename(config: &Config, time_units: &TimeUnits) -> anyhow::Result<String> {
    if let Some(name) = &config.dataset.filename {
        info!(filename = %name, "using configured dataset");
        return Ok(name.clone());
    }

    let reference = config
        .reference_date()
        .context("invalid dataset.reference_date")?;
    let ids = catalog::fetch_identifiers(&config.dataset.catalog_url).await?;
    let filename = Catalog::new(time_units.clone(), ids).select_closest(reference)?;
    Ok(filename)
}

/// Resolve, fetch and open the session dataset. Any failure here is fatal.
async fn open_session(config: &Config, time_units: &TimeUnits) -> anyhow::Result<DatasetSession> {
    let filename = resolve_filename(config, time_units).await?;

    let path = if Path::new(&filename).exists() {
        PathBuf::from(&filename)
    } else {
        download_dataset(
            &config.dataset.download_url,
            &filename,
            &config.dataset.data_dir,
        )
        .await?
    };

    let session = DatasetSession::open(&path, &VariableNames::default())
        .with_context(|| format!("failed to open dataset {}", path.display()))?;
    Ok(session)
}

fn parse_coord(s: Option<&str>, name: &str) -> anyhow::Result<f64> {
    let s = s.with_context(|| format!("missing {name}\n{USAGE}"))?;
    let value: f64 = s
        .parse()
        .with_context(|| format!("invalid {name}: '{s}'"))?;
    if !value.is_finite() {
        bail!("{name} must be finite, got '{s}'");
    }
    Ok(value)
}

/// Parse one feed line: `<timestamp|now> <lat> <lon> <alt>`.
fn parse_position(line: &str) -> anyhow::Result<Query> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 {
        bail!("expected '<time> <lat> <lon> <alt>', got '{line}'");
    }
    let time: QueryTime = parts[0].parse()?;
    Ok(Query {
        time: time.resolve(),
        latitude: parse_coord(parts.get(1).copied(), "latitude")?,
        longitude: parse_coord(parts.get(2).copied(), "longitude")?,
        depth: parse_coord(parts.get(3).copied(), "altitude")?,
    })
}

fn run_query(mut service: CurrentService, args: &[String]) -> anyhow::Result<()> {
    let arg = |i: usize| args.get(i).map(String::as_str);
    let lat = parse_coord(arg(0), "latitude")?;
    let lon = parse_coord(arg(1), "longitude")?;
    let alt = parse_coord(arg(2), "altitude")?;
    let time: QueryTime = match args.get(3) {
        Some(s) => s.parse()?,
        None => QueryTime::Now,
    };

    match service.handle_query(time, lat, lon, alt)? {
        QueryResponse::NoData => println!("no data"),
        resp => println!("{}", serde_json::to_string(&resp)?),
    }
    Ok(())
}

async fn run_follow(service: CurrentService, config: &Config) -> anyhow::Result<()> {
    let (sender, mut updates) = notify::channel(config.notify.channel_capacity, config.ready_timeout());
    let mut service = service.with_updates(sender);

    // downstream consumer
    let consumer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{line}"),
                Err(e) => error!(error = %e, "failed to encode update"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let query = match parse_position(&line) {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "skipping position update");
                continue;
            }
        };
        if let Err(e) = service.handle_position(query).await {
            warn!(error = %e, "position lookup failed");
        }
    }

    // closing the sender lets the consumer drain and exit
    drop(service);
    consumer.await?;
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .cloned()
                .with_context(|| format!("--config needs a path\n{USAGE}"))?;
            args.drain(i..=i + 1);
            path
        }
        None => CONFIG_FILE.to_string(),
    };

    let config = Config::load_from_path(&config_path);
    init_logging(&config.logging.level)?;
    info!(config = %config_path, mode = ?config.mode(), "starting OSCAR current service");

    let time_units = config.time_units()?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(&config, time_units, &args))
}

/// Open the session dataset and run the requested command against it.
async fn serve(config: &Config, time_units: TimeUnits, args: &[String]) -> anyhow::Result<()> {
    if !matches!(args.first().map(String::as_str), Some("query" | "follow")) {
        bail!("{USAGE}");
    }

    let session = open_session(config, &time_units).await?;
    let service = CurrentService::new(session, time_units, config.mode())
        .with_no_data_interval(config.no_data_interval());

    match args.first().map(String::as_str) {
        Some("query") => run_query(service, &args[1..]),
        Some("follow") => run_follow(service, config).await,
        _ => bail!("{USAGE}"),
    }
}
