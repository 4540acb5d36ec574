//! Embedded command surface for the synthetic signal observatory.
//!
//! Hosts drive the observatory through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_with_db`] for direct [`Command`] execution against a DB path.
//! - [`run_command`] for execution against an existing [`SqliteEventStore`].
//! - [`run_benchmark`] for the benchmark group, which never touches `--db`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use signal_observatory_core::{
    compute_rolling_metrics, default_run_id, format_date, format_rfc3339, generate_and_persist,
    now_utc, parse_timestamp, resolve_lookback, Event, FetchQuery, GeneratorRequest,
    LookbackTermination, RollingMetricRow,
};
use signal_observatory_store_sqlite::{
    BenchmarkConfig, BenchmarkReport, BenchmarkThresholds, SqliteEventStore, StoreStatus,
};
use time::Duration;

mod logging;

pub use logging::{init_logging, LogFormat};

const DEFAULT_SIGNAL_NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];
const DEFAULT_SOURCE_ID: &str = "source-1";
const MAX_STEP_SECONDS: f64 = 31_536_000.0;

#[derive(Debug, Parser)]
#[command(name = "sso")]
#[command(about = "Synthetic signal observatory: generate, store and analyze signal events")]
pub struct Cli {
    #[arg(long, global = true, env = "SSO_DB_PATH", default_value = "data/sso.sqlite3")]
    db: PathBuf,

    #[arg(long, global = true, env = "SSO_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[arg(
        long,
        global = true,
        env = "SSO_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Human
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate, list and count persisted events.
    Events {
        #[command(subcommand)]
        command: Box<EventsCommand>,
    },
    /// Rolling statistics and anomaly flags.
    Metrics {
        #[command(subcommand)]
        command: Box<MetricsCommand>,
    },
    /// Store inspection and destructive reset.
    Store {
        #[command(subcommand)]
        command: Box<StoreCommand>,
    },
    /// Latency benchmarks on throwaway databases.
    Benchmark {
        #[command(subcommand)]
        command: Box<BenchmarkCommand>,
    },
}

#[derive(Debug, Subcommand)]
pub enum EventsCommand {
    Generate(GenerateArgs),
    List(ListArgs),
    Count(CountArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long, env = "SSO_BATCH_SIZE", default_value_t = 100, value_parser = parse_positive_usize)]
    count: usize,
    #[arg(long, env = "SSO_SEED", default_value_t = 42)]
    seed: u64,
    /// Defaults to `run-YYYYMMDD-HHMMSS` in UTC.
    #[arg(long)]
    run_id: Option<String>,
    /// RFC3339 with an explicit offset. Defaults to now.
    #[arg(long)]
    start_ts: Option<String>,
    #[arg(long = "source-id")]
    source_ids: Vec<String>,
    #[arg(long = "signal-name")]
    signal_names: Vec<String>,
    #[arg(long, default_value_t = 1.0, value_parser = parse_step_seconds)]
    step_seconds: f64,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    source_id: Option<String>,
    #[arg(long)]
    signal_name: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct CountArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    Window(WindowArgs),
    /// Chart rows over the full stored history, optionally narrowed to one
    /// source and/or signal before metrics are computed.
    Chart(ChartArgs),
}

#[derive(Debug, Args)]
pub struct WindowArgs {
    /// Number of newest events to report on.
    #[arg(long, default_value_t = 200)]
    limit: usize,
    #[arg(long, env = "SSO_WINDOW_SIZE", default_value_t = 20, value_parser = parse_positive_usize)]
    window_size: usize,
    #[arg(long, env = "SSO_Z_THRESHOLD", default_value_t = 3.0, value_parser = parse_positive_f64)]
    z_threshold: f64,
    #[arg(long, env = "SSO_MAX_FETCH_LIMIT", default_value_t = 5_000, value_parser = parse_positive_usize)]
    max_fetch: usize,
    #[arg(long)]
    source_id: Option<String>,
    #[arg(long)]
    signal_name: Option<String>,
    #[arg(long)]
    anomalies_only: bool,
    #[arg(long, conflicts_with = "chart")]
    json: bool,
    #[arg(long)]
    chart: bool,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[arg(long, env = "SSO_WINDOW_SIZE", default_value_t = 20, value_parser = parse_positive_usize)]
    window_size: usize,
    #[arg(long, env = "SSO_Z_THRESHOLD", default_value_t = 3.0, value_parser = parse_positive_f64)]
    z_threshold: f64,
    #[arg(long)]
    source_id: Option<String>,
    #[arg(long)]
    signal_name: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    Status(StatusArgs),
    Reset(ResetArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    #[arg(
        long,
        env = "SSO_ALLOW_DB_RESET",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    allow_reset: bool,
    #[arg(long)]
    confirm: bool,
}

#[derive(Debug, Subcommand)]
pub enum BenchmarkCommand {
    Run(BenchmarkRunArgs),
}

#[derive(Debug, Args)]
pub struct BenchmarkRunArgs {
    #[arg(long = "volume", value_parser = parse_positive_usize)]
    volumes: Vec<usize>,
    #[arg(long, default_value_t = 3, value_parser = parse_positive_usize)]
    repetitions: usize,
    #[arg(long)]
    append_p95_max_ms: Option<f64>,
    #[arg(long)]
    resolve_p95_max_ms: Option<f64>,
    #[arg(long)]
    metrics_p95_max_ms: Option<f64>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate fails or the command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    run_with_db(&cli.db, cli.command)
}

/// Executes a parsed command using the `SQLite` DB at `db_path`.
///
/// # Errors
/// Returns an error when store open/migrate fails or the command fails.
pub fn run_with_db(db_path: &Path, command: Command) -> Result<()> {
    match command {
        Command::Benchmark { command } => run_benchmark(*command),
        other => {
            let mut store = SqliteEventStore::open_migrated(db_path)?;
            tracing::debug!(db = %db_path.display(), "opened event store");
            run_command(other, &mut store)
        }
    }
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, persistence or retrieval fails.
pub fn run_command(command: Command, store: &mut SqliteEventStore) -> Result<()> {
    match command {
        Command::Events { command } => run_events(*command, store),
        Command::Metrics { command } => run_metrics(*command, store),
        Command::Store { command } => run_store(*command, store),
        Command::Benchmark { command } => run_benchmark(*command),
    }
}

fn run_events(command: EventsCommand, store: &mut SqliteEventStore) -> Result<()> {
    match command {
        EventsCommand::Generate(args) => {
            let request = build_generator_request(&args)?;
            let report = generate_and_persist(store, &request)
                .map_err(|err| anyhow!("event generation failed: {err}"))?;

            let payload = GenerateReportPayload {
                contract_version: "generate_report.v1".to_string(),
                run_id: report.run_id,
                seed: request.seed,
                requested_start_ts: rfc3339(report.requested_start)?,
                effective_start_ts: rfc3339(report.effective_start)?,
                step_seconds: args.step_seconds,
                inserted: report.inserted,
                total_events: store.count_events()?,
            };
            print_json(&payload)
        }
        EventsCommand::List(args) => {
            let query = FetchQuery::latest(args.limit)
                .with_source_id(args.source_id)
                .with_signal_name(args.signal_name);
            let events = store.fetch_events(&query)?;

            if args.json {
                let payload = EventsListPayload {
                    contract_version: "events_list.v1".to_string(),
                    events: events
                        .iter()
                        .map(EventPayload::from_event)
                        .collect::<Result<Vec<_>>>()?,
                };
                print_json(&payload)
            } else {
                print_events_table(&events)
            }
        }
        EventsCommand::Count(args) => {
            let total_events = store.count_events()?;
            if args.json {
                print_json(&EventCountPayload {
                    contract_version: "event_count.v1".to_string(),
                    total_events,
                })
            } else {
                println!("{total_events}");
                Ok(())
            }
        }
    }
}

fn run_metrics(command: MetricsCommand, store: &SqliteEventStore) -> Result<()> {
    match command {
        MetricsCommand::Window(args) => {
            let resolved = resolve_lookback(store, args.limit, args.window_size, args.max_fetch)
                .map_err(|err| anyhow!("lookback resolution failed: {err}"))?;
            let window_ids = resolved.window_event_ids();

            let mut chronological = resolved.lookback_events.clone();
            chronological.reverse();
            let rows = compute_rolling_metrics(&chronological, args.window_size, args.z_threshold)
                .map_err(|err| anyhow!("rolling metrics failed: {err}"))?;

            let rows = select_window_rows(rows, &window_ids, &args);
            tracing::info!(
                rows = rows.len(),
                anomalies = rows.iter().filter(|row| row.is_anomaly).count(),
                "computed rolling metrics"
            );

            if args.chart {
                print_json(&ChartRowsPayload {
                    contract_version: "chart_rows.v1".to_string(),
                    rows: build_chart_rows(&rows)?,
                })
            } else if args.json {
                let payload = RollingMetricsPayload {
                    contract_version: "rolling_metrics.v1".to_string(),
                    window_limit: args.limit,
                    window_size: args.window_size,
                    z_threshold: args.z_threshold,
                    lookback: LookbackPayload {
                        fetch_limit: resolved.fetch_limit,
                        fetched_events: resolved.lookback_events.len(),
                        termination: resolved.termination,
                    },
                    rows: rows
                        .iter()
                        .map(MetricRowPayload::from_row)
                        .collect::<Result<Vec<_>>>()?,
                };
                print_json(&payload)
            } else {
                print_metrics_table(&rows)
            }
        }
        MetricsCommand::Chart(args) => {
            let query = FetchQuery::all()
                .with_source_id(args.source_id)
                .with_signal_name(args.signal_name);
            let mut history = store.fetch_events(&query)?;
            history.reverse();
            let rows = compute_rolling_metrics(&history, args.window_size, args.z_threshold)
                .map_err(|err| anyhow!("rolling metrics failed: {err}"))?;
            tracing::info!(
                rows = rows.len(),
                source_id = query.source_id.as_deref().unwrap_or("*"),
                signal_name = query.signal_name.as_deref().unwrap_or("*"),
                "computed chart history"
            );

            print_json(&ChartRowsPayload {
                contract_version: "chart_rows.v1".to_string(),
                rows: build_chart_rows(&rows)?,
            })
        }
    }
}

fn select_window_rows(
    rows: Vec<RollingMetricRow>,
    window_ids: &BTreeSet<String>,
    args: &WindowArgs,
) -> Vec<RollingMetricRow> {
    rows.into_iter()
        .filter(|row| window_ids.contains(&row.event.event_id))
        .filter(|row| {
            args.source_id
                .as_deref()
                .map_or(true, |source_id| row.event.source_id == source_id)
        })
        .filter(|row| {
            args.signal_name
                .as_deref()
                .map_or(true, |signal_name| row.event.signal_name == signal_name)
        })
        .filter(|row| !args.anomalies_only || row.is_anomaly)
        .collect()
}

fn run_store(command: StoreCommand, store: &mut SqliteEventStore) -> Result<()> {
    match command {
        StoreCommand::Status(args) => {
            let status = store.status()?;
            if args.json {
                print_json(&StoreStatusPayload::from_status(&status)?)
            } else {
                print_store_status(&status)
            }
        }
        StoreCommand::Reset(args) => {
            if !reset_allowed(args.allow_reset, args.confirm) {
                return Err(anyhow!(
                    "store reset refused: requires --allow-reset (or SSO_ALLOW_DB_RESET=1) and --confirm"
                ));
            }
            let removed_events = store.count_events()?;
            store.reset()?;
            print_json(&StoreResetPayload {
                contract_version: "store_reset.v1".to_string(),
                removed_events,
            })
        }
    }
}

/// Runs the benchmark command group and optional threshold enforcement.
///
/// # Errors
/// Returns an error when argument combinations are invalid, benchmark execution
/// fails, artifact write fails, or thresholds are violated.
pub fn run_benchmark(command: BenchmarkCommand) -> Result<()> {
    match command {
        BenchmarkCommand::Run(args) => {
            let volumes = if args.volumes.is_empty() {
                vec![100, 1_000, 5_000]
            } else {
                args.volumes
            };

            let thresholds = match (
                args.append_p95_max_ms,
                args.resolve_p95_max_ms,
                args.metrics_p95_max_ms,
            ) {
                (Some(append), Some(resolve), Some(metrics)) => Some(BenchmarkThresholds {
                    append_p95_ms_max: append,
                    resolve_p95_ms_max: resolve,
                    metrics_p95_ms_max: metrics,
                }),
                (None, None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "benchmark thresholds require all of --append-p95-max-ms, --resolve-p95-max-ms, --metrics-p95-max-ms"
                    ))
                }
            };

            let config = BenchmarkConfig {
                volumes,
                repetitions: args.repetitions,
            };
            let report = signal_observatory_store_sqlite::run_benchmark(&config, thresholds)?;

            if let Some(path) = args.output {
                let serialized = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, serialized).with_context(|| {
                    format!("failed writing benchmark report to {}", path.display())
                })?;
            }

            if args.json {
                print_json(&report)?;
            } else {
                print_benchmark_report(&report);
            }

            if !report.within_thresholds {
                return Err(anyhow!(
                    "benchmark thresholds violated: {}",
                    report.violations.join("; ")
                ));
            }
            Ok(())
        }
    }
}

/// Loads `.env` from the working directory or a parent without overriding
/// variables that are already set. Returns the loaded path, or `None` when no
/// file exists or `SSO_DISABLE_DOTENV` is truthy.
///
/// # Errors
/// Returns an error when a `.env` file exists but cannot be read or parsed.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    if dotenv_disabled(std::env::var("SSO_DISABLE_DOTENV").ok().as_deref()) {
        return Ok(None);
    }
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err).context("failed to load .env"),
    }
}

fn dotenv_disabled(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// Destructive reset needs both the standing permission and a per-call
/// confirmation.
#[must_use]
pub fn reset_allowed(allow_reset: bool, confirm: bool) -> bool {
    allow_reset && confirm
}

/// Chart-ready rows ordered by timestamp ascending.
///
/// # Errors
/// Returns an error when a timestamp cannot be formatted.
pub fn build_chart_rows(rows: &[RollingMetricRow]) -> Result<Vec<ChartRow>> {
    let mut ordered: Vec<&RollingMetricRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.event.event_ts);
    ordered
        .into_iter()
        .map(|row| {
            Ok(ChartRow {
                event_ts: rfc3339(row.event.event_ts)?,
                source_id: row.event.source_id.clone(),
                signal_name: row.event.signal_name.clone(),
                signal_value: row.event.signal_value,
                is_anomaly: row.is_anomaly,
                z_score: row.z_score,
            })
        })
        .collect()
}

fn build_generator_request(args: &GenerateArgs) -> Result<GeneratorRequest> {
    let now = now_utc();
    let start_ts = match args.start_ts.as_deref() {
        Some(raw) => parse_timestamp(raw).map_err(|err| anyhow!("invalid --start-ts: {err}"))?,
        None => now,
    };

    let source_ids = if args.source_ids.is_empty() {
        vec![DEFAULT_SOURCE_ID.to_string()]
    } else {
        args.source_ids.clone()
    };
    let signal_names = if args.signal_names.is_empty() {
        DEFAULT_SIGNAL_NAMES.iter().map(ToString::to_string).collect()
    } else {
        args.signal_names.clone()
    };

    Ok(GeneratorRequest {
        count: args.count,
        start_ts,
        run_id: args.run_id.clone().unwrap_or_else(|| default_run_id(now)),
        seed: args.seed,
        source_ids,
        signal_names,
        step: Duration::seconds_f64(args.step_seconds),
    })
}

fn parse_positive_usize(raw: &str) -> std::result::Result<usize, String> {
    let value: usize = raw
        .parse()
        .map_err(|err| format!("expected a positive integer: {err}"))?;
    if value == 0 {
        return Err("value MUST be >= 1".to_string());
    }
    Ok(value)
}

fn parse_positive_f64(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|err| format!("expected a number: {err}"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err("value MUST be a positive finite number".to_string());
    }
    Ok(value)
}

fn parse_step_seconds(raw: &str) -> std::result::Result<f64, String> {
    let value = parse_positive_f64(raw)?;
    if value > MAX_STEP_SECONDS {
        return Err(format!("step MUST be at most {MAX_STEP_SECONDS} seconds"));
    }
    Ok(value)
}

fn rfc3339(value: time::OffsetDateTime) -> Result<String> {
    format_rfc3339(value).map_err(|err| anyhow!(err.to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_events_table(events: &[Event]) -> Result<()> {
    println!(
        "{:<22} {:<28} {:<12} {:<10} {:>10} {:>8} run_id",
        "event_ts", "event_id", "source_id", "signal", "value", "quality"
    );
    println!("{}", "-".repeat(110));
    for event in events {
        println!(
            "{:<22} {:<28} {:<12} {:<10} {:>10.4} {:>8.3} {}",
            rfc3339(event.event_ts)?,
            event.event_id,
            event.source_id,
            event.signal_name,
            event.signal_value,
            event.quality_score,
            event.run_id
        );
    }
    Ok(())
}

fn print_metrics_table(rows: &[RollingMetricRow]) -> Result<()> {
    println!(
        "{:<22} {:<12} {:<10} {:>10} {:>10} {:>10} {:>8} anomaly",
        "event_ts", "source_id", "signal", "value", "mean", "std", "z"
    );
    println!("{}", "-".repeat(100));
    for row in rows {
        println!(
            "{:<22} {:<12} {:<10} {:>10.4} {:>10} {:>10} {:>8} {}",
            rfc3339(row.event.event_ts)?,
            row.event.source_id,
            row.event.signal_name,
            row.event.signal_value,
            format_optional(row.rolling_mean, 4),
            format_optional(row.rolling_std, 4),
            format_optional(row.z_score, 2),
            if row.is_anomaly { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn format_optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.precision$}"))
}

fn print_store_status(status: &StoreStatus) -> Result<()> {
    println!(
        "total_events={} latest_event_ts={}",
        status.total_events,
        match status.latest_event_ts {
            Some(value) => rfc3339(value)?,
            None => "n/a".to_string(),
        }
    );
    println!("{:<28} {:>8} latest_event_ts", "group", "events");
    println!("{}", "-".repeat(70));
    for group in &status.groups {
        let label = group.key.to_string();
        println!(
            "{:<28} {:>8} {}",
            label,
            group.event_count,
            rfc3339(group.latest_event_ts)?
        );
    }
    Ok(())
}

fn print_benchmark_report(report: &BenchmarkReport) {
    println!(
        "contract={} generated_at={} repetitions={} within_thresholds={}",
        report.contract_version,
        report.generated_at,
        report.repetitions,
        if report.within_thresholds {
            "yes"
        } else {
            "no"
        }
    );
    println!(
        "{:<10} {:<12} {:<12} {:<12} {:<12} {:<12} {:<12}",
        "events",
        "append_p50",
        "append_p95",
        "resolve_p50",
        "resolve_p95",
        "metrics_p50",
        "metrics_p95"
    );
    println!("{}", "-".repeat(90));
    for item in &report.volumes {
        println!(
            "{:<10} {:<12.3} {:<12.3} {:<12.3} {:<12.3} {:<12.3} {:<12.3}",
            item.event_count,
            item.append_p50_ms,
            item.append_p95_ms,
            item.resolve_p50_ms,
            item.resolve_p95_ms,
            item.metrics_p50_ms,
            item.metrics_p95_ms
        );
    }

    if !report.violations.is_empty() {
        println!("violations={}", report.violations.join(" | "));
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct GenerateReportPayload {
    contract_version: String,
    run_id: String,
    seed: u64,
    requested_start_ts: String,
    effective_start_ts: String,
    step_seconds: f64,
    inserted: usize,
    total_events: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventPayload {
    event_id: String,
    event_ts: String,
    event_date: String,
    source_id: String,
    signal_name: String,
    signal_value: f64,
    quality_score: f64,
    run_id: String,
}

impl EventPayload {
    fn from_event(event: &Event) -> Result<Self> {
        Ok(Self {
            event_id: event.event_id.clone(),
            event_ts: rfc3339(event.event_ts)?,
            event_date: format_date(event.event_date),
            source_id: event.source_id.clone(),
            signal_name: event.signal_name.clone(),
            signal_value: event.signal_value,
            quality_score: event.quality_score,
            run_id: event.run_id.clone(),
        })
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventsListPayload {
    contract_version: String,
    events: Vec<EventPayload>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventCountPayload {
    contract_version: String,
    total_events: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct MetricRowPayload {
    #[serde(flatten)]
    event: EventPayload,
    rolling_mean: Option<f64>,
    rolling_std: Option<f64>,
    z_score: Option<f64>,
    is_anomaly: bool,
}

impl MetricRowPayload {
    fn from_row(row: &RollingMetricRow) -> Result<Self> {
        Ok(Self {
            event: EventPayload::from_event(&row.event)?,
            rolling_mean: row.rolling_mean,
            rolling_std: row.rolling_std,
            z_score: row.z_score,
            is_anomaly: row.is_anomaly,
        })
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LookbackPayload {
    fetch_limit: usize,
    fetched_events: usize,
    termination: LookbackTermination,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RollingMetricsPayload {
    contract_version: String,
    window_limit: usize,
    window_size: usize,
    z_threshold: f64,
    lookback: LookbackPayload,
    rows: Vec<MetricRowPayload>,
}

/// One point for plotting `signal_value` over time with anomaly markers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChartRow {
    pub event_ts: String,
    pub source_id: String,
    pub signal_name: String,
    pub signal_value: f64,
    pub is_anomaly: bool,
    pub z_score: Option<f64>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChartRowsPayload {
    contract_version: String,
    rows: Vec<ChartRow>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GroupSummaryPayload {
    source_id: String,
    signal_name: String,
    event_count: usize,
    latest_event_ts: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreStatusPayload {
    contract_version: String,
    total_events: usize,
    latest_event_ts: Option<String>,
    groups: Vec<GroupSummaryPayload>,
}

impl StoreStatusPayload {
    fn from_status(status: &StoreStatus) -> Result<Self> {
        Ok(Self {
            contract_version: "store_status.v1".to_string(),
            total_events: status.total_events,
            latest_event_ts: status.latest_event_ts.map(rfc3339).transpose()?,
            groups: status
                .groups
                .iter()
                .map(|group| {
                    Ok(GroupSummaryPayload {
                        source_id: group.key.source_id.clone(),
                        signal_name: group.key.signal_name.clone(),
                        event_count: group.event_count,
                        latest_event_ts: rfc3339(group.latest_event_ts)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreResetPayload {
    contract_version: String,
    removed_events: usize,
}
