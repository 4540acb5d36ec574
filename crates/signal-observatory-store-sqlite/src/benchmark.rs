use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use signal_observatory_core::{
    compute_rolling_metrics, format_rfc3339, generate_events, now_utc, parse_timestamp,
    resolve_lookback, GeneratorRequest, DEFAULT_MAX_FETCH_LIMIT,
};
use time::Duration;
use ulid::Ulid;

use crate::SqliteEventStore;

const BENCHMARK_WINDOW_SIZE: usize = 20;
const BENCHMARK_Z_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkThresholds {
    pub append_p95_ms_max: f64,
    pub resolve_p95_ms_max: f64,
    pub metrics_p95_ms_max: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct BenchmarkConfig {
    pub volumes: Vec<usize>,
    pub repetitions: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkVolumeResult {
    pub event_count: usize,
    pub append_p50_ms: f64,
    pub append_p95_ms: f64,
    pub resolve_p50_ms: f64,
    pub resolve_p95_ms: f64,
    pub metrics_p50_ms: f64,
    pub metrics_p95_ms: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub contract_version: String,
    pub generated_at: String,
    pub repetitions: usize,
    pub volumes: Vec<BenchmarkVolumeResult>,
    pub thresholds: Option<BenchmarkThresholds>,
    pub within_thresholds: bool,
    pub violations: Vec<String>,
}

/// Times append, lookback resolution and metric computation on throwaway
/// databases, one fresh file per volume and repetition.
///
/// The rolling window covers the whole generated batch so resolution and
/// computation scale with the volume.
pub fn run_benchmark(
    config: &BenchmarkConfig,
    thresholds: Option<BenchmarkThresholds>,
) -> Result<BenchmarkReport> {
    if config.volumes.is_empty() {
        return Err(anyhow!(
            "benchmark config must include at least one volume value"
        ));
    }
    if config.volumes.contains(&0) {
        return Err(anyhow!("benchmark volumes must be >= 1"));
    }
    if config.repetitions == 0 {
        return Err(anyhow!("benchmark repetitions must be >= 1"));
    }

    let start_ts =
        parse_timestamp("2025-01-01T00:00:00Z").map_err(|err| anyhow!(err.to_string()))?;
    let mut volume_results = Vec::new();

    for &event_count in &config.volumes {
        let mut append_samples_ms = Vec::new();
        let mut resolve_samples_ms = Vec::new();
        let mut metrics_samples_ms = Vec::new();

        let request = GeneratorRequest {
            count: event_count,
            start_ts,
            run_id: format!("bench-{event_count}"),
            seed: 42,
            source_ids: vec!["source-1".to_string(), "source-2".to_string()],
            signal_names: vec![
                "alpha".to_string(),
                "beta".to_string(),
                "gamma".to_string(),
                "delta".to_string(),
            ],
            step: Duration::seconds(1),
        };
        let events = generate_events(&request).map_err(|err| anyhow!(err.to_string()))?;

        for repetition in 0..config.repetitions {
            let db_path = std::env::temp_dir().join(format!(
                "sso-bench-{}-{}-{}.sqlite3",
                event_count,
                repetition,
                Ulid::new()
            ));

            let mut store = SqliteEventStore::open_migrated(&db_path)?;

            let append_start = Instant::now();
            let _ = store.append_events(&events)?;
            append_samples_ms.push(append_start.elapsed().as_secs_f64() * 1_000.0);

            let resolve_start = Instant::now();
            let resolved = resolve_lookback(
                &store,
                event_count,
                BENCHMARK_WINDOW_SIZE,
                DEFAULT_MAX_FETCH_LIMIT.max(event_count),
            )
            .map_err(|err| anyhow!(err.to_string()))
            .context("benchmark lookback resolution failed")?;
            resolve_samples_ms.push(resolve_start.elapsed().as_secs_f64() * 1_000.0);

            let mut chronological = resolved.lookback_events;
            chronological.reverse();
            let metrics_start = Instant::now();
            let _ = compute_rolling_metrics(
                &chronological,
                BENCHMARK_WINDOW_SIZE,
                BENCHMARK_Z_THRESHOLD,
            )
            .map_err(|err| anyhow!(err.to_string()))?;
            metrics_samples_ms.push(metrics_start.elapsed().as_secs_f64() * 1_000.0);

            drop(store);
            remove_database_files(&db_path);
        }

        volume_results.push(BenchmarkVolumeResult {
            event_count,
            append_p50_ms: percentile(&append_samples_ms, 0.50),
            append_p95_ms: percentile(&append_samples_ms, 0.95),
            resolve_p50_ms: percentile(&resolve_samples_ms, 0.50),
            resolve_p95_ms: percentile(&resolve_samples_ms, 0.95),
            metrics_p50_ms: percentile(&metrics_samples_ms, 0.50),
            metrics_p95_ms: percentile(&metrics_samples_ms, 0.95),
        });
    }

    let violations = thresholds
        .as_ref()
        .map(|limit| threshold_violations(&volume_results, limit))
        .unwrap_or_default();

    tracing::info!(
        volumes = volume_results.len(),
        repetitions = config.repetitions,
        violations = violations.len(),
        "benchmark finished"
    );

    Ok(BenchmarkReport {
        contract_version: "benchmark_report.v1".to_string(),
        generated_at: format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?,
        repetitions: config.repetitions,
        volumes: volume_results,
        thresholds,
        within_thresholds: violations.is_empty(),
        violations,
    })
}

fn threshold_violations(
    volumes: &[BenchmarkVolumeResult],
    limit: &BenchmarkThresholds,
) -> Vec<String> {
    let mut violations = Vec::new();
    for volume in volumes {
        for (name, observed, max) in [
            ("append_p95_ms", volume.append_p95_ms, limit.append_p95_ms_max),
            ("resolve_p95_ms", volume.resolve_p95_ms, limit.resolve_p95_ms_max),
            ("metrics_p95_ms", volume.metrics_p95_ms, limit.metrics_p95_ms_max),
        ] {
            if observed > max {
                violations.push(format!(
                    "volume={} {name}={observed} exceeds max={max}",
                    volume.event_count
                ));
            }
        }
    }
    violations
}

fn remove_database_files(db_path: &std::path::Path) {
    let _ = std::fs::remove_file(db_path);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(sidecar);
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(values: &[f64], percentile_rank: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (percentile_rank * sorted.len() as f64).ceil() as usize;
    let index = position.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    #[test]
    fn benchmark_harness_generates_report_and_respects_thresholds() {
        let config = BenchmarkConfig {
            volumes: vec![25, 75],
            repetitions: 2,
        };
        let thresholds = BenchmarkThresholds {
            append_p95_ms_max: 60_000.0,
            resolve_p95_ms_max: 60_000.0,
            metrics_p95_ms_max: 60_000.0,
        };

        let report = must(run_benchmark(&config, Some(thresholds.clone())));
        assert_eq!(report.contract_version, "benchmark_report.v1");
        assert_eq!(report.repetitions, 2);
        assert_eq!(report.volumes.len(), 2);
        assert_eq!(report.volumes[1].event_count, 75);
        assert_eq!(report.thresholds, Some(thresholds));
        assert!(report.within_thresholds);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn impossible_thresholds_are_reported_as_violations() {
        let config = BenchmarkConfig {
            volumes: vec![10],
            repetitions: 1,
        };
        let thresholds = BenchmarkThresholds {
            append_p95_ms_max: -1.0,
            resolve_p95_ms_max: -1.0,
            metrics_p95_ms_max: -1.0,
        };

        let report = must(run_benchmark(&config, Some(thresholds)));
        assert!(!report.within_thresholds);
        assert_eq!(report.violations.len(), 3);
        assert!(report.violations[0].starts_with("volume=10 append_p95_ms="));
    }

    #[test]
    fn rejects_empty_volumes_and_zero_repetitions() {
        let empty = BenchmarkConfig {
            volumes: Vec::new(),
            repetitions: 1,
        };
        assert!(run_benchmark(&empty, None).is_err());

        let zero = BenchmarkConfig {
            volumes: vec![10],
            repetitions: 0,
        };
        assert!(run_benchmark(&zero, None).is_err());
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let samples = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&samples, 0.50), 3.0);
        assert_eq!(percentile(&samples, 0.95), 5.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }
}
