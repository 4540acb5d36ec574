use std::collections::{BTreeMap, VecDeque};

use crate::{Event, GroupKey, ObservatoryError};

/// An event annotated with statistics over the `window_size` prior events of
/// its group. Statistics are absent until the window has filled.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMetricRow {
    pub event: Event,
    pub rolling_mean: Option<f64>,
    pub rolling_std: Option<f64>,
    pub z_score: Option<f64>,
    pub is_anomaly: bool,
}

impl RollingMetricRow {
    #[must_use]
    pub fn has_stats(&self) -> bool {
        self.rolling_mean.is_some()
    }
}

struct PriorWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl PriorWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn stats(&self) -> Option<(f64, f64)> {
        if self.values.len() < self.capacity {
            return None;
        }
        let len = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / len;
        let variance = self
            .values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / len;
        Some((mean, variance.sqrt()))
    }

    fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            let _ = self.values.pop_front();
        }
    }
}

/// Computes grouped rolling mean, population standard deviation and z-score.
///
/// Events are ordered by timestamp ascending (stable for ties) and each group
/// keeps its own window of prior values. The current value never contributes
/// to its own statistics. A zero standard deviation yields a z-score of zero
/// and no anomaly.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] when `window_size` is zero or
/// `z_threshold` is not a positive finite number.
#[allow(clippy::float_cmp)]
pub fn compute_rolling_metrics(
    events: &[Event],
    window_size: usize,
    z_threshold: f64,
) -> Result<Vec<RollingMetricRow>, ObservatoryError> {
    if window_size == 0 {
        return Err(ObservatoryError::InvalidInput(
            "window_size MUST be >= 1".to_string(),
        ));
    }
    if !z_threshold.is_finite() || z_threshold <= 0.0 {
        return Err(ObservatoryError::InvalidInput(
            "z_threshold MUST be a positive finite number".to_string(),
        ));
    }

    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by_key(|event| event.event_ts);

    let mut windows: BTreeMap<GroupKey, PriorWindow> = BTreeMap::new();
    let mut rows = Vec::with_capacity(ordered.len());

    for event in ordered {
        let window = windows
            .entry(event.group_key())
            .or_insert_with(|| PriorWindow::new(window_size));

        let (rolling_mean, rolling_std, z_score, is_anomaly) = match window.stats() {
            None => (None, None, None, false),
            Some((mean, std)) if std == 0.0 => (Some(mean), Some(std), Some(0.0), false),
            Some((mean, std)) => {
                let z = (event.signal_value - mean) / std;
                (Some(mean), Some(std), Some(z), z.abs() >= z_threshold)
            }
        };

        window.push(event.signal_value);
        rows.push(RollingMetricRow {
            event: event.clone(),
            rolling_mean,
            rolling_std,
            z_score,
            is_anomaly,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_event, must};
    use proptest::prelude::*;

    fn assert_close(actual: Option<f64>, expected: f64) {
        match actual {
            Some(value) => assert!(
                (value - expected).abs() < 1e-9,
                "expected {expected}, got {value}"
            ),
            None => panic!("expected Some({expected}), got None"),
        }
    }

    #[test]
    fn stats_appear_only_after_window_fills() {
        let events = vec![
            fixture_event("a", 0, "s1", "x", 1.0),
            fixture_event("b", 1, "s1", "x", 2.0),
            fixture_event("c", 2, "s1", "x", 3.0),
            fixture_event("d", 3, "s1", "x", 4.0),
        ];

        let rows = must(compute_rolling_metrics(&events, 3, 2.0));
        assert!(rows[..3].iter().all(|row| !row.has_stats() && !row.is_anomaly));
        assert_close(rows[3].rolling_mean, 2.0);
        assert_close(rows[3].rolling_std, (2.0_f64 / 3.0).sqrt());
        assert_close(rows[3].z_score, 2.0 / (2.0_f64 / 3.0).sqrt());
        assert!(rows[3].is_anomaly);
    }

    #[test]
    fn flat_window_has_zero_z_score_and_no_anomaly() {
        let events = vec![
            fixture_event("a", 0, "s1", "x", 5.0),
            fixture_event("b", 1, "s1", "x", 5.0),
            fixture_event("c", 2, "s1", "x", 5.0),
            fixture_event("d", 3, "s1", "x", 100.0),
        ];

        let rows = must(compute_rolling_metrics(&events, 3, 1.0));
        assert_close(rows[3].rolling_std, 0.0);
        assert_close(rows[3].z_score, 0.0);
        assert!(!rows[3].is_anomaly);
    }

    #[test]
    fn groups_never_share_windows() {
        let events = vec![
            fixture_event("a", 0, "s1", "x", 1.0),
            fixture_event("b", 1, "s2", "x", 100.0),
            fixture_event("c", 2, "s1", "x", 3.0),
            fixture_event("d", 3, "s2", "x", 200.0),
            fixture_event("e", 4, "s1", "y", 7.0),
        ];

        let rows = must(compute_rolling_metrics(&events, 1, 3.0));
        let by_id = |id: &str| {
            rows.iter()
                .find(|row| row.event.event_id == id)
                .map_or_else(|| panic!("missing row {id}"), Clone::clone)
        };

        assert!(!by_id("a").has_stats());
        assert!(!by_id("b").has_stats());
        assert_close(by_id("c").rolling_mean, 1.0);
        assert_close(by_id("d").rolling_mean, 100.0);
        assert!(!by_id("e").has_stats());
    }

    #[test]
    fn spike_after_steady_window_is_anomalous() {
        let events = vec![
            fixture_event("a", 0, "s1", "x", 10.0),
            fixture_event("b", 1, "s1", "x", 10.5),
            fixture_event("c", 2, "s1", "x", 9.5),
            fixture_event("d", 3, "s1", "x", 30.0),
        ];

        let rows = must(compute_rolling_metrics(&events, 3, 3.0));
        assert!(rows[..3]
            .iter()
            .all(|row| row.rolling_mean.is_none()
                && row.rolling_std.is_none()
                && row.z_score.is_none()
                && !row.is_anomaly));
        assert_close(rows[3].rolling_mean, 10.0);
        assert_close(rows[3].rolling_std, (0.5_f64 / 3.0).sqrt());
        assert!(rows[3].is_anomaly);
    }

    #[test]
    fn groups_sharing_timestamps_keep_independent_windows() {
        let steady = [4.0, 5.0, 6.0, 5.0];
        let mut events = Vec::new();
        for (offset, value) in steady.iter().enumerate() {
            let offset = i64::try_from(offset).unwrap_or(i64::MAX);
            let spiked = if offset == 3 { 500.0 } else { *value };
            events.push(fixture_event(&format!("a{offset}"), offset, "s1", "x", spiked));
            events.push(fixture_event(&format!("b{offset}"), offset, "s2", "x", *value));
        }
        let only_b: Vec<Event> = events
            .iter()
            .filter(|event| event.source_id == "s2")
            .cloned()
            .collect();

        let mixed = must(compute_rolling_metrics(&events, 3, 3.0));
        let alone = must(compute_rolling_metrics(&only_b, 3, 3.0));

        let mixed_b: Vec<&RollingMetricRow> = mixed
            .iter()
            .filter(|row| row.event.source_id == "s2")
            .collect();
        assert_eq!(mixed_b.len(), alone.len());
        for (lhs, rhs) in mixed_b.iter().zip(&alone) {
            assert_eq!(lhs.event.event_id, rhs.event.event_id);
            assert_eq!(lhs.rolling_mean, rhs.rolling_mean);
            assert_eq!(lhs.rolling_std, rhs.rolling_std);
            assert_eq!(lhs.z_score, rhs.z_score);
            assert!(!lhs.is_anomaly);
        }

        let spike = mixed
            .iter()
            .find(|row| row.event.event_id == "a3")
            .map_or_else(|| panic!("missing row a3"), Clone::clone);
        assert!(spike.is_anomaly);
    }

    #[test]
    fn input_order_does_not_matter() {
        let events = vec![
            fixture_event("c", 2, "s1", "x", 3.0),
            fixture_event("a", 0, "s1", "x", 1.0),
            fixture_event("b", 1, "s1", "x", 2.0),
        ];

        let rows = must(compute_rolling_metrics(&events, 2, 3.0));
        let ids: Vec<&str> = rows.iter().map(|row| row.event.event_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_close(rows[2].rolling_mean, 1.5);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let rows = must(compute_rolling_metrics(&[], 3, 3.0));
        assert!(rows.is_empty());
    }

    #[test]
    fn rejects_zero_window_and_bad_threshold() {
        let events = vec![fixture_event("a", 0, "s1", "x", 1.0)];
        assert!(compute_rolling_metrics(&events, 0, 3.0).is_err());
        assert!(compute_rolling_metrics(&events, 3, 0.0).is_err());
        assert!(compute_rolling_metrics(&events, 3, f64::NAN).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_first_window_size_rows_per_group_have_no_stats(
            values in prop::collection::vec((0_usize..3, -50.0_f64..50.0), 0..60),
            window_size in 1_usize..6,
        ) {
            let events: Vec<Event> = values
                .iter()
                .enumerate()
                .map(|(index, (group, value))| {
                    fixture_event(
                        &format!("e{index}"),
                        i64::try_from(index).unwrap_or(i64::MAX),
                        &format!("s{group}"),
                        "x",
                        *value,
                    )
                })
                .collect();

            let rows = must(compute_rolling_metrics(&events, window_size, 2.5));
            prop_assert_eq!(rows.len(), events.len());

            let mut seen: BTreeMap<String, usize> = BTreeMap::new();
            for row in &rows {
                let count = seen.entry(row.event.source_id.clone()).or_insert(0);
                prop_assert_eq!(row.has_stats(), *count >= window_size);
                if !row.has_stats() {
                    prop_assert!(!row.is_anomaly);
                }
                if let Some(std) = row.rolling_std {
                    prop_assert!(std >= 0.0);
                }
                *count += 1;
            }
        }
    }
}
