use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Event, EventStore, FetchQuery, ObservatoryError};

/// Upper bound on events fetched for lookback when callers pass no explicit cap.
pub const DEFAULT_MAX_FETCH_LIMIT: usize = 5_000;
/// Initial lookback fetch is `window_limit + window_size * LOOKBACK_HEADROOM_FACTOR`.
pub const LOOKBACK_HEADROOM_FACTOR: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LookbackTermination {
    /// No window was requested or the store holds no events.
    Empty,
    /// The store returned everything it holds.
    Exhausted,
    /// Every window event has `window_size` prior group events.
    Satisfied,
    /// The fetch cap was reached before every window event was covered.
    CapReached,
}

/// The newest `window_limit` events and the larger newest-first set needed
/// to compute their rolling statistics. Both are ordered newest-first.
#[derive(Debug, Clone, PartialEq)]
pub struct LookbackWindow {
    pub window_events: Vec<Event>,
    pub lookback_events: Vec<Event>,
    pub fetch_limit: usize,
    pub termination: LookbackTermination,
}

impl LookbackWindow {
    fn empty() -> Self {
        Self {
            window_events: Vec::new(),
            lookback_events: Vec::new(),
            fetch_limit: 0,
            termination: LookbackTermination::Empty,
        }
    }

    #[must_use]
    pub fn window_event_ids(&self) -> BTreeSet<String> {
        self.window_events
            .iter()
            .map(|event| event.event_id.clone())
            .collect()
    }
}

/// Reports whether every window event has at least `window_size` prior
/// events of its own group within `candidates`.
///
/// Prior counts are taken in chronological order (stable for equal
/// timestamps, with older insertions first). A window id missing from
/// `candidates` means the lookback is not satisfied.
#[must_use]
pub fn lookback_satisfied(
    candidates: &[Event],
    window_event_ids: &BTreeSet<String>,
    window_size: usize,
) -> bool {
    let mut chronological: Vec<&Event> = candidates.iter().rev().collect();
    chronological.sort_by_key(|event| event.event_ts);

    let mut group_counts: HashMap<(&str, &str), usize> = HashMap::new();
    let mut prior_counts: HashMap<&str, usize> = HashMap::new();
    for event in chronological {
        let count = group_counts.entry(event.group()).or_insert(0);
        prior_counts.insert(event.event_id.as_str(), *count);
        *count += 1;
    }

    window_event_ids.iter().all(|event_id| {
        prior_counts
            .get(event_id.as_str())
            .is_some_and(|prior| *prior >= window_size)
    })
}

/// Fetches the newest `window_limit` events plus enough older events for
/// their rolling windows, growing the fetch geometrically up to
/// `max_fetch_limit`.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] when `window_size` or
/// `max_fetch_limit` is zero (and a window was requested), and propagates
/// store failures.
pub fn resolve_lookback<S>(
    store: &S,
    window_limit: usize,
    window_size: usize,
    max_fetch_limit: usize,
) -> Result<LookbackWindow, ObservatoryError>
where
    S: EventStore + ?Sized,
{
    if window_limit == 0 {
        return Ok(LookbackWindow::empty());
    }
    if window_size == 0 {
        return Err(ObservatoryError::InvalidInput(
            "window_size MUST be >= 1".to_string(),
        ));
    }
    if max_fetch_limit == 0 {
        return Err(ObservatoryError::InvalidInput(
            "max_fetch_limit MUST be >= 1".to_string(),
        ));
    }

    let window_events = store.fetch(&FetchQuery::latest(window_limit))?;
    if window_events.is_empty() {
        return Ok(LookbackWindow::empty());
    }
    let window_ids: BTreeSet<String> = window_events
        .iter()
        .map(|event| event.event_id.clone())
        .collect();

    let mut fetch_limit = max_fetch_limit.min(
        window_limit.saturating_add(window_size.saturating_mul(LOOKBACK_HEADROOM_FACTOR)),
    );

    loop {
        let lookback_events = store.fetch(&FetchQuery::latest(fetch_limit))?;
        let termination = if lookback_events.len() <= window_limit {
            Some(LookbackTermination::Exhausted)
        } else if lookback_satisfied(&lookback_events, &window_ids, window_size) {
            Some(LookbackTermination::Satisfied)
        } else if lookback_events.len() < fetch_limit {
            Some(LookbackTermination::Exhausted)
        } else if fetch_limit >= max_fetch_limit {
            Some(LookbackTermination::CapReached)
        } else {
            None
        };

        tracing::debug!(
            window_limit,
            window_size,
            fetch_limit,
            fetched = lookback_events.len(),
            ?termination,
            "lookback fetch"
        );

        if let Some(termination) = termination {
            return Ok(LookbackWindow {
                window_events,
                lookback_events,
                fetch_limit,
                termination,
            });
        }

        fetch_limit = max_fetch_limit.min(fetch_limit.saturating_mul(2));
    }
}
