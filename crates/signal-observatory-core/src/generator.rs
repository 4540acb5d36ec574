use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime, UtcOffset};
use ulid::Ulid;

use crate::{ObservatoryError, RawEvent};

/// Parameters for one deterministic synthetic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRequest {
    pub count: usize,
    pub start_ts: OffsetDateTime,
    pub run_id: String,
    pub seed: u64,
    pub source_ids: Vec<String>,
    pub signal_names: Vec<String>,
    pub step: Duration,
}

impl GeneratorRequest {
    /// # Errors
    /// Returns [`ObservatoryError::InvalidInput`] for an empty `run_id`, empty
    /// candidate lists or a non-positive `step`.
    pub fn validate(&self) -> Result<(), ObservatoryError> {
        if self.run_id.trim().is_empty() {
            return Err(ObservatoryError::InvalidInput(
                "run_id MUST be a non-empty string".to_string(),
            ));
        }
        if self.step <= Duration::ZERO {
            return Err(ObservatoryError::InvalidInput(
                "step MUST be a positive duration".to_string(),
            ));
        }
        validate_candidates("source_ids", &self.source_ids)?;
        validate_candidates("signal_names", &self.signal_names)
    }
}

fn validate_candidates(field: &str, candidates: &[String]) -> Result<(), ObservatoryError> {
    if candidates.is_empty() {
        return Err(ObservatoryError::InvalidInput(format!(
            "{field} MUST contain at least one entry"
        )));
    }
    if candidates.iter().any(|candidate| candidate.trim().is_empty()) {
        return Err(ObservatoryError::InvalidInput(format!(
            "{field} entries MUST be non-empty strings"
        )));
    }
    Ok(())
}

/// Generates `count` events starting exactly at `start_ts` (in UTC) and
/// advancing by `step`. Whole-second alignment of a requested start belongs to
/// [`crate::choose_effective_start`].
///
/// The same `(seed, run_id)` always yields the same batch, including event
/// identifiers. A different `run_id` yields a different value sequence.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] when the request fails
/// [`GeneratorRequest::validate`] or the timestamps overflow.
pub fn generate_events(request: &GeneratorRequest) -> Result<Vec<RawEvent>, ObservatoryError> {
    request.validate()?;

    let mut rng = seeded_rng(request.seed, &request.run_id);
    let mut current = request.start_ts.to_offset(UtcOffset::UTC);
    let mut events = Vec::with_capacity(request.count);

    for index in 0..request.count {
        let event_id = Ulid::from(rng.gen::<u128>()).to_string();
        let source_id = pick(&mut rng, &request.source_ids);
        let signal_name = pick(&mut rng, &request.signal_names);
        let noise: f64 = rng.sample(StandardNormal);
        let quality_score: f64 = rng.gen();

        events.push(RawEvent {
            event_id,
            event_ts: current,
            source_id: source_id.clone(),
            signal_value: stable_signal_base(signal_name) + noise,
            signal_name: signal_name.clone(),
            quality_score,
            run_id: request.run_id.clone(),
        });

        if index + 1 < request.count {
            current = current.checked_add(request.step).ok_or_else(|| {
                ObservatoryError::InvalidInput("generated timestamp overflowed".to_string())
            })?;
        }
    }

    tracing::debug!(
        run_id = %request.run_id,
        seed = request.seed,
        count = events.len(),
        "generated synthetic batch"
    );
    Ok(events)
}

/// Per-signal offset in `[0, 9]` derived from a SHA-256 of the name, so each
/// signal sits on its own level across runs and processes.
#[must_use]
pub fn stable_signal_base(signal_name: &str) -> f64 {
    let digest = Sha256::digest(signal_name.as_bytes());
    f64::from(u16::from_be_bytes([digest[0], digest[1]]) % 10)
}

fn seeded_rng(seed: u64, run_id: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_be_bytes());
    hasher.update(b":");
    hasher.update(run_id.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    StdRng::from_seed(digest)
}

fn pick<'a>(rng: &mut StdRng, candidates: &'a [String]) -> &'a String {
    &candidates[rng.gen_range(0..candidates.len())]
}
