use time::{Duration, OffsetDateTime, UtcOffset};

use crate::{
    generate_events, truncate_to_second, EventStore, FetchQuery, GeneratorRequest,
    ObservatoryError,
};

/// Outcome of one [`generate_and_persist`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub run_id: String,
    pub requested_start: OffsetDateTime,
    pub effective_start: OffsetDateTime,
    pub inserted: usize,
}

/// Picks the first timestamp for a new batch so it lands strictly after the
/// newest stored event.
///
/// Both timestamps are truncated to whole seconds before comparison. When the
/// requested start is not after the latest stored timestamp the batch starts
/// one `step` past the truncated latest, plus as many further steps as a
/// sub-second `step` needs to clear the untruncated latest. The returned
/// value is exactly the first timestamp [`generate_events`] will emit.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] for a non-positive `step` or a
/// timestamp overflow.
pub fn choose_effective_start(
    latest: Option<OffsetDateTime>,
    requested: OffsetDateTime,
    step: Duration,
) -> Result<OffsetDateTime, ObservatoryError> {
    if step <= Duration::ZERO {
        return Err(ObservatoryError::InvalidInput(
            "step MUST be a positive duration".to_string(),
        ));
    }

    let requested = truncate_to_second(requested.to_offset(UtcOffset::UTC));
    let Some(latest) = latest.map(|value| value.to_offset(UtcOffset::UTC)) else {
        return Ok(requested);
    };
    let latest_second = truncate_to_second(latest);

    if requested > latest_second {
        return Ok(requested);
    }

    let overflow =
        || ObservatoryError::InvalidInput("effective start timestamp overflowed".to_string());
    let steps = (latest - latest_second).whole_nanoseconds() / step.whole_nanoseconds() + 1;
    let offset = i64::try_from(step.whole_nanoseconds() * steps).map_err(|_| overflow())?;
    latest_second
        .checked_add(Duration::nanoseconds(offset))
        .ok_or_else(overflow)
}

/// Generates a batch after the newest stored event and appends it.
///
/// # Errors
/// Propagates generator validation failures and store failures. Nothing is
/// appended when generation fails.
pub fn generate_and_persist<S>(
    store: &mut S,
    request: &GeneratorRequest,
) -> Result<GenerationReport, ObservatoryError>
where
    S: EventStore + ?Sized,
{
    let latest = store
        .fetch(&FetchQuery::latest(1))?
        .into_iter()
        .next()
        .map(|event| event.event_ts);
    let effective_start = choose_effective_start(latest, request.start_ts, request.step)?;

    let effective = GeneratorRequest {
        start_ts: effective_start,
        ..request.clone()
    };
    let events = generate_events(&effective)?;
    let inserted = store.append(&events)?;

    tracing::info!(
        run_id = %request.run_id,
        inserted,
        shifted = effective_start != truncate_to_second(request.start_ts),
        "persisted generated batch"
    );

    Ok(GenerationReport {
        run_id: request.run_id.clone(),
        requested_start: request.start_ts.to_offset(UtcOffset::UTC),
        effective_start,
        inserted,
    })
}

/// Default run identifier, `run-YYYYMMDD-HHMMSS` in UTC.
#[must_use]
pub fn default_run_id(now: OffsetDateTime) -> String {
    let now = now.to_offset(UtcOffset::UTC);
    format!(
        "run-{:04}{:02}{:02}-{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
