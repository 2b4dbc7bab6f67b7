use std::time::Duration;

use chrono::TimeDelta;

use crate::TidemarkError;
use crate::types::TimeRange;
use tidemark_types::RangeMode;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Split `range` into contiguous sub-ranges each expected to hold at most
/// `max_rows` rows when rows arrive every `step`.
///
/// - Rows in range are `ceil(duration / step)`. At or below the cap the
///   original range is returned unchanged.
/// - Otherwise each chunk spans `floor(step * max_rows)` whole seconds and the
///   final chunk is clamped to the range end.
///
/// Consecutive sub-ranges share their boundary instant (`a.end == b.start`);
/// none is empty or reversed.
///
/// # Errors
/// Returns `InvalidArg` if `step` is zero, `max_rows` is zero, or the chunk
/// rounds down to less than one second.
pub fn partition(
    range: &TimeRange,
    step: Duration,
    max_rows: u32,
) -> Result<Vec<TimeRange>, TidemarkError> {
    if step.is_zero() {
        return Err(TidemarkError::InvalidArg("step must be positive".into()));
    }
    if max_rows == 0 {
        return Err(TidemarkError::InvalidArg(
            "max rows per request must be positive".into(),
        ));
    }

    let total = delta_nanos(range.duration());
    let step_ns = i128::try_from(step.as_nanos())
        .map_err(|_| TidemarkError::InvalidArg("step out of range".into()))?;
    let rows = (total + step_ns - 1) / step_ns;
    if rows <= i128::from(max_rows) {
        return Ok(vec![*range]);
    }

    let chunk_secs = step_ns.saturating_mul(i128::from(max_rows)) / NANOS_PER_SEC;
    if chunk_secs == 0 {
        return Err(TidemarkError::InvalidArg(format!(
            "chunk of {max_rows} rows at {step:?} is shorter than one second"
        )));
    }
    // rows > max_rows, so the chunk is shorter than the range and fits in i64
    let chunk = TimeDelta::seconds(i64::try_from(chunk_secs).unwrap_or(i64::MAX));

    let end = range.end();
    let mut out = Vec::new();
    let mut cursor = range.start();
    while cursor < end {
        let next = cursor.checked_add_signed(chunk).unwrap_or(end);
        let stop = if next >= end { end } else { next };
        out.push(TimeRange::new(cursor, stop)?);
        cursor = stop;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(range = %range, parts = out.len(), chunk_secs = %chunk_secs, "partitioned range");

    Ok(out)
}

/// Partition for uniform resampling at `interval`.
///
/// # Errors
/// See [`partition`].
pub fn partition_on_interval(
    range: &TimeRange,
    interval: Duration,
    max_rows: u32,
) -> Result<Vec<TimeRange>, TidemarkError> {
    partition(range, interval, max_rows)
}

/// Partition for as-recorded retrieval with an estimated `scan_rate`.
///
/// # Errors
/// See [`partition`].
pub fn partition_on_scan_rate(
    range: &TimeRange,
    scan_rate: Duration,
    max_rows: u32,
) -> Result<Vec<TimeRange>, TidemarkError> {
    partition(range, scan_rate, max_rows)
}

/// Partition using the step implied by `mode`.
///
/// # Errors
/// See [`partition`].
pub fn partition_for(
    range: &TimeRange,
    mode: &RangeMode,
    max_rows: u32,
) -> Result<Vec<TimeRange>, TidemarkError> {
    match mode {
        RangeMode::Interpolated { interval } => partition_on_interval(range, *interval, max_rows),
        RangeMode::Recorded { scan_rate } => partition_on_scan_rate(range, *scan_rate, max_rows),
        other => partition(range, other.step(), max_rows),
    }
}

fn delta_nanos(d: TimeDelta) -> i128 {
    i128::from(d.num_seconds()) * NANOS_PER_SEC + i128::from(d.subsec_nanos())
}
