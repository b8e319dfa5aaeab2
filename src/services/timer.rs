use time::{Duration, PrimitiveDateTime};

use crate::db::models::Attempt;

pub(crate) fn deadline(started_at: PrimitiveDateTime, duration_seconds: i32) -> PrimitiveDateTime {
    started_at + Duration::seconds(i64::from(duration_seconds))
}

/// Seconds left on a timer that started at `started_at`, clamped to
/// `[0, duration_seconds]`. Only server time is ever used here.
pub(crate) fn remaining_seconds(
    started_at: PrimitiveDateTime,
    duration_seconds: i32,
    now: PrimitiveDateTime,
) -> i64 {
    let duration = i64::from(duration_seconds.max(0));
    let elapsed = (now - started_at).whole_seconds();
    (duration - elapsed).clamp(0, duration)
}

pub(crate) fn is_expired(attempt: &Attempt, now: PrimitiveDateTime) -> bool {
    now >= deadline(attempt.started_at, attempt.duration_seconds)
}

/// Remaining time as reported to clients; closed attempts have none left.
pub(crate) fn remaining_for(attempt: &Attempt, now: PrimitiveDateTime) -> i64 {
    if attempt.state.is_terminal() {
        return 0;
    }
    remaining_seconds(attempt.started_at, attempt.duration_seconds, now)
}

pub(crate) fn seconds_used(attempt: &Attempt, finished_at: PrimitiveDateTime) -> f64 {
    let used = (finished_at - attempt.started_at).as_seconds_f64();
    used.clamp(0.0, f64::from(attempt.duration_seconds.max(0)))
}
