//! Wall-clock helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    to_ms(SystemTime::now())
}

/// Milliseconds since the Unix epoch for `t` (zero for instants before the epoch).
#[must_use]
pub fn to_ms(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Round a timestamp to the nearest millisecond.
///
/// Start times are stored at millisecond precision so that a persisted task
/// snapshot decodes back to exactly the same value.
#[must_use]
pub fn round_to_millis(t: SystemTime) -> SystemTime {
    let Ok(since_epoch) = t.duration_since(UNIX_EPOCH) else {
        return t;
    };
    let nanos = since_epoch.as_nanos();
    let rounded = (nanos + 500_000) / 1_000_000;
    let millis = u64::try_from(rounded).unwrap_or(u64::MAX);
    UNIX_EPOCH + Duration::from_millis(millis)
}
