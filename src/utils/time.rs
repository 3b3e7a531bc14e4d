use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::Rng;

pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// return millisecond
pub fn get_now_as_millis() -> i64 {
    get_duration_since_epoch().as_millis() as i64
}

/// Uniformly random duration in `[min, max]`. Returns `min` when the range is empty.
pub fn jittered(
    min: Duration,
    max: Duration,
) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
}

/// `Duration::ZERO` means unlimited
pub fn as_deadline(timeout: Duration) -> Option<tokio::time::Instant> {
    if timeout.is_zero() {
        None
    } else {
        Some(tokio::time::Instant::now() + timeout)
    }
}
