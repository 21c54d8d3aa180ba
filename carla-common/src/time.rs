use std::time::SystemTime;

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("closed timelike curve, reality compromised")
        .as_secs()
}

/// Returns the current unix timestamp as floating point seconds, matching the
/// precision episode snapshots carry for `platform_timestamp`.
#[inline]
pub fn timestamp_f64() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("closed timelike curve, reality compromised")
        .as_secs_f64()
}
