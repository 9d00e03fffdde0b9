use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds since the unix epoch
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(i64::MAX as u128) as i64
}

// Signed distance between two clocks, in milliseconds
pub fn clock_drift(local: i64, remote: i64) -> i64 {
    local.saturating_sub(remote)
}

// Elapsed time since a marker, or -1 if the marker was never set
pub fn elapsed_since(now: i64, marker: i64) -> i64 {
    if marker < 0 {
        return -1;
    }
    now.saturating_sub(marker).max(-1)
}
