pub mod health;
pub mod update_check;

pub const MIN_INTERVAL_SECS: u64 = 60;
pub const MAX_INTERVAL_SECS: u64 = 7200;

/// Loop intervals, configured or server-tuned, stay within [60, 7200] seconds.
pub fn clamp_interval(secs: u64) -> u64 {
    secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS)
}
