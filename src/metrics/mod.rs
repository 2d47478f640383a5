pub mod aggregate;
pub mod rate;

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Same instant expressed in milliseconds, the unit charts plot time in.
pub fn epoch_millis(secs: f64) -> f64 {
    secs * 1000.0
}
