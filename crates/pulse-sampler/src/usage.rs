//! Percentage helpers.

/// `used / total` as a percentage in `0..=100`. A zero total reads as 0.
pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Combined usage of several volumes given `(total, available)` pairs.
pub fn disk_usage(volumes: impl IntoIterator<Item = (u64, u64)>) -> f64 {
    let (total, available) = volumes
        .into_iter()
        .fold((0u64, 0u64), |(total, available), (t, a)| {
            (total.saturating_add(t), available.saturating_add(a.min(t)))
        });
    percent(total - available, total)
}

/// Normalise a raw CPU reading, which can be NaN before the first refresh.
pub fn cpu_percent(raw: f32) -> f64 {
    if raw.is_finite() {
        f64::from(raw).clamp(0.0, 100.0)
    } else {
        0.0
    }
}
