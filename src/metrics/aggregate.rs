/// Arithmetic mean of already-normalized quantities (percentages).
/// An empty device set reports zero rather than dividing by zero.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sum for additive quantities (bytes, counts).
pub fn total(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Aggregate memory pressure across devices: `Σused / Σtotal × 100`.
pub fn memory_percent(used: &[u64], total: &[u64]) -> f64 {
    let total: u64 = total.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let used: u64 = used.iter().sum();
    used as f64 / total as f64 * 100.0
}
