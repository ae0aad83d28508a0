use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time utilization estimate for the persistent store.
///
/// `used_bytes` sums `key.len() + value.len()` over every entry (a proxy, not
/// a measured footprint). `total_capacity_estimate` is the fixed constant the
/// facade was configured with; the underlying store exposes no real quota API.
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub total_capacity_estimate: usize,
    pub used_bytes: usize,
    pub available_bytes: usize,
    pub percentage_used: f64,
    pub captured_at: DateTime<Utc>,
}
