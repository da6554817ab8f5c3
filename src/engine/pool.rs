use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::driver::{Driver, LocationStatus};
use crate::state::Store;

/// Orders currently in active delivery for this driver.
pub fn active_order_count(store: &Store, driver_id: Uuid) -> usize {
    store
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.driver_id == Some(driver_id) && order.status.is_active_delivery()
        })
        .count()
}

/// Candidate pool for single-order auto-assignment: active location, online,
/// fresh within the window, and idle (zero active deliveries). Capped at
/// `limit` candidates.
pub fn auto_assign_candidates(
    store: &Store,
    now: DateTime<Utc>,
    freshness: chrono::Duration,
    limit: usize,
) -> Vec<Driver> {
    store
        .drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            let location = driver.location.as_ref()?;
            let eligible = location.is_active
                && location.status == LocationStatus::Online
                && now.signed_duration_since(location.updated_at) <= freshness
                && active_order_count(store, driver.id) == 0;
            eligible.then(|| driver.clone())
        })
        .take(limit)
        .collect()
}

/// Batch planning pool. Intentionally looser than the single-order path:
/// only the active-location flag is checked, no online or freshness gate.
pub fn batch_candidates(store: &Store) -> Vec<Driver> {
    store
        .drivers
        .iter()
        .filter(|entry| entry.value().has_active_location())
        .map(|entry| entry.value().clone())
        .collect()
}
