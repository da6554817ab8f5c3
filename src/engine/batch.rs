use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::pool;
use crate::error::AppError;
use crate::models::order::Order;
use crate::state::Store;

const MINUTES_PER_ORDER: i64 = 7;
const KM_PER_ORDER: f64 = 2.5;

/// Recorded on the plan as metadata; the planner currently runs the same
/// algorithm regardless of strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationStrategy {
    Distance,
    Time,
    #[default]
    Balanced,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatchItem {
    pub order_id: Uuid,
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverRoute {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub order_ids: Vec<Uuid>,
    pub optimized_sequence: Vec<Uuid>,
    pub total_distance_km: f64,
    pub estimated_time_minutes: i64,
    pub orders_count: usize,
    pub current_workload: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPlan {
    pub routes: Vec<DriverRoute>,
    pub total_orders: usize,
    pub total_drivers: usize,
    pub optimization_strategy: OptimizationStrategy,
}

/// Computes a proposed multi-order route set. This is a dry run: nothing is
/// written to the store and no events are published; committing a plan is a
/// separate step.
///
/// Pre-bound orders go straight to their driver. The rest are dealt
/// round-robin across the candidate pool sorted ascending by current
/// workload, then each driver's set is sequenced oldest-first. Distance and
/// time are flat per-order estimates, not routed geometry.
pub fn plan_batch(
    store: &Store,
    items: &[BatchItem],
    strategy: OptimizationStrategy,
) -> Result<BatchPlan, AppError> {
    if items.is_empty() {
        return Err(AppError::Validation("batch contains no orders".to_string()));
    }

    // whole-batch validation: any bad order aborts the plan
    let mut orders: Vec<(Order, Option<Uuid>)> = Vec::with_capacity(items.len());
    for item in items {
        let order = store
            .orders
            .get(&item.order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::Validation(format!("order {} not found", item.order_id)))?;
        if !order.status.is_assignable() {
            return Err(AppError::Validation(format!(
                "order {} in status {:?} cannot be planned",
                order.id, order.status
            )));
        }
        if let Some(driver_id) = item.driver_id {
            if !store.drivers.contains_key(&driver_id) {
                return Err(AppError::Validation(format!("driver {driver_id} not found")));
            }
        }
        orders.push((order, item.driver_id));
    }

    let mut candidates = pool::batch_candidates(store);
    if candidates.is_empty() {
        return Err(AppError::NoAvailableDrivers);
    }

    let workloads: HashMap<Uuid, usize> = candidates
        .iter()
        .map(|driver| (driver.id, pool::active_order_count(store, driver.id)))
        .collect();
    candidates.sort_by_key(|driver| workloads[&driver.id]);

    let mut buckets: HashMap<Uuid, Vec<Order>> = HashMap::new();
    let mut route_order: Vec<Uuid> = Vec::new();
    let mut push = |buckets: &mut HashMap<Uuid, Vec<Order>>,
                    route_order: &mut Vec<Uuid>,
                    driver_id: Uuid,
                    order: Order| {
        if !buckets.contains_key(&driver_id) {
            route_order.push(driver_id);
        }
        buckets.entry(driver_id).or_default().push(order);
    };

    let mut unassigned: Vec<Order> = Vec::new();
    for (order, bound) in orders {
        match bound {
            Some(driver_id) => push(&mut buckets, &mut route_order, driver_id, order),
            None => unassigned.push(order),
        }
    }

    // least-busy drivers take from the rotation first, input order preserved
    for (index, order) in unassigned.into_iter().enumerate() {
        let driver_id = candidates[index % candidates.len()].id;
        push(&mut buckets, &mut route_order, driver_id, order);
    }

    let total_orders = items.len();
    let routes: Vec<DriverRoute> = route_order
        .into_iter()
        .map(|driver_id| {
            let orders = buckets.remove(&driver_id).unwrap_or_default();
            let order_ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
            let mut sequenced = orders;
            sequenced.sort_by_key(|order| order.created_at);
            let optimized_sequence: Vec<Uuid> =
                sequenced.iter().map(|order| order.id).collect();

            let driver_name = store
                .drivers
                .get(&driver_id)
                .map(|entry| entry.value().name.clone())
                .unwrap_or_default();
            let current_workload = workloads
                .get(&driver_id)
                .copied()
                .unwrap_or_else(|| pool::active_order_count(store, driver_id));

            let orders_count = order_ids.len();
            DriverRoute {
                driver_id,
                driver_name,
                order_ids,
                optimized_sequence,
                total_distance_km: orders_count as f64 * KM_PER_ORDER,
                estimated_time_minutes: orders_count as i64 * MINUTES_PER_ORDER,
                orders_count,
                current_workload,
            }
        })
        .collect();

    Ok(BatchPlan {
        total_drivers: routes.len(),
        routes,
        total_orders,
        optimization_strategy: strategy,
    })
}
