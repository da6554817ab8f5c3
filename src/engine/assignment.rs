use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::bus::BusEvent;
use crate::engine::pool;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::notification::Notification;
use crate::models::order::{Order, OrderStatus};
use crate::models::Role;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct AssignRequest {
    pub order_id: Uuid,
    pub driver_id: Option<Uuid>,
}

/// Single-order assignment. With an explicit driver, only the active-location
/// check applies; without one, the first candidate from the auto-assign pool
/// wins. Distance-based ranking is a future extension point.
pub fn assign_driver(
    state: &AppState,
    actor_id: Uuid,
    actor_role: Role,
    req: AssignRequest,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let order = state
        .store
        .orders
        .get(&req.order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", req.order_id)))?;

    match actor_role {
        Role::Admin => {}
        Role::Vendor if order.vendor_id == actor_id => {}
        Role::Vendor => {
            return Err(AppError::Forbidden("vendor does not own this order".to_string()));
        }
        _ => {
            return Err(AppError::Forbidden(
                "only admins and vendors can assign drivers".to_string(),
            ));
        }
    }

    if !order.status.is_assignable() {
        return Err(AppError::Validation(format!(
            "order in status {:?} cannot be assigned",
            order.status
        )));
    }

    let driver = match req.driver_id {
        Some(driver_id) => {
            let driver = state
                .store
                .drivers
                .get(&driver_id)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
            if !driver.has_active_location() {
                return Err(AppError::Validation(
                    "driver has no active location".to_string(),
                ));
            }
            driver
        }
        None => pool::auto_assign_candidates(
            &state.store,
            now,
            state.settings.location_freshness,
            state.settings.auto_assign_candidate_limit,
        )
        .into_iter()
        .next()
        .ok_or(AppError::NoAvailableDrivers)?,
    };

    Ok(commit_assignment(state, order, &driver, now))
}

/// Driver self-accept of an available job.
pub fn accept_delivery(
    state: &AppState,
    driver_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let order = state
        .store
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.driver_id == Some(driver_id) {
        return Err(AppError::Conflict("delivery already accepted".to_string()));
    }
    if order.driver_id.is_some() {
        return Err(AppError::Validation(
            "order is already assigned to another driver".to_string(),
        ));
    }
    if order.status != OrderStatus::Ready {
        return Err(AppError::Validation(format!(
            "order in status {:?} is not ready for pickup",
            order.status
        )));
    }

    let driver = state
        .store
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))?;

    Ok(commit_assignment(state, order, &driver, now))
}

/// Binds the order to the driver, notifies both sides, and publishes the
/// assignment event.
fn commit_assignment(state: &AppState, mut order: Order, driver: &Driver, now: DateTime<Utc>) -> Order {
    order.driver_id = Some(driver.id);
    order.status = OrderStatus::Assigned;
    order.assigned_at = Some(now);
    state.store.orders.insert(order.id, order.clone());

    state.publish(BusEvent::OrderAssigned {
        order: order.clone(),
        driver_id: driver.id,
    });

    notify(
        state,
        driver.id,
        Some(order.id),
        "New Delivery Assignment",
        &format!("You have been assigned order {}", order.id),
        now,
    );
    notify(
        state,
        order.customer_id,
        Some(order.id),
        "Driver Assigned",
        &format!("{} is delivering your order", driver.name),
        now,
    );

    info!(order_id = %order.id, driver_id = %driver.id, "order assigned");
    order
}

pub fn notify(
    state: &AppState,
    recipient_id: Uuid,
    order_id: Option<Uuid>,
    title: &str,
    body: &str,
    now: DateTime<Utc>,
) {
    let notification = Notification {
        id: Uuid::new_v4(),
        recipient_id,
        order_id,
        title: title.to_string(),
        body: body.to_string(),
        created_at: now,
    };
    state
        .store
        .notifications
        .insert(notification.id, notification.clone());
    state.publish(BusEvent::NotificationSent { notification });
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{accept_delivery, assign_driver, AssignRequest};
    use crate::config::Settings;
    use crate::error::AppError;
    use crate::models::driver::{Driver, DriverLocation, GeoPoint, LocationStatus};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::Role;
    use crate::state::AppState;

    fn state() -> AppState {
        AppState::new(Settings::default())
    }

    fn seed_driver(state: &AppState, age: Duration, is_active: bool) -> Uuid {
        let driver = Driver {
            id: Uuid::new_v4(),
            name: "Dispatch Dan".to_string(),
            location: Some(DriverLocation {
                point: GeoPoint { lat: 52.52, lng: 13.405 },
                heading: None,
                speed: None,
                accuracy: None,
                is_active,
                status: LocationStatus::Online,
                updated_at: Utc::now() - age,
            }),
        };
        let id = driver.id;
        state.store.drivers.insert(id, driver);
        id
    }

    fn seed_order(state: &AppState, vendor_id: Uuid, status: OrderStatus) -> Uuid {
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            vendor_id,
            store_id: Uuid::new_v4(),
            driver_id: None,
            status,
            dropoff: GeoPoint { lat: 52.5, lng: 13.4 },
            address: "Friedrichstr. 43".to_string(),
            created_at: Utc::now(),
            assigned_at: None,
        };
        let id = order.id;
        state.store.orders.insert(id, order);
        id
    }

    fn assign(state: &AppState, role: Role, actor: Uuid, order_id: Uuid, driver_id: Option<Uuid>) -> Result<Order, AppError> {
        assign_driver(
            state,
            actor,
            role,
            AssignRequest { order_id, driver_id },
            Utc::now(),
        )
    }

    #[test]
    fn auto_assign_with_no_drivers_fails() {
        let state = state();
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        let err = assign(&state, Role::Admin, Uuid::new_v4(), order_id, None).unwrap_err();
        assert!(matches!(err, AppError::NoAvailableDrivers));
    }

    #[test]
    fn auto_assign_binds_order_and_notifies_both_sides() {
        let state = state();
        let driver_id = seed_driver(&state, Duration::minutes(1), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        let order = assign(&state, Role::Admin, Uuid::new_v4(), order_id, None).unwrap();
        assert_eq!(order.status, OrderStatus::Assigned);
        assert_eq!(order.driver_id, Some(driver_id));
        assert!(order.assigned_at.is_some());

        let stored = state.store.orders.get(&order_id).unwrap().value().clone();
        assert_eq!(stored.driver_id, Some(driver_id));

        let recipients: Vec<Uuid> = state
            .store
            .notifications
            .iter()
            .map(|entry| entry.value().recipient_id)
            .collect();
        assert_eq!(recipients.len(), 2);
        assert!(recipients.contains(&driver_id));
        assert!(recipients.contains(&stored.customer_id));
    }

    #[test]
    fn stale_drivers_are_not_auto_assigned() {
        let state = state();
        seed_driver(&state, Duration::minutes(20), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        let err = assign(&state, Role::Admin, Uuid::new_v4(), order_id, None).unwrap_err();
        assert!(matches!(err, AppError::NoAvailableDrivers));
    }

    #[test]
    fn explicit_driver_skips_freshness_but_not_active_check() {
        let state = state();
        // stale but active: allowed when named explicitly
        let stale = seed_driver(&state, Duration::minutes(45), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        let order = assign(&state, Role::Admin, Uuid::new_v4(), order_id, Some(stale)).unwrap();
        assert_eq!(order.driver_id, Some(stale));

        // inactive location: rejected even when named explicitly
        let inactive = seed_driver(&state, Duration::minutes(1), false);
        let other = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);
        let err = assign(&state, Role::Admin, Uuid::new_v4(), other, Some(inactive)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn explicit_unknown_driver_is_not_found() {
        let state = state();
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);
        let err =
            assign(&state, Role::Admin, Uuid::new_v4(), order_id, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn reassignment_of_assigned_order_is_permitted() {
        let state = state();
        let first = seed_driver(&state, Duration::minutes(1), true);
        let second = seed_driver(&state, Duration::minutes(1), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        assign(&state, Role::Admin, Uuid::new_v4(), order_id, Some(first)).unwrap();
        let order = assign(&state, Role::Admin, Uuid::new_v4(), order_id, Some(second)).unwrap();
        assert_eq!(order.driver_id, Some(second));
        assert_eq!(order.status, OrderStatus::Assigned);
    }

    #[test]
    fn unassignable_status_is_rejected() {
        let state = state();
        seed_driver(&state, Duration::minutes(1), true);
        for status in [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Delivered] {
            let order_id = seed_order(&state, Uuid::new_v4(), status);
            let err = assign(&state, Role::Admin, Uuid::new_v4(), order_id, None).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{status:?}");
        }
    }

    #[test]
    fn vendor_can_only_assign_own_orders() {
        let state = state();
        let vendor = Uuid::new_v4();
        seed_driver(&state, Duration::minutes(1), true);
        let own = seed_order(&state, vendor, OrderStatus::Ready);
        let foreign = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        assert!(assign(&state, Role::Vendor, vendor, own, None).is_ok());
        let err = assign(&state, Role::Vendor, vendor, foreign, None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn drivers_and_customers_cannot_assign() {
        let state = state();
        seed_driver(&state, Duration::minutes(1), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);

        for role in [Role::Driver, Role::Customer] {
            let err = assign(&state, role, Uuid::new_v4(), order_id, None).unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)), "{role:?}");
        }
    }

    #[test]
    fn accept_requires_ready_and_unassigned() {
        let state = state();
        let driver_id = seed_driver(&state, Duration::minutes(1), true);

        let pending = seed_order(&state, Uuid::new_v4(), OrderStatus::Pending);
        let err = accept_delivery(&state, driver_id, pending, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let ready = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);
        let order = accept_delivery(&state, driver_id, ready, Utc::now()).unwrap();
        assert_eq!(order.driver_id, Some(driver_id));
        assert_eq!(order.status, OrderStatus::Assigned);

        // accepting twice is a conflict
        let err = accept_delivery(&state, driver_id, ready, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // another driver accepting the same order is rejected
        let rival = seed_driver(&state, Duration::minutes(1), true);
        let err = accept_delivery(&state, rival, ready, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn assignment_publishes_order_assigned_event() {
        let state = state();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.bus.on(crate::bus::EventKind::OrderAssigned, move |event| {
            if let crate::bus::BusEvent::OrderAssigned { driver_id, .. } = event {
                sink.lock().unwrap().push(*driver_id);
            }
        });

        let driver_id = seed_driver(&state, Duration::minutes(1), true);
        let order_id = seed_order(&state, Uuid::new_v4(), OrderStatus::Ready);
        assign(&state, Role::Admin, Uuid::new_v4(), order_id, None).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![driver_id]);
    }
}
