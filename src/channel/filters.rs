use serde_json::{json, Value};
use uuid::Uuid;

use crate::bus::BusEvent;
use crate::models::order::OrderStatus;
use crate::models::Role;
use crate::state::Store;

use super::Viewer;

fn is_admin(viewer: &Viewer) -> bool {
    viewer.role == Role::Admin
}

/// Vendor feed: order lifecycle events for the vendor's own orders.
pub fn vendor_wants(viewer: &Viewer, event: &BusEvent) -> bool {
    match event {
        BusEvent::OrderCreated { order } | BusEvent::OrderUpdated { order } => {
            is_admin(viewer) || order.vendor_id == viewer.user_id
        }
        _ => false,
    }
}

/// Driver feed: Ready orders are the "new jobs available" signal and go to
/// every driver; assignment events only to the assigned driver.
pub fn driver_wants(viewer: &Viewer, event: &BusEvent) -> bool {
    match event {
        BusEvent::OrderUpdated { order } => order.status == OrderStatus::Ready,
        BusEvent::OrderAssigned { driver_id, .. } => {
            is_admin(viewer) || *driver_id == viewer.user_id
        }
        _ => false,
    }
}

/// Customer feed: own order updates and own notifications.
pub fn customer_wants(viewer: &Viewer, event: &BusEvent) -> bool {
    match event {
        BusEvent::OrderUpdated { order } => {
            is_admin(viewer) || order.customer_id == viewer.user_id
        }
        BusEvent::NotificationSent { notification } => {
            is_admin(viewer) || notification.recipient_id == viewer.user_id
        }
        _ => false,
    }
}

/// Order-scoped location feed: the order's currently assigned driver is
/// re-read from the store on every event (the assignment can change while
/// the stream is open); an event explicitly tagged with the order id always
/// matches.
pub fn location_wants(store: &Store, order_id: Uuid, event: &BusEvent) -> bool {
    match event {
        BusEvent::DriverLocationUpdated {
            driver_id,
            order_id: tagged,
            ..
        } => {
            if *tagged == Some(order_id) {
                return true;
            }
            store
                .orders
                .get(&order_id)
                .is_some_and(|order| order.driver_id == Some(*driver_id))
        }
        _ => false,
    }
}

pub fn connected_frame(role: Role) -> Value {
    json!({ "type": "connected", "role": role })
}

pub fn order_connected_frame(order_id: Uuid) -> Value {
    json!({ "type": "connected", "order_id": order_id })
}

pub fn event_frame(event: &BusEvent) -> Value {
    match event {
        BusEvent::OrderCreated { order } => json!({ "type": "order_created", "order": order }),
        BusEvent::OrderUpdated { order } => json!({ "type": "order_updated", "order": order }),
        BusEvent::OrderAssigned { order, driver_id } => {
            json!({ "type": "order_assigned", "order": order, "driver_id": driver_id })
        }
        BusEvent::DriverLocationUpdated {
            driver_id,
            location,
            order_id,
        } => json!({
            "type": "location",
            "driver_id": driver_id,
            "location": location,
            "order_id": order_id,
        }),
        BusEvent::NotificationSent { notification } => {
            json!({ "type": "notification_sent", "notification": notification })
        }
    }
}
