use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::api::rest::ok;
use crate::bus::BusEvent;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::{Order, OrderStatus};
use crate::models::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub vendor_id: Uuid,
    pub store_id: Uuid,
    pub dropoff: GeoPoint,
    pub address: String,
    /// Only honored for admin callers placing an order on a customer's behalf.
    pub customer_id: Option<Uuid>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Customer, Role::Admin])?;

    if payload.address.trim().is_empty() {
        return Err(AppError::Validation("address cannot be empty".to_string()));
    }

    let customer_id = if auth.is_admin() {
        payload.customer_id.unwrap_or(auth.user_id)
    } else {
        auth.user_id
    };

    let order = Order {
        id: Uuid::new_v4(),
        customer_id,
        vendor_id: payload.vendor_id,
        store_id: payload.store_id,
        driver_id: None,
        status: OrderStatus::Pending,
        dropoff: payload.dropoff,
        address: payload.address,
        created_at: Utc::now(),
        assigned_at: None,
    };

    state.store.orders.insert(order.id, order.clone());
    state.publish(BusEvent::OrderCreated { order: order.clone() });

    Ok(ok(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = state
        .store
        .orders
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if !auth.is_admin() && !order.is_participant(auth.user_id) {
        return Err(AppError::Forbidden("not a participant of this order".to_string()));
    }

    Ok(ok(order))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state
        .store
        .orders
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    let permitted = match auth.role {
        Role::Admin => true,
        Role::Vendor => {
            order.vendor_id == auth.user_id
                && matches!(
                    payload.status,
                    OrderStatus::Accepted
                        | OrderStatus::Preparing
                        | OrderStatus::Ready
                        | OrderStatus::Cancelled
                )
        }
        Role::Driver => {
            order.driver_id == Some(auth.user_id)
                && matches!(payload.status, OrderStatus::InDelivery | OrderStatus::Delivered)
        }
        Role::Customer => {
            order.customer_id == auth.user_id && payload.status == OrderStatus::Cancelled
        }
    };
    if !permitted {
        return Err(AppError::Forbidden(
            "not allowed to set this order status".to_string(),
        ));
    }

    if payload.status == OrderStatus::Assigned {
        return Err(AppError::Validation(
            "assignment goes through the delivery endpoints".to_string(),
        ));
    }
    if !order.status.can_transition(payload.status) {
        return Err(AppError::Validation(format!(
            "cannot transition from {:?} to {:?}",
            order.status, payload.status
        )));
    }
    if payload.status.requires_driver() && order.driver_id.is_none() {
        return Err(AppError::Validation(
            "order has no driver for a delivery status".to_string(),
        ));
    }

    let mut updated = order;
    updated.status = payload.status;
    if payload.status == OrderStatus::Cancelled {
        // a cancelled order holds no driver
        updated.driver_id = None;
        updated.assigned_at = None;
    }

    state.store.orders.insert(updated.id, updated.clone());
    state.publish(BusEvent::OrderUpdated { order: updated.clone() });

    Ok(ok(updated))
}
