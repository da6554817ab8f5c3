use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::api::rest::ok;
use crate::bus::BusEvent;
use crate::engine::assignment::accept_delivery;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverLocation, GeoPoint, LocationStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/location", patch(update_location))
        .route(
            "/drivers/deliveries",
            get(list_deliveries).post(accept_delivery_handler),
        )
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub user_id: Option<Uuid>,
    pub name: String,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Admin])?;

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let driver = Driver {
        id: payload.user_id.unwrap_or_else(Uuid::new_v4),
        name: payload.name,
        location: None,
    };
    if state.store.drivers.contains_key(&driver.id) {
        return Err(AppError::Conflict(format!(
            "driver {} already registered",
            driver.id
        )));
    }

    state.store.drivers.insert(driver.id, driver.clone());
    Ok(ok(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Admin])?;

    let drivers: Vec<Driver> = state
        .store
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Ok(ok(drivers))
}

#[derive(Deserialize)]
pub struct LocationPing {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub status: LocationStatus,
    pub order_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(ping): Json<LocationPing>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Driver])?;

    let location = DriverLocation {
        point: GeoPoint {
            lat: ping.lat,
            lng: ping.lng,
        },
        heading: ping.heading,
        speed: ping.speed,
        accuracy: ping.accuracy,
        is_active: ping.is_active,
        status: ping.status,
        updated_at: Utc::now(),
    };

    let driver = {
        let mut driver = state
            .store
            .drivers
            .get_mut(&auth.user_id)
            .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))?;
        driver.location = Some(location.clone());
        driver.clone()
    };

    state.publish(BusEvent::DriverLocationUpdated {
        driver_id: driver.id,
        location,
        order_id: ping.order_id,
    });

    Ok(ok(driver))
}

#[derive(Deserialize)]
pub struct DeliveryListParams {
    #[serde(default)]
    pub available: bool,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<DeliveryListParams>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Driver, Role::Admin])?;

    let mut deliveries: Vec<Order> = state
        .store
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|order| {
            let in_scope = if params.available {
                order.status == OrderStatus::Ready && order.driver_id.is_none()
            } else if auth.is_admin() {
                order.driver_id.is_some()
            } else {
                order.driver_id == Some(auth.user_id)
            };

            in_scope
                && params.status.is_none_or(|status| order.status == status)
                && params.from.is_none_or(|from| order.created_at >= from)
                && params.to.is_none_or(|to| order.created_at <= to)
        })
        .collect();

    if params.available {
        // oldest jobs first
        deliveries.sort_by_key(|order| order.created_at);
    } else {
        deliveries.sort_by_key(|order| std::cmp::Reverse(order.created_at));
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let total = deliveries.len();
    let total_pages = total.div_ceil(limit);
    let page_items: Vec<Order> = deliveries
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(ok(json!({
        "deliveries": page_items,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": total_pages,
        }
    })))
}

#[derive(Deserialize)]
pub struct AcceptDeliveryRequest {
    pub order_id: Uuid,
}

async fn accept_delivery_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<AcceptDeliveryRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Driver])?;

    let order = accept_delivery(&state, auth.user_id, payload.order_id, Utc::now())?;
    Ok(ok(json!({ "order": order })))
}
