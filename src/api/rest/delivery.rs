use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::api::rest::ok;
use crate::engine::assignment::{assign_driver, AssignRequest};
use crate::engine::batch::{plan_batch, BatchItem, OptimizationStrategy};
use crate::error::AppError;
use crate::models::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/delivery/assign-nearest-driver", post(assign_nearest_driver))
        .route("/delivery/batch-optimize", post(batch_optimize))
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub order_id: Uuid,
    pub driver_id: Option<Uuid>,
}

async fn assign_nearest_driver(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Value>, AppError> {
    let result = assign_driver(
        &state,
        auth.user_id,
        auth.role,
        AssignRequest {
            order_id: payload.order_id,
            driver_id: payload.driver_id,
        },
        Utc::now(),
    );

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    let order = result?;
    let driver_id = order.driver_id;
    Ok(ok(json!({
        "order": order,
        "driver_id": driver_id,
        "message": "driver assigned",
    })))
}

#[derive(Deserialize)]
pub struct BatchOptimizeRequest {
    pub orders: Vec<BatchItem>,
    #[serde(default)]
    pub optimization_strategy: OptimizationStrategy,
}

async fn batch_optimize(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<BatchOptimizeRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_role(&[Role::Admin, Role::Driver])?;

    let plan = plan_batch(&state.store, &payload.orders, payload.optimization_strategy)?;
    state.metrics.batch_plans_total.inc();

    Ok(ok(plan))
}
