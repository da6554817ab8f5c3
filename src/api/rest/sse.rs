use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::bus::BusEvent;
use crate::channel::{self, filters, ChannelGuard, ConnectionContext, Viewer};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NotificationStreamParams {
    pub role: Option<crate::models::Role>,
}

/// Role-scoped notification stream. All auth and validation happens before
/// the stream opens; once open, problems end the connection instead of
/// changing the HTTP status.
pub async fn notification_stream(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<NotificationStreamParams>,
) -> Result<impl IntoResponse, AppError> {
    let requested = params
        .role
        .ok_or_else(|| AppError::Validation("role query parameter is required".to_string()))?;
    if requested != auth.role && !auth.is_admin() {
        return Err(AppError::Forbidden(
            "requested role does not match authenticated role".to_string(),
        ));
    }

    let viewer = Viewer {
        user_id: auth.user_id,
        role: auth.role,
    };
    let (ctx, rx) = ConnectionContext::open(viewer);
    let guard = ChannelGuard::new(
        Arc::clone(&state.bus),
        Arc::clone(&ctx),
        state.metrics.sse_connections_active.clone(),
    );

    ctx.send(filters::connected_frame(requested));
    channel::subscribe_notifications(&guard, &ctx, requested);

    Ok(stream_response(
        rx,
        guard,
        state.settings.notification_stream_max,
        state.settings.heartbeat_interval,
    ))
}

#[derive(Deserialize)]
pub struct LocationStreamParams {
    pub order_id: Option<Uuid>,
}

/// Order-scoped driver-location stream. If the order already has a driver,
/// the driver's last known location is pushed immediately so the viewer is
/// not blind until the next live ping.
pub async fn driver_location_stream(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<LocationStreamParams>,
) -> Result<impl IntoResponse, AppError> {
    let order_id = params
        .order_id
        .ok_or_else(|| AppError::Validation("order_id query parameter is required".to_string()))?;
    let order = state
        .store
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
    if !auth.is_admin() && !order.is_participant(auth.user_id) {
        return Err(AppError::Forbidden("not a participant of this order".to_string()));
    }

    let viewer = Viewer {
        user_id: auth.user_id,
        role: auth.role,
    };
    let (ctx, rx) = ConnectionContext::open(viewer);
    let guard = ChannelGuard::new(
        Arc::clone(&state.bus),
        Arc::clone(&ctx),
        state.metrics.sse_connections_active.clone(),
    );

    ctx.send(filters::order_connected_frame(order_id));
    if let Some(driver_id) = order.driver_id {
        let location = state
            .store
            .drivers
            .get(&driver_id)
            .and_then(|entry| entry.value().location.clone());
        if let Some(location) = location {
            ctx.send(filters::event_frame(&BusEvent::DriverLocationUpdated {
                driver_id,
                location,
                order_id: Some(order_id),
            }));
        }
    }
    channel::subscribe_order_location(&guard, &ctx, &state.store, order_id);

    Ok(stream_response(
        rx,
        guard,
        state.settings.tracking_stream_max,
        state.settings.heartbeat_interval,
    ))
}

/// Wraps the frame queue into an SSE response: one `data:` event per frame,
/// comment heartbeats on the keep-alive interval, and a hard lifetime after
/// which the stream ends. Dropping the stream (client abort, timeout, write
/// failure) drops the guard, which unregisters every listener.
fn stream_response(
    rx: mpsc::UnboundedReceiver<Value>,
    guard: ChannelGuard,
    max_lifetime: Duration,
    heartbeat: Duration,
) -> impl IntoResponse {
    let frames = UnboundedReceiverStream::new(rx)
        .take_until(tokio::time::sleep(max_lifetime))
        .map(move |frame| {
            let _open = &guard;
            Ok::<SseEvent, Infallible>(SseEvent::default().data(frame.to_string()))
        });

    (
        [
            ("cache-control", "no-cache, no-transform"),
            ("x-accel-buffering", "no"),
        ],
        Sse::new(frames).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat")),
    )
}
