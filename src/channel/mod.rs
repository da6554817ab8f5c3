pub mod filters;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use prometheus::IntGauge;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus, EventKind, ListenerId};
use crate::models::Role;
use crate::state::Store;

/// Identity of the client on the other end of a streaming connection.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub user_id: Uuid,
    pub role: Role,
}

/// Per-connection state shared between the bus handlers and the stream.
/// Handlers hold an `Arc` to it; the closed flag is checked before every
/// send so an emit racing a teardown never reaches a dead transport.
pub struct ConnectionContext {
    pub viewer: Viewer,
    closed: AtomicBool,
    tx: mpsc::UnboundedSender<Value>,
}

impl ConnectionContext {
    pub fn open(viewer: Viewer) -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                viewer,
                closed: AtomicBool::new(false),
                tx,
            }),
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue a frame for the client. Frames offered after close are dropped;
    /// a failed send (receiver gone) marks the connection closed instead of
    /// propagating.
    pub fn send(&self, frame: Value) {
        if self.is_closed() {
            return;
        }
        if self.tx.send(frame).is_err() {
            debug!(user_id = %self.viewer.user_id, "send on closed stream, marking connection closed");
            self.close();
        }
    }

    /// Idempotent: returns true only for the call that actually closed.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

/// Owns every bus registration a connection made. Releasing (explicitly or
/// on drop) unregisters each listener exactly once, so no teardown path can
/// leak subscriptions.
pub struct ChannelGuard {
    bus: Arc<EventBus>,
    ctx: Arc<ConnectionContext>,
    registrations: Mutex<Vec<(EventKind, ListenerId)>>,
    open_connections: IntGauge,
}

impl ChannelGuard {
    pub fn new(bus: Arc<EventBus>, ctx: Arc<ConnectionContext>, open_connections: IntGauge) -> Self {
        open_connections.inc();
        Self {
            bus,
            ctx,
            registrations: Mutex::new(Vec::new()),
            open_connections,
        }
    }

    pub fn register<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.bus.on(kind, handler);
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((kind, id));
    }

    /// Marks the connection closed and unregisters all listeners. Safe to
    /// call more than once.
    pub fn release(&self) {
        self.ctx.close();
        let drained: Vec<(EventKind, ListenerId)> = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for (kind, id) in drained {
            self.bus.off(kind, id);
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.release();
        self.open_connections.dec();
    }
}

/// Registers the notification listener set for `listener_role`. The viewer's
/// own role stays on the context so the admin bypass in the predicates still
/// applies when an admin watches another role's feed.
pub fn subscribe_notifications(
    guard: &ChannelGuard,
    ctx: &Arc<ConnectionContext>,
    listener_role: Role,
) {
    match listener_role {
        Role::Vendor => {
            register_filtered(guard, ctx, EventKind::OrderCreated, filters::vendor_wants);
            register_filtered(guard, ctx, EventKind::OrderUpdated, filters::vendor_wants);
        }
        Role::Driver => {
            register_filtered(guard, ctx, EventKind::OrderUpdated, filters::driver_wants);
            register_filtered(guard, ctx, EventKind::OrderAssigned, filters::driver_wants);
        }
        Role::Customer => {
            register_filtered(guard, ctx, EventKind::OrderUpdated, filters::customer_wants);
            register_filtered(guard, ctx, EventKind::NotificationSent, filters::customer_wants);
        }
        Role::Admin => {
            for kind in [
                EventKind::OrderCreated,
                EventKind::OrderUpdated,
                EventKind::OrderAssigned,
                EventKind::NotificationSent,
            ] {
                register_filtered(guard, ctx, kind, |_, _| true);
            }
        }
    }
}

/// Order-scoped location feed.
pub fn subscribe_order_location(
    guard: &ChannelGuard,
    ctx: &Arc<ConnectionContext>,
    store: &Arc<Store>,
    order_id: Uuid,
) {
    let ctx = Arc::clone(ctx);
    let store = Arc::clone(store);
    guard.register(EventKind::DriverLocationUpdated, move |event| {
        if filters::location_wants(&store, order_id, event) {
            ctx.send(filters::event_frame(event));
        }
    });
}

fn register_filtered<F>(
    guard: &ChannelGuard,
    ctx: &Arc<ConnectionContext>,
    kind: EventKind,
    wants: F,
) where
    F: Fn(&Viewer, &BusEvent) -> bool + Send + Sync + 'static,
{
    let ctx = Arc::clone(ctx);
    guard.register(kind, move |event| {
        if wants(&ctx.viewer, event) {
            ctx.send(filters::event_frame(event));
        }
    });
}
