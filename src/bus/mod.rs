use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::models::driver::DriverLocation;
use crate::models::notification::Notification;
use crate::models::order::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreated,
    OrderUpdated,
    OrderAssigned,
    DriverLocationUpdated,
    NotificationSent,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::OrderCreated => "order_created",
            EventKind::OrderUpdated => "order_updated",
            EventKind::OrderAssigned => "order_assigned",
            EventKind::DriverLocationUpdated => "driver_location_updated",
            EventKind::NotificationSent => "notification_sent",
        }
    }
}

/// A domain event as carried through the bus. Events are ephemeral: no
/// sequence numbers, no persistence, delivery is best-effort to whoever is
/// registered at emit time.
#[derive(Debug, Clone)]
pub enum BusEvent {
    OrderCreated {
        order: Order,
    },
    OrderUpdated {
        order: Order,
    },
    OrderAssigned {
        order: Order,
        driver_id: Uuid,
    },
    DriverLocationUpdated {
        driver_id: Uuid,
        location: DriverLocation,
        order_id: Option<Uuid>,
    },
    NotificationSent {
        notification: Notification,
    },
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::OrderCreated { .. } => EventKind::OrderCreated,
            BusEvent::OrderUpdated { .. } => EventKind::OrderUpdated,
            BusEvent::OrderAssigned { .. } => EventKind::OrderAssigned,
            BusEvent::DriverLocationUpdated { .. } => EventKind::DriverLocationUpdated,
            BusEvent::NotificationSent { .. } => EventKind::NotificationSent,
        }
    }
}

pub type ListenerId = u64;

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// In-process publish/subscribe registry. Handlers for a kind run
/// synchronously in registration order; a subscriber that registers after an
/// emit never sees that event. Constructed per `AppState` and passed by
/// reference into channel setup so tests get isolated buses.
pub struct EventBus {
    listeners: DashMap<EventKind, Vec<(ListenerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Silent no-op when the id was never registered or is already gone.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        if let Some(mut entry) = self.listeners.get_mut(&kind) {
            entry.retain(|(registered, _)| *registered != id);
        }
    }

    /// Dispatches to a snapshot of the current listeners, so a handler that
    /// unregisters itself (or others) mid-emit cannot corrupt iteration. A
    /// panicking handler is logged and skipped; the rest still run.
    pub fn emit(&self, event: &BusEvent) {
        let snapshot: Vec<Handler> = self
            .listeners
            .get(&event.kind())
            .map(|entry| entry.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = event.kind().as_str(), "event handler panicked");
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, |entry| entry.len())
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.iter().map(|entry| entry.len()).sum()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{BusEvent, EventBus, EventKind};
    use crate::models::driver::GeoPoint;
    use crate::models::order::{Order, OrderStatus};

    fn order_event() -> BusEvent {
        BusEvent::OrderCreated {
            order: Order {
                id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                vendor_id: Uuid::new_v4(),
                store_id: Uuid::new_v4(),
                driver_id: None,
                status: OrderStatus::Pending,
                dropoff: GeoPoint { lat: 52.52, lng: 13.405 },
                address: "Alexanderplatz 1".to_string(),
                created_at: Utc::now(),
                assigned_at: None,
            },
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.on(EventKind::OrderCreated, move |_| {
                seen.lock().unwrap().push(tag);
            });
        }

        bus.emit(&order_event());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn off_removes_only_the_named_listener() {
        let bus = EventBus::new();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));

        let seen_a = seen.clone();
        let a = bus.on(EventKind::OrderCreated, move |_| {
            seen_a.lock().unwrap().push("a");
        });
        let seen_b = seen.clone();
        bus.on(EventKind::OrderCreated, move |_| {
            seen_b.lock().unwrap().push("b");
        });

        bus.off(EventKind::OrderCreated, a);
        bus.emit(&order_event());

        assert_eq!(*seen.lock().unwrap(), vec!["b"]);
        assert_eq!(bus.listener_count(EventKind::OrderCreated), 1);
    }

    #[test]
    fn off_for_unknown_id_is_a_noop() {
        let bus = EventBus::new();
        bus.on(EventKind::OrderUpdated, |_| {});
        bus.off(EventKind::OrderUpdated, 9999);
        bus.off(EventKind::OrderAssigned, 1);
        assert_eq!(bus.listener_count(EventKind::OrderUpdated), 1);
    }

    #[test]
    fn late_subscriber_misses_earlier_emits() {
        let bus = EventBus::new();
        bus.emit(&order_event());

        let seen = std::sync::Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        bus.on(EventKind::OrderCreated, move |_| {
            *counter.lock().unwrap() += 1;
        });

        assert_eq!(*seen.lock().unwrap(), 0);
        bus.emit(&order_event());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn panicking_handler_does_not_block_the_rest() {
        let bus = EventBus::new();
        bus.on(EventKind::OrderCreated, |_| panic!("malformed subscriber"));

        let seen = std::sync::Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        bus.on(EventKind::OrderCreated, move |_| {
            *counter.lock().unwrap() += 1;
        });

        bus.emit(&order_event());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn handler_unregistering_itself_mid_emit_is_safe() {
        let bus = std::sync::Arc::new(EventBus::new());
        let slot = std::sync::Arc::new(Mutex::new(None));

        let bus_ref = bus.clone();
        let slot_ref = slot.clone();
        let id = bus.on(EventKind::OrderCreated, move |_| {
            if let Some(own_id) = *slot_ref.lock().unwrap() {
                bus_ref.off(EventKind::OrderCreated, own_id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.emit(&order_event());
        assert_eq!(bus.listener_count(EventKind::OrderCreated), 0);

        // second emit sees the empty registry
        bus.emit(&order_event());
    }
}
