use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::config::Settings;
use crate::models::driver::Driver;
use crate::models::notification::Notification;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

/// In-process stand-in for the relational store. The engine and channels
/// treat it as the transactional source of truth for orders, drivers, and
/// notification records.
#[derive(Default)]
pub struct Store {
    pub orders: DashMap<Uuid, Order>,
    pub drivers: DashMap<Uuid, Driver>,
    pub notifications: DashMap<Uuid, Notification>,
}

pub struct AppState {
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub settings: Settings,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            store: Arc::new(Store::default()),
            bus: Arc::new(EventBus::new()),
            settings,
            metrics: Metrics::new(),
        }
    }

    /// Persist first, then publish: callers mutate the store and hand the
    /// resulting event here.
    pub fn publish(&self, event: BusEvent) {
        self.metrics
            .events_emitted_total
            .with_label_values(&[event.kind().as_str()])
            .inc();
        self.bus.emit(&event);
    }
}
