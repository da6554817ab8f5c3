use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    Ready,
    Assigned,
    InDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// An order can receive a driver while Ready, or while Assigned
    /// (reassignment to a different driver).
    pub fn is_assignable(self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::Assigned)
    }

    /// Counts toward a driver's current workload.
    pub fn is_active_delivery(self) -> bool {
        matches!(self, OrderStatus::Assigned | OrderStatus::InDelivery)
    }

    /// States in which `driver_id` must be set.
    pub fn requires_driver(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::InDelivery | OrderStatus::Delivered
        )
    }

    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, next) {
            (Pending, Accepted)
            | (Accepted, Preparing)
            | (Preparing, Ready)
            | (Ready, Assigned)
            | (Assigned, InDelivery)
            | (InDelivery, Delivered) => true,
            (Delivered | Cancelled, _) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub store_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: OrderStatus,
    pub dropoff: GeoPoint,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id
            || self.vendor_id == user_id
            || self.driver_id == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn forward_chain_is_permitted() {
        assert!(Pending.can_transition(Accepted));
        assert!(Accepted.can_transition(Preparing));
        assert!(Preparing.can_transition(Ready));
        assert!(Ready.can_transition(Assigned));
        assert!(Assigned.can_transition(InDelivery));
        assert!(InDelivery.can_transition(Delivered));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!Pending.can_transition(Ready));
        assert!(!Accepted.can_transition(Assigned));
        assert!(!Ready.can_transition(Delivered));
    }

    #[test]
    fn cancel_is_reachable_from_non_terminal_states() {
        for status in [Pending, Accepted, Preparing, Ready, Assigned, InDelivery] {
            assert!(status.can_transition(Cancelled), "{status:?}");
        }
        assert!(!Delivered.can_transition(Cancelled));
        assert!(!Cancelled.can_transition(Cancelled));
    }

    #[test]
    fn terminal_states_do_not_move() {
        assert!(!Delivered.can_transition(Pending));
        assert!(!Cancelled.can_transition(Ready));
    }

    #[test]
    fn assignable_and_workload_states() {
        assert!(Ready.is_assignable());
        assert!(Assigned.is_assignable());
        assert!(!Pending.is_assignable());
        assert!(!Delivered.is_assignable());

        assert!(Assigned.is_active_delivery());
        assert!(InDelivery.is_active_delivery());
        assert!(!Delivered.is_active_delivery());
    }
}
