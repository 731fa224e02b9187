//! Fulfillment states for sub-orders and the order-level status derived from them.
//!
//! ```text
//! pending ──► paid ──► processing ──► shipped ──► delivered
//!    │          │           │            │            │
//!    └──────────┴───────────┴─► cancelled └─► refunded / returned ◄┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubOrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Returned,
}

use SubOrderStatus::*;

/// Every legal edge. Anything not listed here is rejected.
const TRANSITIONS: &[(SubOrderStatus, SubOrderStatus)] = &[
    (Pending, Paid),
    (Paid, Processing),
    (Paid, Shipped),
    (Processing, Shipped),
    (Shipped, Delivered),
    (Pending, Cancelled),
    (Paid, Cancelled),
    (Processing, Cancelled),
    (Shipped, Refunded),
    (Delivered, Refunded),
    (Shipped, Returned),
    (Delivered, Returned),
];

impl SubOrderStatus {
    pub fn can_transition_to(self, next: SubOrderStatus) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    /// Position on the happy path; `None` for the exits.
    pub fn progress_rank(self) -> Option<u8> {
        match self {
            Pending => Some(0),
            Paid => Some(1),
            Processing => Some(2),
            Shipped => Some(3),
            Delivered => Some(4),
            Cancelled | Refunded | Returned => None,
        }
    }

    /// Cancelled, refunded and returned sub-orders accept no further transitions.
    pub fn is_terminal(self) -> bool {
        self.progress_rank().is_none()
    }

    pub fn is_before_shipment(self) -> bool {
        matches!(self, Pending | Paid | Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pending => "pending",
            Paid => "paid",
            Processing => "processing",
            Shipped => "shipped",
            Delivered => "delivered",
            Cancelled => "cancelled",
            Refunded => "refunded",
            Returned => "returned",
        }
    }
}

impl fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order-level status. Always computed from the sub-orders, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Returned,
    /// Every sub-order left the happy path, but not all the same way.
    Closed,
    /// Some sub-orders left the happy path; the rest have reached at least this state.
    Partial(SubOrderStatus),
}

impl From<SubOrderStatus> for OrderStatus {
    fn from(status: SubOrderStatus) -> Self {
        match status {
            Pending => OrderStatus::Pending,
            Paid => OrderStatus::Paid,
            Processing => OrderStatus::Processing,
            Shipped => OrderStatus::Shipped,
            Delivered => OrderStatus::Delivered,
            Cancelled => OrderStatus::Cancelled,
            Refunded => OrderStatus::Refunded,
            Returned => OrderStatus::Returned,
        }
    }
}

impl OrderStatus {
    /// Least-advanced-wins summary: `delivered` only when every active sub-order is
    /// delivered, `shipped` when every one is shipped or further, otherwise the
    /// status of the slowest sub-order.
    pub fn derive<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SubOrderStatus>,
    {
        let statuses: Vec<SubOrderStatus> = statuses.into_iter().collect();
        let slowest = statuses
            .iter()
            .copied()
            .filter_map(|s| s.progress_rank().map(|rank| (rank, s)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, s)| s);
        let has_exits = statuses.iter().any(|s| s.is_terminal());

        match (slowest, has_exits) {
            (Some(progress), false) => progress.into(),
            (Some(progress), true) => OrderStatus::Partial(progress),
            (None, _) => match statuses.first() {
                Some(first) if statuses.iter().all(|s| s == first) => (*first).into(),
                Some(_) => OrderStatus::Closed,
                None => OrderStatus::Pending,
            },
        }
    }

    /// Rank of the happy-path progress this status reports, if any.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Paid => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Partial(progress) => progress.progress_rank(),
            OrderStatus::Cancelled
            | OrderStatus::Refunded
            | OrderStatus::Returned
            | OrderStatus::Closed => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => f.write_str("pending"),
            OrderStatus::Paid => f.write_str("paid"),
            OrderStatus::Processing => f.write_str("processing"),
            OrderStatus::Shipped => f.write_str("shipped"),
            OrderStatus::Delivered => f.write_str("delivered"),
            OrderStatus::Cancelled => f.write_str("cancelled"),
            OrderStatus::Refunded => f.write_str("refunded"),
            OrderStatus::Returned => f.write_str("returned"),
            OrderStatus::Closed => f.write_str("closed"),
            OrderStatus::Partial(progress) => write!(f, "partial:{progress}"),
        }
    }
}
