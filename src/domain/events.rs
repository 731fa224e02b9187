use super::actor::Actor;
use super::ids::{BuyerId, OrderNumber, SellerId};
use super::money::Money;
use super::payment::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Facts published after a transition commits. Subscribers (notifications, analytics)
/// receive them best-effort; the ledger never waits on delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    OrderPlaced {
        order_number: OrderNumber,
        buyer_id: BuyerId,
        sellers: Vec<SellerId>,
        total_amount: Money,
        at: DateTime<Utc>,
    },
    PaymentVerified {
        order_number: OrderNumber,
        method: PaymentMethod,
        at: DateTime<Utc>,
    },
    PaymentRejected {
        order_number: OrderNumber,
        method: PaymentMethod,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    SubOrderProcessing {
        order_number: OrderNumber,
        seller_id: SellerId,
        at: DateTime<Utc>,
    },
    SubOrderShipped {
        order_number: OrderNumber,
        seller_id: SellerId,
        tracking_number: String,
        courier: String,
        at: DateTime<Utc>,
    },
    SubOrderDelivered {
        order_number: OrderNumber,
        seller_id: SellerId,
        confirmed_by: Actor,
        at: DateTime<Utc>,
    },
    OrderDelivered {
        order_number: OrderNumber,
        at: DateTime<Utc>,
    },
    SubOrderCancelled {
        order_number: OrderNumber,
        seller_id: SellerId,
        reason: String,
        at: DateTime<Utc>,
    },
    SubOrderRefunded {
        order_number: OrderNumber,
        seller_id: SellerId,
        amount: Money,
        reason: String,
        at: DateTime<Utc>,
    },
    SubOrderReturned {
        order_number: OrderNumber,
        seller_id: SellerId,
        reason: String,
        at: DateTime<Utc>,
    },
    ProfitTransferred {
        order_number: OrderNumber,
        seller_id: SellerId,
        amount: Money,
        reference: String,
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "OrderPlaced",
            DomainEvent::PaymentVerified { .. } => "PaymentVerified",
            DomainEvent::PaymentRejected { .. } => "PaymentRejected",
            DomainEvent::SubOrderProcessing { .. } => "SubOrderProcessing",
            DomainEvent::SubOrderShipped { .. } => "SubOrderShipped",
            DomainEvent::SubOrderDelivered { .. } => "SubOrderDelivered",
            DomainEvent::OrderDelivered { .. } => "OrderDelivered",
            DomainEvent::SubOrderCancelled { .. } => "SubOrderCancelled",
            DomainEvent::SubOrderRefunded { .. } => "SubOrderRefunded",
            DomainEvent::SubOrderReturned { .. } => "SubOrderReturned",
            DomainEvent::ProfitTransferred { .. } => "ProfitTransferred",
        }
    }

    pub fn order_number(&self) -> &OrderNumber {
        match self {
            DomainEvent::OrderPlaced { order_number, .. }
            | DomainEvent::PaymentVerified { order_number, .. }
            | DomainEvent::PaymentRejected { order_number, .. }
            | DomainEvent::SubOrderProcessing { order_number, .. }
            | DomainEvent::SubOrderShipped { order_number, .. }
            | DomainEvent::SubOrderDelivered { order_number, .. }
            | DomainEvent::OrderDelivered { order_number, .. }
            | DomainEvent::SubOrderCancelled { order_number, .. }
            | DomainEvent::SubOrderRefunded { order_number, .. }
            | DomainEvent::SubOrderReturned { order_number, .. }
            | DomainEvent::ProfitTransferred { order_number, .. } => order_number,
        }
    }
}
