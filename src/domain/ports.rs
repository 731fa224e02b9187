use super::events::DomainEvent;
use super::ids::{OrderId, OrderNumber, SellerId};
use super::money::Money;
use super::order::Order;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored value together with the version stamp it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Durable order persistence with optimistic concurrency.
///
/// Versions start at 1 on insert and grow by one per successful swap.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with `Conflict` if the order number is already taken.
    async fn insert(&self, order: Order) -> Result<Versioned<Order>>;
    async fn get(&self, id: &OrderId) -> Result<Option<Versioned<Order>>>;
    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Versioned<Order>>>;
    /// Writes `order` only if the stored version still equals `expected_version`.
    async fn compare_and_swap(&self, order: Order, expected_version: u64)
    -> Result<Versioned<Order>>;
    async fn all(&self) -> Result<Vec<Versioned<Order>>>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;

/// Opaque destination supplied by the seller bank-details service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    pub account_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRequest {
    /// Repeating a key must return the original payout, never a second one.
    pub payout_key: String,
    pub seller_id: SellerId,
    pub destination: PayoutAccount,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutReceipt {
    pub reference: String,
}

#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn destination(&self, seller_id: &SellerId) -> Result<Option<PayoutAccount>>;
    async fn transfer(&self, request: PayoutRequest) -> Result<PayoutReceipt>;
}

pub type PayoutGatewayBox = Box<dyn PayoutGateway>;

/// Fire-and-forget sink for committed domain events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &DomainEvent);
}

pub type EventPublisherBox = Box<dyn EventPublisher>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockBox = Box<dyn Clock>;
