use crate::domain::ids::{OrderId, OrderNumber, SellerId};
use crate::domain::money::Money;
use crate::domain::order::Order;
use crate::domain::ports::{
    OrderStore, PayoutAccount, PayoutGateway, PayoutReceipt, PayoutRequest, Versioned,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct OrderTables {
    orders: HashMap<OrderId, Versioned<Order>>,
    numbers: HashMap<OrderNumber, OrderId>,
}

/// A thread-safe in-memory order store.
///
/// Uses `Arc<RwLock<..>>` so clones share one table. The version check and the write
/// happen under the same write guard, which makes `compare_and_swap` atomic.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Versioned<Order>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .numbers
            .get(&order.order_number)
            .and_then(|id| tables.orders.get(id))
        {
            return Err(LedgerError::Conflict {
                order_number: order.order_number.to_string(),
                expected: 0,
                actual: existing.version,
            });
        }
        let stored = Versioned {
            data: order,
            version: 1,
        };
        tables
            .numbers
            .insert(stored.data.order_number.clone(), stored.data.id);
        tables.orders.insert(stored.data.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Versioned<Order>>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(id).cloned())
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Versioned<Order>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .numbers
            .get(number)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn compare_and_swap(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<Versioned<Order>> {
        let mut tables = self.tables.write().await;
        let current = tables
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| LedgerError::not_found(format!("order {}", order.order_number)))?;
        if current.version != expected_version {
            return Err(LedgerError::Conflict {
                order_number: order.order_number.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        *current = Versioned {
            data: order,
            version: expected_version + 1,
        };
        Ok(current.clone())
    }

    async fn all(&self) -> Result<Vec<Versioned<Order>>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.values().cloned().collect())
    }
}

#[derive(Default)]
struct PayoutBook {
    accounts: HashMap<SellerId, PayoutAccount>,
    /// Keyed by payout key, so a repeated request finds its original payout.
    payouts: HashMap<String, (SellerId, Money, String)>,
    unavailable: bool,
}

/// In-memory stand-in for the seller payout service.
///
/// Honors payout keys the way a real processor honors idempotency keys.
#[derive(Default, Clone)]
pub struct InMemoryPayoutGateway {
    book: Arc<Mutex<PayoutBook>>,
    latency: Option<Duration>,
}

impl InMemoryPayoutGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every transfer, widening the window for concurrent callers.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn register_account(&self, seller_id: SellerId, account_ref: impl Into<String>) {
        let mut book = self.book.lock().await;
        book.accounts.insert(
            seller_id,
            PayoutAccount {
                account_ref: account_ref.into(),
            },
        );
    }

    /// Simulates a processor outage: transfers fail until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.book.lock().await.unavailable = unavailable;
    }

    pub async fn payout_count(&self) -> usize {
        self.book.lock().await.payouts.len()
    }

    pub async fn paid_to(&self, seller_id: &SellerId) -> Money {
        let book = self.book.lock().await;
        book.payouts
            .values()
            .filter(|(seller, _, _)| seller == seller_id)
            .map(|(_, amount, _)| *amount)
            .sum()
    }
}

#[async_trait]
impl PayoutGateway for InMemoryPayoutGateway {
    async fn destination(&self, seller_id: &SellerId) -> Result<Option<PayoutAccount>> {
        let book = self.book.lock().await;
        Ok(book.accounts.get(seller_id).cloned())
    }

    async fn transfer(&self, request: PayoutRequest) -> Result<PayoutReceipt> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut book = self.book.lock().await;
        if book.unavailable {
            return Err(LedgerError::PayoutFailed(
                "payout processor unavailable".into(),
            ));
        }
        if let Some((_, _, reference)) = book.payouts.get(&request.payout_key) {
            return Ok(PayoutReceipt {
                reference: reference.clone(),
            });
        }
        let reference = format!("PO-{:06}", book.payouts.len() + 1);
        book.payouts.insert(
            request.payout_key,
            (request.seller_id, request.amount, reference.clone()),
        );
        Ok(PayoutReceipt { reference })
    }
}
