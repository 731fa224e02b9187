use async_trait::async_trait;
use chrono::Utc;
use gem_ledger::config::LedgerConfig;
use gem_ledger::domain::ids::{OrderId, OrderNumber, SellerId};
use gem_ledger::domain::order::Order;
use gem_ledger::domain::ports::{OrderStore, Versioned};
use gem_ledger::domain::status::SubOrderStatus;
use gem_ledger::error::{LedgerError, Result};
use gem_ledger::infrastructure::in_memory::InMemoryOrderStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

mod common;
use common::*;

type CompetingWrite = Box<dyn FnOnce(&mut Order) + Send>;

/// Commits a queued competing write right before each engine write, so the engine's
/// compare-and-swap always finds a newer version while the queue is non-empty.
#[derive(Clone, Default)]
struct ContendedStore {
    inner: InMemoryOrderStore,
    competing: Arc<Mutex<VecDeque<CompetingWrite>>>,
}

impl ContendedStore {
    /// Queues `times` writes that only bump the version.
    fn bump_versions(&self, times: usize) {
        for _ in 0..times {
            self.write_before_next_swap(|_| {});
        }
    }

    fn write_before_next_swap(&self, change: impl FnOnce(&mut Order) + Send + 'static) {
        self.competing.lock().unwrap().push_back(Box::new(change));
    }
}

#[async_trait]
impl OrderStore for ContendedStore {
    async fn insert(&self, order: Order) -> Result<Versioned<Order>> {
        self.inner.insert(order).await
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Versioned<Order>>> {
        self.inner.get(id).await
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Versioned<Order>>> {
        self.inner.get_by_number(number).await
    }

    async fn compare_and_swap(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<Versioned<Order>> {
        let next = self.competing.lock().unwrap().pop_front();
        if let Some(change) = next {
            let current = self.inner.get(&order.id).await?.unwrap();
            let mut competing = current.data;
            change(&mut competing);
            self.inner.compare_and_swap(competing, current.version).await?;
        }
        self.inner.compare_and_swap(order, expected_version).await
    }

    async fn all(&self) -> Result<Vec<Versioned<Order>>> {
        self.inner.all().await
    }
}

fn contended_harness(max_retries: u32) -> (Harness, ContendedStore) {
    let store = ContendedStore::default();
    let config = LedgerConfig::default().with_max_conflict_retries(max_retries);
    (Harness::with_store(config, Box::new(store.clone())), store)
}

#[tokio::test]
async fn test_conflicts_within_retry_bound_are_absorbed() {
    let (mut h, store) = contended_harness(3);
    let number = place_paid_order(&h, "ORD-CF-1").await;
    h.drain_events();

    store.bump_versions(3);
    h.engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap();

    let order = h.order(&number).await;
    let a = order.sub_order(&SellerId::new(SELLER_A)).unwrap();
    assert_eq!(a.status, SubOrderStatus::Shipped);
    assert_eq!(a.history.len(), 2);
    assert_eq!(h.drain_events(), vec!["SubOrderShipped"]);
}

#[tokio::test]
async fn test_exhausted_retries_surface_conflict_and_leave_order_unchanged() {
    let (mut h, store) = contended_harness(3);
    let number = place_paid_order(&h, "ORD-CF-2").await;
    let before = h.order(&number).await;
    h.drain_events();

    store.bump_versions(4);
    let err = h
        .engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }), "{err}");

    assert_eq!(h.order(&number).await, before);
    assert!(h.drain_events().is_empty());

    // Contention is gone, so the same request now goes through
    h.engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_retry_rechecks_preconditions_against_fresh_state() {
    let (mut h, store) = contended_harness(5);
    let number = place_paid_order(&h, "ORD-CF-3").await;
    h.drain_events();

    // The seller's cancellation lands between the ship read and the ship write
    store.write_before_next_swap(|order| {
        order
            .cancel(
                &SellerId::new(SELLER_A),
                "out of stock",
                Utc::now(),
                &seller(SELLER_A),
            )
            .unwrap();
    });
    let err = h
        .engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Precondition(_)), "{err}");

    let order = h.order(&number).await;
    let a = order.sub_order(&SellerId::new(SELLER_A)).unwrap();
    assert_eq!(a.status, SubOrderStatus::Cancelled);
    assert!(a.tracking_number.is_none());
    assert!(h.drain_events().is_empty());
}
