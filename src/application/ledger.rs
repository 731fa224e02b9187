use crate::domain::events::DomainEvent;
use crate::domain::ids::OrderNumber;
use crate::domain::order::Order;
use crate::domain::ports::{OrderStoreBox, Versioned};
use crate::error::{LedgerError, Result};
use tracing::debug;

/// Result of one `atomic_update` attempt.
#[derive(Debug)]
pub struct Committed {
    pub order: Versioned<Order>,
    pub events: Vec<DomainEvent>,
    /// `false` when the transition was a no-op and nothing was written.
    pub changed: bool,
}

/// The single point of mutation for orders.
///
/// Wraps an `OrderStore` with read-modify-write semantics: a transition runs against a
/// private copy of the current order, and the copy is written back only if the stored
/// version has not moved in the meantime.
pub struct LedgerStore {
    store: OrderStoreBox,
}

impl LedgerStore {
    pub fn new(store: OrderStoreBox) -> Self {
        Self { store }
    }

    pub async fn get(&self, number: &OrderNumber) -> Result<Versioned<Order>> {
        self.store
            .get_by_number(number)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {number}")))
    }

    pub async fn find(&self, number: &OrderNumber) -> Result<Option<Versioned<Order>>> {
        self.store.get_by_number(number).await
    }

    /// Persists a freshly placed order after re-checking its totals.
    pub async fn insert(&self, order: Order) -> Result<Versioned<Order>> {
        order.check_totals()?;
        self.store.insert(order).await
    }

    pub async fn all(&self) -> Result<Vec<Order>> {
        Ok(self
            .store
            .all()
            .await?
            .into_iter()
            .map(|versioned| versioned.data)
            .collect())
    }

    /// Applies `transition` to the current state of `number`.
    ///
    /// Fails with `Conflict` if another writer committed between the read and the
    /// write; the caller decides whether to run the transition again. A transition
    /// error leaves the store untouched.
    pub async fn atomic_update<F>(&self, number: &OrderNumber, transition: &mut F) -> Result<Committed>
    where
        F: FnMut(&mut Order) -> Result<Vec<DomainEvent>> + Send,
    {
        let current = self.get(number).await?;
        let mut working = current.data.clone();
        let events = transition(&mut working)?;

        if working == current.data {
            return Ok(Committed {
                order: current,
                events,
                changed: false,
            });
        }

        working.ensure_frozen_fields_unchanged(&current.data)?;
        working.check_totals()?;

        let stored = self.store.compare_and_swap(working, current.version).await?;
        debug!(
            order_number = %number,
            version = stored.version,
            events = events.len(),
            "order committed"
        );
        Ok(Committed {
            order: stored,
            events,
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryOrderStore;

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let ledger = LedgerStore::new(Box::new(InMemoryOrderStore::new()));
        let mut noop = |_: &mut Order| -> Result<Vec<DomainEvent>> { Ok(Vec::new()) };
        let err = ledger
            .atomic_update(&OrderNumber::new("ORD-404"), &mut noop)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
