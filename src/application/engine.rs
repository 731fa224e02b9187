use super::ledger::{Committed, LedgerStore};
use crate::config::LedgerConfig;
use crate::domain::actor::Actor;
use crate::domain::events::DomainEvent;
use crate::domain::ids::{BuyerId, OrderNumber, SellerId};
use crate::domain::order::{NewOrder, Order, Shipment, SubOrder};
use crate::domain::ports::{ClockBox, EventPublisherBox, OrderStoreBox, PayoutGatewayBox};
use crate::domain::status::SubOrderStatus;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// Entry point for every order operation.
///
/// `OrderEngine` owns the ledger and the outbound ports. It holds no order state of
/// its own: each operation reads, transitions and writes through the ledger, and
/// re-runs the transition against fresh state when the write loses a version race.
pub struct OrderEngine {
    pub(super) ledger: LedgerStore,
    pub(super) payouts: PayoutGatewayBox,
    events: EventPublisherBox,
    pub(super) clock: ClockBox,
    pub(super) config: LedgerConfig,
}

pub(super) fn ensure_buyer(order: &Order, buyer: &BuyerId) -> Result<()> {
    if &order.buyer_id == buyer {
        Ok(())
    } else {
        // Same answer as a missing order, so buyers cannot probe each other's numbers.
        Err(LedgerError::not_found(format!("order {}", order.order_number)))
    }
}

fn is_overdue(sub: &SubOrder, now: DateTime<Utc>, window: Duration) -> bool {
    sub.status == SubOrderStatus::Shipped
        && sub
            .shipped_at
            .and_then(|shipped_at| shipped_at.checked_add_signed(window))
            .is_some_and(|deadline| deadline <= now)
}

impl OrderEngine {
    /// Creates a new `OrderEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Order persistence.
    /// * `payouts` - Seller payout service.
    /// * `events` - Sink for committed domain events.
    /// * `clock` - Time source for transition timestamps and auto-confirmation.
    /// * `config` - Validated before use.
    pub fn new(
        store: OrderStoreBox,
        payouts: PayoutGatewayBox,
        events: EventPublisherBox,
        clock: ClockBox,
        config: LedgerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger: LedgerStore::new(store),
            payouts,
            events,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Runs `transition` through the ledger, retrying on version conflicts.
    ///
    /// The transition is re-evaluated from scratch on every attempt, so its
    /// preconditions are always checked against the state it is written over.
    pub(super) async fn transact<F>(
        &self,
        number: &OrderNumber,
        operation: &'static str,
        mut transition: F,
    ) -> Result<Committed>
    where
        F: FnMut(&mut Order) -> Result<Vec<DomainEvent>> + Send,
    {
        let mut retries = 0;
        loop {
            match self.ledger.atomic_update(number, &mut transition).await {
                Ok(committed) => {
                    if committed.changed {
                        info!(
                            order_number = %number,
                            operation,
                            version = committed.order.version,
                            status = %committed.order.data.status(),
                            "transition applied"
                        );
                        for event in &committed.events {
                            self.events.publish(event);
                        }
                    } else {
                        debug!(order_number = %number, operation, "transition was a no-op");
                    }
                    return Ok(committed);
                }
                Err(err) if err.is_conflict() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    debug!(order_number = %number, operation, retries, "version conflict, retrying");
                    tokio::task::yield_now().await;
                }
                Err(err) => {
                    if err.is_conflict() {
                        warn!(order_number = %number, operation, retries, "giving up after repeated conflicts");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Accepts a checkout payload.
    ///
    /// Re-submitting a checkout with the same order number, buyer and totals returns
    /// the order that was already placed.
    pub async fn place_order(&self, new: NewOrder) -> Result<Order> {
        let (order, event) = Order::place(new, self.clock.now())?;
        match self.ledger.insert(order.clone()).await {
            Ok(stored) => {
                info!(
                    order_number = %stored.data.order_number,
                    buyer_id = %stored.data.buyer_id,
                    sub_orders = stored.data.sub_orders.len(),
                    total = %stored.data.totals.total_amount,
                    "order placed"
                );
                self.events.publish(&event);
                Ok(stored.data)
            }
            Err(err) if err.is_conflict() => {
                let existing = self.ledger.get(&order.order_number).await?.data;
                if existing.buyer_id == order.buyer_id && existing.totals == order.totals {
                    debug!(order_number = %existing.order_number, "duplicate checkout submission");
                    Ok(existing)
                } else {
                    Err(LedgerError::validation(format!(
                        "order number {} is already in use",
                        order.order_number
                    )))
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Seller acknowledges a paid sub-order and starts preparing it.
    pub async fn start_processing(&self, actor: &Actor, number: &OrderNumber) -> Result<Order> {
        let Actor::Seller(seller_id) = actor else {
            return Err(LedgerError::Forbidden(format!(
                "{actor} may not process sub-orders"
            )));
        };
        let committed = self
            .transact(number, "start_processing", |order| {
                order.start_processing(seller_id, self.clock.now(), actor)
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Seller hands their sub-order to a courier. Only the owning seller may ship.
    pub async fn mark_shipped(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        shipment: &Shipment,
    ) -> Result<Order> {
        let Actor::Seller(seller_id) = actor else {
            return Err(LedgerError::Forbidden(format!(
                "{actor} may not ship sub-orders"
            )));
        };
        let committed = self
            .transact(number, "mark_shipped", |order| {
                order.mark_shipped(seller_id, shipment, self.clock.now(), actor)
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Buyer (or the auto-confirm job) confirms receipt.
    ///
    /// With `seller_id` set, only that sub-order is confirmed; otherwise every
    /// sub-order currently in transit is.
    pub async fn confirm_delivery(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        seller_id: Option<&SellerId>,
    ) -> Result<Order> {
        if !matches!(actor, Actor::Buyer(_) | Actor::System) {
            return Err(LedgerError::Forbidden(format!(
                "{actor} may not confirm delivery"
            )));
        }
        let committed = self
            .transact(number, "confirm_delivery", |order| {
                if let Actor::Buyer(buyer) = actor {
                    ensure_buyer(order, buyer)?;
                }
                let now = self.clock.now();
                match seller_id {
                    Some(seller_id) => order.confirm_delivery(seller_id, now, actor),
                    None => {
                        let in_transit: Vec<SellerId> = order
                            .sub_orders
                            .iter()
                            .filter(|s| s.status == SubOrderStatus::Shipped)
                            .map(|s| s.seller_id.clone())
                            .collect();
                        let any_delivered = order
                            .sub_orders
                            .iter()
                            .any(|s| s.status == SubOrderStatus::Delivered);
                        if in_transit.is_empty() && !any_delivered {
                            return Err(LedgerError::precondition(format!(
                                "nothing in order {} has shipped yet",
                                order.order_number
                            )));
                        }
                        let mut events = Vec::new();
                        for seller_id in &in_transit {
                            events.extend(order.confirm_delivery(seller_id, now, actor)?);
                        }
                        Ok(events)
                    }
                }
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Confirms every sub-order that has been in transit longer than the configured
    /// window. Returns how many sub-orders were confirmed.
    ///
    /// Each confirmation goes through the same transition as a buyer confirmation, and
    /// the deadline is re-checked against the state being written.
    pub async fn confirm_overdue_deliveries(&self) -> Result<usize> {
        let window = self.config.auto_confirm_after;
        let now = self.clock.now();
        let mut confirmed = 0;

        for order in self.ledger.all().await? {
            let overdue: Vec<SellerId> = order
                .sub_orders
                .iter()
                .filter(|s| is_overdue(s, now, window))
                .map(|s| s.seller_id.clone())
                .collect();

            for seller_id in overdue {
                let result = self
                    .transact(&order.order_number, "auto_confirm_delivery", |fresh| {
                        let now = self.clock.now();
                        match fresh.sub_order(&seller_id) {
                            Some(sub) if is_overdue(sub, now, window) => {
                                fresh.confirm_delivery(&seller_id, now, &Actor::System)
                            }
                            _ => Ok(Vec::new()),
                        }
                    })
                    .await;
                match result {
                    Ok(committed) if committed.changed => confirmed += 1,
                    Ok(_) => {}
                    Err(err) => warn!(
                        order_number = %order.order_number,
                        seller_id = %seller_id,
                        error = %err,
                        "auto-confirmation failed"
                    ),
                }
            }
        }

        if confirmed > 0 {
            info!(confirmed, "auto-confirmed overdue deliveries");
        }
        Ok(confirmed)
    }

    /// Cancels before shipment.
    ///
    /// Buyers and admins may cancel one sub-order or, with `seller_id` unset, the whole
    /// order. Sellers may only cancel their own sub-order. No funds are released.
    pub async fn cancel(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        seller_id: Option<&SellerId>,
        reason: &str,
    ) -> Result<Order> {
        let committed = self
            .transact(number, "cancel", |order| {
                let now = self.clock.now();
                match (actor, seller_id) {
                    (Actor::Buyer(buyer), scope) => {
                        ensure_buyer(order, buyer)?;
                        match scope {
                            Some(seller_id) => order.cancel(seller_id, reason, now, actor),
                            None => order.cancel_all(reason, now, actor),
                        }
                    }
                    (Actor::Seller(own), None) => order.cancel(own, reason, now, actor),
                    (Actor::Seller(own), Some(seller_id)) if own == seller_id => {
                        order.cancel(own, reason, now, actor)
                    }
                    (Actor::Seller(_), Some(_)) => Err(LedgerError::Forbidden(
                        "sellers may only cancel their own sub-order".into(),
                    )),
                    (Actor::Admin(_), Some(seller_id)) => order.cancel(seller_id, reason, now, actor),
                    (Actor::Admin(_), None) => order.cancel_all(reason, now, actor),
                    (Actor::System, _) => Err(LedgerError::Forbidden(
                        "scheduled jobs may not cancel orders".into(),
                    )),
                }
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Admin records a refund for a shipped or delivered sub-order.
    pub async fn refund(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        seller_id: &SellerId,
        reason: &str,
    ) -> Result<Order> {
        actor.require_admin()?;
        let committed = self
            .transact(number, "refund", |order| {
                order.refund(seller_id, reason, self.clock.now(), actor)
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Admin records that the goods of a shipped or delivered sub-order came back.
    pub async fn mark_returned(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        seller_id: &SellerId,
        reason: &str,
    ) -> Result<Order> {
        actor.require_admin()?;
        let committed = self
            .transact(number, "mark_returned", |order| {
                order.mark_returned(seller_id, reason, self.clock.now(), actor)
            })
            .await?;
        Ok(committed.order.data)
    }
}
