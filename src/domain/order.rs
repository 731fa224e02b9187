//! The order aggregate and every transition that may change it.
//!
//! Transition methods mutate `&mut self` and return the events they produced. They are
//! only ever called on a working copy inside the ledger's atomic update, so an `Err`
//! discards every change made before it.

use super::actor::Actor;
use super::events::DomainEvent;
use super::ids::{AdminId, BuyerId, OrderId, OrderNumber, SellerId};
use super::money::{Money, UnitPrice};
use super::payment::{
    GatewayStatus, PaymentMethod, PaymentRecord, PaymentStatus, ReceiptRef, Verdict,
};
use super::settlement::{PayoutRecord, Settlement, payout_key};
use super::status::{OrderStatus, SubOrderStatus};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSnapshot {
    pub name: String,
    pub shop_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub address: ShippingAddress,
    pub method: String,
    pub cost: Money,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub gem_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: UnitPrice,
    pub line_total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub total_shipping: Money,
    pub total_amount: Money,
}

/// One entry of a sub-order's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: SubOrderStatus,
    pub to: SubOrderStatus,
    pub at: DateTime<Utc>,
    pub by: Actor,
    pub note: Option<String>,
}

/// Tracking metadata supplied by a seller when handing a parcel to a courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub tracking_number: String,
    pub courier: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOrder {
    pub seller_id: SellerId,
    pub seller: SellerSnapshot,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    pub status: SubOrderStatus,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settlement: Settlement,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl SubOrder {
    pub fn profit_transferred(&self) -> bool {
        self.settlement.is_transferred()
    }

    fn transition(
        &mut self,
        to: SubOrderStatus,
        at: DateTime<Utc>,
        by: &Actor,
        note: Option<String>,
    ) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::precondition(format!(
                "sub-order for seller {} cannot move from {} to {}",
                self.seller_id, self.status, to
            )));
        }
        self.history.push(StatusChange {
            from: self.status,
            to,
            at,
            by: by.clone(),
            note,
        });
        self.status = to;
        Ok(())
    }
}

/// Root aggregate for one checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub buyer_id: BuyerId,
    pub buyer: BuyerSnapshot,
    pub payment: PaymentRecord,
    pub shipping: ShippingDetails,
    pub totals: OrderTotals,
    pub placed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub sub_orders: Vec<SubOrder>,
}

/// Checkout payload for a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Checkout may reserve the number up front; otherwise one is generated.
    #[serde(default)]
    pub order_number: Option<OrderNumber>,
    pub buyer_id: BuyerId,
    pub buyer: BuyerSnapshot,
    pub shipping_address: ShippingAddress,
    pub shipping_method: String,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub sub_orders: Vec<NewSubOrder>,
    /// Totals as computed by checkout; they must match the line items.
    pub totals: OrderTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubOrder {
    pub seller_id: SellerId,
    pub seller: SellerSnapshot,
    pub items: Vec<NewOrderItem>,
    pub shipping_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub gem_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: UnitPrice,
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(LedgerError::validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn amount_overflow() -> LedgerError {
    LedgerError::validation("amount overflow")
}

impl Order {
    /// Validates a checkout payload and builds the order in `pending`.
    pub fn place(new: NewOrder, placed_at: DateTime<Utc>) -> Result<(Order, DomainEvent)> {
        require_text(new.buyer_id.as_str(), "buyer id")?;
        require_text(&new.buyer.name, "buyer name")?;
        if !new.buyer.email.contains('@') {
            return Err(LedgerError::validation("buyer email is malformed"));
        }
        require_text(&new.shipping_address.line1, "shipping address")?;
        require_text(&new.shipping_address.country, "shipping country")?;
        require_text(&new.shipping_method, "shipping method")?;
        if new.sub_orders.is_empty() {
            return Err(LedgerError::validation("an order needs at least one seller"));
        }

        let mut sellers = HashSet::new();
        let mut sub_orders = Vec::with_capacity(new.sub_orders.len());
        for sub in new.sub_orders {
            require_text(sub.seller_id.as_str(), "seller id")?;
            if !sellers.insert(sub.seller_id.clone()) {
                return Err(LedgerError::validation(format!(
                    "seller {} appears in more than one sub-order",
                    sub.seller_id
                )));
            }
            if sub.items.is_empty() {
                return Err(LedgerError::validation(format!(
                    "sub-order for seller {} has no items",
                    sub.seller_id
                )));
            }
            if sub.shipping_cost.is_negative() {
                return Err(LedgerError::validation("shipping cost must not be negative"));
            }

            let mut items = Vec::with_capacity(sub.items.len());
            for item in sub.items {
                require_text(&item.gem_id, "gem id")?;
                require_text(&item.name, "item name")?;
                if item.quantity == 0 {
                    return Err(LedgerError::validation(format!(
                        "item {} has zero quantity",
                        item.gem_id
                    )));
                }
                let line_total = item
                    .unit_price
                    .money()
                    .checked_times(item.quantity)
                    .ok_or_else(amount_overflow)?;
                items.push(OrderItem {
                    line_total,
                    gem_id: item.gem_id,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                });
            }
            let subtotal = Money::checked_sum(items.iter().map(|i| i.line_total))
                .ok_or_else(amount_overflow)?;
            let total_amount = subtotal
                .checked_add(sub.shipping_cost)
                .ok_or_else(amount_overflow)?;

            sub_orders.push(SubOrder {
                seller_id: sub.seller_id,
                seller: sub.seller,
                items,
                subtotal,
                shipping_cost: sub.shipping_cost,
                total_amount,
                status: SubOrderStatus::Pending,
                tracking_number: None,
                courier: None,
                estimated_delivery: None,
                shipped_at: None,
                delivered_at: None,
                settlement: Settlement::default(),
                history: Vec::new(),
            });
        }

        let sum_of = |field: fn(&SubOrder) -> Money| {
            Money::checked_sum(sub_orders.iter().map(field)).ok_or_else(amount_overflow)
        };
        let computed = OrderTotals {
            subtotal: sum_of(|s| s.subtotal)?,
            total_shipping: sum_of(|s| s.shipping_cost)?,
            total_amount: sum_of(|s| s.total_amount)?,
        };
        if computed != new.totals {
            return Err(LedgerError::validation(format!(
                "totals mismatch: checkout sent {}/{}/{}, items add up to {}/{}/{}",
                new.totals.subtotal,
                new.totals.total_shipping,
                new.totals.total_amount,
                computed.subtotal,
                computed.total_shipping,
                computed.total_amount
            )));
        }

        let id = OrderId::new();
        let order_number = match new.order_number {
            Some(number) => {
                require_text(number.as_str(), "order number")?;
                number
            }
            None => OrderNumber::generate(placed_at, &id),
        };

        let order = Order {
            id,
            order_number,
            buyer_id: new.buyer_id,
            buyer: new.buyer,
            payment: PaymentRecord::new(new.payment_method, new.transaction_id),
            shipping: ShippingDetails {
                address: new.shipping_address,
                method: new.shipping_method,
                cost: computed.total_shipping,
                estimated_delivery: new.estimated_delivery,
            },
            totals: computed,
            placed_at,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            sub_orders,
        };
        let event = DomainEvent::OrderPlaced {
            order_number: order.order_number.clone(),
            buyer_id: order.buyer_id.clone(),
            sellers: order.sub_orders.iter().map(|s| s.seller_id.clone()).collect(),
            total_amount: order.totals.total_amount,
            at: placed_at,
        };
        Ok((order, event))
    }

    /// Derived from the sub-orders on every call.
    pub fn status(&self) -> OrderStatus {
        OrderStatus::derive(self.sub_orders.iter().map(|s| s.status))
    }

    pub fn sub_order(&self, seller_id: &SellerId) -> Option<&SubOrder> {
        self.sub_orders.iter().find(|s| &s.seller_id == seller_id)
    }

    fn sub_order_mut(&mut self, seller_id: &SellerId) -> Result<&mut SubOrder> {
        let order_number = self.order_number.clone();
        self.sub_orders
            .iter_mut()
            .find(|s| &s.seller_id == seller_id)
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "order {order_number} has no sub-order for seller {seller_id}"
                ))
            })
    }

    fn require_payment_completed(&self) -> Result<()> {
        if self.payment.is_completed() {
            Ok(())
        } else {
            Err(LedgerError::PaymentNotVerified(self.order_number.to_string()))
        }
    }

    /// `Σ sub_order.total_amount == total_amount`, and each sub-order adds up.
    pub fn check_totals(&self) -> Result<()> {
        for sub in &self.sub_orders {
            let items = Money::checked_sum(sub.items.iter().map(|i| i.line_total))
                .ok_or_else(amount_overflow)?;
            let total = sub
                .subtotal
                .checked_add(sub.shipping_cost)
                .ok_or_else(amount_overflow)?;
            if items != sub.subtotal || total != sub.total_amount {
                return Err(LedgerError::validation(format!(
                    "sub-order totals for seller {} are inconsistent",
                    sub.seller_id
                )));
            }
        }
        let sum = Money::checked_sum(self.sub_orders.iter().map(|s| s.total_amount))
            .ok_or_else(amount_overflow)?;
        if sum != self.totals.total_amount {
            return Err(LedgerError::validation(format!(
                "order total {} does not equal sub-order sum {}",
                self.totals.total_amount, sum
            )));
        }
        Ok(())
    }

    /// Rejects a transition that touched anything frozen at placement.
    pub fn ensure_frozen_fields_unchanged(&self, before: &Order) -> Result<()> {
        let same_subs = self.sub_orders.len() == before.sub_orders.len()
            && self.sub_orders.iter().zip(&before.sub_orders).all(|(a, b)| {
                a.seller_id == b.seller_id
                    && a.seller == b.seller
                    && a.items == b.items
                    && a.subtotal == b.subtotal
                    && a.shipping_cost == b.shipping_cost
                    && a.total_amount == b.total_amount
            });
        if self.id != before.id
            || self.order_number != before.order_number
            || self.buyer_id != before.buyer_id
            || self.buyer != before.buyer
            || self.shipping.address != before.shipping.address
            || self.totals != before.totals
            || self.placed_at != before.placed_at
            || !same_subs
        {
            return Err(LedgerError::precondition(format!(
                "order {} snapshot fields are immutable after placement",
                before.order_number
            )));
        }
        Ok(())
    }

    fn refresh_milestones(&mut self, at: DateTime<Utc>) -> Option<DomainEvent> {
        let rank = self.status().progress_rank();
        if self.shipped_at.is_none() && rank >= Some(3) {
            self.shipped_at = Some(at);
        }
        if self.delivered_at.is_none() && rank == Some(4) {
            self.delivered_at = Some(at);
            return Some(DomainEvent::OrderDelivered {
                order_number: self.order_number.clone(),
                at,
            });
        }
        None
    }

    /// Marks the payment refunded once nothing that was paid for is still live.
    fn refresh_payment_after_exit(&mut self) {
        let all_closed = self.sub_orders.iter().all(|s| s.status.is_terminal());
        let any_refunded = self
            .sub_orders
            .iter()
            .any(|s| matches!(s.status, SubOrderStatus::Refunded | SubOrderStatus::Returned));
        if all_closed && any_refunded && self.payment.is_completed() {
            self.payment.status = PaymentStatus::Refunded;
        }
    }

    /// `pending → paid` for every sub-order still waiting on payment.
    pub fn on_payment_confirmed(&mut self, at: DateTime<Utc>, by: &Actor) -> Result<usize> {
        self.require_payment_completed()?;
        let mut moved = 0;
        for sub in self
            .sub_orders
            .iter_mut()
            .filter(|s| s.status == SubOrderStatus::Pending)
        {
            sub.transition(SubOrderStatus::Paid, at, by, Some("payment confirmed".into()))?;
            moved += 1;
        }
        if self.confirmed_at.is_none() {
            self.confirmed_at = Some(at);
        }
        Ok(moved)
    }

    pub fn record_gateway_result(
        &mut self,
        method: PaymentMethod,
        transaction_id: &str,
        result: GatewayStatus,
        at: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        if !self.payment.record_gateway_result(method, transaction_id, result, at)? {
            return Ok(Vec::new());
        }
        match result {
            GatewayStatus::Succeeded => {
                self.on_payment_confirmed(at, &Actor::System)?;
                Ok(vec![DomainEvent::PaymentVerified {
                    order_number: self.order_number.clone(),
                    method,
                    at,
                }])
            }
            GatewayStatus::Failed => Ok(vec![DomainEvent::PaymentRejected {
                order_number: self.order_number.clone(),
                method,
                reason: Some("gateway reported failure".into()),
                at,
            }]),
        }
    }

    pub fn submit_receipt(&mut self, receipt: ReceiptRef, at: DateTime<Utc>) -> Result<bool> {
        if self.sub_orders.iter().all(|s| s.status.is_terminal()) {
            return Err(LedgerError::precondition(format!(
                "order {} is closed",
                self.order_number
            )));
        }
        self.payment.submit_receipt(receipt, at)
    }

    pub fn verify_receipt(
        &mut self,
        verdict: Verdict,
        admin: &AdminId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        if !self.payment.decide(verdict, admin, reason, at)? {
            return Ok(Vec::new());
        }
        let method = self.payment.method;
        match verdict {
            Verdict::Approved => {
                self.on_payment_confirmed(at, &Actor::Admin(admin.clone()))?;
                Ok(vec![DomainEvent::PaymentVerified {
                    order_number: self.order_number.clone(),
                    method,
                    at,
                }])
            }
            Verdict::Rejected => Ok(vec![DomainEvent::PaymentRejected {
                order_number: self.order_number.clone(),
                method,
                reason: self.payment.decision.as_ref().and_then(|d| d.reason.clone()),
                at,
            }]),
        }
    }

    pub fn start_processing(
        &mut self,
        seller_id: &SellerId,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        self.require_payment_completed()?;
        let order_number = self.order_number.clone();
        let sub = self.sub_order_mut(seller_id)?;
        if sub.status == SubOrderStatus::Processing {
            return Ok(Vec::new());
        }
        sub.transition(SubOrderStatus::Processing, at, by, None)?;
        Ok(vec![DomainEvent::SubOrderProcessing {
            order_number,
            seller_id: seller_id.clone(),
            at,
        }])
    }

    pub fn mark_shipped(
        &mut self,
        seller_id: &SellerId,
        shipment: &Shipment,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        require_text(&shipment.tracking_number, "tracking number")?;
        require_text(&shipment.courier, "courier")?;
        self.require_payment_completed()?;

        let order_number = self.order_number.clone();
        let sub = self.sub_order_mut(seller_id)?;
        if matches!(sub.status, SubOrderStatus::Shipped | SubOrderStatus::Delivered) {
            let same = sub.tracking_number.as_deref() == Some(shipment.tracking_number.as_str())
                && sub.courier.as_deref() == Some(shipment.courier.as_str());
            return if same {
                Ok(Vec::new())
            } else {
                Err(LedgerError::precondition(format!(
                    "sub-order for seller {seller_id} already shipped with tracking {}",
                    sub.tracking_number.as_deref().unwrap_or("-")
                )))
            };
        }
        sub.transition(SubOrderStatus::Shipped, at, by, None)?;
        sub.tracking_number = Some(shipment.tracking_number.clone());
        sub.courier = Some(shipment.courier.clone());
        sub.estimated_delivery = shipment.estimated_delivery;
        sub.shipped_at = Some(at);

        let mut events = vec![DomainEvent::SubOrderShipped {
            order_number,
            seller_id: seller_id.clone(),
            tracking_number: shipment.tracking_number.clone(),
            courier: shipment.courier.clone(),
            at,
        }];
        events.extend(self.refresh_milestones(at));
        Ok(events)
    }

    pub fn confirm_delivery(
        &mut self,
        seller_id: &SellerId,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        let order_number = self.order_number.clone();
        let sub = self.sub_order_mut(seller_id)?;
        if sub.status == SubOrderStatus::Delivered {
            return Ok(Vec::new());
        }
        let note = matches!(by, Actor::System).then(|| "auto-confirmed".to_string());
        sub.transition(SubOrderStatus::Delivered, at, by, note)?;
        sub.delivered_at = Some(at);

        let mut events = vec![DomainEvent::SubOrderDelivered {
            order_number,
            seller_id: seller_id.clone(),
            confirmed_by: by.clone(),
            at,
        }];
        events.extend(self.refresh_milestones(at));
        Ok(events)
    }

    pub fn cancel(
        &mut self,
        seller_id: &SellerId,
        reason: &str,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        require_text(reason, "cancellation reason")?;
        let order_number = self.order_number.clone();
        let sub = self.sub_order_mut(seller_id)?;
        if sub.status == SubOrderStatus::Cancelled {
            return Ok(Vec::new());
        }
        if !sub.status.is_before_shipment() {
            return Err(LedgerError::precondition(format!(
                "sub-order for seller {seller_id} is {} and can no longer be cancelled",
                sub.status
            )));
        }
        sub.transition(SubOrderStatus::Cancelled, at, by, Some(reason.to_string()))?;

        let mut events = vec![DomainEvent::SubOrderCancelled {
            order_number,
            seller_id: seller_id.clone(),
            reason: reason.to_string(),
            at,
        }];
        events.extend(self.refresh_milestones(at));
        Ok(events)
    }

    /// Cancels every sub-order, or none if any of them has already shipped.
    pub fn cancel_all(
        &mut self,
        reason: &str,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        if let Some(shipped) = self
            .sub_orders
            .iter()
            .find(|s| s.status != SubOrderStatus::Cancelled && !s.status.is_before_shipment())
        {
            return Err(LedgerError::precondition(format!(
                "sub-order for seller {} is {}; cancel the remaining sub-orders individually",
                shipped.seller_id, shipped.status
            )));
        }
        let sellers: Vec<SellerId> = self.sub_orders.iter().map(|s| s.seller_id.clone()).collect();
        let mut events = Vec::new();
        for seller_id in &sellers {
            events.extend(self.cancel(seller_id, reason, at, by)?);
        }
        Ok(events)
    }

    fn close_after_delivery(
        &mut self,
        seller_id: &SellerId,
        to: SubOrderStatus,
        reason: &str,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Option<Money>> {
        require_text(reason, "reason")?;
        let sub = self.sub_order_mut(seller_id)?;
        if sub.status == to {
            return Ok(None);
        }
        if !matches!(sub.settlement, Settlement::Unsettled { .. }) {
            return Err(LedgerError::precondition(format!(
                "profit for seller {seller_id} has already been released"
            )));
        }
        sub.transition(to, at, by, Some(reason.to_string()))?;
        let amount = sub.total_amount;
        self.refresh_payment_after_exit();
        Ok(Some(amount))
    }

    pub fn refund(
        &mut self,
        seller_id: &SellerId,
        reason: &str,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        let refunded =
            self.close_after_delivery(seller_id, SubOrderStatus::Refunded, reason, at, by)?;
        Ok(refunded
            .map(|amount| DomainEvent::SubOrderRefunded {
                order_number: self.order_number.clone(),
                seller_id: seller_id.clone(),
                amount,
                reason: reason.to_string(),
                at,
            })
            .into_iter()
            .collect())
    }

    pub fn mark_returned(
        &mut self,
        seller_id: &SellerId,
        reason: &str,
        at: DateTime<Utc>,
        by: &Actor,
    ) -> Result<Vec<DomainEvent>> {
        let returned =
            self.close_after_delivery(seller_id, SubOrderStatus::Returned, reason, at, by)?;
        Ok(returned
            .map(|_| DomainEvent::SubOrderReturned {
                order_number: self.order_number.clone(),
                seller_id: seller_id.clone(),
                reason: reason.to_string(),
                at,
            })
            .into_iter()
            .collect())
    }

    /// Reserves the payout for a delivered, paid sub-order.
    pub fn claim_settlement(
        &mut self,
        seller_id: &SellerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<SettlementClaim> {
        let order_number = self.order_number.clone();
        let paid = self.payment.is_completed();
        let sub = self.sub_order_mut(seller_id)?;

        if let Settlement::Transferred(record) = &sub.settlement {
            return Ok(SettlementClaim::AlreadyTransferred(record.clone()));
        }
        if sub.status != SubOrderStatus::Delivered {
            return Err(LedgerError::precondition(format!(
                "sub-order for seller {seller_id} is {}, settlement requires delivered",
                sub.status
            )));
        }
        if !paid {
            return Err(LedgerError::PaymentNotVerified(order_number.to_string()));
        }

        if let Settlement::InFlight {
            payout_key, amount, ..
        } = &sub.settlement
        {
            return Ok(SettlementClaim::Resume {
                payout_key: payout_key.clone(),
                amount: *amount,
            });
        }

        let key = payout_key(&order_number, seller_id);
        sub.settlement = Settlement::InFlight {
            payout_key: key.clone(),
            amount,
            claimed_at: at,
            attempts: sub.settlement.attempts() + 1,
        };
        Ok(SettlementClaim::Claimed {
            payout_key: key,
            amount,
        })
    }

    /// Records a payout the gateway has confirmed. A second confirmation is a no-op.
    pub fn complete_settlement(
        &mut self,
        seller_id: &SellerId,
        record: PayoutRecord,
    ) -> Result<Vec<DomainEvent>> {
        let order_number = self.order_number.clone();
        let sub = self.sub_order_mut(seller_id)?;
        if sub.settlement.is_transferred() {
            return Ok(Vec::new());
        }
        if sub.status != SubOrderStatus::Delivered {
            return Err(LedgerError::precondition(format!(
                "payout {} executed for a {} sub-order and needs manual reconciliation",
                record.reference, sub.status
            )));
        }
        let event = DomainEvent::ProfitTransferred {
            order_number,
            seller_id: seller_id.clone(),
            amount: record.amount,
            reference: record.reference.clone(),
            at: record.transferred_at,
        };
        sub.settlement = Settlement::Transferred(record);
        Ok(vec![event])
    }

    /// Drops an in-flight claim after a payout failure, keeping the error for review.
    pub fn release_settlement(&mut self, seller_id: &SellerId, error: &str) -> Result<bool> {
        let sub = self.sub_order_mut(seller_id)?;
        match &sub.settlement {
            Settlement::InFlight { attempts, .. } => {
                sub.settlement = Settlement::Unsettled {
                    attempts: *attempts,
                    last_error: Some(error.to_string()),
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Case-insensitive match over the denormalized snapshot fields.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        hit(self.order_number.as_str())
            || hit(&self.buyer.name)
            || hit(&self.buyer.email)
            || self.sub_orders.iter().any(|s| s.matches_text(&needle))
    }
}

impl SubOrder {
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&self.seller.name)
            || self.seller.shop_name.as_deref().is_some_and(hit)
            || self.tracking_number.as_deref().is_some_and(hit)
            || self.items.iter().any(|i| hit(&i.name) || hit(&i.gem_id))
    }
}

/// Outcome of reserving a payout.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementClaim {
    Claimed { payout_key: String, amount: Money },
    /// An earlier attempt left a claim behind; retry the gateway with the same key.
    Resume { payout_key: String, amount: Money },
    AlreadyTransferred(PayoutRecord),
}
