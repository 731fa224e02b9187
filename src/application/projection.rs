//! Read-side views over the ledger.
//!
//! Every view is built from the denormalized snapshots stored on the order itself;
//! nothing here looks up live buyer or seller profiles.

use super::engine::OrderEngine;
use crate::domain::actor::Actor;
use crate::domain::ids::{OrderNumber, SellerId};
use crate::domain::money::Money;
use crate::domain::order::{
    BuyerSnapshot, Order, OrderItem, OrderTotals, SellerSnapshot, ShippingAddress,
    ShippingDetails, StatusChange, SubOrder,
};
use crate::domain::payment::{PaymentMethod, PaymentRecord, PaymentStatus};
use crate::domain::status::{OrderStatus, SubOrderStatus};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filters and paging for `list_orders`.
///
/// For seller views `status` is matched against the seller's own sub-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderQuery {
    /// 1-based.
    pub page: usize,
    /// Falls back to the configured default and is capped at the configured maximum.
    pub per_page: Option<usize>,
    pub status: Option<OrderStatus>,
    /// Inclusive.
    pub placed_from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub placed_to: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub sort: SortOrder,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: None,
            status: None,
            placed_from: None,
            placed_to: None,
            text: None,
            sort: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// What a seller sees of an order: their own sub-order plus the context needed to
/// fulfil it. Other sellers' items and payment instrument details are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellerOrderView {
    pub order_number: OrderNumber,
    pub placed_at: DateTime<Utc>,
    pub buyer_name: String,
    pub ship_to: ShippingAddress,
    pub shipping_method: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub sub_order: SubOrder,
}

impl SellerOrderView {
    fn from_order(order: &Order, seller_id: &SellerId) -> Option<Self> {
        let sub_order = order.sub_order(seller_id)?.clone();
        Some(Self {
            order_number: order.order_number.clone(),
            placed_at: order.placed_at,
            buyer_name: order.buyer.name.clone(),
            ship_to: order.shipping.address.clone(),
            shipping_method: order.shipping.method.clone(),
            payment_method: order.payment.method,
            payment_status: order.payment.status,
            sub_order,
        })
    }

    fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.order_number.as_str().to_lowercase().contains(&needle)
            || self.buyer_name.to_lowercase().contains(&needle)
            || self.sub_order.matches_text(&needle)
    }
}

/// A sub-order as the buyer sees it. Seller settlement is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyerSubOrderView {
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
    pub history: Vec<StatusChange>,
}

impl From<&SubOrder> for BuyerSubOrderView {
    fn from(sub: &SubOrder) -> Self {
        Self {
            seller_id: sub.seller_id.clone(),
            seller: sub.seller.clone(),
            items: sub.items.clone(),
            subtotal: sub.subtotal,
            shipping_cost: sub.shipping_cost,
            total_amount: sub.total_amount,
            status: sub.status,
            tracking_number: sub.tracking_number.clone(),
            courier: sub.courier.clone(),
            estimated_delivery: sub.estimated_delivery,
            shipped_at: sub.shipped_at,
            delivered_at: sub.delivered_at,
            history: sub.history.clone(),
        }
    }
}

/// The buyer's own order, without seller payout details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyerOrderView {
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub buyer: BuyerSnapshot,
    pub payment: PaymentRecord,
    pub shipping: ShippingDetails,
    pub totals: OrderTotals,
    pub placed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub sub_orders: Vec<BuyerSubOrderView>,
}

impl From<&Order> for BuyerOrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number.clone(),
            status: order.status(),
            buyer: order.buyer.clone(),
            payment: order.payment.clone(),
            shipping: order.shipping.clone(),
            totals: order.totals,
            placed_at: order.placed_at,
            confirmed_at: order.confirmed_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            sub_orders: order.sub_orders.iter().map(BuyerSubOrderView::from).collect(),
        }
    }
}

impl BuyerOrderView {
    fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        hit(self.order_number.as_str())
            || hit(&self.buyer.name)
            || hit(&self.buyer.email)
            || self.sub_orders.iter().any(|sub| {
                hit(&sub.seller.name)
                    || sub.seller.shop_name.as_deref().is_some_and(hit)
                    || sub.tracking_number.as_deref().is_some_and(hit)
                    || sub.items.iter().any(|i| hit(&i.name) || hit(&i.gem_id))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum OrderView {
    Full(Order),
    Buyer(BuyerOrderView),
    Seller(SellerOrderView),
}

impl OrderView {
    pub fn order_number(&self) -> &OrderNumber {
        match self {
            OrderView::Full(order) => &order.order_number,
            OrderView::Buyer(view) => &view.order_number,
            OrderView::Seller(view) => &view.order_number,
        }
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        match self {
            OrderView::Full(order) => order.placed_at,
            OrderView::Buyer(view) => view.placed_at,
            OrderView::Seller(view) => view.placed_at,
        }
    }

    /// Order-level status for full and buyer views, the seller's own status for seller views.
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderView::Full(order) => order.status(),
            OrderView::Buyer(view) => view.status,
            OrderView::Seller(view) => view.sub_order.status.into(),
        }
    }

    fn matches_text(&self, needle: &str) -> bool {
        match self {
            OrderView::Full(order) => order.matches_text(needle),
            OrderView::Buyer(view) => view.matches_text(needle),
            OrderView::Seller(view) => view.matches_text(needle),
        }
    }
}

/// Projects `order` for `actor`, or `None` if the actor has no share in it.
fn view_for(actor: &Actor, order: &Order) -> Option<OrderView> {
    match actor {
        Actor::Buyer(buyer) if &order.buyer_id == buyer => Some(OrderView::Buyer(order.into())),
        Actor::Buyer(_) => None,
        Actor::Seller(seller) => SellerOrderView::from_order(order, seller).map(OrderView::Seller),
        Actor::Admin(_) | Actor::System => Some(OrderView::Full(order.clone())),
    }
}

impl OrderQuery {
    fn matches(&self, view: &OrderView) -> bool {
        let placed_at = view.placed_at();
        self.placed_from.is_none_or(|from| placed_at >= from)
            && self.placed_to.is_none_or(|to| placed_at < to)
            && self.status.is_none_or(|status| view.status() == status)
            && self
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .is_none_or(|text| view.matches_text(text))
    }
}

impl OrderEngine {
    /// Lists the orders visible to `actor`, filtered, sorted and paginated.
    pub async fn list_orders(&self, actor: &Actor, query: &OrderQuery) -> Result<Page<OrderView>> {
        if query.page == 0 {
            return Err(LedgerError::validation("page numbers start at 1"));
        }
        let per_page = query
            .per_page
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);

        let mut views: Vec<OrderView> = self
            .ledger
            .all()
            .await?
            .iter()
            .filter_map(|order| view_for(actor, order))
            .filter(|view| query.matches(view))
            .collect();

        match query.sort {
            SortOrder::NewestFirst => {
                views.sort_by_key(|v| (Reverse(v.placed_at()), v.order_number().clone()))
            }
            SortOrder::OldestFirst => {
                views.sort_by_key(|v| (v.placed_at(), v.order_number().clone()))
            }
        }

        let total_items = views.len();
        let total_pages = total_items.div_ceil(per_page);
        let items = views
            .into_iter()
            .skip((query.page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(Page {
            items,
            page: query.page,
            per_page,
            total_items,
            total_pages,
        })
    }

    /// A single order as `actor` may see it. Orders outside the actor's scope are
    /// reported as missing.
    pub async fn order_for(&self, actor: &Actor, number: &OrderNumber) -> Result<OrderView> {
        let order = self.ledger.get(number).await?.data;
        view_for(actor, &order).ok_or_else(|| LedgerError::not_found(format!("order {number}")))
    }

    /// Bank-transfer payments waiting on an admin, oldest receipt first.
    pub async fn verification_queue(&self, actor: &Actor) -> Result<Vec<Order>> {
        actor.require_admin()?;
        let mut queue: Vec<Order> = self
            .ledger
            .all()
            .await?
            .into_iter()
            .filter(|order| {
                order.payment.method == PaymentMethod::BankTransfer
                    && order.payment.status == PaymentStatus::Processing
            })
            .collect();
        queue.sort_by_key(|order| (order.payment.receipt_submitted_at, order.placed_at));
        Ok(queue)
    }

    /// Every order, unfiltered, ordered by order number. Used for reporting.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        let mut orders = self.ledger.all().await?;
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        Ok(orders)
    }
}
