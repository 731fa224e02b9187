#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use gem_ledger::application::engine::OrderEngine;
use gem_ledger::application::projection::OrderView;
use gem_ledger::config::LedgerConfig;
use gem_ledger::domain::actor::Actor;
use gem_ledger::domain::events::DomainEvent;
use gem_ledger::domain::ids::{AdminId, BuyerId, OrderNumber, SellerId};
use gem_ledger::domain::money::{Money, UnitPrice};
use gem_ledger::domain::order::{
    BuyerSnapshot, NewOrder, NewOrderItem, NewSubOrder, Order, OrderTotals, SellerSnapshot,
    ShippingAddress, Shipment,
};
use gem_ledger::domain::payment::PaymentMethod;
use gem_ledger::domain::ports::OrderStoreBox;
use gem_ledger::infrastructure::clock::ManualClock;
use gem_ledger::infrastructure::events::BroadcastPublisher;
use gem_ledger::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPayoutGateway};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const SELLER_A: &str = "seller-a";
pub const SELLER_B: &str = "seller-b";
pub const BUYER: &str = "buyer-1";

/// An engine wired to in-memory adapters, with handles on the adapters for assertions.
pub struct Harness {
    pub engine: Arc<OrderEngine>,
    pub payouts: InMemoryPayoutGateway,
    pub clock: ManualClock,
    pub events: broadcast::Receiver<DomainEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self::with_gateway(config, InMemoryPayoutGateway::new())
    }

    pub fn with_gateway(config: LedgerConfig, payouts: InMemoryPayoutGateway) -> Self {
        Self::build(config, Box::new(InMemoryOrderStore::new()), payouts)
    }

    pub fn with_store(config: LedgerConfig, store: OrderStoreBox) -> Self {
        Self::build(config, store, InMemoryPayoutGateway::new())
    }

    fn build(config: LedgerConfig, store: OrderStoreBox, payouts: InMemoryPayoutGateway) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let publisher = BroadcastPublisher::new(256);
        let events = publisher.subscribe();
        let engine = OrderEngine::new(
            store,
            Box::new(payouts.clone()),
            Box::new(publisher),
            Box::new(clock.clone()),
            config,
        )
        .unwrap();
        Self {
            engine: Arc::new(engine),
            payouts,
            clock,
            events,
        }
    }

    /// The stored order as an admin sees it.
    pub async fn order(&self, number: &OrderNumber) -> Order {
        match self.engine.order_for(&admin(), number).await.unwrap() {
            OrderView::Full(order) => order,
            other => panic!("admin received a restricted view: {other:?}"),
        }
    }

    /// Names of the events published so far, in order.
    pub fn drain_events(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            names.push(event.name());
        }
        names
    }
}

pub fn buyer() -> Actor {
    Actor::Buyer(BuyerId::new(BUYER))
}

pub fn seller(id: &str) -> Actor {
    Actor::Seller(SellerId::new(id))
}

pub fn admin() -> Actor {
    Actor::Admin(AdminId::new("admin-1"))
}

pub fn shipment(tracking: &str) -> Shipment {
    Shipment {
        tracking_number: tracking.into(),
        courier: "DHL".into(),
        estimated_delivery: None,
    }
}

fn sub_order(seller_id: &str, gem: &str, quantity: u32, price: Money, shipping: Money) -> NewSubOrder {
    NewSubOrder {
        seller_id: SellerId::new(seller_id),
        seller: SellerSnapshot {
            name: format!("{seller_id} trading"),
            shop_name: Some(format!("{gem} house")),
        },
        items: vec![NewOrderItem {
            gem_id: format!("{gem}-1"),
            name: gem.to_string(),
            quantity,
            unit_price: UnitPrice::new(price.value()).unwrap(),
        }],
        shipping_cost: shipping,
    }
}

/// Seller A: 2 × 45 + 10 shipping = 100. Seller B: 45 + 5 shipping = 50.
pub fn two_seller_order(number: &str, method: PaymentMethod) -> NewOrder {
    NewOrder {
        order_number: Some(OrderNumber::new(number)),
        buyer_id: BuyerId::new(BUYER),
        buyer: BuyerSnapshot {
            name: "Nimali Perera".into(),
            email: "nimali@example.com".into(),
            phone: Some("+94 77 000 0000".into()),
        },
        shipping_address: ShippingAddress {
            recipient: "Nimali Perera".into(),
            line1: "12 Temple Road".into(),
            line2: None,
            city: "Kandy".into(),
            region: Some("Central".into()),
            postal_code: "20000".into(),
            country: "LK".into(),
        },
        shipping_method: "standard".into(),
        estimated_delivery: None,
        payment_method: method,
        transaction_id: None,
        sub_orders: vec![
            sub_order(SELLER_A, "Sapphire", 2, Money::new(dec!(45)), Money::new(dec!(10))),
            sub_order(SELLER_B, "Ruby", 1, Money::new(dec!(45)), Money::new(dec!(5))),
        ],
        totals: OrderTotals {
            subtotal: Money::new(dec!(135)),
            total_shipping: Money::new(dec!(15)),
            total_amount: Money::new(dec!(150)),
        },
    }
}

/// A single-seller order with arbitrary line items, used by randomized tests.
pub fn single_seller_order(number: &str, seller_id: &str, lines: &[(u32, Money)], shipping: Money) -> NewOrder {
    let items: Vec<NewOrderItem> = lines
        .iter()
        .enumerate()
        .map(|(i, (quantity, price))| NewOrderItem {
            gem_id: format!("gem-{i}"),
            name: format!("Gem {i}"),
            quantity: *quantity,
            unit_price: UnitPrice::new(price.value()).unwrap(),
        })
        .collect();
    let subtotal: Money = lines.iter().map(|(q, p)| p.checked_times(*q).unwrap()).sum();
    let mut order = two_seller_order(number, PaymentMethod::Card);
    order.sub_orders = vec![NewSubOrder {
        seller_id: SellerId::new(seller_id),
        seller: SellerSnapshot {
            name: seller_id.to_string(),
            shop_name: None,
        },
        items,
        shipping_cost: shipping,
    }];
    order.totals = OrderTotals {
        subtotal,
        total_shipping: shipping,
        total_amount: subtotal + shipping,
    };
    order
}

/// Places a card order and confirms it through the gateway.
pub async fn place_paid_order(harness: &Harness, number: &str) -> OrderNumber {
    use gem_ledger::application::verification::GatewayCallback;
    use gem_ledger::domain::payment::GatewayStatus;

    let order = harness
        .engine
        .place_order(two_seller_order(number, PaymentMethod::Card))
        .await
        .unwrap();
    harness
        .engine
        .record_gateway_result(&GatewayCallback {
            order_number: order.order_number.clone(),
            transaction_id: format!("tx-{number}"),
            status: GatewayStatus::Succeeded,
            method: PaymentMethod::Card,
        })
        .await
        .unwrap();
    order.order_number
}

/// Places, pays, ships and delivers both sub-orders.
pub async fn place_delivered_order(harness: &Harness, number: &str) -> OrderNumber {
    let number = place_paid_order(harness, number).await;
    for id in [SELLER_A, SELLER_B] {
        harness
            .engine
            .mark_shipped(&seller(id), &number, &shipment(&format!("TRK-{id}")))
            .await
            .unwrap();
    }
    harness
        .engine
        .confirm_delivery(&buyer(), &number, None)
        .await
        .unwrap();
    number
}
