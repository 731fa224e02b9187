use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct SubOrderRow<'a> {
    order_number: &'a str,
    seller: &'a str,
    sub_status: &'static str,
    order_status: String,
    payment_status: &'static str,
    total: String,
    profit_transferred: bool,
    payout_reference: &'a str,
}

/// Writes one CSV row per sub-order.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes every sub-order of `orders` in the given order and flushes.
    pub fn write_orders<'a, I>(&mut self, orders: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Order>,
    {
        for order in orders {
            let order_status = order.status().to_string();
            for sub in &order.sub_orders {
                self.writer.serialize(SubOrderRow {
                    order_number: order.order_number.as_str(),
                    seller: sub.seller_id.as_str(),
                    sub_status: sub.status.as_str(),
                    order_status: order_status.clone(),
                    payment_status: order.payment.status.as_str(),
                    total: format!("{:.2}", sub.total_amount.value()),
                    profit_transferred: sub.profit_transferred(),
                    payout_reference: sub
                        .settlement
                        .payout()
                        .map(|p| p.reference.as_str())
                        .unwrap_or(""),
                })?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{BuyerId, OrderNumber, SellerId};
    use crate::domain::money::{Money, UnitPrice};
    use crate::domain::order::{
        BuyerSnapshot, NewOrder, NewOrderItem, NewSubOrder, OrderTotals, SellerSnapshot,
        ShippingAddress,
    };
    use crate::domain::payment::PaymentMethod;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writer_one_row_per_sub_order() {
        let new = NewOrder {
            order_number: Some(OrderNumber::new("ORD-W1")),
            buyer_id: BuyerId::new("b1"),
            buyer: BuyerSnapshot {
                name: "Buyer".into(),
                email: "b@example.com".into(),
                phone: None,
            },
            shipping_address: ShippingAddress {
                recipient: "Buyer".into(),
                line1: "1 Road".into(),
                line2: None,
                city: "Kandy".into(),
                region: None,
                postal_code: "20000".into(),
                country: "LK".into(),
            },
            shipping_method: "standard".into(),
            estimated_delivery: None,
            payment_method: PaymentMethod::Card,
            transaction_id: None,
            sub_orders: ["s1", "s2"]
                .into_iter()
                .map(|seller| NewSubOrder {
                    seller_id: SellerId::new(seller),
                    seller: SellerSnapshot {
                        name: seller.into(),
                        shop_name: None,
                    },
                    items: vec![NewOrderItem {
                        gem_id: "g".into(),
                        name: "Topaz".into(),
                        quantity: 1,
                        unit_price: UnitPrice::new(dec!(12.5)).unwrap(),
                    }],
                    shipping_cost: Money::ZERO,
                })
                .collect(),
            totals: OrderTotals {
                subtotal: Money::new(dec!(25)),
                total_shipping: Money::ZERO,
                total_amount: Money::new(dec!(25)),
            },
        };
        let (order, _) = Order::place(new, Utc::now()).unwrap();

        let mut out = Vec::new();
        OrderWriter::new(&mut out).write_orders([&order]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "order_number,seller,sub_status,order_status,payment_status,total,profit_transferred,payout_reference"
        );
        assert_eq!(lines[1], "ORD-W1,s1,pending,pending,pending,12.50,false,");
        assert_eq!(lines.len(), 3);
    }
}
