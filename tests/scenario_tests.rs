use gem_ledger::application::verification::GatewayCallback;
use gem_ledger::domain::ids::{OrderNumber, SellerId};
use gem_ledger::domain::money::Money;
use gem_ledger::domain::payment::{GatewayStatus, PaymentMethod, PaymentStatus, ReceiptRef, Verdict};
use gem_ledger::domain::status::{OrderStatus, SubOrderStatus};
use gem_ledger::error::LedgerError;
use rust_decimal_macros::dec;

mod common;
use common::*;

fn receipt(url: &str) -> ReceiptRef {
    ReceiptRef::new(url).unwrap()
}

#[tokio::test]
async fn test_two_seller_bank_transfer_lifecycle() {
    let mut h = Harness::new();
    h.payouts.register_account(SellerId::new(SELLER_A), "LK-ACC-A").await;
    let engine = &h.engine;

    let order = engine
        .place_order(two_seller_order("ORD-SCN-1", PaymentMethod::BankTransfer))
        .await
        .unwrap();
    let number = order.order_number.clone();
    assert_eq!(order.totals.total_amount, Money::new(dec!(150)));

    // 1. Receipt rejected: nothing moves, shipping refused
    engine
        .submit_receipt(&buyer(), &number, receipt("https://evidence/r1.pdf"))
        .await
        .unwrap();
    let payment = engine
        .verify_receipt(&admin(), &number, Verdict::Rejected, Some("amount does not match".into()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let order = h.order(&number).await;
    assert!(order.sub_orders.iter().all(|s| s.status == SubOrderStatus::Pending));
    let err = engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PaymentNotVerified(_)));

    // 2. Resubmitted and approved: both sub-orders paid
    engine
        .submit_receipt(&buyer(), &number, receipt("https://evidence/r2.pdf"))
        .await
        .unwrap();
    let payment = engine
        .verify_receipt(&admin(), &number, Verdict::Approved, None)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.verification_history.len(), 1);
    let order = h.order(&number).await;
    assert!(order.sub_orders.iter().all(|s| s.status == SubOrderStatus::Paid));
    assert!(order.confirmed_at.is_some());

    // 3. A ships; the order waits on B
    let order = engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);

    // 4. B ships
    let order = engine
        .mark_shipped(&seller(SELLER_B), &number, &shipment("TRK-B"))
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Shipped);
    assert!(order.shipped_at.is_some());

    // 5. Buyer confirms delivery
    let order = engine
        .confirm_delivery(&buyer(), &number, None)
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Delivered);
    assert!(order.delivered_at.is_some());

    // 6. Settlement for A happens once
    let first = engine
        .transfer_profit(&admin(), &number, &SellerId::new(SELLER_A))
        .await
        .unwrap();
    assert_eq!(first.amount, Money::new(dec!(100)));
    let retry = engine
        .transfer_profit(&admin(), &number, &SellerId::new(SELLER_A))
        .await
        .unwrap();
    assert_eq!(retry, first);
    assert_eq!(h.payouts.payout_count().await, 1);

    let order = h.order(&number).await;
    assert!(order.sub_order(&SellerId::new(SELLER_A)).unwrap().profit_transferred());
    assert!(!order.sub_order(&SellerId::new(SELLER_B)).unwrap().profit_transferred());

    let events = h.drain_events();
    for expected in [
        "OrderPlaced",
        "PaymentRejected",
        "PaymentVerified",
        "SubOrderShipped",
        "OrderDelivered",
        "ProfitTransferred",
    ] {
        assert!(events.contains(&expected), "missing {expected} in {events:?}");
    }
    assert_eq!(events.iter().filter(|e| **e == "ProfitTransferred").count(), 1);
}

#[tokio::test]
async fn test_verify_receipt_twice_yields_same_record() {
    let h = Harness::new();
    let number = h
        .engine
        .place_order(two_seller_order("ORD-VR-1", PaymentMethod::BankTransfer))
        .await
        .unwrap()
        .order_number;
    h.engine
        .submit_receipt(&buyer(), &number, receipt("https://evidence/r.pdf"))
        .await
        .unwrap();

    let first = h
        .engine
        .verify_receipt(&admin(), &number, Verdict::Approved, None)
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::minutes(5));
    let second = h
        .engine
        .verify_receipt(&admin(), &number, Verdict::Rejected, Some("double click".into()))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_shipping_refused_until_paid_for_every_method() {
    let h = Harness::new();
    for (i, method) in [
        PaymentMethod::Card,
        PaymentMethod::Paypal,
        PaymentMethod::Crypto,
        PaymentMethod::BankTransfer,
    ]
    .into_iter()
    .enumerate()
    {
        let number = h
            .engine
            .place_order(two_seller_order(&format!("ORD-M-{i}"), method))
            .await
            .unwrap()
            .order_number;
        let err = h
            .engine
            .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK"))
            .await
            .unwrap_err();
        assert!(err.is_precondition(), "{method}: {err}");
    }
}

#[tokio::test]
async fn test_failed_gateway_callback_then_success() {
    let mut h = Harness::new();
    let number = h
        .engine
        .place_order(two_seller_order("ORD-GW-1", PaymentMethod::Paypal))
        .await
        .unwrap()
        .order_number;

    let failed = GatewayCallback {
        order_number: number.clone(),
        transaction_id: "tx-declined".into(),
        status: GatewayStatus::Failed,
        method: PaymentMethod::Paypal,
    };
    let order = h.engine.record_gateway_result(&failed).await.unwrap();
    assert_eq!(order.payment.status, PaymentStatus::Failed);
    assert_eq!(order.status(), OrderStatus::Pending);

    let succeeded = GatewayCallback {
        transaction_id: "tx-ok".into(),
        status: GatewayStatus::Succeeded,
        ..failed
    };
    let order = h.engine.record_gateway_result(&succeeded).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);

    // Webhook redelivery
    let again = h.engine.record_gateway_result(&succeeded).await.unwrap();
    assert_eq!(again, order);
    assert_eq!(
        h.drain_events(),
        vec!["OrderPlaced", "PaymentRejected", "PaymentVerified"]
    );
}

#[tokio::test]
async fn test_bank_transfer_rejects_gateway_callbacks() {
    let h = Harness::new();
    let number = h
        .engine
        .place_order(two_seller_order("ORD-GW-2", PaymentMethod::BankTransfer))
        .await
        .unwrap()
        .order_number;
    let err = h
        .engine
        .record_gateway_result(&GatewayCallback {
            order_number: number,
            transaction_id: "tx".into(),
            status: GatewayStatus::Succeeded,
            method: PaymentMethod::BankTransfer,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Precondition(_)));
}

#[tokio::test]
async fn test_only_admins_verify_and_only_buyers_submit() {
    let h = Harness::new();
    let number = h
        .engine
        .place_order(two_seller_order("ORD-RG-1", PaymentMethod::BankTransfer))
        .await
        .unwrap()
        .order_number;

    assert!(matches!(
        h.engine
            .submit_receipt(&seller(SELLER_A), &number, receipt("https://e/r"))
            .await,
        Err(LedgerError::Forbidden(_))
    ));
    h.engine
        .submit_receipt(&buyer(), &number, receipt("https://e/r"))
        .await
        .unwrap();
    assert!(matches!(
        h.engine
            .verify_receipt(&buyer(), &number, Verdict::Approved, None)
            .await,
        Err(LedgerError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_processing_then_shipping_records_audit_trail() {
    let h = Harness::new();
    let number = place_paid_order(&h, "ORD-AUD-1").await;
    let a = SellerId::new(SELLER_A);

    let order = h.engine.start_processing(&seller(SELLER_A), &number).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.sub_order(&a).unwrap().status, SubOrderStatus::Processing);

    let order = h
        .engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap();
    let trail: Vec<(SubOrderStatus, SubOrderStatus)> = order
        .sub_order(&a)
        .unwrap()
        .history
        .iter()
        .map(|change| (change.from, change.to))
        .collect();
    assert_eq!(
        trail,
        vec![
            (SubOrderStatus::Pending, SubOrderStatus::Paid),
            (SubOrderStatus::Paid, SubOrderStatus::Processing),
            (SubOrderStatus::Processing, SubOrderStatus::Shipped),
        ]
    );
    assert_eq!(
        order.sub_order(&a).unwrap().history[2].by,
        seller(SELLER_A)
    );
}

#[tokio::test]
async fn test_partial_cancellation_and_refund() {
    let h = Harness::new();
    let number = place_paid_order(&h, "ORD-PC-1").await;

    h.engine
        .mark_shipped(&seller(SELLER_A), &number, &shipment("TRK-A"))
        .await
        .unwrap();
    let order = h
        .engine
        .cancel(&seller(SELLER_B), &number, None, "stone failed inspection")
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Partial(SubOrderStatus::Shipped));

    // Whole-order cancel is refused once something has shipped
    let err = h
        .engine
        .cancel(&buyer(), &number, None, "too slow")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Precondition(_)));

    assert!(matches!(
        h.engine
            .refund(&buyer(), &number, &SellerId::new(SELLER_A), "lost")
            .await,
        Err(LedgerError::Forbidden(_))
    ));
    let order = h
        .engine
        .refund(&admin(), &number, &SellerId::new(SELLER_A), "lost in transit")
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Closed);
    assert_eq!(order.payment.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_returned_sub_order_cannot_be_settled() {
    let h = Harness::new();
    h.payouts.register_account(SellerId::new(SELLER_B), "ACC-B").await;
    let number = place_delivered_order(&h, "ORD-RET-1").await;
    let b = SellerId::new(SELLER_B);

    let order = h
        .engine
        .mark_returned(&admin(), &number, &b, "buyer returned the ruby")
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Partial(SubOrderStatus::Delivered));

    let err = h.engine.transfer_profit(&admin(), &number, &b).await.unwrap_err();
    assert!(matches!(err, LedgerError::Precondition(_)));
    assert_eq!(h.payouts.payout_count().await, 0);
}

#[tokio::test]
async fn test_unknown_order_and_seller_are_not_found() {
    let h = Harness::new();
    let err = h
        .engine
        .mark_shipped(&seller(SELLER_A), &OrderNumber::new("ORD-NOPE"), &shipment("T"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let number = place_paid_order(&h, "ORD-NF-1").await;
    let err = h
        .engine
        .mark_shipped(&seller("seller-z"), &number, &shipment("T"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_oversized_checkout_is_rejected_without_a_write() {
    use gem_ledger::application::commands::Command;
    use gem_ledger::domain::money::UnitPrice;
    use rust_decimal::Decimal;

    let h = Harness::new();
    let mut order = two_seller_order("ORD-BIG-1", PaymentMethod::Card);
    order.sub_orders[0].items[0].unit_price = UnitPrice::new(Decimal::MAX).unwrap();
    order.sub_orders[0].items[0].quantity = 2;

    let err = h
        .engine
        .execute(Command::PlaceOrder { order })
        .await
        .unwrap_err();
    assert!(matches!(&err, LedgerError::Validation(msg) if msg == "amount overflow"), "{err}");
    assert!(h.engine.all_orders().await.unwrap().is_empty());

    // The engine keeps serving after the rejected checkout
    h.engine
        .place_order(two_seller_order("ORD-BIG-1", PaymentMethod::Card))
        .await
        .unwrap();
}
