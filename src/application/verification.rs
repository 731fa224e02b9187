use super::engine::{OrderEngine, ensure_buyer};
use crate::domain::actor::Actor;
use crate::domain::ids::OrderNumber;
use crate::domain::order::Order;
use crate::domain::payment::{GatewayStatus, PaymentMethod, PaymentRecord, ReceiptRef, Verdict};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Webhook payload reported by the payment gateway for an instant method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub order_number: OrderNumber,
    pub transaction_id: String,
    pub status: GatewayStatus,
    pub method: PaymentMethod,
}

impl OrderEngine {
    /// Records a gateway webhook. Redelivery of the same callback is a no-op.
    pub async fn record_gateway_result(&self, callback: &GatewayCallback) -> Result<Order> {
        let committed = self
            .transact(&callback.order_number, "record_gateway_result", |order| {
                order.record_gateway_result(
                    callback.method,
                    &callback.transaction_id,
                    callback.status,
                    self.clock.now(),
                )
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Buyer attaches a bank-transfer receipt, queueing the payment for review.
    pub async fn submit_receipt(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        receipt: ReceiptRef,
    ) -> Result<Order> {
        let Actor::Buyer(buyer) = actor else {
            return Err(LedgerError::Forbidden(format!(
                "{actor} may not submit payment receipts"
            )));
        };
        let committed = self
            .transact(number, "submit_receipt", |order| {
                ensure_buyer(order, buyer)?;
                order.submit_receipt(receipt.clone(), self.clock.now())?;
                Ok(Vec::new())
            })
            .await?;
        Ok(committed.order.data)
    }

    /// Admin ruling on a submitted receipt.
    ///
    /// Approval pays every pending sub-order. Once a receipt has been ruled on, later
    /// calls return the recorded payment unchanged.
    pub async fn verify_receipt(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        verdict: Verdict,
        reason: Option<String>,
    ) -> Result<PaymentRecord> {
        let admin = actor.require_admin()?;
        let committed = self
            .transact(number, "verify_receipt", |order| {
                order.verify_receipt(verdict, admin, reason.clone(), self.clock.now())
            })
            .await?;
        Ok(committed.order.data.payment)
    }
}
