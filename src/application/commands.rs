use super::engine::OrderEngine;
use super::verification::GatewayCallback;
use crate::domain::actor::Actor;
use crate::domain::ids::{OrderNumber, SellerId};
use crate::domain::order::{NewOrder, Shipment};
use crate::domain::payment::{ReceiptRef, Verdict};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One externally submitted operation, as read from a command stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    PlaceOrder {
        order: NewOrder,
    },
    GatewayCallback(GatewayCallback),
    SubmitReceipt {
        actor: Actor,
        order_number: OrderNumber,
        receipt: ReceiptRef,
    },
    VerifyReceipt {
        actor: Actor,
        order_number: OrderNumber,
        verdict: Verdict,
        #[serde(default)]
        reason: Option<String>,
    },
    StartProcessing {
        actor: Actor,
        order_number: OrderNumber,
    },
    MarkShipped {
        actor: Actor,
        order_number: OrderNumber,
        #[serde(flatten)]
        shipment: Shipment,
    },
    ConfirmDelivery {
        actor: Actor,
        order_number: OrderNumber,
        #[serde(default)]
        seller_id: Option<SellerId>,
    },
    AutoConfirm,
    Cancel {
        actor: Actor,
        order_number: OrderNumber,
        #[serde(default)]
        seller_id: Option<SellerId>,
        reason: String,
    },
    Refund {
        actor: Actor,
        order_number: OrderNumber,
        seller_id: SellerId,
        reason: String,
    },
    MarkReturned {
        actor: Actor,
        order_number: OrderNumber,
        seller_id: SellerId,
        reason: String,
    },
    TransferProfit {
        actor: Actor,
        order_number: OrderNumber,
        seller_id: SellerId,
    },
    SettleEligible {
        actor: Actor,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlaceOrder { .. } => "place_order",
            Command::GatewayCallback(_) => "gateway_callback",
            Command::SubmitReceipt { .. } => "submit_receipt",
            Command::VerifyReceipt { .. } => "verify_receipt",
            Command::StartProcessing { .. } => "start_processing",
            Command::MarkShipped { .. } => "mark_shipped",
            Command::ConfirmDelivery { .. } => "confirm_delivery",
            Command::AutoConfirm => "auto_confirm",
            Command::Cancel { .. } => "cancel",
            Command::Refund { .. } => "refund",
            Command::MarkReturned { .. } => "mark_returned",
            Command::TransferProfit { .. } => "transfer_profit",
            Command::SettleEligible { .. } => "settle_eligible",
        }
    }
}

impl OrderEngine {
    /// Dispatches a command to the matching engine operation.
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::PlaceOrder { order } => {
                self.place_order(order).await?;
            }
            Command::GatewayCallback(callback) => {
                self.record_gateway_result(&callback).await?;
            }
            Command::SubmitReceipt {
                actor,
                order_number,
                receipt,
            } => {
                self.submit_receipt(&actor, &order_number, receipt).await?;
            }
            Command::VerifyReceipt {
                actor,
                order_number,
                verdict,
                reason,
            } => {
                self.verify_receipt(&actor, &order_number, verdict, reason)
                    .await?;
            }
            Command::StartProcessing {
                actor,
                order_number,
            } => {
                self.start_processing(&actor, &order_number).await?;
            }
            Command::MarkShipped {
                actor,
                order_number,
                shipment,
            } => {
                self.mark_shipped(&actor, &order_number, &shipment).await?;
            }
            Command::ConfirmDelivery {
                actor,
                order_number,
                seller_id,
            } => {
                self.confirm_delivery(&actor, &order_number, seller_id.as_ref())
                    .await?;
            }
            Command::AutoConfirm => {
                self.confirm_overdue_deliveries().await?;
            }
            Command::Cancel {
                actor,
                order_number,
                seller_id,
                reason,
            } => {
                self.cancel(&actor, &order_number, seller_id.as_ref(), &reason)
                    .await?;
            }
            Command::Refund {
                actor,
                order_number,
                seller_id,
                reason,
            } => {
                self.refund(&actor, &order_number, &seller_id, &reason).await?;
            }
            Command::MarkReturned {
                actor,
                order_number,
                seller_id,
                reason,
            } => {
                self.mark_returned(&actor, &order_number, &seller_id, &reason)
                    .await?;
            }
            Command::TransferProfit {
                actor,
                order_number,
                seller_id,
            } => {
                let record = self
                    .transfer_profit(&actor, &order_number, &seller_id)
                    .await?;
                info!(
                    order_number = %order_number,
                    seller_id = %seller_id,
                    reference = %record.reference,
                    amount = %record.amount,
                    "profit transferred"
                );
            }
            Command::SettleEligible { actor } => {
                self.settle_eligible(&actor).await?;
            }
        }
        Ok(())
    }
}
