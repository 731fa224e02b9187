use super::engine::OrderEngine;
use crate::domain::actor::Actor;
use crate::domain::ids::{OrderNumber, SellerId};
use crate::domain::money::Money;
use crate::domain::order::{SettlementClaim, SubOrder};
use crate::domain::ports::PayoutRequest;
use crate::domain::settlement::PayoutRecord;
use crate::domain::status::SubOrderStatus;
use crate::error::{LedgerError, Result};
use tracing::{error, info, warn};

/// One sub-order the settlement sweep could not pay out.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementFailure {
    pub order_number: OrderNumber,
    pub seller_id: SellerId,
    pub error: String,
}

/// Outcome of a `settle_eligible` sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub transferred: Vec<PayoutRecord>,
    pub already_transferred: usize,
    pub failed: Vec<SettlementFailure>,
}

impl OrderEngine {
    /// What the seller receives: the sub-order total less commission on the item subtotal.
    pub fn payout_amount(&self, sub: &SubOrder) -> Money {
        sub.total_amount - sub.subtotal.portion(self.config.commission_rate)
    }

    /// Releases the seller's profit for a delivered, paid sub-order.
    ///
    /// The claim is committed before the payout gateway is called, and the gateway is
    /// handed a key derived from the order and seller. A concurrent or repeated call
    /// therefore reaches the gateway with the same key and ends with the one payout
    /// that was made, which is returned.
    pub async fn transfer_profit(
        &self,
        actor: &Actor,
        number: &OrderNumber,
        seller_id: &SellerId,
    ) -> Result<PayoutRecord> {
        actor.require_admin_or_system()?;

        let mut claim = None;
        self.transact(number, "claim_settlement", |order| {
            let sub = order.sub_order(seller_id).ok_or_else(|| {
                LedgerError::not_found(format!(
                    "order {number} has no sub-order for seller {seller_id}"
                ))
            })?;
            let amount = self.payout_amount(sub);
            claim = Some(order.claim_settlement(seller_id, amount, self.clock.now())?);
            Ok(Vec::new())
        })
        .await?;

        let (payout_key, amount) = match claim {
            Some(SettlementClaim::AlreadyTransferred(record)) => {
                info!(
                    order_number = %number,
                    seller_id = %seller_id,
                    reference = %record.reference,
                    "profit already transferred"
                );
                return Ok(record);
            }
            Some(SettlementClaim::Claimed { payout_key, amount })
            | Some(SettlementClaim::Resume { payout_key, amount }) => (payout_key, amount),
            None => {
                return Err(LedgerError::Internal(
                    "settlement claim was not evaluated".into(),
                ));
            }
        };

        let destination = match self.payouts.destination(seller_id).await {
            Ok(Some(destination)) => destination,
            Ok(None) => {
                return Err(self
                    .abandon_claim(number, seller_id, "payout account not configured".into())
                    .await);
            }
            Err(err) => return Err(self.abandon_claim(number, seller_id, reason(err)).await),
        };

        let request = PayoutRequest {
            payout_key: payout_key.clone(),
            seller_id: seller_id.clone(),
            destination,
            amount,
        };
        let receipt = match self.payouts.transfer(request).await {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.abandon_claim(number, seller_id, reason(err)).await),
        };

        let record = PayoutRecord {
            reference: receipt.reference,
            payout_key,
            amount,
            transferred_at: self.clock.now(),
        };
        let committed = self
            .transact(number, "complete_settlement", |order| {
                order.complete_settlement(seller_id, record.clone())
            })
            .await
            .inspect_err(|err| {
                error!(
                    order_number = %number,
                    seller_id = %seller_id,
                    reference = %record.reference,
                    error = %err,
                    "payout executed but could not be recorded"
                )
            })?;

        committed
            .order
            .data
            .sub_order(seller_id)
            .and_then(|sub| sub.settlement.payout())
            .cloned()
            .ok_or_else(|| LedgerError::Internal("payout record missing after commit".into()))
    }

    /// Returns the claim to `Unsettled` and builds the error to surface.
    async fn abandon_claim(
        &self,
        number: &OrderNumber,
        seller_id: &SellerId,
        message: String,
    ) -> LedgerError {
        warn!(order_number = %number, seller_id = %seller_id, error = %message, "payout failed");
        let released = self
            .transact(number, "release_settlement", |order| {
                order.release_settlement(seller_id, &message)?;
                Ok(Vec::new())
            })
            .await;
        if let Err(err) = released {
            error!(
                order_number = %number,
                seller_id = %seller_id,
                error = %err,
                "could not release settlement claim"
            );
        }
        LedgerError::PayoutFailed(message)
    }

    /// Runs `transfer_profit` for every delivered, paid sub-order not yet settled.
    ///
    /// Failures are collected in the report, never propagated, so one missing payout
    /// account does not block other sellers.
    pub async fn settle_eligible(&self, actor: &Actor) -> Result<SettlementReport> {
        actor.require_admin_or_system()?;
        let mut report = SettlementReport::default();

        for order in self.ledger.all().await? {
            if !order.payment.is_completed() {
                continue;
            }
            for sub in order
                .sub_orders
                .iter()
                .filter(|s| s.status == SubOrderStatus::Delivered)
            {
                if sub.settlement.is_transferred() {
                    report.already_transferred += 1;
                    continue;
                }
                match self
                    .transfer_profit(actor, &order.order_number, &sub.seller_id)
                    .await
                {
                    Ok(record) => report.transferred.push(record),
                    Err(err) => report.failed.push(SettlementFailure {
                        order_number: order.order_number.clone(),
                        seller_id: sub.seller_id.clone(),
                        error: reason(err),
                    }),
                }
            }
        }

        info!(
            transferred = report.transferred.len(),
            already_transferred = report.already_transferred,
            failed = report.failed.len(),
            "settlement sweep finished"
        );
        Ok(report)
    }
}

fn reason(err: LedgerError) -> String {
    match err {
        LedgerError::PayoutFailed(message) => message,
        other => other.to_string(),
    }
}
