use super::ids::AdminId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Paypal,
    Crypto,
    BankTransfer,
}

impl PaymentMethod {
    /// Instant methods are settled by the gateway; bank transfers need an admin.
    pub fn is_instant(self) -> bool {
        !matches!(self, PaymentMethod::BankTransfer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Crypto => "crypto",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a receipt held by the evidence store. The ledger never sees the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptRef(String);

impl ReceiptRef {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
            return Err(LedgerError::validation(
                "receipt reference must be a non-empty URL",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReceiptRef {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ReceiptRef> for String {
    fn from(receipt: ReceiptRef) -> Self {
        receipt.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

/// An admin's ruling on one submitted receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub verdict: Verdict,
    pub decided_by: AdminId,
    pub decided_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub receipt: ReceiptRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Succeeded,
    Failed,
}

/// Payment state tracked against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt: Option<ReceiptRef>,
    pub receipt_submitted_at: Option<DateTime<Utc>>,
    /// Ruling on the current receipt, if one was made.
    pub decision: Option<VerificationDecision>,
    /// Rulings on earlier receipts that were superseded by a resubmission.
    #[serde(default)]
    pub verification_history: Vec<VerificationDecision>,
}

impl PaymentRecord {
    pub fn new(method: PaymentMethod, transaction_id: Option<String>) -> Self {
        Self {
            method,
            status: PaymentStatus::Pending,
            transaction_id,
            paid_at: None,
            receipt: None,
            receipt_submitted_at: None,
            decision: None,
            verification_history: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Records a gateway callback for an instant method.
    ///
    /// Returns `false` when the callback repeats what is already recorded.
    pub fn record_gateway_result(
        &mut self,
        method: PaymentMethod,
        transaction_id: &str,
        result: GatewayStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if !self.method.is_instant() {
            return Err(LedgerError::precondition(format!(
                "{} payments are verified manually",
                self.method
            )));
        }
        if method != self.method {
            return Err(LedgerError::validation(format!(
                "callback method {method} does not match order method {}",
                self.method
            )));
        }
        if transaction_id.trim().is_empty() {
            return Err(LedgerError::validation("transaction id is required"));
        }

        let same_tx = self.transaction_id.as_deref() == Some(transaction_id);
        match (self.status, result) {
            (PaymentStatus::Completed, GatewayStatus::Succeeded) if same_tx => Ok(false),
            (PaymentStatus::Failed, GatewayStatus::Failed) if same_tx => Ok(false),
            (PaymentStatus::Completed, _) => Err(LedgerError::precondition(format!(
                "payment already completed by transaction {}",
                self.transaction_id.as_deref().unwrap_or("-")
            ))),
            (PaymentStatus::Refunded, _) => {
                Err(LedgerError::precondition("payment has been refunded"))
            }
            (_, GatewayStatus::Succeeded) => {
                self.status = PaymentStatus::Completed;
                self.transaction_id = Some(transaction_id.to_string());
                self.paid_at = Some(at);
                Ok(true)
            }
            (_, GatewayStatus::Failed) => {
                self.status = PaymentStatus::Failed;
                self.transaction_id = Some(transaction_id.to_string());
                Ok(true)
            }
        }
    }

    /// Attaches a bank-transfer receipt and queues it for verification.
    pub fn submit_receipt(&mut self, receipt: ReceiptRef, at: DateTime<Utc>) -> Result<bool> {
        if self.method != PaymentMethod::BankTransfer {
            return Err(LedgerError::precondition(format!(
                "receipts are only accepted for bank transfers, not {}",
                self.method
            )));
        }
        match self.status {
            PaymentStatus::Processing if self.receipt.as_ref() == Some(&receipt) => Ok(false),
            PaymentStatus::Processing => {
                self.receipt = Some(receipt);
                self.receipt_submitted_at = Some(at);
                Ok(true)
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {
                if let Some(previous) = self.decision.take() {
                    self.verification_history.push(previous);
                }
                self.receipt = Some(receipt);
                self.receipt_submitted_at = Some(at);
                self.status = PaymentStatus::Processing;
                Ok(true)
            }
            PaymentStatus::Completed | PaymentStatus::Refunded => Err(LedgerError::precondition(
                format!("payment is already {}", self.status),
            )),
        }
    }

    /// Applies an admin ruling to the pending receipt.
    ///
    /// Once a receipt has been ruled on, further calls leave the record untouched
    /// and return `false`, whatever verdict they carry.
    pub fn decide(
        &mut self,
        verdict: Verdict,
        admin: &AdminId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if self.method != PaymentMethod::BankTransfer {
            return Err(LedgerError::precondition(format!(
                "{} payments are not verified manually",
                self.method
            )));
        }
        if self.decision.is_some() {
            return Ok(false);
        }
        let receipt = match (&self.receipt, self.status) {
            (Some(receipt), PaymentStatus::Processing) => receipt.clone(),
            _ => {
                return Err(LedgerError::precondition(
                    "no receipt is awaiting verification",
                ));
            }
        };
        let reason = reason.filter(|r| !r.trim().is_empty());
        if verdict == Verdict::Rejected && reason.is_none() {
            return Err(LedgerError::validation("a rejection requires a reason"));
        }

        self.status = match verdict {
            Verdict::Approved => {
                self.paid_at = Some(at);
                PaymentStatus::Completed
            }
            Verdict::Rejected => PaymentStatus::Failed,
        };
        self.decision = Some(VerificationDecision {
            verdict,
            decided_by: admin.clone(),
            decided_at: at,
            reason,
            receipt,
        });
        Ok(true)
    }
}
