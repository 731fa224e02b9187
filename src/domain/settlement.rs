use super::ids::{OrderNumber, SellerId};
use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof of a completed seller payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub reference: String,
    pub payout_key: String,
    pub amount: Money,
    pub transferred_at: DateTime<Utc>,
}

/// Where a sub-order stands in the one-time profit release.
///
/// `InFlight` is written before the payout gateway is called, so a concurrent or
/// retried caller finds the claim and reuses its key instead of starting a new payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    Unsettled {
        attempts: u32,
        last_error: Option<String>,
    },
    InFlight {
        payout_key: String,
        amount: Money,
        claimed_at: DateTime<Utc>,
        attempts: u32,
    },
    Transferred(PayoutRecord),
}

impl Default for Settlement {
    fn default() -> Self {
        Settlement::Unsettled {
            attempts: 0,
            last_error: None,
        }
    }
}

impl Settlement {
    pub fn is_transferred(&self) -> bool {
        matches!(self, Settlement::Transferred(_))
    }

    pub fn payout(&self) -> Option<&PayoutRecord> {
        match self {
            Settlement::Transferred(record) => Some(record),
            _ => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Settlement::Unsettled { attempts, .. } | Settlement::InFlight { attempts, .. } => {
                *attempts
            }
            Settlement::Transferred(_) => 0,
        }
    }
}

/// Idempotency key handed to the payout gateway; stable across retries.
pub fn payout_key(order_number: &OrderNumber, seller_id: &SellerId) -> String {
    format!("{order_number}/{seller_id}")
}
