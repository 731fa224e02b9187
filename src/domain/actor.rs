use super::ids::{AdminId, BuyerId, SellerId};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is invoking an operation. Authentication happens upstream; the ledger only
/// enforces what each role may touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    Buyer(BuyerId),
    Seller(SellerId),
    Admin(AdminId),
    /// Scheduled jobs: delivery auto-confirmation and the settlement sweep.
    System,
}

impl Actor {
    pub fn require_admin(&self) -> Result<&AdminId> {
        match self {
            Actor::Admin(admin) => Ok(admin),
            other => Err(LedgerError::Forbidden(format!(
                "{other} may not perform admin operations"
            ))),
        }
    }

    pub fn require_admin_or_system(&self) -> Result<()> {
        match self {
            Actor::Admin(_) | Actor::System => Ok(()),
            other => Err(LedgerError::Forbidden(format!(
                "{other} may not trigger settlement"
            ))),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Buyer(id) => write!(f, "buyer:{id}"),
            Actor::Seller(id) => write!(f, "seller:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}
