use thiserror::Error;

/// Errors surfaced by the ledger.
///
/// `Validation` and `Precondition` are raised before any write. `Conflict` is
/// transient and retried by the engine up to the configured bound.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("payment for order {0} has not been verified")]
    PaymentNotVerified(String),
    #[error("order {order_number} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        order_number: String,
        expected: u64,
        actual: u64,
    },
    #[error("payout failed: {0}")]
    PayoutFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shipping before payment verification is a precondition failure with its own variant.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::PaymentNotVerified(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
