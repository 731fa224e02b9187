use crate::error::{LedgerError, Result};
use chrono::Duration;
use rust_decimal::Decimal;

/// Longest accepted auto-confirm window.
pub const MAX_AUTO_CONFIRM_DAYS: i64 = 3650;

/// Tunables for the order engine.
///
/// | Field | Default |
/// |-------|---------|
/// | `auto_confirm_after` | 14 days |
/// | `max_conflict_retries` | 5 |
/// | `commission_rate` | 0 |
/// | `default_page_size` | 20 |
/// | `max_page_size` | 100 |
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Shipped sub-orders with no buyer confirmation are delivered after this window.
    pub auto_confirm_after: Duration,
    /// How many times a transition is re-run against fresh state after a version conflict.
    pub max_conflict_retries: u32,
    /// Platform share withheld from each sub-order's item subtotal at payout.
    pub commission_rate: Decimal,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            auto_confirm_after: Duration::days(14),
            max_conflict_retries: 5,
            commission_rate: Decimal::ZERO,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl LedgerConfig {
    /// Day counts beyond what `Duration` can hold saturate and are rejected by `validate`.
    pub fn with_auto_confirm_days(mut self, days: i64) -> Self {
        self.auto_confirm_after = Duration::try_days(days).unwrap_or(if days < 0 {
            Duration::MIN
        } else {
            Duration::MAX
        });
        self
    }

    pub fn with_commission_rate(mut self, rate: Decimal) -> Self {
        self.commission_rate = rate;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_confirm_after <= Duration::zero() {
            return Err(LedgerError::validation(
                "auto-confirm window must be positive",
            ));
        }
        if self.auto_confirm_after > Duration::days(MAX_AUTO_CONFIRM_DAYS) {
            return Err(LedgerError::validation(format!(
                "auto-confirm window must not exceed {MAX_AUTO_CONFIRM_DAYS} days"
            )));
        }
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(LedgerError::validation(
                "commission rate must be in [0, 1)",
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(LedgerError::validation(
                "default page size must be between 1 and the max page size",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LedgerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = LedgerConfig::default().with_commission_rate(dec!(1));
        assert!(matches!(config.validate(), Err(LedgerError::Validation(_))));

        let config = LedgerConfig::default().with_auto_confirm_days(0);
        assert!(config.validate().is_err());

        let config = LedgerConfig::default().with_auto_confirm_days(MAX_AUTO_CONFIRM_DAYS);
        assert!(config.validate().is_ok());
        for days in [MAX_AUTO_CONFIRM_DAYS + 1, 100_000_000, i64::MAX, i64::MIN] {
            let config = LedgerConfig::default().with_auto_confirm_days(days);
            assert!(
                matches!(config.validate(), Err(LedgerError::Validation(_))),
                "{days} days accepted"
            );
        }

        let config = LedgerConfig {
            default_page_size: 500,
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
