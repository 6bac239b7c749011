//! Results of transaction and reserve proof checks.

use serde::{Deserialize, Serialize};

/// Outcome of checking a tx key or tx proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTx {
    pub is_good: bool,
    pub num_confirmations: Option<u64>,
    pub in_pool: Option<bool>,
    pub amount_received: Option<u64>,
}

impl CheckTx {
    pub fn bad() -> Self {
        Self::default()
    }

    pub fn good(num_confirmations: u64, in_pool: bool, amount_received: u64) -> Self {
        Self {
            is_good: true,
            num_confirmations: Some(num_confirmations),
            in_pool: Some(in_pool),
            amount_received: Some(amount_received),
        }
    }
}

/// Outcome of checking a reserve proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReserve {
    pub is_good: bool,
    pub amount_total: Option<u64>,
    pub amount_spent: Option<u64>,
}

impl CheckReserve {
    pub fn bad() -> Self {
        Self::default()
    }

    pub fn good(amount_total: u64, amount_spent: u64) -> Self {
        Self {
            is_good: true,
            amount_total: Some(amount_total),
            amount_spent: Some(amount_spent),
        }
    }

    /// Proven amount not yet spent.
    pub fn unspent(&self) -> Option<u64> {
        Some(self.amount_total?.saturating_sub(self.amount_spent?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_check_has_no_details() {
        let c = CheckTx::bad();
        assert!(!c.is_good);
        assert!(c.num_confirmations.is_none() && c.in_pool.is_none() && c.amount_received.is_none());
        assert_eq!(CheckReserve::bad().unspent(), None);
    }

    #[test]
    fn test_reserve_unspent() {
        assert_eq!(CheckReserve::good(10, 4).unspent(), Some(6));
    }
}
