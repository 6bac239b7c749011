//! Wallet outputs and key images.

use crate::error::WalletError;
use crate::reconcile::{merge_opt, reconcile_value, Merge, MergeRules};
use serde::{Deserialize, Serialize};

/// A key image, optionally with the signature proving ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyImage {
    pub hex: String,
    pub signature: Option<String>,
}

impl KeyImage {
    pub fn new(hex: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            signature: None,
        }
    }
}

/// Result of importing signed key images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyImageImportResult {
    pub height: u64,
    pub spent_amount: u64,
    pub unspent_amount: u64,
}

/// Identity of an output within the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputKey {
    KeyImage(String),
    Position(String, u32),
}

/// An output received by the wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub tx_id: String,
    pub account_index: u32,
    pub subaddress_index: u32,
    pub amount: u64,
    pub key_image: Option<KeyImage>,
    pub is_spent: Option<bool>,
    pub is_frozen: Option<bool>,
    pub is_unlocked: Option<bool>,
    pub stealth_public_key: Option<String>,
    /// Global output index on chain.
    pub global_index: Option<u64>,
    /// Position of the output within its transaction.
    pub index_in_tx: Option<u32>,
}

impl Output {
    /// Key image when known, else `(tx_id, index_in_tx)`.
    pub fn key(&self) -> OutputKey {
        match &self.key_image {
            Some(ki) if !ki.hex.is_empty() => OutputKey::KeyImage(ki.hex.clone()),
            _ => OutputKey::Position(self.tx_id.clone(), self.index_in_tx.unwrap_or(0)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.is_spent != Some(true) && self.is_frozen != Some(true) && self.is_unlocked == Some(true)
    }
}

impl Merge for Output {
    fn absorb(&mut self, mut other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        if self.tx_id.is_empty() {
            self.tx_id = std::mem::take(&mut other.tx_id);
        }
        self.account_index = reconcile_value(
            "account_index",
            self.account_index,
            other.account_index,
            &rules.policy("account_index"),
        )?;
        self.subaddress_index = reconcile_value(
            "subaddress_index",
            self.subaddress_index,
            other.subaddress_index,
            &rules.policy("subaddress_index"),
        )?;
        self.amount = reconcile_value("amount", self.amount, other.amount, &rules.policy("amount"))?;
        self.key_image = match (self.key_image.take(), other.key_image.take()) {
            (Some(mut mine), Some(theirs)) => {
                if mine.hex != theirs.hex {
                    return Err(WalletError::Reconcile {
                        field: "key_image".into(),
                        left: mine.hex,
                        right: theirs.hex,
                    });
                }
                if mine.signature.is_none() {
                    mine.signature = theirs.signature;
                }
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };
        merge_opt!(
            self,
            other,
            rules,
            is_spent,
            is_frozen,
            is_unlocked,
            stealth_public_key,
            global_index,
            index_in_tx,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(index: u32) -> Output {
        Output {
            tx_id: "ab".repeat(32),
            amount: 1_000,
            index_in_tx: Some(index),
            ..Default::default()
        }
    }

    #[test]
    fn test_key_prefers_key_image() {
        let mut o = output(1);
        assert_eq!(o.key(), OutputKey::Position("ab".repeat(32), 1));
        o.key_image = Some(KeyImage::new("ff"));
        assert_eq!(o.key(), OutputKey::KeyImage("ff".into()));
    }

    #[test]
    fn test_merge_spent_is_sticky() {
        let mut a = Output { is_spent: Some(false), ..output(0) };
        let b = Output {
            is_spent: Some(true),
            key_image: Some(KeyImage::new("ff")),
            global_index: Some(42),
            ..output(0)
        };
        a.merge(b).unwrap();
        assert_eq!(a.is_spent, Some(true));
        assert_eq!(a.global_index, Some(42));
        assert_eq!(a.key_image.unwrap().hex, "ff");
    }

    #[test]
    fn test_merge_amount_conflict() {
        let mut a = output(0);
        let b = Output { amount: 2_000, ..output(0) };
        assert!(matches!(a.merge(b), Err(WalletError::Reconcile { .. })));
    }

    #[test]
    fn test_available() {
        let mut o = Output { is_unlocked: Some(true), ..output(0) };
        assert!(o.is_available());
        o.is_frozen = Some(true);
        assert!(!o.is_available());
    }
}
