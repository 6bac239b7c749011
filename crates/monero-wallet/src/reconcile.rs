//! Reconciliation of two observations of the same entity.
//!
//! The same transaction can be seen through different RPC lenses (incoming
//! vs outgoing, confirmed vs pool). Merging them reconciles each scalar field:
//! a single defined value wins, equal values pass through, and unequal values
//! are resolved by a per-field [`ReconcilePolicy`] or rejected.

use crate::error::WalletError;
use std::collections::HashMap;
use std::fmt::Debug;

/// How to resolve two values that disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// When exactly one side is defined: `None`/`Some(true)` take it,
    /// `Some(false)` yields undefined.
    pub resolve_defined: Option<bool>,
    /// For booleans that differ: the value to keep.
    pub resolve_true: Option<bool>,
    /// For numbers that differ: `true` keeps the max, `false` the min.
    pub resolve_max: Option<bool>,
}

impl ReconcilePolicy {
    /// Differing booleans resolve to `value`.
    pub const fn prefer(value: bool) -> Self {
        Self {
            resolve_defined: None,
            resolve_true: Some(value),
            resolve_max: None,
        }
    }

    pub const fn max() -> Self {
        Self {
            resolve_defined: None,
            resolve_true: None,
            resolve_max: Some(true),
        }
    }

    pub const fn min() -> Self {
        Self {
            resolve_defined: None,
            resolve_true: None,
            resolve_max: Some(false),
        }
    }
}

/// Values that a policy can choose between when they differ.
pub trait Reconcilable: PartialEq + Clone + Debug {
    fn resolve(_a: &Self, _b: &Self, _policy: &ReconcilePolicy) -> Option<Self> {
        None
    }
}

impl Reconcilable for bool {
    fn resolve(_a: &Self, _b: &Self, policy: &ReconcilePolicy) -> Option<Self> {
        policy.resolve_true
    }
}

macro_rules! numeric_reconcilable {
    ($($ty:ty),*) => {
        $(impl Reconcilable for $ty {
            fn resolve(a: &Self, b: &Self, policy: &ReconcilePolicy) -> Option<Self> {
                policy.resolve_max.map(|max| if max { *a.max(b) } else { *a.min(b) })
            }
        })*
    };
}

numeric_reconcilable!(u32, u64, i64);

impl Reconcilable for String {}
impl<T: PartialEq + Clone + Debug> Reconcilable for Vec<T> {}

/// Reconcile two optional values of the field `field`.
pub fn reconcile<T: Reconcilable>(
    field: &str,
    a: Option<T>,
    b: Option<T>,
    policy: &ReconcilePolicy,
) -> Result<Option<T>, WalletError> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(v), None) | (None, Some(v)) => Ok(match policy.resolve_defined {
            Some(false) => None,
            _ => Some(v),
        }),
        (Some(a), Some(b)) if a == b => Ok(Some(a)),
        (Some(a), Some(b)) => T::resolve(&a, &b, policy).map(Some).ok_or_else(|| WalletError::Reconcile {
            field: field.to_string(),
            left: format!("{:?}", a),
            right: format!("{:?}", b),
        }),
    }
}

/// Reconcile two values that are always defined.
pub fn reconcile_value<T: Reconcilable>(field: &str, a: T, b: T, policy: &ReconcilePolicy) -> Result<T, WalletError> {
    let fallback = a.clone();
    Ok(reconcile(field, Some(a), Some(b), policy)?.unwrap_or(fallback))
}

/// Per-field policies consulted by [`Merge::merge_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRules {
    fields: HashMap<&'static str, ReconcilePolicy>,
}

impl MergeRules {
    /// No overrides: any disagreement is a [`WalletError::Reconcile`].
    pub fn strict() -> Self {
        Self { fields: HashMap::new() }
    }

    /// Set the policy for `field`, replacing any previous one.
    pub fn with(mut self, field: &'static str, policy: ReconcilePolicy) -> Self {
        self.fields.insert(field, policy);
        self
    }

    pub fn policy(&self, field: &str) -> ReconcilePolicy {
        self.fields.get(field).copied().unwrap_or_default()
    }
}

impl Default for MergeRules {
    /// Transactions only move forward: they become relayed and confirmed,
    /// leave the pool, and accumulate confirmations.
    fn default() -> Self {
        Self::strict()
            .with("is_confirmed", ReconcilePolicy::prefer(true))
            .with("is_relayed", ReconcilePolicy::prefer(true))
            .with("is_double_spend", ReconcilePolicy::prefer(true))
            .with("in_pool", ReconcilePolicy::prefer(false))
            .with("is_spent", ReconcilePolicy::prefer(true))
            .with("is_unlocked", ReconcilePolicy::prefer(true))
            .with("is_used", ReconcilePolicy::prefer(true))
            .with("num_confirmations", ReconcilePolicy::max())
            .with("height", ReconcilePolicy::max())
            .with("last_relayed_timestamp", ReconcilePolicy::max())
            .with("received_timestamp", ReconcilePolicy::min())
    }
}

/// Entities that can absorb another observation of themselves.
pub trait Merge: Sized + Clone {
    /// Fold `other` into `self` field by field. On error `self` may be
    /// partly merged; callers outside an enclosing merge use [`Merge::merge_with`].
    fn absorb(&mut self, other: Self, rules: &MergeRules) -> Result<(), WalletError>;

    /// Merge `other` into `self`. On a conflict `self` is left untouched.
    fn merge_with(&mut self, other: Self, rules: &MergeRules) -> Result<(), WalletError> {
        let mut merged = self.clone();
        merged.absorb(other, rules)?;
        *self = merged;
        Ok(())
    }

    fn merge(&mut self, other: Self) -> Result<(), WalletError> {
        self.merge_with(other, &MergeRules::default())
    }
}

/// Reconcile `$target.$field` with `$other.$field` under `$rules`.
macro_rules! merge_opt {
    ($target:ident, $other:ident, $rules:ident, $($field:ident),+ $(,)?) => {
        $(
            $target.$field = $crate::reconcile::reconcile(
                stringify!($field),
                $target.$field.take(),
                $other.$field,
                &$rules.policy(stringify!($field)),
            )?;
        )+
    };
}

pub(crate) use merge_opt;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defined_side_wins() {
        let p = ReconcilePolicy::default();
        assert_eq!(reconcile("fee", Some(5u64), None, &p).unwrap(), Some(5));
        assert_eq!(reconcile("fee", None, Some(5u64), &p).unwrap(), Some(5));
        assert_eq!(reconcile::<u64>("fee", None, None, &p).unwrap(), None);

        let drop = ReconcilePolicy { resolve_defined: Some(false), ..Default::default() };
        assert_eq!(reconcile("fee", Some(5u64), None, &drop).unwrap(), None);
    }

    #[test]
    fn test_equal_passes_unequal_fails() {
        let p = ReconcilePolicy::default();
        assert_eq!(reconcile("amount", Some(7u64), Some(7), &p).unwrap(), Some(7));
        let err = reconcile("amount", Some(7u64), Some(8), &p).unwrap_err();
        assert!(matches!(err, WalletError::Reconcile { ref field, .. } if field == "amount"));

        let err = reconcile("note", Some("a".to_string()), Some("b".to_string()), &ReconcilePolicy::max());
        assert!(err.is_err());
    }

    #[test]
    fn test_policies() {
        assert_eq!(reconcile("c", Some(false), Some(true), &ReconcilePolicy::prefer(true)).unwrap(), Some(true));
        assert_eq!(reconcile("p", Some(true), Some(false), &ReconcilePolicy::prefer(false)).unwrap(), Some(false));
        assert_eq!(reconcile("n", Some(3u64), Some(9), &ReconcilePolicy::max()).unwrap(), Some(9));
        assert_eq!(reconcile("t", Some(3u64), Some(9), &ReconcilePolicy::min()).unwrap(), Some(3));
        // A numeric policy does not apply to booleans.
        assert!(reconcile("b", Some(true), Some(false), &ReconcilePolicy::max()).is_err());
    }

    #[test]
    fn test_rules_override() {
        let rules = MergeRules::default();
        assert_eq!(rules.policy("in_pool"), ReconcilePolicy::prefer(false));
        assert_eq!(rules.policy("unknown"), ReconcilePolicy::default());

        let rules = rules.with("fee", ReconcilePolicy::max());
        assert_eq!(reconcile_value("fee", 1u64, 2, &rules.policy("fee")).unwrap(), 2);
        assert!(MergeRules::strict().policy("in_pool").resolve_true.is_none());
    }
}
