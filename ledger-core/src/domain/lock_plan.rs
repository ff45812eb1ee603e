//! Lock ordering policy
//!
//! Any unit of work that touches more than one account acquires the row
//! locks in strictly ascending id order. Two operations over the same set of
//! accounts therefore always request locks in the same global order and can
//! never wait on each other in a cycle.

use super::AccountId;

/// Sorted, de-duplicated acquisition order for a set of account rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPlan {
    ids: Vec<AccountId>,
}

impl LockPlan {
    pub fn new(ids: impl IntoIterator<Item = AccountId>) -> Self {
        let mut ids: Vec<AccountId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Plan for the two sides of a transfer (one row for a self-transfer)
    pub fn for_transfer(from: AccountId, to: AccountId) -> Self {
        Self::new([from, to])
    }

    /// Ids in acquisition order
    pub fn ids(&self) -> &[AccountId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_is_ascending() {
        let plan = LockPlan::new([42, 7, 19]);
        assert_eq!(plan.ids(), &[7, 19, 42]);
    }

    #[test]
    fn test_crossing_transfers_share_an_order() {
        let a_to_b = LockPlan::for_transfer(5, 2);
        let b_to_a = LockPlan::for_transfer(2, 5);
        assert_eq!(a_to_b, b_to_a);
        assert_eq!(a_to_b.ids(), &[2, 5]);
    }

    #[test]
    fn test_self_transfer_locks_once() {
        let plan = LockPlan::for_transfer(3, 3);
        assert_eq!(plan.len(), 1);
        assert!(plan.contains(3));
        assert!(!plan.contains(4));
    }
}
