//! Quorum arithmetic used by the consistency gate.

use std::collections::BTreeSet;
use std::sync::Arc;

/// A set of nodes against which a group of responders can be judged a
/// quorum.
pub trait QuorumSet<Id: 'static> {
    /// Check if a series of ids constitutes a quorum in this set.
    fn is_quorum<'a, I: Iterator<Item = &'a Id> + Clone>(&self, ids: I) -> bool;
}

impl<Id: 'static, T: QuorumSet<Id>> QuorumSet<Id> for Arc<T> {
    fn is_quorum<'a, I: Iterator<Item = &'a Id> + Clone>(&self, ids: I) -> bool {
        self.as_ref().is_quorum(ids)
    }
}

/// Simple majority over a fixed member set.
///
/// Ids outside the member set are ignored rather than counted, so a stale
/// responder list cannot manufacture a quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Majority<Id>
where Id: Ord
{
    members: BTreeSet<Id>,
}

impl<Id> Majority<Id>
where Id: Ord
{
    pub fn new(members: BTreeSet<Id>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &BTreeSet<Id> {
        &self.members
    }
}

impl<Id> QuorumSet<Id> for Majority<Id>
where Id: Ord + 'static
{
    fn is_quorum<'a, I: Iterator<Item = &'a Id> + Clone>(&self, ids: I) -> bool {
        let granted = ids.filter(|id| self.members.contains(id)).count();
        granted * 2 > self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;

    use super::Majority;
    use super::QuorumSet;

    #[test]
    fn test_majority() {
        let m = Majority::new(btreeset! {1u64, 2, 3});

        assert!(!m.is_quorum([].iter()));
        assert!(!m.is_quorum([1u64].iter()));
        assert!(m.is_quorum([1u64, 2].iter()));
        assert!(m.is_quorum([1u64, 2, 3].iter()));

        // Unknown responders do not count toward the quorum.
        assert!(!m.is_quorum([1u64, 9].iter()));
    }

    #[test]
    fn test_even_member_count_needs_strict_majority() {
        let m = Majority::new(btreeset! {1u64, 2, 3, 4});

        assert!(!m.is_quorum([1u64, 2].iter()));
        assert!(m.is_quorum([1u64, 2, 3].iter()));
    }
}
