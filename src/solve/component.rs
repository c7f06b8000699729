//! Components: the tree of strongly connected evaluation scopes.
//!
//! A fresh tabled call opens a component below the current one. When a
//! call reaches a variant that is still being evaluated in an ancestor,
//! every component on the path up to that ancestor is merged into it:
//! they turn out to be one SCC. A component completes once its
//! worklists are drained and all of its children are terminal.

use crate::errors::*;
use crate::solve::worklist::WorklistIndex;
use crate::store::VariantId;
use std::fmt::Debug;

arena_index! {
    /// Handle to a component in a `Session`.
    ComponentIndex, "component"
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SccStatus {
    Active,
    Merged,
    Completed,
}

/// How negative conditions inside the component are resolved at
/// completion. Ordered: merging keeps the strongest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegStatus {
    /// No negative nodes.
    None,
    /// Negative waiters were resumed with the literal delayed.
    Delay,
    /// Conditional answers survived completion and were simplified.
    Simplify,
}

/// An ordered set of handles with fallible growth.
#[derive(Clone, Debug)]
pub struct HandleSet<I> {
    members: Vec<I>,
}

pub type WorklistSet = HandleSet<WorklistIndex>;
pub type ComponentSet = HandleSet<ComponentIndex>;

impl<I: Copy + PartialEq + Debug> HandleSet<I> {
    pub fn new() -> Self {
        HandleSet { members: vec![] }
    }

    /// Adds `member` unless present; returns whether it was added.
    pub fn insert(&mut self, member: I) -> Result<bool> {
        if self.members.contains(&member) {
            return Ok(false);
        }
        try_push(&mut self.members, member, "handle set")?;
        Ok(true)
    }

    /// Moves every member of `other` into `self`. On failure `self` is
    /// unchanged and `other` keeps its members.
    pub fn absorb(&mut self, other: &mut HandleSet<I>) -> Result<()> {
        self.members
            .try_reserve(other.members.len())
            .map_err(|_| ErrorKind::OutOfMemory("handle set"))?;
        for member in other.members.drain(..) {
            if !self.members.contains(&member) {
                self.members.push(member);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, member: I) -> bool {
        match self.members.iter().position(|&m| m == member) {
            Some(pos) => {
                self.members.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the oldest member.
    pub fn pop_front(&mut self) -> Option<I> {
        if self.members.is_empty() {
            None
        } else {
            Some(self.members.remove(0))
        }
    }

    pub fn contains(&self, member: I) -> bool {
        self.members.contains(&member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        self.members.iter().cloned()
    }

    pub fn to_vec(&self) -> Vec<I> {
        self.members.clone()
    }
}

impl<I: Copy + PartialEq + Debug> Default for HandleSet<I> {
    fn default() -> Self {
        HandleSet::new()
    }
}

pub struct Component {
    pub(crate) status: SccStatus,
    pub(crate) neg_status: NegStatus,
    /// Answers settled by the simplification pass.
    pub(crate) simplifications: usize,
    /// Non-owning back reference; the parent owns us through `children`.
    pub(crate) parent: Option<ComponentIndex>,
    pub(crate) children: ComponentSet,
    pub(crate) merged: ComponentSet,
    /// Worklists with pending work, in scheduling order.
    pub(crate) worklist: WorklistSet,
    /// Every worklist that belongs to this component.
    pub(crate) created_worklists: WorklistSet,
    /// Worklists holding conditional answers.
    pub(crate) delay_worklists: WorklistSet,
    /// The variant whose call opened the component.
    pub(crate) leader: Option<VariantId>,
}

impl Component {
    pub(crate) fn new(parent: Option<ComponentIndex>, leader: Option<VariantId>) -> Self {
        Component {
            status: SccStatus::Active,
            neg_status: NegStatus::None,
            simplifications: 0,
            parent,
            children: ComponentSet::new(),
            merged: ComponentSet::new(),
            worklist: WorklistSet::new(),
            created_worklists: WorklistSet::new(),
            delay_worklists: WorklistSet::new(),
            leader,
        }
    }

    pub fn status(&self) -> SccStatus {
        self.status
    }

    pub fn neg_status(&self) -> NegStatus {
        self.neg_status
    }

    pub fn simplifications(&self) -> usize {
        self.simplifications
    }

    pub fn parent(&self) -> Option<ComponentIndex> {
        self.parent
    }

    pub fn leader(&self) -> Option<VariantId> {
        self.leader
    }

    pub fn children(&self) -> &ComponentSet {
        &self.children
    }

    pub fn merged(&self) -> &ComponentSet {
        &self.merged
    }

    pub fn worklists(&self) -> &WorklistSet {
        &self.created_worklists
    }

    pub fn delay_worklists(&self) -> &WorklistSet {
        &self.delay_worklists
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SccStatus::Active
    }

    /// Moves the status forward. `Merged` and `Completed` are terminal;
    /// any other transition is a scheduling error.
    pub fn transition(&mut self, status: SccStatus) -> Result<()> {
        match (self.status, status) {
            (SccStatus::Active, SccStatus::Merged) | (SccStatus::Active, SccStatus::Completed) => {
                self.status = status;
                Ok(())
            }
            (from, to) => bail!(ErrorKind::Scheduling(format!(
                "component status cannot move from {:?} to {:?}",
                from, to
            ))),
        }
    }

    pub(crate) fn raise_neg_status(&mut self, neg_status: NegStatus) {
        self.neg_status = self.neg_status.max(neg_status);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        let mut component = Component::new(None, None);
        component.transition(SccStatus::Completed).unwrap();

        let err = component.transition(SccStatus::Active).unwrap_err();
        assert!(err.is_fatal());
        assert!(component.transition(SccStatus::Merged).is_err());
        assert_eq!(component.status(), SccStatus::Completed);
    }

    #[test]
    fn merged_is_terminal() {
        let mut component = Component::new(None, None);
        component.transition(SccStatus::Merged).unwrap();
        assert!(component.is_terminal());
        assert!(component.transition(SccStatus::Completed).is_err());
    }

    #[test]
    fn neg_status_keeps_the_strongest() {
        let mut component = Component::new(None, None);
        component.raise_neg_status(NegStatus::Simplify);
        component.raise_neg_status(NegStatus::Delay);
        assert_eq!(component.neg_status(), NegStatus::Simplify);
    }

    #[test]
    fn handle_set_absorbs_without_duplicates() {
        use crate::arena::ArenaIndex;

        let a = ComponentIndex::new(0, 0);
        let b = ComponentIndex::new(1, 0);
        let mut left = ComponentSet::new();
        let mut right = ComponentSet::new();
        left.insert(a).unwrap();
        right.insert(a).unwrap();
        right.insert(b).unwrap();
        assert!(!right.insert(b).unwrap());

        left.absorb(&mut right).unwrap();
        assert_eq!(left.to_vec(), vec![a, b]);
        assert!(right.is_empty());
    }
}
