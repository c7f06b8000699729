//! The incremental dependency graph.
//!
//! One node per tabled variant (and per dynamic base predicate). An
//! edge `parent -> child` means `parent`'s table was computed by calling
//! `child`. Invalidating a node bumps `falsecount` on it and on
//! everything that transitively depends on it, once per wave. Bringing
//! a node back up to date is pull-based (`refresh`): dependencies first,
//! and a node whose dependencies all came back with the same answers is
//! settled without being re-run.

use crate::arena::Arena;
use crate::errors::*;
use crate::store::VariantId;
use std::collections::{HashMap, HashSet, VecDeque};

arena_index! {
    IdgIndex, "idg node"
}

#[derive(Clone, Debug)]
pub struct IdgNode {
    variant: VariantId,
    /// Nodes that depend on this one.
    affected: HashSet<IdgIndex>,
    /// Nodes this one depends on.
    dependent: HashSet<IdgIndex>,
    /// Answers at the last stable state.
    answer_count: usize,
    new_answer: bool,
    reevaluating: bool,
    /// Pending invalidations; zero means valid.
    falsecount: usize,
    /// Last wave that visited this node.
    wave: u64,
    /// Invalidated directly rather than through a dependency; must be
    /// re-run.
    stale: bool,
    /// Epoch of the last reevaluation that changed the answers.
    changed_at: u64,
    /// Epoch at which the node was last known valid.
    validated_at: u64,
}

impl IdgNode {
    fn new(variant: VariantId) -> Self {
        IdgNode {
            variant,
            affected: HashSet::new(),
            dependent: HashSet::new(),
            answer_count: 0,
            new_answer: false,
            reevaluating: false,
            falsecount: 0,
            wave: 0,
            stale: false,
            changed_at: 0,
            validated_at: 0,
        }
    }

    pub fn variant(&self) -> VariantId {
        self.variant
    }

    pub fn answer_count(&self) -> usize {
        self.answer_count
    }

    pub fn new_answer(&self) -> bool {
        self.new_answer
    }

    pub fn is_reevaluating(&self) -> bool {
        self.reevaluating
    }

    pub fn falsecount(&self) -> usize {
        self.falsecount
    }

    pub fn is_invalid(&self) -> bool {
        self.falsecount > 0
    }
}

/// Result of re-running one node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reevaluation {
    pub answer_count: usize,
    /// Some answer was not present before.
    pub new_answer: bool,
}

/// What `refresh` needs from whoever owns the tables.
pub trait Reevaluate {
    fn idg(&mut self) -> &mut Idg;

    /// Recomputes the table of `variant` from scratch.
    fn reevaluate(&mut self, variant: VariantId) -> Result<Reevaluation>;
}

#[derive(Default)]
pub struct Idg {
    nodes: Arena<IdgIndex, IdgNode>,
    by_variant: HashMap<VariantId, IdgIndex>,
    wave: u64,
    epoch: u64,
}

impl Idg {
    pub fn new() -> Self {
        Idg::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup(&self, variant: VariantId) -> Option<IdgIndex> {
        self.by_variant.get(&variant).cloned()
    }

    pub fn get(&self, variant: VariantId) -> Option<&IdgNode> {
        self.lookup(variant).map(|index| &self.nodes[index])
    }

    pub fn is_invalid(&self, variant: VariantId) -> bool {
        self.get(variant).map_or(false, IdgNode::is_invalid)
    }

    /// The node for `variant`, created on first use.
    pub fn node(&mut self, variant: VariantId) -> Result<IdgIndex> {
        if let Some(index) = self.lookup(variant) {
            return Ok(index);
        }
        self.by_variant.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("idg index"))?;
        let index = self.nodes.insert(IdgNode::new(variant))?;
        self.by_variant.insert(variant, index);
        Ok(index)
    }

    /// Records that `parent` depends on `child`. Returns false if the
    /// edge was already there.
    pub fn record_edge(&mut self, parent: VariantId, child: VariantId) -> Result<bool> {
        if parent == child {
            return Ok(false);
        }
        let parent = self.node(parent)?;
        let child = self.node(child)?;
        if self.nodes[parent].dependent.contains(&child) {
            return Ok(false);
        }

        self.nodes[parent].dependent.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("idg edges"))?;
        self.nodes[child].affected.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("idg edges"))?;
        self.nodes[parent].dependent.insert(child);
        self.nodes[child].affected.insert(parent);
        Ok(true)
    }

    pub fn dependencies(&self, variant: VariantId) -> Vec<VariantId> {
        self.neighbours(variant, |node| &node.dependent)
    }

    pub fn affected(&self, variant: VariantId) -> Vec<VariantId> {
        self.neighbours(variant, |node| &node.affected)
    }

    fn neighbours<F>(&self, variant: VariantId, edges: F) -> Vec<VariantId>
    where
        F: Fn(&IdgNode) -> &HashSet<IdgIndex>,
    {
        let mut result: Vec<VariantId> = match self.get(variant) {
            Some(node) => edges(node).iter().map(|&index| self.nodes[index].variant).collect(),
            None => vec![],
        };
        result.sort();
        result
    }

    /// Starts an invalidation wave at `variant`. Every node reachable
    /// through `affected` has its `falsecount` bumped exactly once.
    /// Returns the variants visited, origin first.
    pub fn invalidate(&mut self, variant: VariantId) -> Result<Vec<VariantId>> {
        debug_heading!("invalidate({:?})", variant);
        let origin = self.node(variant)?;
        self.nodes[origin].stale = true;
        Ok(self.wave_from(vec![origin], &[]))
    }

    /// Bumps every node reachable from `roots`, except those in
    /// `exclude`.
    fn wave_from(&mut self, roots: Vec<IdgIndex>, exclude: &[IdgIndex]) -> Vec<VariantId> {
        self.wave += 1;
        let wave = self.wave;
        for &index in exclude {
            self.nodes[index].wave = wave;
        }

        let mut visited = vec![];
        let mut queue: VecDeque<IdgIndex> = roots.into_iter().collect();
        while let Some(index) = queue.pop_front() {
            let node = &mut self.nodes[index];
            if node.wave == wave {
                continue;
            }
            node.wave = wave;
            node.falsecount += 1;
            debug!("{:?} falsecount = {}", node.variant, node.falsecount);
            visited.push(node.variant);
            queue.extend(node.affected.iter().cloned());
        }
        visited
    }

    /// Notes that `variant`'s table just completed with `answer_count`
    /// answers. The node is valid from here on. If the count moved,
    /// everything depending on it is invalidated.
    pub fn complete(&mut self, variant: VariantId, answer_count: usize) -> Result<()> {
        self.complete_all(&[(variant, answer_count)])
    }

    /// `complete` for every table of one SCC at once. Members are
    /// validated together, so a changed member never invalidates a
    /// sibling computed in the same fixpoint.
    pub fn complete_all(&mut self, completed: &[(VariantId, usize)]) -> Result<()> {
        let mut members = vec![];
        for &(variant, answer_count) in completed {
            let index = self.node(variant)?;
            let node = &mut self.nodes[index];
            if node.reevaluating {
                // `finish_reevaluation` owns the comparison.
                continue;
            }
            // A first completion is not a change anybody could have seen.
            let first = node.validated_at == 0;
            let changed = !first && node.answer_count != answer_count;
            node.new_answer = answer_count > node.answer_count;
            node.answer_count = answer_count;
            try_push(&mut members, (index, changed), "idg members")?;
        }
        self.validate(&members);
        Ok(())
    }

    pub fn begin_reevaluation(&mut self, variant: VariantId) -> Result<()> {
        let index = self.node(variant)?;
        self.nodes[index].reevaluating = true;
        Ok(())
    }

    pub fn abort_reevaluation(&mut self, variant: VariantId) {
        if let Some(index) = self.lookup(variant) {
            self.nodes[index].reevaluating = false;
        }
    }

    /// Compares the outcome of a reevaluation with the snapshot. Returns
    /// whether the answers changed. Unchanged answers settle the
    /// dependents whose only reason to be invalid was this node.
    pub fn finish_reevaluation(&mut self, variant: VariantId, result: Reevaluation) -> Result<bool> {
        let index = self.node(variant)?;
        let node = &mut self.nodes[index];
        let changed = result.new_answer || result.answer_count != node.answer_count;
        debug!("reevaluated {:?}: {} -> {} answers, changed = {}", variant, node.answer_count, result.answer_count, changed);
        node.reevaluating = false;
        node.new_answer = result.new_answer;
        node.answer_count = result.answer_count;
        self.validate(&[(index, changed)]);
        Ok(changed)
    }

    /// Marks `members` valid. Valid nodes depending on a changed member
    /// are invalidated; dependents of unchanged members are settled if
    /// they can be.
    fn validate(&mut self, members: &[(IdgIndex, bool)]) {
        if members.is_empty() {
            return;
        }
        self.epoch += 1;
        let epoch = self.epoch;
        for &(index, changed) in members {
            let node = &mut self.nodes[index];
            node.falsecount = 0;
            node.stale = false;
            node.validated_at = epoch;
            if changed {
                node.changed_at = epoch;
            }
        }

        let mut roots = vec![];
        for &(index, changed) in members {
            if changed {
                let nodes = &self.nodes;
                roots.extend(nodes[index].affected.iter().cloned().filter(|&parent| !nodes[parent].is_invalid()));
            }
        }
        if !roots.is_empty() {
            let exclude: Vec<IdgIndex> = members.iter().map(|&(index, _)| index).collect();
            self.wave_from(roots, &exclude);
        }

        for &(index, changed) in members {
            if !changed {
                self.settle_affected(index);
            }
        }
    }

    /// True if `index` is invalid only because of dependencies that are
    /// now valid and unchanged.
    fn can_settle(&self, index: IdgIndex) -> bool {
        let node = &self.nodes[index];
        !node.stale
            && !node.reevaluating
            && node.dependent.iter().all(|&dep| {
                let dep = &self.nodes[dep];
                !dep.is_invalid() && dep.changed_at <= node.validated_at
            })
    }

    fn settle(&mut self, index: IdgIndex) {
        debug!("settled {:?} without reevaluation", self.nodes[index].variant);
        self.epoch += 1;
        let node = &mut self.nodes[index];
        node.falsecount = 0;
        node.validated_at = self.epoch;
    }

    fn settle_affected(&mut self, index: IdgIndex) {
        let mut stack: Vec<IdgIndex> = self.nodes[index].affected.iter().cloned().collect();
        while let Some(parent) = stack.pop() {
            if self.nodes[parent].is_invalid() && self.can_settle(parent) {
                self.settle(parent);
                stack.extend(self.nodes[parent].affected.iter().cloned());
            }
        }
    }

    /// Brings `variant` up to date with a closure as the evaluator.
    pub fn refresh_with<F>(&mut self, variant: VariantId, eval: F) -> Result<bool>
    where
        F: FnMut(VariantId) -> Result<Reevaluation>,
    {
        struct Closure<'a, F> {
            idg: &'a mut Idg,
            eval: F,
        }

        impl<'a, F> Reevaluate for Closure<'a, F>
        where
            F: FnMut(VariantId) -> Result<Reevaluation>,
        {
            fn idg(&mut self) -> &mut Idg {
                self.idg
            }

            fn reevaluate(&mut self, variant: VariantId) -> Result<Reevaluation> {
                (self.eval)(variant)
            }
        }

        refresh(&mut Closure { idg: self, eval }, variant)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_variant.clear();
    }
}

/// Brings `variant` up to date: invalid dependencies first, then the
/// node itself, which is re-run only if it was invalidated directly or
/// some dependency changed. Returns whether `variant`'s answers changed.
pub fn refresh<R: Reevaluate + ?Sized>(ctx: &mut R, variant: VariantId) -> Result<bool> {
    let before = match ctx.idg().get(variant) {
        Some(node) => node.changed_at,
        None => return Ok(false),
    };
    let mut visiting = HashSet::new();
    refresh_node(ctx, variant, &mut visiting)?;
    Ok(ctx.idg().get(variant).map_or(false, |node| node.changed_at > before))
}

fn refresh_node<R: Reevaluate + ?Sized>(
    ctx: &mut R,
    variant: VariantId,
    visiting: &mut HashSet<VariantId>,
) -> Result<()> {
    let index = match ctx.idg().lookup(variant) {
        Some(index) => index,
        None => return Ok(()),
    };
    if !ctx.idg().nodes[index].is_invalid() || !visiting.insert(variant) {
        return Ok(());
    }
    debug_heading!("refresh({:?})", variant);

    for dep in ctx.idg().dependencies(variant) {
        refresh_node(ctx, dep, visiting)?;
    }

    // Re-running a dependency may have recomputed this table too.
    if !ctx.idg().nodes[index].is_invalid() {
        return Ok(());
    }
    if ctx.idg().can_settle(index) {
        ctx.idg().settle(index);
        return Ok(());
    }

    ctx.idg().begin_reevaluation(variant)?;
    match ctx.reevaluate(variant) {
        Ok(result) => {
            ctx.idg().finish_reevaluation(variant, result)?;
            Ok(())
        }
        Err(err) => {
            ctx.idg().abort_reevaluation(variant);
            Err(err)
        }
    }
}
