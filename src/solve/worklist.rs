//! Per-variant scheduling state.
//!
//! A worklist is a doubly linked list of clusters ordered by time: the
//! head is the oldest cluster, the tail the newest. Answers are pushed
//! into the tail answer cluster (`riac`, the newest answer cluster) and
//! suspended consumers into the tail suspension cluster. Hence a
//! suspension cluster still has work exactly when an answer cluster sits
//! to its right:
//!
//! ```notrust
//! [A1 A2] [S] [A3]      S must see A3, and only A3
//! ```
//!
//! Work is done one `[S][A]` pair at a time, oldest suspensions first.
//! When every consumer of `S` has seen every answer of `A`, the two
//! clusters swap places (`[A][S]`) and are merged into their like-typed
//! neighbours. The list is drained when it has the shape `[A*][S*]`.
//! A cluster that is being scanned is never appended to or relinked.

use crate::errors::*;
use crate::solve::cluster::{ClusterIndex, ClusterKind, ClusterPool, Suspension};
use crate::solve::component::ComponentIndex;
use crate::store::{AnswerId, VariantId};

arena_index! {
    /// Handle to a live worklist in a `Session`.
    WorklistIndex, "worklist"
}

/// The `[S][A]` pair currently being scanned.
#[derive(Copy, Clone, Debug)]
struct Scan {
    suspensions: ClusterIndex,
    answers: ClusterIndex,
    suspension_pos: usize,
    answer_pos: usize,
}

pub struct Worklist<C> {
    pub(crate) variant: VariantId,
    pub(crate) component: ComponentIndex,

    head: Option<ClusterIndex>,
    tail: Option<ClusterIndex>,

    /// Rightmost (newest) answer cluster.
    riac: Option<ClusterIndex>,

    pool: ClusterPool<C>,
    scan: Option<Scan>,
    next_seq: u64,
    cluster_capacity: usize,

    /// No further answers can be derived.
    pub(crate) completed: bool,
    /// Ground call: complete after the first unconditional answer.
    pub(crate) ground: bool,
    /// A run over this worklist is in progress.
    pub(crate) executing: bool,
    /// Queued in its component's runnable set.
    pub(crate) in_global_wl: bool,
    /// Someone is waiting on the negation of this variant.
    pub(crate) negative: bool,
    /// Negative waiters were resumed with the literal delayed.
    pub(crate) neg_delayed: bool,
    /// At least one unconditional answer.
    pub(crate) has_answers: bool,
    /// Conditional answers have been simplified after completion.
    pub(crate) answer_completed: bool,
    /// Invalidated through the IDG while live; invalidate again on
    /// completion.
    pub(crate) depend_abolish: bool,
    /// Abolish requested while live; abolish on completion.
    pub(crate) abolish_on_complete: bool,

    /// Number of answers that are still conditional.
    pub(crate) undefined: usize,

    /// Consumers waiting for this variant to fail (`tnot`).
    pub(crate) negatives: Vec<C>,
    /// Conditional answers added to this table.
    pub(crate) delays: Vec<AnswerId>,
    /// Answers still undefined after delay resolution at completion;
    /// the input of the simplification pass.
    pub(crate) pos_undefined: Vec<AnswerId>,
}

impl<C: Clone> Worklist<C> {
    pub(crate) fn new(
        variant: VariantId,
        component: ComponentIndex,
        ground: bool,
        cluster_capacity: usize,
    ) -> Self {
        Worklist {
            variant,
            component,
            head: None,
            tail: None,
            riac: None,
            pool: ClusterPool::new(),
            scan: None,
            next_seq: 0,
            cluster_capacity,
            completed: false,
            ground,
            executing: false,
            in_global_wl: false,
            negative: false,
            neg_delayed: false,
            has_answers: false,
            answer_completed: false,
            depend_abolish: false,
            abolish_on_complete: false,
            undefined: 0,
            negatives: vec![],
            delays: vec![],
            pos_undefined: vec![],
        }
    }

    pub fn variant(&self) -> VariantId {
        self.variant
    }

    pub fn component(&self) -> ComponentIndex {
        self.component
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_ground(&self) -> bool {
        self.ground
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn has_answers(&self) -> bool {
        self.has_answers
    }

    pub fn is_answer_completed(&self) -> bool {
        self.answer_completed
    }

    pub fn undefined(&self) -> usize {
        self.undefined
    }

    /// Some caller of `tnot` on this table is (or was) suspended on it.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_neg_delayed(&self) -> bool {
        self.neg_delayed
    }

    pub fn abolish_pending(&self) -> bool {
        self.abolish_on_complete || self.depend_abolish
    }

    /// Appends `answer` to the newest answer cluster, or to a fresh one
    /// if the tail holds suspensions (or is being scanned).
    pub(crate) fn push_answer(&mut self, answer: AnswerId, conditional: bool) -> Result<()> {
        let seq = self.next_seq;
        let cluster = match self.tail {
            Some(tail)
                if self.pool[tail].kind == ClusterKind::Answers && !self.is_scanned(tail) =>
            {
                self.pool[tail].reserve_member()?;
                tail
            }
            _ => {
                let cluster = self.pool.alloc(ClusterKind::Answers, self.cluster_capacity)?;
                self.link_tail(cluster);
                cluster
            }
        };
        self.pool[cluster].answers.push((seq, answer));
        self.riac = Some(cluster);
        self.next_seq += 1;
        if !conditional {
            self.has_answers = true;
        }
        Ok(())
    }

    /// Registers `consumer`; it will see every answer pushed from now
    /// on, exactly once.
    pub(crate) fn push_suspension(&mut self, consumer: C) -> Result<()> {
        let suspension = Suspension { consumer, start: self.next_seq };
        let cluster = match self.tail {
            Some(tail) if self.pool[tail].kind == ClusterKind::Suspensions => {
                self.pool[tail].reserve_member()?;
                tail
            }
            _ => {
                let cluster = self.pool.alloc(ClusterKind::Suspensions, self.cluster_capacity)?;
                self.link_tail(cluster);
                cluster
            }
        };
        self.pool[cluster].suspensions.push(suspension);
        Ok(())
    }

    /// True if some consumer has not yet seen some answer.
    pub fn has_work(&self) -> bool {
        self.scan.is_some() || self.find_pair().is_some()
    }

    /// Produces the next `(consumer, answer)` resolution, oldest
    /// consumers first. Returns `None` once drained.
    pub(crate) fn next_work(&mut self) -> Result<Option<(C, AnswerId)>> {
        loop {
            let mut scan = match self.scan {
                Some(scan) => scan,
                None => match self.find_pair() {
                    Some((suspensions, answers)) => Scan {
                        suspensions,
                        answers,
                        suspension_pos: 0,
                        answer_pos: 0,
                    },
                    None => return Ok(None),
                },
            };

            let suspension_len = self.pool[scan.suspensions].suspensions.len();
            let answer_len = self.pool[scan.answers].answers.len();
            if scan.suspension_pos < suspension_len && answer_len > 0 {
                let (seq, answer) = self.pool[scan.answers].answers[scan.answer_pos];
                let suspension = &self.pool[scan.suspensions].suspensions[scan.suspension_pos];
                debug_assert!(seq >= suspension.start, "consumer sees an answer older than itself");
                let consumer = suspension.consumer.clone();

                scan.answer_pos += 1;
                if scan.answer_pos == answer_len {
                    scan.answer_pos = 0;
                    scan.suspension_pos += 1;
                }
                self.scan = Some(scan);
                return Ok(Some((consumer, answer)));
            }

            self.scan = None;
            self.swap(scan.suspensions, scan.answers);
        }
    }

    /// Marks the table as complete: no more answers will be pushed.
    pub(crate) fn mark_complete(&mut self) {
        self.completed = true;
        if self.undefined == 0 {
            self.answer_completed = true;
        }
    }

    /// Drops all clusters back into the pool. Only valid at a boundary
    /// where nothing is scanning the list.
    pub(crate) fn reset(&mut self) -> Result<()> {
        if self.executing || self.scan.is_some() {
            bail!(ErrorKind::Scheduling(format!(
                "cannot reset worklist of {:?} while it is being scanned",
                self.variant
            )));
        }
        self.pool.reset();
        self.head = None;
        self.tail = None;
        self.riac = None;
        Ok(())
    }

    /// Cluster kinds and sizes from head to tail.
    pub fn shape(&self) -> Vec<(ClusterKind, usize)> {
        let mut shape = vec![];
        let mut cursor = self.head;
        while let Some(index) = cursor {
            shape.push((self.pool[index].kind, self.pool[index].len()));
            cursor = self.pool[index].next;
        }
        shape
    }

    pub fn free_clusters(&self) -> usize {
        self.pool.free_len()
    }

    fn is_scanned(&self, cluster: ClusterIndex) -> bool {
        self.scan.map_or(false, |scan| scan.answers == cluster || scan.suspensions == cluster)
    }

    /// Leftmost suspension cluster immediately followed by an answer
    /// cluster.
    fn find_pair(&self) -> Option<(ClusterIndex, ClusterIndex)> {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let cluster = &self.pool[index];
            if cluster.kind == ClusterKind::Suspensions {
                if let Some(next) = cluster.next {
                    if self.pool[next].kind == ClusterKind::Answers {
                        return Some((index, next));
                    }
                }
            }
            cursor = cluster.next;
        }
        None
    }

    fn link_tail(&mut self, cluster: ClusterIndex) {
        self.pool[cluster].prev = self.tail;
        self.pool[cluster].next = None;
        match self.tail {
            Some(tail) => self.pool[tail].next = Some(cluster),
            None => self.head = Some(cluster),
        }
        self.tail = Some(cluster);
    }

    fn unlink(&mut self, cluster: ClusterIndex) {
        let (prev, next) = (self.pool[cluster].prev, self.pool[cluster].next);
        match prev {
            Some(prev) => self.pool[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.pool[next].prev = prev,
            None => self.tail = prev,
        }
        self.pool[cluster].prev = None;
        self.pool[cluster].next = None;
    }

    /// `P [S][A] N` becomes `P [A][S] N`, then `A` is folded into `P`
    /// and `N` into `S` where the kinds agree.
    fn swap(&mut self, suspensions: ClusterIndex, answers: ClusterIndex) {
        let prev = self.pool[suspensions].prev;
        let next = self.pool[answers].next;

        match prev {
            Some(prev) => self.pool[prev].next = Some(answers),
            None => self.head = Some(answers),
        }
        self.pool[answers].prev = prev;
        self.pool[answers].next = Some(suspensions);
        self.pool[suspensions].prev = Some(answers);
        self.pool[suspensions].next = next;
        match next {
            Some(next) => self.pool[next].prev = Some(suspensions),
            None => self.tail = Some(suspensions),
        }

        // Merging is an optimization: if it cannot allocate, the list is
        // still well formed, just more fragmented.
        if let Some(prev) = prev {
            if self.pool[prev].kind == ClusterKind::Answers
                && self.pool.merge(prev, answers).is_ok()
            {
                self.unlink(answers);
                self.pool.release(answers);
            }
        }
        if let Some(next) = next {
            if self.pool[next].kind == ClusterKind::Suspensions
                && self.pool.merge(suspensions, next).is_ok()
            {
                self.unlink(next);
                self.pool.release(next);
            }
        }

        self.riac = self.newest_answer_cluster();
    }

    fn newest_answer_cluster(&self) -> Option<ClusterIndex> {
        let mut cursor = self.tail;
        while let Some(index) = cursor {
            if self.pool[index].kind == ClusterKind::Answers {
                return Some(index);
            }
            cursor = self.pool[index].prev;
        }
        None
    }
}
