//! Clusters: homogeneous batches of answers or suspended consumers,
//! linked into a worklist and recycled through a per-worklist pool.

use crate::errors::*;
use crate::store::AnswerId;
use std::mem;
use std::ops::{Index, IndexMut};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClusterKind {
    Answers,
    Suspensions,
}

/// Position of a cluster in its worklist's pool. Clusters never leave
/// the worklist that allocated them, so no generation is needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClusterIndex {
    value: usize,
}

/// A consumer waiting for answers, plus the sequence number of the
/// first answer it is allowed to see.
#[derive(Clone, Debug)]
pub struct Suspension<C> {
    pub consumer: C,
    pub start: u64,
}

pub struct Cluster<C> {
    pub kind: ClusterKind,
    pub prev: Option<ClusterIndex>,
    pub next: Option<ClusterIndex>,

    /// Members of an answer cluster, tagged with their sequence numbers.
    pub answers: Vec<(u64, AnswerId)>,

    /// Members of a suspension cluster, oldest first.
    pub suspensions: Vec<Suspension<C>>,
}

impl<C> Cluster<C> {
    fn empty(kind: ClusterKind) -> Self {
        Cluster {
            kind,
            prev: None,
            next: None,
            answers: vec![],
            suspensions: vec![],
        }
    }

    pub fn len(&self) -> usize {
        match self.kind {
            ClusterKind::Answers => self.answers.len(),
            ClusterKind::Suspensions => self.suspensions.len(),
        }
    }

    /// Reserves room for one more member of this cluster's kind.
    pub fn reserve_member(&mut self) -> Result<()> {
        let reserved = match self.kind {
            ClusterKind::Answers => self.answers.try_reserve(1),
            ClusterKind::Suspensions => self.suspensions.try_reserve(1),
        };
        reserved.map_err(|_| ErrorKind::OutOfMemory("cluster members").into())
    }

    /// Moves all members of `other` (same kind) to the end of `self`.
    /// On allocation failure neither cluster is changed.
    pub fn append(&mut self, other: &mut Cluster<C>) -> Result<()> {
        debug_assert_eq!(self.kind, other.kind);
        match self.kind {
            ClusterKind::Answers => {
                self.answers
                    .try_reserve(other.answers.len())
                    .map_err(|_| ErrorKind::OutOfMemory("cluster members"))?;
                self.answers.append(&mut other.answers);
            }
            ClusterKind::Suspensions => {
                self.suspensions
                    .try_reserve(other.suspensions.len())
                    .map_err(|_| ErrorKind::OutOfMemory("cluster members"))?;
                self.suspensions.append(&mut other.suspensions);
            }
        }
        Ok(())
    }
}

/// Cluster storage for one worklist. Released clusters keep their
/// buffers and go on the free list.
pub struct ClusterPool<C> {
    clusters: Vec<Cluster<C>>,
    free_clusters: Vec<ClusterIndex>,
}

impl<C> ClusterPool<C> {
    pub fn new() -> Self {
        ClusterPool { clusters: vec![], free_clusters: vec![] }
    }

    /// Hands out an unlinked, empty cluster of `kind` with room for at
    /// least `capacity` members.
    pub fn alloc(&mut self, kind: ClusterKind, capacity: usize) -> Result<ClusterIndex> {
        let capacity = capacity.max(1);
        if let Some(&index) = self.free_clusters.last() {
            let cluster = &mut self.clusters[index.value];
            reserve(cluster, kind, capacity)?;
            cluster.kind = kind;
            self.free_clusters.pop();
            return Ok(index);
        }

        let mut cluster = Cluster::empty(kind);
        reserve(&mut cluster, kind, capacity)?;
        let index = ClusterIndex { value: self.clusters.len() };
        try_push(&mut self.clusters, cluster, "cluster pool")?;
        Ok(index)
    }

    /// Returns an unlinked cluster to the free list.
    pub fn release(&mut self, index: ClusterIndex) {
        let cluster = &mut self.clusters[index.value];
        cluster.prev = None;
        cluster.next = None;
        cluster.answers.clear();
        cluster.suspensions.clear();
        self.free_clusters.push(index);
    }

    /// Takes the members of `from` and appends them to `into`.
    pub fn merge(&mut self, into: ClusterIndex, from: ClusterIndex) -> Result<()> {
        debug_assert_ne!(into, from);
        let kind = self.clusters[from.value].kind;
        let mut taken = mem::replace(&mut self.clusters[from.value], Cluster::empty(kind));
        let result = self.clusters[into.value].append(&mut taken);
        // Put the links, and the members if the append failed, back.
        self.clusters[from.value] = taken;
        result
    }

    pub fn free_len(&self) -> usize {
        self.free_clusters.len()
    }

    pub fn reset(&mut self) {
        self.free_clusters.clear();
        for (value, cluster) in self.clusters.iter_mut().enumerate() {
            cluster.prev = None;
            cluster.next = None;
            cluster.answers.clear();
            cluster.suspensions.clear();
            self.free_clusters.push(ClusterIndex { value });
        }
    }
}

fn reserve<C>(cluster: &mut Cluster<C>, kind: ClusterKind, capacity: usize) -> Result<()> {
    let reserved = match kind {
        ClusterKind::Answers => cluster.answers.try_reserve(capacity),
        ClusterKind::Suspensions => cluster.suspensions.try_reserve(capacity),
    };
    reserved.map_err(|_| ErrorKind::OutOfMemory("cluster members").into())
}

impl<C> Index<ClusterIndex> for ClusterPool<C> {
    type Output = Cluster<C>;

    fn index(&self, index: ClusterIndex) -> &Cluster<C> {
        &self.clusters[index.value]
    }
}

impl<C> IndexMut<ClusterIndex> for ClusterPool<C> {
    fn index_mut(&mut self, index: ClusterIndex) -> &mut Cluster<C> {
        &mut self.clusters[index.value]
    }
}
