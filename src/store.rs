//! The answer/variant store that tables are built on.
//!
//! The scheduler never looks inside terms. It only needs stable
//! identities: one `VariantId` per canonical call and one `AnswerId`
//! per answer, both valid until the answer is deleted or the variant
//! abolished. `AnswerStore` is that contract; `MemoryStore` is the
//! in-memory implementation used by the reference evaluator.

use crate::errors::*;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Identity of an interned variant (a canonical tabled call).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantId {
    value: u32,
}

/// Identity of one answer in a variant's table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnswerId {
    value: u32,
}

impl VariantId {
    pub fn new(value: usize) -> Self {
        VariantId { value: value as u32 }
    }

    pub fn index(self) -> usize {
        self.value as usize
    }
}

impl AnswerId {
    pub fn new(value: usize) -> Self {
        AnswerId { value: value as u32 }
    }

    pub fn index(self) -> usize {
        self.value as usize
    }
}

/// A canonical call pattern, as produced by the term engine.
pub trait TableKey: Clone + Debug + Eq + Hash {
    /// A ground call has at most one answer, which lets its table
    /// complete as soon as that answer is found.
    fn is_ground(&self) -> bool;
}

/// Result of inserting an answer term.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Inserted {
    New(AnswerId),
    Duplicate(AnswerId),
}

impl Inserted {
    pub fn answer(self) -> AnswerId {
        match self {
            Inserted::New(answer) | Inserted::Duplicate(answer) => answer,
        }
    }
}

pub trait AnswerStore {
    type Key: TableKey;
    type Term: Clone + Debug + Eq + Hash;

    /// Interns `key`, returning the existing variant if there is one.
    fn intern(&mut self, key: &Self::Key) -> Result<VariantId>;

    fn lookup(&self, key: &Self::Key) -> Option<VariantId>;

    fn variant_key(&self, variant: VariantId) -> Option<&Self::Key>;

    fn insert_answer(&mut self, variant: VariantId, term: Self::Term) -> Result<Inserted>;

    fn delete_answer(&mut self, answer: AnswerId) -> Result<()>;

    /// False once `answer` has been deleted.
    fn contains(&self, answer: AnswerId) -> bool;

    fn answer_variant(&self, answer: AnswerId) -> Option<VariantId>;

    fn answer_term(&self, answer: AnswerId) -> Option<&Self::Term>;

    /// Live answers of `variant`, in insertion order.
    fn answers(&self, variant: VariantId) -> Vec<AnswerId>;

    fn answer_count(&self, variant: VariantId) -> usize;

    /// Deletes every answer of `variant`; returns how many there were.
    fn abolish(&mut self, variant: VariantId) -> Result<usize>;
}

struct VariantEntry<K, T> {
    key: K,
    answers: Vec<AnswerId>,
    index: HashMap<T, AnswerId>,
}

struct AnswerEntry<T> {
    variant: VariantId,
    term: T,
    live: bool,
}

/// An `AnswerStore` kept entirely in memory. Deleted answers are
/// tombstoned, so an `AnswerId` is never reused.
pub struct MemoryStore<K, T> {
    keys: HashMap<K, VariantId>,
    variants: Vec<VariantEntry<K, T>>,
    answers: Vec<AnswerEntry<T>>,
}

impl<K: TableKey, T: Clone + Debug + Eq + Hash> MemoryStore<K, T> {
    pub fn new() -> Self {
        MemoryStore {
            keys: HashMap::new(),
            variants: vec![],
            answers: vec![],
        }
    }

    fn variant_entry(&self, variant: VariantId) -> Option<&VariantEntry<K, T>> {
        self.variants.get(variant.index())
    }

    fn live_entry(&self, answer: AnswerId) -> Option<&AnswerEntry<T>> {
        self.answers.get(answer.index()).filter(|entry| entry.live)
    }
}

impl<K: TableKey, T: Clone + Debug + Eq + Hash> Default for MemoryStore<K, T> {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl<K: TableKey, T: Clone + Debug + Eq + Hash> AnswerStore for MemoryStore<K, T> {
    type Key = K;
    type Term = T;

    fn intern(&mut self, key: &K) -> Result<VariantId> {
        if let Some(&variant) = self.keys.get(key) {
            return Ok(variant);
        }
        self.keys.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("variant index"))?;
        let variant = VariantId::new(self.variants.len());
        try_push(
            &mut self.variants,
            VariantEntry { key: key.clone(), answers: vec![], index: HashMap::new() },
            "variant table",
        )?;
        self.keys.insert(key.clone(), variant);
        Ok(variant)
    }

    fn lookup(&self, key: &K) -> Option<VariantId> {
        self.keys.get(key).cloned()
    }

    fn variant_key(&self, variant: VariantId) -> Option<&K> {
        self.variant_entry(variant).map(|entry| &entry.key)
    }

    fn insert_answer(&mut self, variant: VariantId, term: T) -> Result<Inserted> {
        let answer = AnswerId::new(self.answers.len());
        let entry = match self.variants.get_mut(variant.index()) {
            Some(entry) => entry,
            None => bail!(ErrorKind::Scheduling(format!("unknown variant {:?}", variant))),
        };
        if let Some(&existing) = entry.index.get(&term) {
            return Ok(Inserted::Duplicate(existing));
        }

        // Reserve everything first so a failure leaves the store as it was.
        entry.answers.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("answer list"))?;
        entry.index.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("answer index"))?;
        self.answers.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("answer table"))?;

        entry.answers.push(answer);
        entry.index.insert(term.clone(), answer);
        self.answers.push(AnswerEntry { variant, term, live: true });
        Ok(Inserted::New(answer))
    }

    fn delete_answer(&mut self, answer: AnswerId) -> Result<()> {
        let (variant, term) = match self.answers.get_mut(answer.index()) {
            Some(entry) if entry.live => {
                entry.live = false;
                (entry.variant, entry.term.clone())
            }
            _ => bail!(ErrorKind::UnknownAnswer(answer)),
        };
        let entry = &mut self.variants[variant.index()];
        entry.answers.retain(|&a| a != answer);
        entry.index.remove(&term);
        Ok(())
    }

    fn contains(&self, answer: AnswerId) -> bool {
        self.live_entry(answer).is_some()
    }

    fn answer_variant(&self, answer: AnswerId) -> Option<VariantId> {
        self.answers.get(answer.index()).map(|entry| entry.variant)
    }

    fn answer_term(&self, answer: AnswerId) -> Option<&T> {
        self.live_entry(answer).map(|entry| &entry.term)
    }

    fn answers(&self, variant: VariantId) -> Vec<AnswerId> {
        self.variant_entry(variant)
            .map(|entry| entry.answers.clone())
            .unwrap_or_default()
    }

    fn answer_count(&self, variant: VariantId) -> usize {
        self.variant_entry(variant).map_or(0, |entry| entry.answers.len())
    }

    fn abolish(&mut self, variant: VariantId) -> Result<usize> {
        let answers = match self.variants.get_mut(variant.index()) {
            Some(entry) => {
                entry.index.clear();
                ::std::mem::replace(&mut entry.answers, vec![])
            }
            None => return Ok(0),
        };
        for &answer in &answers {
            self.answers[answer.index()].live = false;
        }
        Ok(answers.len())
    }
}
