//! Slot arenas with generation-tagged indices.
//!
//! The component tree, the worklists and the IDG all refer to each
//! other cyclically (parent/children, affected/dependent). They do so
//! through typed indices into an owning `Arena` instead of pointers.
//! Each index carries the generation of the slot it was issued for, so
//! an index that outlives its value is detected on lookup rather than
//! silently aliasing whatever was recycled into the slot.

use crate::errors::*;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed handle into an `Arena`.
pub trait ArenaIndex: Copy + Eq + fmt::Debug {
    /// Human-readable kind, used in `StaleHandle` errors.
    const KIND: &'static str;

    fn new(slot: usize, generation: u32) -> Self;
    fn slot(self) -> usize;
    fn generation(self) -> u32;
}

macro_rules! arena_index {
    ($(#[$attr:meta])* $name:ident, $kind:expr) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            slot: u32,
            generation: u32,
        }

        impl $crate::arena::ArenaIndex for $name {
            const KIND: &'static str = $kind;

            fn new(slot: usize, generation: u32) -> Self {
                $name { slot: slot as u32, generation }
            }

            fn slot(self) -> usize {
                self.slot as usize
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}({}#{})", stringify!($name), self.slot, self.generation)
            }
        }
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Arena<I, T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    len: usize,
    index: PhantomData<I>,
}

impl<I: ArenaIndex, T> Arena<I, T> {
    pub fn new() -> Self {
        Arena {
            entries: vec![],
            free: vec![],
            len: 0,
            index: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value`, recycling a free slot if there is one.
    pub fn insert(&mut self, value: T) -> Result<I> {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.entries[slot];
            entry.value = Some(value);
            self.len += 1;
            return Ok(I::new(slot, entry.generation));
        }

        let slot = self.entries.len();
        try_push(&mut self.entries, Entry { generation: 0, value: Some(value) }, I::KIND)?;
        self.len += 1;
        Ok(I::new(slot, 0))
    }

    /// Removes the value at `index`. The slot's generation is bumped so
    /// that every outstanding copy of `index` becomes stale.
    pub fn remove(&mut self, index: I) -> Result<T> {
        self.check(index)?;
        // The free list never needs more room than there are entries.
        self.free.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory(I::KIND))?;
        let entry = &mut self.entries[index.slot()];
        let value = entry.value.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot());
        self.len -= 1;
        value.ok_or_else(|| ErrorKind::StaleHandle(I::KIND, index.slot()).into())
    }

    pub fn contains(&self, index: I) -> bool {
        self.check(index).is_ok()
    }

    pub fn get(&self, index: I) -> Result<&T> {
        self.check(index)?;
        self.entries[index.slot()]
            .value
            .as_ref()
            .ok_or_else(|| ErrorKind::StaleHandle(I::KIND, index.slot()).into())
    }

    pub fn get_mut(&mut self, index: I) -> Result<&mut T> {
        self.check(index)?;
        self.entries[index.slot()]
            .value
            .as_mut()
            .ok_or_else(|| ErrorKind::StaleHandle(I::KIND, index.slot()).into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                entry.value.as_ref().map(|value| (I::new(slot, entry.generation), value))
            })
    }

    /// Drops every value. Indices issued before the call are all stale
    /// afterwards.
    pub fn clear(&mut self) {
        self.free.clear();
        for (slot, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
            }
            self.free.push(slot);
        }
        self.len = 0;
    }

    fn check(&self, index: I) -> Result<()> {
        match self.entries.get(index.slot()) {
            Some(entry) if entry.generation == index.generation() && entry.value.is_some() => Ok(()),
            _ => bail!(ErrorKind::StaleHandle(I::KIND, index.slot())),
        }
    }
}

impl<I: ArenaIndex, T> Default for Arena<I, T> {
    fn default() -> Self {
        Arena::new()
    }
}

/// Panicking access for indices the caller has already validated (or
/// that the arena's owner issued itself). External entry points use
/// `get`/`get_mut` instead.
impl<I: ArenaIndex, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, index: I) -> &T {
        match self.get(index) {
            Ok(value) => value,
            Err(_) => panic!("stale {} index {:?}", I::KIND, index),
        }
    }
}

impl<I: ArenaIndex, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, index: I) -> &mut T {
        match self.get_mut(index) {
            Ok(value) => value,
            Err(_) => panic!("stale {} index {:?}", I::KIND, index),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    arena_index!(TestIndex, "test");

    #[test]
    fn removed_index_is_stale() {
        let mut arena: Arena<TestIndex, &str> = Arena::new();
        let a = arena.insert("a").unwrap();
        assert_eq!(arena.remove(a).unwrap(), "a");

        let b = arena.insert("b").unwrap();
        assert_eq!(a.slot(), b.slot(), "slot is recycled");
        assert!(arena.get(a).is_err());
        assert_eq!(*arena.get(b).unwrap(), "b");

        let err = arena.get(a).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut arena: Arena<TestIndex, u32> = Arena::new();
        let indices: Vec<_> = (0..4).map(|i| arena.insert(i).unwrap()).collect();
        arena.clear();
        assert!(arena.is_empty());
        assert!(indices.iter().all(|&i| !arena.contains(i)));
        let fresh = arena.insert(9).unwrap();
        assert_eq!(arena[fresh], 9);
    }
}
