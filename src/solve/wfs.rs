//! Three-valued truth and the unfounded-set pass run when a component
//! completes with conditional answers left over.

use crate::solve::delay::DelayStore;
use crate::store::{AnswerId, AnswerStore, TableKey};
use std::collections::HashSet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TruthValue {
    /// Contains a finite proof.
    True,

    /// Contains no proof or an infinite proof.
    False,

    /// Participates in a negative cycle.
    ///
    /// Consider this: are `a` and `b` true if `a :- tnot b. b :- tnot a.`?
    Unknown,
}

impl TruthValue {
    pub fn or(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::True, _) | (_, TruthValue::True) => TruthValue::True,
            (TruthValue::Unknown, _) | (_, TruthValue::Unknown) => TruthValue::Unknown,
            (TruthValue::False, TruthValue::False) => TruthValue::False,
        }
    }

    pub fn and(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::False, _) | (_, TruthValue::False) => TruthValue::False,
            (TruthValue::Unknown, _) | (_, TruthValue::Unknown) => TruthValue::Unknown,
            (TruthValue::True, TruthValue::True) => TruthValue::True,
        }
    }

    pub fn not(self) -> TruthValue {
        match self {
            TruthValue::True => TruthValue::False,
            TruthValue::False => TruthValue::True,
            TruthValue::Unknown => TruthValue::Unknown,
        }
    }

    pub fn any<I>(iter: I) -> TruthValue
    where
        I: IntoIterator<Item = TruthValue>,
    {
        iter.into_iter().fold(TruthValue::False, |a, b| a.or(b))
    }

    pub fn all<I>(iter: I) -> TruthValue
    where
        I: IntoIterator<Item = TruthValue>,
    {
        iter.into_iter().fold(TruthValue::True, |a, b| a.and(b))
    }
}

/// Truth of a single answer as currently known.
pub fn answer_truth<S, K>(store: &S, delays: &DelayStore<K>, answer: AnswerId) -> TruthValue
where
    S: AnswerStore<Key = K>,
    K: TableKey,
{
    if !store.contains(answer) {
        TruthValue::False
    } else if delays.is_conditional(answer) {
        TruthValue::Unknown
    } else {
        TruthValue::True
    }
}

/// Returns the subset of `answers` that is unfounded: answers that
/// can only be derived through positive conditions on each other.
///
/// Computes the least set of supported answers. An answer is supported
/// if one of its live disjuncts has every pending positive condition
/// either outside `answers` or already supported. Pending negative
/// conditions do not prevent support; they are what leaves a supported
/// answer undefined. Everything in `answers` that never becomes
/// supported is unfounded.
pub fn unfounded<K: TableKey>(delays: &DelayStore<K>, answers: &[AnswerId]) -> Vec<AnswerId> {
    let candidates: HashSet<AnswerId> =
        answers.iter().cloned().filter(|&answer| delays.is_conditional(answer)).collect();
    let mut supported: HashSet<AnswerId> = HashSet::new();

    loop {
        let mut changed = false;
        for &answer in answers {
            if !candidates.contains(&answer) || supported.contains(&answer) {
                continue;
            }
            let info = match delays.info(answer) {
                Some(info) => info,
                None => continue,
            };
            let has_support = info.live_sets().any(|set| {
                set.iter().all(|delay| match delay.answer {
                    Some(b) => !candidates.contains(&b) || supported.contains(&b),
                    None => true,
                })
            });
            if has_support {
                supported.insert(answer);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut result: Vec<AnswerId> =
        answers.iter().cloned().filter(|answer| candidates.contains(answer) && !supported.contains(answer)).collect();
    result.dedup();
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solve::delay::Delay;
    use crate::store::{MemoryStore, VariantId};

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Key(&'static str);

    impl TableKey for Key {
        fn is_ground(&self) -> bool {
            true
        }
    }

    fn setup() -> (MemoryStore<Key, u32>, DelayStore<Key>, Vec<(VariantId, AnswerId)>) {
        let mut store = MemoryStore::new();
        let mut entries = vec![];
        for name in &["p", "q", "r"] {
            let variant = store.intern(&Key(name)).unwrap();
            let answer = store.insert_answer(variant, 0).unwrap().answer();
            entries.push((variant, answer));
        }
        (store, DelayStore::new(), entries)
    }

    #[test]
    fn positive_loop_is_unfounded() {
        let (_, mut delays, entries) = setup();
        let (p, pa) = entries[0];
        let (q, qa) = entries[1];
        // p :- q.   q :- p.
        delays.add_condition(p, pa, vec![Delay::positive(q, Key("q"), qa)]).unwrap();
        delays.add_condition(q, qa, vec![Delay::positive(p, Key("p"), pa)]).unwrap();

        let mut result = unfounded(&delays, &[pa, qa]);
        result.sort();
        assert_eq!(result, vec![pa, qa]);
    }

    #[test]
    fn negative_loop_stays_undefined() {
        let (_, mut delays, entries) = setup();
        let (p, pa) = entries[0];
        let (q, qa) = entries[1];
        let (r, ra) = entries[2];
        // p :- tnot q.   q :- tnot p.   r :- p.
        delays.add_condition(p, pa, vec![Delay::negative(q, Key("q"))]).unwrap();
        delays.add_condition(q, qa, vec![Delay::negative(p, Key("p"))]).unwrap();
        delays.add_condition(r, ra, vec![Delay::positive(p, Key("p"), pa)]).unwrap();

        assert!(unfounded(&delays, &[ra, pa, qa]).is_empty());
    }

    #[test]
    fn truth_of_answers() {
        let (mut store, mut delays, entries) = setup();
        let (p, pa) = entries[0];
        let (q, qa) = entries[1];
        let (_, ra) = entries[2];
        delays.add_condition(p, pa, vec![Delay::negative(q, Key("q"))]).unwrap();
        store.delete_answer(ra).unwrap();

        assert_eq!(answer_truth(&store, &delays, pa), TruthValue::Unknown);
        assert_eq!(answer_truth(&store, &delays, qa), TruthValue::True);
        assert_eq!(answer_truth(&store, &delays, ra), TruthValue::False);
        assert_eq!(TruthValue::any(vec![TruthValue::False, TruthValue::Unknown]), TruthValue::Unknown);
        assert_eq!(TruthValue::all(vec![TruthValue::True, TruthValue::Unknown]).not(), TruthValue::Unknown);
    }
}
