//! Conditional answers under the well-founded semantics.
//!
//! An answer derived through an unresolved call carries a `DelayInfo`:
//! a disjunction of `DelaySet`s, each a conjunction of delayed literals.
//! A positive literal names a specific answer of another variant, a
//! negative one names only the variant (`tnot`). When a variant's
//! answers settle, `resolve` walks the reverse index (`DelayUsage`) and
//! updates every set that mentions them. Settling one answer can settle
//! others, so resolution runs as a queue until nothing changes.

use crate::errors::*;
use crate::store::{AnswerId, AnswerStore, TableKey, VariantId};
use std::collections::{HashMap, HashSet, VecDeque};

/// One delayed literal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delay<K> {
    pub variant: VariantId,
    /// The call the literal was made with, for residual programs.
    pub wrapper: K,
    /// `Some` for a positive literal, `None` for `tnot`.
    pub answer: Option<AnswerId>,
    satisfied: bool,
}

impl<K> Delay<K> {
    pub fn positive(variant: VariantId, wrapper: K, answer: AnswerId) -> Self {
        Delay { variant, wrapper, answer: Some(answer), satisfied: false }
    }

    pub fn negative(variant: VariantId, wrapper: K) -> Self {
        Delay { variant, wrapper, answer: None, satisfied: false }
    }

    pub fn is_negative(&self) -> bool {
        self.answer.is_none()
    }

    fn effect(&self, outcome: Outcome) -> Effect {
        match (self.answer, outcome) {
            (Some(a), Outcome::True(b)) if a == b => Effect::Satisfy,
            (Some(a), Outcome::False(Some(b))) if a == b => Effect::Refute,
            (Some(_), Outcome::False(None)) => Effect::Refute,
            (None, Outcome::True(_)) => Effect::Refute,
            (None, Outcome::False(None)) => Effect::Satisfy,
            _ => Effect::Nothing,
        }
    }
}

/// What became known about a variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// This answer is now unconditionally true.
    True(AnswerId),
    /// This answer was deleted; `None` means the variant is complete
    /// and has no answers at all.
    False(Option<AnswerId>),
}

enum Effect {
    Satisfy,
    Refute,
    Nothing,
}

enum Verdict {
    Pending,
    True,
    False,
}

/// An answer that left the conditional state during resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Settled {
    True { variant: VariantId, answer: AnswerId },
    False { variant: VariantId, answer: AnswerId },
}

/// One conjunctive disjunct; its delays live in
/// `DelayInfo::delays[offset..offset + size]`.
#[derive(Copy, Clone, Debug)]
pub struct DelaySet {
    offset: usize,
    size: usize,
    /// Conjuncts not yet satisfied.
    active: usize,
    refuted: bool,
}

impl DelaySet {
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn is_refuted(&self) -> bool {
        self.refuted
    }
}

#[derive(Clone, Debug)]
pub struct DelayInfo<K> {
    variant: VariantId,
    /// Some wrapper is non-ground, so its bindings are shared with the
    /// answer term.
    has_share_records: bool,
    delay_sets: Vec<DelaySet>,
    delays: Vec<Delay<K>>,
}

impl<K: TableKey> DelayInfo<K> {
    fn new(variant: VariantId) -> Self {
        DelayInfo { variant, has_share_records: false, delay_sets: vec![], delays: vec![] }
    }

    pub fn variant(&self) -> VariantId {
        self.variant
    }

    pub fn has_share_records(&self) -> bool {
        self.has_share_records
    }

    pub fn delay_sets(&self) -> &[DelaySet] {
        &self.delay_sets
    }

    /// The unsatisfied literals of every live disjunct.
    pub fn live_sets(&self) -> impl Iterator<Item = Vec<&Delay<K>>> + '_ {
        self.delay_sets.iter().filter(|set| !set.refuted).map(move |set| {
            self.delays[set.offset..set.offset + set.size]
                .iter()
                .filter(|delay| !delay.satisfied)
                .collect()
        })
    }

    fn add_set(&mut self, delays: Vec<Delay<K>>) -> Result<()> {
        self.delays.try_reserve(delays.len()).map_err(|_| ErrorKind::OutOfMemory("delay buffer"))?;
        self.delay_sets.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("delay sets"))?;

        let set = DelaySet { offset: self.delays.len(), size: delays.len(), active: delays.len(), refuted: false };
        self.has_share_records |= delays.iter().any(|delay| !delay.wrapper.is_ground());
        self.delays.extend(delays);
        self.delay_sets.push(set);
        Ok(())
    }

    fn apply(&mut self, variant: VariantId, outcome: Outcome) -> Verdict {
        let DelayInfo { delay_sets, delays, .. } = self;
        let mut satisfied = false;
        for set in delay_sets.iter_mut().filter(|set| !set.refuted) {
            for delay in &mut delays[set.offset..set.offset + set.size] {
                if delay.variant != variant || delay.satisfied {
                    continue;
                }
                match delay.effect(outcome) {
                    Effect::Satisfy => {
                        delay.satisfied = true;
                        set.active -= 1;
                    }
                    Effect::Refute => {
                        set.refuted = true;
                        break;
                    }
                    Effect::Nothing => {}
                }
            }
            if !set.refuted && set.active == 0 {
                satisfied = true;
            }
        }

        if satisfied {
            Verdict::True
        } else if delay_sets.iter().all(|set| set.refuted) {
            Verdict::False
        } else {
            Verdict::Pending
        }
    }
}

/// Reverse index: the answers whose conditions mention one answer
/// (positive literals) or one variant (negative literals). Entries can
/// go stale when those answers settle; `resolve` skips and prunes them.
#[derive(Clone, Debug, Default)]
pub struct DelayUsage {
    answers: Vec<AnswerId>,
}

/// A delay list under construction for the clause being resolved.
#[derive(Clone, Debug)]
pub struct DelayList<K> {
    delays: Vec<Delay<K>>,
}

impl<K> DelayList<K> {
    pub fn new() -> Self {
        DelayList { delays: vec![] }
    }

    pub fn push(&mut self, delay: Delay<K>) -> Result<()> {
        try_push(&mut self.delays, delay, "delay list")
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delay<K>> {
        self.delays.iter()
    }
}

impl<K> Default for DelayList<K> {
    fn default() -> Self {
        DelayList::new()
    }
}

pub struct DelayStore<K> {
    infos: HashMap<AnswerId, DelayInfo<K>>,
    /// Keyed by the answer a positive literal names, grouped by its
    /// variant.
    positive: HashMap<VariantId, HashMap<AnswerId, DelayUsage>>,
    negative: HashMap<VariantId, DelayUsage>,
}

impl<K: TableKey> DelayStore<K> {
    pub fn new() -> Self {
        DelayStore { infos: HashMap::new(), positive: HashMap::new(), negative: HashMap::new() }
    }

    pub fn is_conditional(&self, answer: AnswerId) -> bool {
        self.infos.contains_key(&answer)
    }

    pub fn info(&self, answer: AnswerId) -> Option<&DelayInfo<K>> {
        self.infos.get(&answer)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Drops literals that are already known to hold. Returns `None` if
    /// some literal is already known to fail, in which case the clause
    /// contributes nothing.
    pub fn normalize<S>(
        &self,
        store: &S,
        complete: &HashSet<VariantId>,
        list: DelayList<K>,
    ) -> Option<Vec<Delay<K>>>
    where
        S: AnswerStore<Key = K>,
    {
        let mut kept = vec![];
        for delay in list.delays {
            match delay.answer {
                Some(answer) => {
                    if !store.contains(answer) {
                        return None;
                    }
                    if self.is_conditional(answer) {
                        kept.push(delay);
                    }
                }
                None => {
                    let answers = store.answers(delay.variant);
                    if answers.iter().any(|&answer| !self.is_conditional(answer)) {
                        return None;
                    }
                    if answers.is_empty() && complete.contains(&delay.variant) {
                        continue;
                    }
                    kept.push(delay);
                }
            }
        }
        Some(kept)
    }

    /// Adds one disjunct to `answer`'s condition. On failure nothing
    /// changes for `answer`.
    pub fn add_condition(&mut self, variant: VariantId, answer: AnswerId, delays: Vec<Delay<K>>) -> Result<()> {
        debug_assert!(!delays.is_empty(), "an empty delay set is an unconditional answer");
        self.infos.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("delay infos"))?;
        self.positive.try_reserve(delays.len()).map_err(|_| ErrorKind::OutOfMemory("delay usages"))?;
        self.negative.try_reserve(delays.len()).map_err(|_| ErrorKind::OutOfMemory("delay usages"))?;

        let mentioned: Vec<(VariantId, Option<AnswerId>)> =
            delays.iter().map(|delay| (delay.variant, delay.answer)).collect();
        let mut info = self.infos.remove(&answer).unwrap_or_else(|| DelayInfo::new(variant));
        let result = info.add_set(delays);
        if !info.delay_sets.is_empty() {
            self.infos.insert(answer, info);
        }
        result?;

        for (variant, literal) in mentioned {
            let usage = match literal {
                Some(literal) => {
                    let by_answer = self.positive.entry(variant).or_insert_with(HashMap::new);
                    by_answer.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("delay usages"))?;
                    by_answer.entry(literal).or_insert_with(DelayUsage::default)
                }
                None => self.negative.entry(variant).or_insert_with(DelayUsage::default),
            };
            if !usage.answers.contains(&answer) {
                try_push(&mut usage.answers, answer, "delay usage")?;
            }
        }
        Ok(())
    }

    /// The answers whose conditions `outcome` for `variant` can touch.
    /// A settled answer reaches the positive literals naming it, and
    /// negative literals on `variant` when it is true. Failure of the
    /// whole variant reaches both kinds.
    fn dependents(&self, variant: VariantId, outcome: Outcome) -> Vec<AnswerId> {
        let mut dependents = vec![];
        let positive = self.positive.get(&variant);
        match outcome {
            Outcome::True(answer) | Outcome::False(Some(answer)) => {
                if let Some(usage) = positive.and_then(|by_answer| by_answer.get(&answer)) {
                    dependents.extend(usage.answers.iter().cloned());
                }
            }
            Outcome::False(None) => {
                for usage in positive.into_iter().flat_map(|by_answer| by_answer.values()) {
                    dependents.extend(usage.answers.iter().cloned());
                }
            }
        }
        if let Outcome::True(_) | Outcome::False(None) = outcome {
            if let Some(usage) = self.negative.get(&variant) {
                dependents.extend(usage.answers.iter().cloned());
            }
        }
        dependents.sort();
        dependents.dedup();
        dependents
    }

    /// Drops the usage entries `dependents` consulted that point only
    /// at settled answers.
    fn prune(&mut self, variant: VariantId, outcome: Outcome) {
        let infos = &self.infos;
        let live = |usage: &mut DelayUsage| {
            usage.answers.retain(|answer| infos.contains_key(answer));
            !usage.answers.is_empty()
        };

        if let Some(by_answer) = self.positive.get_mut(&variant) {
            match outcome {
                Outcome::True(answer) | Outcome::False(Some(answer)) => {
                    if let Some(usage) = by_answer.get_mut(&answer) {
                        if !live(usage) {
                            by_answer.remove(&answer);
                        }
                    }
                }
                Outcome::False(None) => by_answer.retain(|_, usage| live(usage)),
            }
            if by_answer.is_empty() {
                self.positive.remove(&variant);
            }
        }
        if let Outcome::True(_) | Outcome::False(None) = outcome {
            if let Some(usage) = self.negative.get_mut(&variant) {
                if !live(usage) {
                    self.negative.remove(&variant);
                }
            }
        }
    }

    /// Variants holding conditional answers that mention `variant` or
    /// one of its answers.
    pub fn dependent_variants(&self, variant: VariantId) -> Vec<VariantId> {
        let mut variants: Vec<VariantId> = self
            .dependents(variant, Outcome::False(None))
            .into_iter()
            .filter_map(|answer| self.infos.get(&answer))
            .map(|info| info.variant)
            .collect();
        variants.sort();
        variants.dedup();
        variants
    }

    /// Propagates `outcome` for `variant` through every condition that
    /// mentions it, then through everything that settles as a result.
    /// Answers whose every disjunct is refuted are deleted from `store`.
    /// Repeating an outcome changes nothing.
    pub fn resolve<S>(
        &mut self,
        store: &mut S,
        complete: &HashSet<VariantId>,
        variant: VariantId,
        outcome: Outcome,
    ) -> Result<Vec<Settled>>
    where
        S: AnswerStore<Key = K>,
    {
        debug_heading!("resolve({:?}, {:?})", variant, outcome);

        let mut settled = vec![];
        let mut queue = VecDeque::new();
        queue.push_back((variant, outcome));

        while let Some((variant, outcome)) = queue.pop_front() {
            for answer in self.dependents(variant, outcome) {
                let verdict = match self.infos.get_mut(&answer) {
                    Some(info) => info.apply(variant, outcome),
                    None => continue,
                };
                let owner = match verdict {
                    Verdict::Pending => continue,
                    Verdict::True | Verdict::False => match self.infos.remove(&answer) {
                        Some(info) => info.variant,
                        None => continue,
                    },
                };

                if let Verdict::True = verdict {
                    debug!("answer {:?} of {:?} is unconditional", answer, owner);
                    settled.push(Settled::True { variant: owner, answer });
                    queue.push_back((owner, Outcome::True(answer)));
                } else {
                    debug!("answer {:?} of {:?} is false", answer, owner);
                    store.delete_answer(answer)?;
                    settled.push(Settled::False { variant: owner, answer });
                    queue.push_back((owner, Outcome::False(Some(answer))));
                    if complete.contains(&owner) && store.answer_count(owner) == 0 {
                        queue.push_back((owner, Outcome::False(None)));
                    }
                }
            }

            self.prune(variant, outcome);
        }

        Ok(settled)
    }

    /// Drops every condition of `answer`, which was just derived
    /// unconditionally, and propagates its truth.
    pub fn confirm<S>(
        &mut self,
        store: &mut S,
        complete: &HashSet<VariantId>,
        variant: VariantId,
        answer: AnswerId,
    ) -> Result<Vec<Settled>>
    where
        S: AnswerStore<Key = K>,
    {
        let mut settled = vec![];
        if self.infos.remove(&answer).is_some() {
            settled.push(Settled::True { variant, answer });
        }
        settled.extend(self.resolve(store, complete, variant, Outcome::True(answer))?);
        Ok(settled)
    }

    /// Deletes an answer outright (unfounded) and propagates its
    /// failure.
    pub fn retract<S>(
        &mut self,
        store: &mut S,
        complete: &HashSet<VariantId>,
        answer: AnswerId,
    ) -> Result<Vec<Settled>>
    where
        S: AnswerStore<Key = K>,
    {
        let variant = match self.infos.remove(&answer) {
            Some(info) => info.variant,
            None => bail!(ErrorKind::UnknownAnswer(answer)),
        };
        store.delete_answer(answer)?;
        let mut settled = vec![Settled::False { variant, answer }];
        settled.extend(self.resolve(store, complete, variant, Outcome::False(Some(answer)))?);
        if complete.contains(&variant) && store.answer_count(variant) == 0 {
            settled.extend(self.resolve(store, complete, variant, Outcome::False(None))?);
        }
        Ok(settled)
    }

    pub fn forget(&mut self, answer: AnswerId) {
        self.infos.remove(&answer);
    }

    /// Forgets the conditions of every answer of `variant`, ahead of
    /// abolishing its table. Positive literals on those answers can
    /// never settle now, so their usages go too.
    pub fn forget_variant<S>(&mut self, store: &S, variant: VariantId)
    where
        S: AnswerStore<Key = K>,
    {
        for answer in store.answers(variant) {
            self.infos.remove(&answer);
        }
        self.positive.remove(&variant);
    }

    pub fn clear(&mut self) {
        self.infos.clear();
        self.positive.clear();
        self.negative.clear();
    }
}

impl<K: TableKey> Default for DelayStore<K> {
    fn default() -> Self {
        DelayStore::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;

    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Key(&'static str);

    impl TableKey for Key {
        fn is_ground(&self) -> bool {
            true
        }
    }

    struct Fixture {
        store: MemoryStore<Key, u32>,
        delays: DelayStore<Key>,
        complete: HashSet<VariantId>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture { store: MemoryStore::new(), delays: DelayStore::new(), complete: HashSet::new() }
        }

        fn variant(&mut self, name: &'static str) -> VariantId {
            self.store.intern(&Key(name)).unwrap()
        }

        fn answer(&mut self, variant: VariantId, term: u32) -> AnswerId {
            self.store.insert_answer(variant, term).unwrap().answer()
        }

        fn resolve(&mut self, variant: VariantId, outcome: Outcome) -> Vec<Settled> {
            self.delays.resolve(&mut self.store, &self.complete, variant, outcome).unwrap()
        }
    }

    #[test]
    fn refuted_set_is_not_decremented_further() {
        let mut f = Fixture::new();
        let (p, q, r) = (f.variant("p"), f.variant("q"), f.variant("r"));
        let pa = f.answer(p, 1);
        let qa = f.answer(q, 1);
        let h = f.variant("h");
        let ha = f.answer(h, 1);

        // h :- tnot q, p(a).   h :- tnot r.
        f.delays
            .add_condition(h, ha, vec![Delay::negative(q, Key("q")), Delay::positive(p, Key("p"), pa)])
            .unwrap();
        f.delays.add_condition(h, ha, vec![Delay::negative(r, Key("r"))]).unwrap();

        // q succeeds: `tnot q` fails and takes the first disjunct with it.
        assert!(f.resolve(q, Outcome::True(qa)).is_empty());
        let sets = f.delays.info(ha).unwrap().delay_sets().to_vec();
        assert!(sets[0].is_refuted());
        assert_eq!(sets[0].active(), 2);

        // p(a) is irrelevant now.
        assert!(f.resolve(p, Outcome::True(pa)).is_empty());
        assert_eq!(f.delays.info(ha).unwrap().delay_sets()[0].active(), 2);

        // r fails: the second disjunct holds.
        f.complete.insert(r);
        let settled = f.resolve(r, Outcome::False(None));
        assert_eq!(settled, vec![Settled::True { variant: h, answer: ha }]);
        assert!(!f.delays.is_conditional(ha));
    }

    #[test]
    fn satisfied_set_propagates_exactly_once() {
        let mut f = Fixture::new();
        let (p, q, h) = (f.variant("p"), f.variant("q"), f.variant("h"));
        let pa = f.answer(p, 1);
        let ha = f.answer(h, 1);
        f.delays
            .add_condition(h, ha, vec![Delay::negative(q, Key("q")), Delay::positive(p, Key("p"), pa)])
            .unwrap();

        f.complete.insert(q);
        assert!(f.resolve(q, Outcome::False(None)).is_empty());
        assert!(f.resolve(q, Outcome::False(None)).is_empty());
        assert_eq!(f.delays.info(ha).unwrap().delay_sets()[0].active(), 1);

        assert_eq!(f.resolve(p, Outcome::True(pa)), vec![Settled::True { variant: h, answer: ha }]);
        assert!(f.resolve(p, Outcome::True(pa)).is_empty());
    }

    #[test]
    fn refuting_every_disjunct_deletes_the_answer_and_cascades() {
        let mut f = Fixture::new();
        let (p, q, h) = (f.variant("p"), f.variant("q"), f.variant("h"));
        let pa = f.answer(p, 1);
        let qa = f.answer(q, 1);
        let ha = f.answer(h, 1);
        f.delays.add_condition(q, qa, vec![Delay::negative(p, Key("p"))]).unwrap();
        f.delays.add_condition(h, ha, vec![Delay::positive(q, Key("q"), qa)]).unwrap();
        f.complete.insert(q);
        f.complete.insert(h);

        let settled = f.resolve(p, Outcome::True(pa));
        assert_eq!(
            settled,
            vec![Settled::False { variant: q, answer: qa }, Settled::False { variant: h, answer: ha }]
        );
        assert!(!f.store.contains(qa));
        assert!(!f.store.contains(ha));
        assert!(f.delays.is_empty());
    }

    #[test]
    fn settling_one_answer_leaves_literals_on_its_siblings_alone() {
        let mut f = Fixture::new();
        let (p, h, g) = (f.variant("p"), f.variant("h"), f.variant("g"));
        let pa = f.answer(p, 1);
        let pb = f.answer(p, 2);
        let ha = f.answer(h, 1);
        let ga = f.answer(g, 1);
        // h :- p(1).   g :- p(2).
        f.delays.add_condition(h, ha, vec![Delay::positive(p, Key("p"), pa)]).unwrap();
        f.delays.add_condition(g, ga, vec![Delay::positive(p, Key("p"), pb)]).unwrap();

        assert_eq!(f.resolve(p, Outcome::True(pa)), vec![Settled::True { variant: h, answer: ha }]);
        assert!(f.delays.is_conditional(ga));
        assert_eq!(f.delays.dependents(p, Outcome::True(pb)), vec![ga]);
        assert!(f.delays.dependents(p, Outcome::True(pa)).is_empty());

        // Failure of the whole variant still reaches g.
        f.complete.insert(g);
        assert_eq!(f.resolve(p, Outcome::False(None)), vec![Settled::False { variant: g, answer: ga }]);
        assert!(!f.store.contains(ga));
    }

    #[test]
    fn dependent_variants_cover_both_literal_kinds() {
        let mut f = Fixture::new();
        let (p, h, g) = (f.variant("p"), f.variant("h"), f.variant("g"));
        let pa = f.answer(p, 1);
        let ha = f.answer(h, 1);
        let ga = f.answer(g, 1);
        f.delays.add_condition(h, ha, vec![Delay::positive(p, Key("p"), pa)]).unwrap();
        f.delays.add_condition(g, ga, vec![Delay::negative(p, Key("p"))]).unwrap();

        let mut expected = vec![h, g];
        expected.sort();
        assert_eq!(f.delays.dependent_variants(p), expected);
        assert!(f.delays.dependent_variants(h).is_empty());
    }

    #[test]
    fn normalize_drops_settled_literals() {
        let mut f = Fixture::new();
        let (p, q, r) = (f.variant("p"), f.variant("q"), f.variant("r"));
        let pa = f.answer(p, 1);
        f.complete.insert(q);

        let mut list = DelayList::new();
        list.push(Delay::positive(p, Key("p"), pa)).unwrap();
        list.push(Delay::negative(q, Key("q"))).unwrap();
        list.push(Delay::negative(r, Key("r"))).unwrap();
        let kept = f.delays.normalize(&f.store, &f.complete, list).unwrap();
        assert_eq!(kept, vec![Delay::negative(r, Key("r"))]);

        let mut list = DelayList::new();
        list.push(Delay::negative(p, Key("p"))).unwrap();
        assert!(f.delays.normalize(&f.store, &f.complete, list).is_none());
    }
}
