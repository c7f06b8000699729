//! Tabled evaluation: worklists, the component tree, delayed literals
//! and the incremental dependency graph, driven through a `Session`.
//!
//! `Tables` is the persistent half: answers, conditions and the IDG
//! outlive any one evaluation. A `Session` is the transient half owned
//! by one logical thread: the component tree and the live worklists of
//! tables that are still being computed. The interpreter drives a
//! session through `call`, `subscribe`, `negate` and `add_answer`, and
//! hands control back to it through `completion`, which runs worklists
//! to a fixpoint and resumes suspended consumers through a `Resolver`.

use crate::arena::Arena;
use crate::config::TablingConfig;
use crate::errors::*;
use crate::store::{AnswerId, AnswerStore, Inserted, TableKey, VariantId};
use std::collections::{HashMap, HashSet};
use std::mem;

pub mod cluster;
pub mod component;
pub mod delay;
pub mod idg;
pub mod wfs;
pub mod worklist;

#[cfg(test)]
mod test;

use self::component::{Component, ComponentIndex, NegStatus, SccStatus};
use self::delay::{Delay, DelayList, DelayStore, Settled};
use self::idg::Idg;
use self::wfs::TruthValue;
use self::worklist::{Worklist, WorklistIndex};

/// The persistent tabling state.
pub struct Tables<S: AnswerStore> {
    store: S,
    idg: Idg,
    delays: DelayStore<S::Key>,
    complete: HashSet<VariantId>,
}

impl<S: AnswerStore> Tables<S> {
    pub fn new(store: S) -> Self {
        Tables { store, idg: Idg::new(), delays: DelayStore::new(), complete: HashSet::new() }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn idg(&self) -> &Idg {
        &self.idg
    }

    pub fn idg_mut(&mut self) -> &mut Idg {
        &mut self.idg
    }

    pub fn delays(&self) -> &DelayStore<S::Key> {
        &self.delays
    }

    pub fn is_complete(&self, variant: VariantId) -> bool {
        self.complete.contains(&variant)
    }

    pub fn is_conditional(&self, answer: AnswerId) -> bool {
        self.delays.is_conditional(answer)
    }

    pub fn answer_truth(&self, answer: AnswerId) -> TruthValue {
        wfs::answer_truth(&self.store, &self.delays, answer)
    }

    /// The residual program for `answer`: one conjunction of pending
    /// literals per live disjunct. Empty if the answer is unconditional.
    pub fn conditions(&self, answer: AnswerId) -> Vec<Vec<Delay<S::Key>>> {
        match self.delays.info(answer) {
            Some(info) => info.live_sets().map(|set| set.into_iter().cloned().collect()).collect(),
            None => vec![],
        }
    }

    /// Throws the table of `variant` away. Returns the number of answers
    /// dropped. Tables whose conditional answers mention the abolished
    /// ones are invalidated, since those literals can no longer settle.
    pub fn abolish(&mut self, variant: VariantId) -> Result<usize> {
        debug!("abolish({:?})", variant);
        let dependents = self.delays.dependent_variants(variant);
        self.delays.forget_variant(&self.store, variant);
        self.complete.remove(&variant);
        let dropped = self.store.abolish(variant)?;
        for dependent in dependents {
            if dependent != variant && self.idg.lookup(dependent).is_some() {
                debug!("{:?} held conditions on {:?}", dependent, variant);
                self.idg.invalidate(dependent)?;
            }
        }
        Ok(dropped)
    }

    /// Answer of a complete table to `tnot`.
    fn negation_of(&self, variant: VariantId) -> Negation {
        let answers = self.store.answers(variant);
        if answers.is_empty() {
            Negation::Succeeded
        } else if answers.iter().any(|&answer| !self.delays.is_conditional(answer)) {
            Negation::Failed
        } else {
            Negation::Delayed
        }
    }
}

/// What a call found.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// The table is complete; read its answers from the store.
    Complete(VariantId),
    /// The table is complete but the IDG has invalidated it.
    Invalid(VariantId),
    /// First call: the caller must evaluate the variant's clauses into
    /// `worklist`, then drive `component` to completion.
    Fresh { worklist: WorklistIndex, component: ComponentIndex },
    /// The variant is being evaluated by an enclosing call; the
    /// component path up to its owner has been merged.
    Incomplete(WorklistIndex),
}

/// Answer to `tnot`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Negation {
    /// No answers: the negative literal holds.
    Succeeded,
    /// An unconditional answer exists: the negative literal fails.
    Failed,
    /// Only conditional answers, or a negative loop: continue with the
    /// literal delayed.
    Delayed,
    /// The table is incomplete; the consumer will be resumed with one
    /// of the other outcomes.
    Suspended,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddAnswer {
    New(AnswerId),
    Duplicate(AnswerId),
    /// The clause's delayed literals are already known to fail.
    Rejected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Completed,
    /// The component was merged into an ancestor, which completes it.
    Merged,
    /// A worklist of the component is executing further up the stack.
    Pending,
}

enum Step {
    Done,
    Resume,
    Pending,
}

/// Resumes suspended consumers. Implemented by the interpreter.
pub trait Resolver<S: AnswerStore, C> {
    /// `consumer` is resumed with a new answer of the table it called.
    fn resume(&mut self, session: &mut Session<S, C>, consumer: C, answer: AnswerId) -> Result<()>;

    /// `consumer` is resumed with the result of its `tnot`. Never called
    /// with `Failed` or `Suspended`.
    fn resume_negation(
        &mut self,
        session: &mut Session<S, C>,
        consumer: C,
        variant: VariantId,
        negation: Negation,
    ) -> Result<()>;
}

/// The transient state of one logical thread.
pub struct Session<S: AnswerStore, C> {
    config: TablingConfig,
    tables: Tables<S>,
    components: Arena<ComponentIndex, Component>,
    worklists: Arena<WorklistIndex, Worklist<C>>,
    variants: HashMap<VariantId, WorklistIndex>,
    current: Option<ComponentIndex>,
    delay_lists: Vec<DelayList<S::Key>>,
}

impl<S: AnswerStore, C: Clone> Session<S, C> {
    pub fn new(config: TablingConfig, tables: Tables<S>) -> Self {
        Session {
            config,
            tables,
            components: Arena::new(),
            worklists: Arena::new(),
            variants: HashMap::new(),
            current: None,
            delay_lists: vec![],
        }
    }

    pub fn config(&self) -> &TablingConfig {
        &self.config
    }

    pub fn tables(&self) -> &Tables<S> {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut Tables<S> {
        &mut self.tables
    }

    pub fn current(&self) -> Option<ComponentIndex> {
        self.current
    }

    pub fn component(&self, index: ComponentIndex) -> Result<&Component> {
        self.components.get(index)
    }

    pub fn worklist(&self, index: WorklistIndex) -> Result<&Worklist<C>> {
        self.worklists.get(index)
    }

    /// The live worklist of `variant`, if its table is being computed.
    pub fn worklist_of(&self, variant: VariantId) -> Option<WorklistIndex> {
        self.variants.get(&variant).cloned()
    }

    pub fn is_conditional(&self, answer: AnswerId) -> bool {
        self.tables.is_conditional(answer)
    }

    pub fn answer_truth(&self, answer: AnswerId) -> TruthValue {
        self.tables.answer_truth(answer)
    }

    pub fn conditions(&self, answer: AnswerId) -> Vec<Vec<Delay<S::Key>>> {
        self.tables.conditions(answer)
    }

    /// A tabled call of `key`, made while evaluating `parent`.
    pub fn call(&mut self, parent: Option<VariantId>, key: &S::Key) -> Result<CallOutcome> {
        let variant = self.tables.store.intern(key)?;
        if self.config.incremental {
            match parent {
                Some(parent) => {
                    self.tables.idg.record_edge(parent, variant)?;
                }
                None => {
                    self.tables.idg.node(variant)?;
                }
            }
        }

        if self.tables.complete.contains(&variant) {
            // A table that completed early in this session is fresh
            // whatever its IDG node says.
            let live = self.variants.contains_key(&variant);
            if self.config.incremental && !live && self.tables.idg.is_invalid(variant) {
                return Ok(CallOutcome::Invalid(variant));
            }
            return Ok(CallOutcome::Complete(variant));
        }

        if let Some(&worklist) = self.variants.get(&variant) {
            let owner = self.worklists[worklist].component;
            self.merge_path(owner)?;
            return Ok(CallOutcome::Incomplete(worklist));
        }

        debug_heading!("new table {:?} for {:?}", variant, key);
        let component = self.components.insert(Component::new(self.current, Some(variant)))?;
        let worklist = match self.create_worklist(variant, component, key.is_ground()) {
            Ok(worklist) => worklist,
            Err(err) => {
                self.components.remove(component)?;
                return Err(err);
            }
        };
        if let Some(parent) = self.current {
            self.components[parent].children.insert(component)?;
        }
        debug!("component {:?} under {:?}", component, self.current);
        self.current = Some(component);
        Ok(CallOutcome::Fresh { worklist, component })
    }

    fn create_worklist(
        &mut self,
        variant: VariantId,
        component: ComponentIndex,
        ground: bool,
    ) -> Result<WorklistIndex> {
        self.variants.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory("variant map"))?;
        let worklist = self.worklists.insert(Worklist::new(
            variant,
            component,
            ground,
            self.config.cluster_capacity,
        ))?;
        if let Err(err) = self.components[component].created_worklists.insert(worklist) {
            self.worklists.remove(worklist)?;
            return Err(err);
        }
        self.variants.insert(variant, worklist);
        Ok(worklist)
    }

    /// Records that `parent`'s table depends on `key` without tabling
    /// `key` (dynamic base predicates).
    pub fn record_dependency(&mut self, parent: VariantId, key: &S::Key) -> Result<VariantId> {
        let variant = self.tables.store.intern(key)?;
        if self.config.incremental {
            self.tables.idg.record_edge(parent, variant)?;
        }
        Ok(variant)
    }

    /// Merges every component from the current one up to `owner` into
    /// `owner`.
    fn merge_path(&mut self, owner: ComponentIndex) -> Result<()> {
        let mut path = vec![];
        let mut cursor = self.current;
        loop {
            match cursor {
                Some(index) if index == owner => break,
                Some(index) => {
                    path.push(index);
                    cursor = self.components.get(index)?.parent;
                }
                None => bail!(ErrorKind::Scheduling(format!(
                    "component {:?} is not an ancestor of {:?}",
                    owner, self.current
                ))),
            }
        }

        if !path.is_empty() {
            debug_heading!("merge {:?} into {:?}", path, owner);
            for index in path {
                self.merge_into(index, owner)?;
            }
        }
        self.current = Some(owner);
        Ok(())
    }

    fn merge_into(&mut self, child: ComponentIndex, owner: ComponentIndex) -> Result<()> {
        self.components[child].transition(SccStatus::Merged)?;

        if let Some(parent) = self.components[child].parent {
            self.components[parent].children.remove(child);
        }

        let mut children = mem::take(&mut self.components[child].children);
        for grandchild in children.iter() {
            self.components[grandchild].parent = Some(owner);
        }
        self.components[owner].children.absorb(&mut children)?;

        let mut runnable = mem::take(&mut self.components[child].worklist);
        self.components[owner].worklist.absorb(&mut runnable)?;

        let mut created = mem::take(&mut self.components[child].created_worklists);
        for worklist in created.iter() {
            self.worklists[worklist].component = owner;
        }
        self.components[owner].created_worklists.absorb(&mut created)?;

        let mut delayed = mem::take(&mut self.components[child].delay_worklists);
        self.components[owner].delay_worklists.absorb(&mut delayed)?;

        let mut merged = mem::take(&mut self.components[child].merged);
        merged.insert(child)?;
        self.components[owner].merged.absorb(&mut merged)?;

        let (neg_status, simplifications) = {
            let child = &self.components[child];
            (child.neg_status, child.simplifications)
        };
        let owner = &mut self.components[owner];
        owner.raise_neg_status(neg_status);
        owner.simplifications += simplifications;
        Ok(())
    }

    /// Registers `consumer` on `worklist` and returns the answers it
    /// must consume right away. It is resumed with every later answer
    /// exactly once.
    pub fn subscribe(&mut self, worklist: WorklistIndex, consumer: C) -> Result<Vec<AnswerId>> {
        let worklist = self.worklists.get_mut(worklist)?;
        let answers = self.tables.store.answers(worklist.variant);
        if !worklist.completed {
            worklist.push_suspension(consumer)?;
        }
        Ok(answers)
    }

    /// `tnot` of a variant that has already been called.
    pub fn negate(&mut self, variant: VariantId, consumer: C) -> Result<Negation> {
        if self.tables.complete.contains(&variant) {
            return Ok(self.tables.negation_of(variant));
        }
        let index = match self.variants.get(&variant) {
            Some(&index) => index,
            None => bail!(ErrorKind::Scheduling(format!("tnot of {:?}, which was never called", variant))),
        };
        let worklist = &mut self.worklists[index];
        if worklist.has_answers {
            return Ok(Negation::Failed);
        }
        try_push(&mut worklist.negatives, consumer, "negative waiters")?;
        worklist.negative = true;
        Ok(Negation::Suspended)
    }

    /// Starts recording the delayed literals of the clause being
    /// resolved.
    pub fn init_delay_list(&mut self) -> Result<()> {
        try_push(&mut self.delay_lists, DelayList::new(), "delay lists")
    }

    /// Adds a delayed literal to the innermost delay list: positive if
    /// `answer` is given, `tnot` otherwise.
    pub fn push_delay(&mut self, variant: VariantId, wrapper: S::Key, answer: Option<AnswerId>) -> Result<()> {
        let list = match self.delay_lists.last_mut() {
            Some(list) => list,
            None => bail!(ErrorKind::Scheduling("push_delay without init_delay_list".to_string())),
        };
        let delay = match answer {
            Some(answer) => Delay::positive(variant, wrapper, answer),
            None => Delay::negative(variant, wrapper),
        };
        list.push(delay)
    }

    pub fn take_delay_list(&mut self) -> Result<DelayList<S::Key>> {
        match self.delay_lists.pop() {
            Some(list) => Ok(list),
            None => bail!(ErrorKind::Scheduling("take_delay_list without init_delay_list".to_string())),
        }
    }

    /// Adds an answer to the table of `worklist`, conditional on
    /// `delays`.
    pub fn add_answer(
        &mut self,
        worklist: WorklistIndex,
        term: S::Term,
        delays: DelayList<S::Key>,
    ) -> Result<AddAnswer> {
        let (variant, completed) = {
            let worklist = self.worklists.get(worklist)?;
            (worklist.variant, worklist.completed)
        };

        let conditions = match self.tables.delays.normalize(&self.tables.store, &self.tables.complete, delays) {
            Some(conditions) => conditions,
            None => return Ok(AddAnswer::Rejected),
        };
        let conditional = !conditions.is_empty();

        if completed {
            // Only an early-completed ground table can get here, and it
            // already has its one answer.
            return match self.tables.store.answers(variant).first() {
                Some(&answer) => Ok(AddAnswer::Duplicate(answer)),
                None => Ok(AddAnswer::Rejected),
            };
        }

        match self.tables.store.insert_answer(variant, term)? {
            Inserted::New(answer) => {
                debug!("new answer {:?} for {:?}, conditional = {}", answer, variant, conditional);
                if let Err(err) = self.record_answer(worklist, variant, answer, conditions) {
                    self.tables.delays.forget(answer);
                    let entry = &mut self.worklists[worklist];
                    entry.delays.retain(|&delayed| delayed != answer);
                    entry.undefined = entry.delays.len();
                    self.tables.store.delete_answer(answer)?;
                    return Err(err);
                }
                self.schedule(worklist)?;
                if !conditional {
                    self.settle_true(variant, answer)?;
                }
                Ok(AddAnswer::New(answer))
            }
            Inserted::Duplicate(answer) => {
                if !self.tables.delays.is_conditional(answer) {
                    return Ok(AddAnswer::Duplicate(answer));
                }
                if conditional {
                    self.tables.delays.add_condition(variant, answer, conditions)?;
                } else {
                    debug!("conditional answer {:?} for {:?} re-derived unconditionally", answer, variant);
                    self.settle_true(variant, answer)?;
                }
                Ok(AddAnswer::Duplicate(answer))
            }
        }
    }

    fn record_answer(
        &mut self,
        index: WorklistIndex,
        variant: VariantId,
        answer: AnswerId,
        conditions: Vec<Delay<S::Key>>,
    ) -> Result<()> {
        let conditional = !conditions.is_empty();
        if conditional {
            self.tables.delays.add_condition(variant, answer, conditions)?;
            let worklist = &mut self.worklists[index];
            try_push(&mut worklist.delays, answer, "delayed answers")?;
            worklist.undefined += 1;
            let component = worklist.component;
            self.components[component].delay_worklists.insert(index)?;
        }
        self.worklists[index].push_answer(answer, conditional)
    }

    /// `answer` of `variant` just became unconditionally true.
    fn settle_true(&mut self, variant: VariantId, answer: AnswerId) -> Result<()> {
        let settled =
            self.tables.delays.confirm(&mut self.tables.store, &self.tables.complete, variant, answer)?;
        self.apply_settled(&settled);
        self.apply_settled(&[Settled::True { variant, answer }]);
        Ok(())
    }

    /// Brings live worklists in line with answers that left the
    /// conditional state.
    fn apply_settled(&mut self, settled: &[Settled]) {
        for &event in settled {
            let (variant, answer, truth) = match event {
                Settled::True { variant, answer } => (variant, answer, true),
                Settled::False { variant, answer } => (variant, answer, false),
            };
            let index = match self.variants.get(&variant) {
                Some(&index) => index,
                None => continue,
            };
            let worklist = &mut self.worklists[index];
            worklist.delays.retain(|&delayed| delayed != answer);
            worklist.undefined = worklist.delays.len();
            if !truth {
                continue;
            }

            worklist.has_answers = true;
            if !worklist.negatives.is_empty() {
                debug!("{} negative waiters on {:?} fail", worklist.negatives.len(), variant);
                worklist.negatives.clear();
            }
            if self.config.early_completion && worklist.ground && !worklist.completed {
                debug!("ground table {:?} completes early", variant);
                worklist.mark_complete();
                self.tables.complete.insert(variant);
            }
        }
    }

    /// Queues `worklist` in its component's runnable set.
    fn schedule(&mut self, index: WorklistIndex) -> Result<()> {
        let worklist = &self.worklists[index];
        if worklist.in_global_wl || !worklist.has_work() {
            return Ok(());
        }
        let component = worklist.component;
        self.components[component].worklist.insert(index)?;
        self.worklists[index].in_global_wl = true;
        Ok(())
    }

    /// Resolves every pending (consumer, answer) pair of `worklist`.
    pub fn run<R>(&mut self, index: WorklistIndex, resolver: &mut R) -> Result<()>
    where
        R: Resolver<S, C> + ?Sized,
    {
        let variant = {
            let worklist = self.worklists.get_mut(index)?;
            if worklist.executing {
                bail!(ErrorKind::Scheduling(format!("worklist of {:?} is already executing", worklist.variant)));
            }
            worklist.executing = true;
            worklist.variant
        };
        debug_heading!("run({:?})", variant);

        let result = self.drain(index, resolver);
        if let Ok(worklist) = self.worklists.get_mut(index) {
            worklist.executing = false;
        }
        result
    }

    fn drain<R>(&mut self, index: WorklistIndex, resolver: &mut R) -> Result<()>
    where
        R: Resolver<S, C> + ?Sized,
    {
        loop {
            let next = self.worklists.get_mut(index)?.next_work()?;
            let (consumer, answer) = match next {
                Some(work) => work,
                None => break,
            };
            if !self.tables.store.contains(answer) {
                debug!("skipping deleted answer {:?}", answer);
                continue;
            }
            resolver.resume(self, consumer, answer)?;
        }
        Ok(())
    }

    /// Runs `component` to a fixpoint and completes it.
    pub fn completion<R>(&mut self, component: ComponentIndex, resolver: &mut R) -> Result<Completion>
    where
        R: Resolver<S, C> + ?Sized,
    {
        debug_heading!("completion({:?})", component);
        loop {
            match self.components.get(component)?.status {
                SccStatus::Active => {}
                SccStatus::Merged => return Ok(Completion::Merged),
                SccStatus::Completed => bail!(ErrorKind::Scheduling(format!(
                    "component {:?} is already complete",
                    component
                ))),
            }

            if let Some(index) = self.pop_runnable(component) {
                self.run(index, resolver)?;
                continue;
            }

            match self.try_complete(component, resolver)? {
                Step::Done => return Ok(Completion::Completed),
                Step::Resume => continue,
                Step::Pending => return Ok(Completion::Pending),
            }
        }
    }

    fn pop_runnable(&mut self, component: ComponentIndex) -> Option<WorklistIndex> {
        while let Some(index) = self.components[component].worklist.pop_front() {
            let worklist = &mut self.worklists[index];
            worklist.in_global_wl = false;
            if !worklist.executing {
                return Some(index);
            }
        }
        None
    }

    fn try_complete<R>(&mut self, component: ComponentIndex, resolver: &mut R) -> Result<Step>
    where
        R: Resolver<S, C> + ?Sized,
    {
        let worklists = self.components[component].created_worklists.to_vec();
        if worklists.iter().any(|&index| self.worklists[index].executing) {
            return Ok(Step::Pending);
        }

        let mut rescheduled = false;
        for &index in &worklists {
            if self.worklists[index].has_work() {
                self.schedule(index)?;
                rescheduled = true;
            }
        }
        if rescheduled {
            return Ok(Step::Resume);
        }

        // At a fixpoint, anyone waiting on the failure of a table in this
        // component that has no unconditional answer is caught in a loop
        // through negation.
        let mut waiters = vec![];
        for &index in &worklists {
            let worklist = &mut self.worklists[index];
            if !worklist.is_negative() || worklist.negatives.is_empty() || worklist.has_answers {
                continue;
            }
            worklist.neg_delayed = true;
            let variant = worklist.variant;
            waiters.extend(worklist.negatives.drain(..).map(|consumer| (consumer, variant)));
        }
        if !waiters.is_empty() {
            debug!("delaying {} negative waiters in {:?}", waiters.len(), component);
            self.components[component].raise_neg_status(NegStatus::Delay);
            for (consumer, variant) in waiters {
                resolver.resume_negation(self, consumer, variant, Negation::Delayed)?;
            }
            return Ok(Step::Resume);
        }

        self.complete_component(component, resolver)?;
        Ok(Step::Done)
    }

    fn complete_component<R>(&mut self, component: ComponentIndex, resolver: &mut R) -> Result<()>
    where
        R: Resolver<S, C> + ?Sized,
    {
        debug_heading!("complete_component({:?})", component);
        for child in self.components[component].children.iter() {
            if !self.components[child].is_terminal() {
                bail!(ErrorKind::Scheduling(format!(
                    "component {:?} has an active child {:?}",
                    component, child
                )));
            }
        }
        self.components[component].transition(SccStatus::Completed)?;

        let worklists = self.components[component].created_worklists.to_vec();
        let variants: Vec<VariantId> = worklists.iter().map(|&index| self.worklists[index].variant).collect();
        self.tables.complete.try_reserve(variants.len()).map_err(|_| ErrorKind::OutOfMemory("complete set"))?;
        for &index in &worklists {
            let worklist = &mut self.worklists[index];
            worklist.mark_complete();
            self.tables.complete.insert(worklist.variant);
        }

        // Tables that ended with no answers at all fail.
        let mut settled = vec![];
        for &variant in &variants {
            if self.tables.store.answer_count(variant) == 0 {
                settled.extend(self.tables.delays.resolve(
                    &mut self.tables.store,
                    &self.tables.complete,
                    variant,
                    delay::Outcome::False(None),
                )?);
            }
        }
        self.apply_settled(&settled);

        let mut pending = vec![];
        for &index in &worklists {
            let worklist = &mut self.worklists[index];
            let delays = &self.tables.delays;
            worklist.pos_undefined = worklist.delays.iter().cloned().filter(|&a| delays.is_conditional(a)).collect();
            pending.extend(worklist.pos_undefined.iter().cloned());
        }
        if !pending.is_empty() {
            self.simplify(component, &pending)?;
        }

        for &index in &worklists {
            let worklist = &mut self.worklists[index];
            let delays = &self.tables.delays;
            worklist.delays.retain(|&answer| delays.is_conditional(answer));
            worklist.undefined = worklist.delays.len();
            worklist.answer_completed = worklist.undefined == 0;
        }

        if self.config.incremental {
            let counts: Vec<(VariantId, usize)> =
                variants.iter().map(|&variant| (variant, self.tables.store.answer_count(variant))).collect();
            self.tables.idg.complete_all(&counts)?;
        }

        // Everything below happens at the boundary: no worklist of the
        // component is being scanned any more.
        let mut abolish = vec![];
        let mut invalidate = vec![];
        let mut waiters = vec![];
        for &index in &worklists {
            let mut worklist = self.worklists.remove(index)?;
            self.variants.remove(&worklist.variant);
            worklist.reset()?;
            if worklist.abolish_on_complete {
                abolish.push(worklist.variant);
            } else if worklist.depend_abolish {
                invalidate.push(worklist.variant);
            }
            let variant = worklist.variant;
            waiters.extend(worklist.negatives.drain(..).map(|consumer| (consumer, variant)));
        }
        let waiters: Vec<(C, VariantId, Negation)> = waiters
            .into_iter()
            .map(|(consumer, variant)| (consumer, variant, self.tables.negation_of(variant)))
            .collect();

        for variant in abolish {
            log::warn!("applying deferred abolish of {:?}", variant);
            self.tables.abolish(variant)?;
        }
        for variant in invalidate {
            log::warn!("applying deferred invalidation of {:?}", variant);
            self.tables.idg.invalidate(variant)?;
        }

        self.current = self.components[component].parent;
        debug!("completed {:?} with tables {:?}", component, variants);

        for (consumer, variant, negation) in waiters {
            if negation != Negation::Failed {
                resolver.resume_negation(self, consumer, variant, negation)?;
            }
        }
        Ok(())
    }

    /// Deletes unfounded conditional answers of a completed component.
    fn simplify(&mut self, component: ComponentIndex, pending: &[AnswerId]) -> Result<()> {
        debug_heading!("simplify({:?}, {} conditional answers)", component, pending.len());
        self.components[component].raise_neg_status(NegStatus::Simplify);

        let unfounded = wfs::unfounded(&self.tables.delays, pending);
        let mut settled = vec![];
        for answer in unfounded {
            if !self.tables.delays.is_conditional(answer) {
                continue;
            }
            debug!("answer {:?} is unfounded", answer);
            settled.extend(self.tables.delays.retract(&mut self.tables.store, &self.tables.complete, answer)?);
        }
        self.components[component].simplifications += settled.len();
        self.apply_settled(&settled);
        Ok(())
    }

    /// Abolishes the table of `variant`, or defers it to completion if
    /// the table is still being computed. Returns whether the table is
    /// gone now.
    pub fn abolish(&mut self, variant: VariantId) -> Result<bool> {
        if let Some(&index) = self.variants.get(&variant) {
            log::warn!("abolish of {:?} deferred until its table completes", variant);
            self.worklists[index].abolish_on_complete = true;
            return Ok(false);
        }
        self.tables.abolish(variant)?;
        Ok(true)
    }

    /// Starts an IDG invalidation wave at `variant`, deferred to
    /// completion if its table is still being computed.
    pub fn invalidate(&mut self, variant: VariantId) -> Result<Vec<VariantId>> {
        if let Some(&index) = self.variants.get(&variant) {
            log::warn!("invalidation of {:?} deferred until its table completes", variant);
            self.worklists[index].depend_abolish = true;
            return Ok(vec![]);
        }
        self.tables.idg.invalidate(variant)
    }

    /// Releases everything this session owns. Tables left incomplete are
    /// abolished; complete tables stay.
    pub fn clear(&mut self) -> Result<()> {
        let incomplete: Vec<VariantId> = self
            .variants
            .keys()
            .cloned()
            .filter(|variant| !self.tables.complete.contains(variant))
            .collect();
        for variant in incomplete {
            self.tables.abolish(variant)?;
        }
        self.variants.clear();
        self.worklists.clear();
        self.components.clear();
        self.current = None;
        self.delay_lists.clear();
        Ok(())
    }

    /// Ends the session and hands the persistent tables back.
    pub fn into_tables(mut self) -> Result<Tables<S>> {
        self.clear()?;
        Ok(self.tables)
    }
}
