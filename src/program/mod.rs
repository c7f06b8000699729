//! A small SLG evaluator over Datalog rules with `tnot`.
//!
//! Predicates defined by rules are tabled; every call of one goes
//! through a `Session`. Predicates without rules are dynamic base
//! relations whose facts can be asserted and retracted; each is a single
//! IDG node, so changing a fact invalidates exactly the tables computed
//! from that relation.
//!
//! Clause resolution follows the usual SLG shape: an `ExClause` is a
//! partially resolved clause `head :- delayed | subgoals`. The selected
//! literal is popped off the end of `subgoals`; a tabled literal either
//! consumes the answers already in its table or suspends as a consumer
//! of that table until new answers arrive.

use crate::config::TablingConfig;
use crate::errors::*;
use crate::solve::component::ComponentIndex;
use crate::solve::idg::{self, Idg, Reevaluate, Reevaluation};
use crate::solve::wfs::TruthValue;
use crate::solve::worklist::WorklistIndex;
use crate::solve::{CallOutcome, Completion, Negation, Resolver, Session, Tables};
use crate::store::{AnswerId, AnswerStore, MemoryStore, VariantId};
use std::collections::{HashMap, HashSet};
use std::mem;

pub mod term;

#[cfg(test)]
mod test;

pub use self::term::{Atom, Literal, Rule, Substitution, Symbol, Term};

pub type AtomStore = MemoryStore<Atom, Atom>;

/// The static rules.
#[derive(Clone, Debug, Default)]
pub struct Program {
    rules: Vec<Rule>,
    tabled: HashSet<Symbol>,
}

impl Program {
    pub fn new(rules: Vec<Rule>) -> Self {
        let tabled = rules.iter().map(|rule| rule.head.predicate.clone()).collect();
        Program { rules, tabled }
    }

    pub fn is_tabled(&self, predicate: &Symbol) -> bool {
        self.tabled.contains(predicate)
    }

    pub fn rules_for<'a>(&'a self, predicate: &'a Symbol) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |rule| rule.head.predicate == *predicate)
    }
}

/// A literal delayed in a clause: the clause continues as if it held.
#[derive(Clone, Debug)]
enum Delayed {
    Positive { variant: VariantId, wrapper: Atom, answer: AnswerId },
    Negative { variant: VariantId, wrapper: Atom },
}

/// `head :- delayed | subgoals`, deriving answers for `table`.
#[derive(Clone, Debug)]
pub struct ExClause {
    table: WorklistIndex,
    variant: VariantId,
    head: Atom,
    delayed: Vec<Delayed>,
    /// Remaining literals, the next one last.
    subgoals: Vec<Literal>,
}

impl ExClause {
    fn apply(&self, subst: &Substitution) -> ExClause {
        ExClause {
            table: self.table,
            variant: self.variant,
            head: subst.apply_atom(&self.head),
            delayed: self.delayed.clone(),
            subgoals: self.subgoals.iter().map(|literal| subst.apply_literal(literal)).collect(),
        }
    }
}

/// A clause suspended on the table of `callee`, positively or
/// negatively.
#[derive(Clone, Debug)]
pub struct PendingExClause {
    ex_clause: ExClause,
    selected: Atom,
    callee: VariantId,
}

struct Solver<'p> {
    program: &'p Program,
    facts: &'p HashMap<Symbol, Vec<Atom>>,
    overflow_depth: usize,
    depth: usize,
    next_var: u32,
}

type EngineSession = Session<AtomStore, PendingExClause>;

impl<'p> Solver<'p> {
    fn fresh_vars(&mut self, count: u32) -> u32 {
        let offset = self.next_var;
        self.next_var += count;
        offset
    }

    /// Evaluates `goal` from the top, completing its table.
    fn solve_root(&mut self, session: &mut EngineSession, goal: &Atom) -> Result<()> {
        match session.call(None, goal)? {
            CallOutcome::Complete(_) => Ok(()),
            CallOutcome::Invalid(variant) => {
                if session.abolish(variant)? {
                    self.solve_root(session, goal)
                } else {
                    Ok(())
                }
            }
            CallOutcome::Fresh { worklist, component } => {
                let variant = session.worklist(worklist)?.variant();
                self.subgoal(session, worklist, variant, goal)?;
                self.complete(session, component)
            }
            CallOutcome::Incomplete(worklist) => bail!(ErrorKind::Scheduling(format!(
                "root goal {:?} is already being evaluated by {:?}",
                goal, worklist
            ))),
        }
    }

    /// Resolves `goal` against every rule of its predicate, feeding the
    /// answers into `table`.
    fn subgoal(&mut self, session: &mut EngineSession, table: WorklistIndex, variant: VariantId, goal: &Atom) -> Result<()> {
        debug_heading!("subgoal({:?})", goal);
        if self.depth >= self.overflow_depth {
            bail!(ErrorKind::Overflow(self.overflow_depth));
        }
        self.depth += 1;

        let program = self.program;
        let offset = self.fresh_vars(goal.var_count());
        let goal = goal.shift(offset);
        let mut result = Ok(());
        for rule in program.rules_for(&goal.predicate) {
            let offset = self.fresh_vars(rule.var_count());
            let rule = rule.shift(offset);
            let mut subst = Substitution::new();
            if !subst.unify_atoms(&rule.head, &goal) {
                continue;
            }
            let ex_clause = ExClause {
                table,
                variant,
                head: subst.apply_atom(&goal),
                delayed: vec![],
                subgoals: rule.body.iter().rev().map(|literal| subst.apply_literal(literal)).collect(),
            };
            result = self.new_clause(session, ex_clause);
            if result.is_err() {
                break;
            }
        }

        self.depth -= 1;
        result
    }

    fn complete(&mut self, session: &mut EngineSession, component: ComponentIndex) -> Result<()> {
        match session.completion(component, self)? {
            Completion::Completed => {}
            outcome => debug!("completion of {:?}: {:?}", component, outcome),
        }
        Ok(())
    }

    /// Pops the next subgoal off `ex_clause` and solves it.
    fn new_clause(&mut self, session: &mut EngineSession, mut ex_clause: ExClause) -> Result<()> {
        match ex_clause.subgoals.pop() {
            // No goals left to prove: this is an answer.
            None => self.answer(session, ex_clause),
            Some(Literal::Positive(selected)) => self.positive(session, ex_clause, selected),
            Some(Literal::Negative(selected)) => self.negative(session, ex_clause, selected),
        }
    }

    fn answer(&mut self, session: &mut EngineSession, ex_clause: ExClause) -> Result<()> {
        session.init_delay_list()?;
        for delayed in &ex_clause.delayed {
            match *delayed {
                Delayed::Positive { variant, ref wrapper, answer } => {
                    session.push_delay(variant, wrapper.clone(), Some(answer))?
                }
                Delayed::Negative { variant, ref wrapper } => session.push_delay(variant, wrapper.clone(), None)?,
            }
        }
        let delays = session.take_delay_list()?;
        let outcome = session.add_answer(ex_clause.table, ex_clause.head.variant(), delays)?;
        debug!("answer {:?} for {:?}: {:?}", ex_clause.head, ex_clause.variant, outcome);
        Ok(())
    }

    fn positive(&mut self, session: &mut EngineSession, ex_clause: ExClause, selected: Atom) -> Result<()> {
        debug_heading!("positive({:?} :- {:?})", ex_clause.head, selected);
        if !self.program.is_tabled(&selected.predicate) {
            return self.base(session, ex_clause, selected);
        }

        let key = selected.variant();
        match session.call(Some(ex_clause.variant), &key)? {
            CallOutcome::Complete(callee) => self.consume_all(session, &ex_clause, &selected, callee),
            CallOutcome::Invalid(callee) => {
                if session.abolish(callee)? {
                    self.positive(session, ex_clause, selected)
                } else {
                    // Still being recomputed in this session; its answers
                    // are current.
                    self.consume_all(session, &ex_clause, &selected, callee)
                }
            }
            CallOutcome::Incomplete(worklist) => {
                let callee = session.worklist(worklist)?.variant();
                let pending = PendingExClause { ex_clause: ex_clause.clone(), selected: selected.clone(), callee };
                for answer in session.subscribe(worklist, pending)? {
                    self.consume(session, &ex_clause, &selected, callee, answer)?;
                }
                Ok(())
            }
            CallOutcome::Fresh { worklist, component } => {
                let callee = session.worklist(worklist)?.variant();
                session.subscribe(worklist, PendingExClause { ex_clause, selected, callee })?;
                self.subgoal(session, worklist, callee, &key)?;
                self.complete(session, component)
            }
        }
    }

    fn consume_all(
        &mut self,
        session: &mut EngineSession,
        ex_clause: &ExClause,
        selected: &Atom,
        callee: VariantId,
    ) -> Result<()> {
        for answer in session.tables().store().answers(callee) {
            self.consume(session, ex_clause, selected, callee, answer)?;
        }
        Ok(())
    }

    /// Continues `ex_clause` with an answer of the table it selected.
    fn consume(
        &mut self,
        session: &mut EngineSession,
        ex_clause: &ExClause,
        selected: &Atom,
        callee: VariantId,
        answer: AnswerId,
    ) -> Result<()> {
        let term = match session.tables().store().answer_term(answer) {
            Some(term) => term.clone(),
            None => return Ok(()),
        };
        let offset = self.fresh_vars(term.var_count());
        let mut subst = Substitution::new();
        if !subst.unify_atoms(selected, &term.shift(offset)) {
            return Ok(());
        }

        let mut next = ex_clause.apply(&subst);
        if session.is_conditional(answer) {
            next.delayed.push(Delayed::Positive { variant: callee, wrapper: selected.variant(), answer });
        }
        self.new_clause(session, next)
    }

    fn base(&mut self, session: &mut EngineSession, ex_clause: ExClause, selected: Atom) -> Result<()> {
        session.record_dependency(ex_clause.variant, &Atom::base_key(&selected.predicate))?;
        let facts = self.facts;
        for fact in facts.get(&selected.predicate).into_iter().flatten() {
            let mut subst = Substitution::new();
            if subst.unify_atoms(&selected, fact) {
                self.new_clause(session, ex_clause.apply(&subst))?;
            }
        }
        Ok(())
    }

    fn negative(&mut self, session: &mut EngineSession, ex_clause: ExClause, selected: Atom) -> Result<()> {
        debug_heading!("negative({:?} :- tnot {:?})", ex_clause.head, selected);
        if !selected.is_ground() {
            log::warn!("floundered on tnot {:?} in a clause for {:?}", selected, ex_clause.head);
            bail!(ErrorKind::Floundered(format!("{:?}", selected)));
        }

        if !self.program.is_tabled(&selected.predicate) {
            session.record_dependency(ex_clause.variant, &Atom::base_key(&selected.predicate))?;
            let holds = self.facts.get(&selected.predicate).map_or(false, |facts| facts.contains(&selected));
            return if holds { Ok(()) } else { self.new_clause(session, ex_clause) };
        }

        match session.call(Some(ex_clause.variant), &selected)? {
            CallOutcome::Complete(callee) => self.negated(session, ex_clause, selected, callee),
            CallOutcome::Invalid(callee) => {
                if session.abolish(callee)? {
                    self.negative(session, ex_clause, selected)
                } else {
                    self.negated(session, ex_clause, selected, callee)
                }
            }
            CallOutcome::Incomplete(worklist) => {
                let callee = session.worklist(worklist)?.variant();
                self.negated(session, ex_clause, selected, callee)
            }
            CallOutcome::Fresh { worklist, component } => {
                let callee = session.worklist(worklist)?.variant();
                self.subgoal(session, worklist, callee, &selected)?;
                self.complete(session, component)?;
                self.negated(session, ex_clause, selected, callee)
            }
        }
    }

    /// Asks the session about `tnot callee`, suspending if the table is
    /// still incomplete.
    fn negated(&mut self, session: &mut EngineSession, ex_clause: ExClause, selected: Atom, callee: VariantId) -> Result<()> {
        let pending = PendingExClause { ex_clause, selected, callee };
        match session.negate(callee, pending.clone())? {
            Negation::Suspended => Ok(()),
            negation => self.proceed_negative(session, pending, negation),
        }
    }

    fn proceed_negative(&mut self, session: &mut EngineSession, pending: PendingExClause, negation: Negation) -> Result<()> {
        let PendingExClause { mut ex_clause, selected, callee } = pending;
        match negation {
            Negation::Succeeded => self.new_clause(session, ex_clause),
            Negation::Delayed => {
                ex_clause.delayed.push(Delayed::Negative { variant: callee, wrapper: selected });
                self.new_clause(session, ex_clause)
            }
            Negation::Failed | Negation::Suspended => Ok(()),
        }
    }
}

impl<'p> Resolver<AtomStore, PendingExClause> for Solver<'p> {
    fn resume(&mut self, session: &mut EngineSession, pending: PendingExClause, answer: AnswerId) -> Result<()> {
        self.consume(session, &pending.ex_clause, &pending.selected, pending.callee, answer)
    }

    fn resume_negation(
        &mut self,
        session: &mut EngineSession,
        pending: PendingExClause,
        _variant: VariantId,
        negation: Negation,
    ) -> Result<()> {
        self.proceed_negative(session, pending, negation)
    }
}

/// Owns the program, the dynamic facts and the tables, and answers
/// queries with their truth values.
pub struct Engine {
    config: TablingConfig,
    program: Program,
    facts: HashMap<Symbol, Vec<Atom>>,
    tables: Tables<AtomStore>,
    reevaluations: usize,
}

impl Engine {
    pub fn new(config: TablingConfig, program: Program) -> Self {
        Engine { config, program, facts: HashMap::new(), tables: Tables::new(MemoryStore::new()), reevaluations: 0 }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn tables(&self) -> &Tables<AtomStore> {
        &self.tables
    }

    /// Number of tables (and base relations) re-run by `refresh`.
    pub fn reevaluations(&self) -> usize {
        self.reevaluations
    }

    /// All answers to `goal` with their truth value. False answers are
    /// not reported.
    pub fn solve(&mut self, goal: &Atom) -> Result<Vec<(Atom, TruthValue)>> {
        let key = goal.variant();
        self.refresh(&key)?;
        self.evaluate(&key)?;

        let variant = match self.tables.store().lookup(&key) {
            Some(variant) => variant,
            None => return Ok(vec![]),
        };
        let mut answers: Vec<(Atom, TruthValue)> = self
            .tables
            .store()
            .answers(variant)
            .into_iter()
            .filter_map(|answer| {
                let term = self.tables.store().answer_term(answer)?.clone();
                Some((term, self.tables.answer_truth(answer)))
            })
            .collect();
        answers.sort();
        Ok(answers)
    }

    /// Brings the table of `goal` up to date if it was invalidated.
    /// Returns whether its answers changed.
    pub fn refresh(&mut self, goal: &Atom) -> Result<bool> {
        let key = goal.variant();
        match self.tables.store().lookup(&key) {
            Some(variant) if self.tables.idg().is_invalid(variant) => idg::refresh(self, variant),
            _ => Ok(false),
        }
    }

    /// Runs a session that completes the table of `key`.
    fn evaluate(&mut self, key: &Atom) -> Result<()> {
        let tables = mem::replace(&mut self.tables, Tables::new(MemoryStore::new()));
        let mut session = Session::new(self.config, tables);
        let mut solver = Solver {
            program: &self.program,
            facts: &self.facts,
            overflow_depth: self.config.overflow_depth,
            depth: 0,
            next_var: 0,
        };
        let result = solver.solve_root(&mut session, key);
        self.tables = session.into_tables()?;
        result
    }

    /// Adds a fact to a base relation. Returns false if it was already
    /// there.
    pub fn assert_fact(&mut self, fact: Atom) -> Result<bool> {
        self.check_fact(&fact)?;
        let facts = self.facts.entry(fact.predicate.clone()).or_insert_with(Vec::new);
        if facts.contains(&fact) {
            return Ok(false);
        }
        let predicate = fact.predicate.clone();
        try_push(facts, fact, "facts")?;
        self.touch(&predicate)?;
        Ok(true)
    }

    /// Removes a fact from a base relation. Returns false if it was not
    /// there.
    pub fn retract_fact(&mut self, fact: &Atom) -> Result<bool> {
        self.check_fact(fact)?;
        let removed = match self.facts.get_mut(&fact.predicate) {
            Some(facts) => {
                let before = facts.len();
                facts.retain(|existing| existing != fact);
                facts.len() != before
            }
            None => false,
        };
        if removed {
            self.touch(&fact.predicate)?;
        }
        Ok(removed)
    }

    fn check_fact(&self, fact: &Atom) -> Result<()> {
        if self.program.is_tabled(&fact.predicate) {
            bail!("`{}` is defined by rules and has no dynamic facts", fact.predicate);
        }
        if !fact.is_ground() {
            bail!("fact {:?} is not ground", fact);
        }
        Ok(())
    }

    /// Invalidates every table computed from `predicate`.
    fn touch(&mut self, predicate: &Symbol) -> Result<()> {
        if !self.config.incremental {
            return Ok(());
        }
        if let Some(variant) = self.tables.store().lookup(&Atom::base_key(predicate)) {
            let invalidated = self.tables.idg_mut().invalidate(variant)?;
            debug!("{} changed, invalidated {:?}", predicate, invalidated);
        }
        Ok(())
    }

    /// The answers of `variant` with their truth values, so that an
    /// answer moving between true and unknown counts as a change.
    fn answer_set(&self, variant: VariantId) -> HashSet<(Atom, TruthValue)> {
        let store = self.tables.store();
        store
            .answers(variant)
            .into_iter()
            .filter_map(|answer| Some((store.answer_term(answer)?.clone(), self.tables.answer_truth(answer))))
            .collect()
    }
}

impl Reevaluate for Engine {
    fn idg(&mut self) -> &mut Idg {
        self.tables.idg_mut()
    }

    fn reevaluate(&mut self, variant: VariantId) -> Result<Reevaluation> {
        let key = match self.tables.store().variant_key(variant) {
            Some(key) => key.clone(),
            None => bail!(ErrorKind::Scheduling(format!("no key for {:?}", variant))),
        };
        debug_heading!("reevaluate({:?})", key);
        self.reevaluations += 1;

        if !self.program.is_tabled(&key.predicate) {
            let answer_count = self.facts.get(&key.predicate).map_or(0, Vec::len);
            return Ok(Reevaluation { answer_count, new_answer: true });
        }

        let before = self.answer_set(variant);
        self.tables.abolish(variant)?;
        self.evaluate(&key)?;
        let after = self.answer_set(variant);
        Ok(Reevaluation {
            answer_count: after.len(),
            new_answer: after.iter().any(|answer| !before.contains(answer)),
        })
    }
}
