use super::*;
use crate::store::MemoryStore;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key(&'static str, bool);

impl TableKey for Key {
    fn is_ground(&self) -> bool {
        self.1
    }
}

type Store = MemoryStore<Key, u32>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Consumer {
    Named(&'static str),
    /// Tries to run this worklist again from inside its own run.
    Rerun(WorklistIndex),
}

#[derive(Default)]
struct Recorder {
    resumed: Vec<(Consumer, AnswerId)>,
    negations: Vec<(Consumer, VariantId, Negation)>,
    /// Whether the negated table was flagged as delayed when its waiter
    /// was resumed.
    neg_delayed: Vec<bool>,
    errors: Vec<Error>,
}

impl Resolver<Store, Consumer> for Recorder {
    fn resume(&mut self, session: &mut Session<Store, Consumer>, consumer: Consumer, answer: AnswerId) -> Result<()> {
        if let Consumer::Rerun(index) = consumer {
            if let Err(err) = session.run(index, self) {
                self.errors.push(err);
            }
        }
        self.resumed.push((consumer, answer));
        Ok(())
    }

    fn resume_negation(
        &mut self,
        session: &mut Session<Store, Consumer>,
        consumer: Consumer,
        variant: VariantId,
        negation: Negation,
    ) -> Result<()> {
        if let Some(index) = session.worklist_of(variant) {
            self.neg_delayed.push(session.worklist(index)?.is_neg_delayed());
        }
        self.negations.push((consumer, variant, negation));
        Ok(())
    }
}

fn session() -> Session<Store, Consumer> {
    Session::new(TablingConfig::default(), Tables::new(MemoryStore::new()))
}

fn fresh(session: &mut Session<Store, Consumer>, parent: Option<VariantId>, key: Key) -> (WorklistIndex, ComponentIndex) {
    match session.call(parent, &key).unwrap() {
        CallOutcome::Fresh { worklist, component } => (worklist, component),
        other => panic!("expected a fresh table for {:?}, got {:?}", key, other),
    }
}

fn unconditional(session: &mut Session<Store, Consumer>, worklist: WorklistIndex, term: u32) -> AnswerId {
    match session.add_answer(worklist, term, DelayList::new()).unwrap() {
        AddAnswer::New(answer) => answer,
        other => panic!("expected a new answer, got {:?}", other),
    }
}

#[test]
fn consumer_is_resumed_with_later_answers() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, component) = fresh(&mut session, None, Key("p", false));

    let a1 = unconditional(&mut session, p, 1);
    assert_eq!(session.subscribe(p, Consumer::Named("c")).unwrap(), vec![a1]);
    let a2 = unconditional(&mut session, p, 2);
    assert_eq!(session.add_answer(p, 2, DelayList::new()).unwrap(), AddAnswer::Duplicate(a2));

    assert_eq!(session.completion(component, &mut recorder).unwrap(), Completion::Completed);
    assert_eq!(recorder.resumed, vec![(Consumer::Named("c"), a2)]);
    assert_eq!(session.current(), None);
}

#[test]
fn ground_table_completes_on_its_answer() {
    let mut session = session();
    let (p, _) = fresh(&mut session, None, Key("p", true));
    let variant = session.worklist(p).unwrap().variant();

    unconditional(&mut session, p, 1);
    assert!(session.worklist(p).unwrap().is_completed());
    assert!(session.tables().is_complete(variant));
    assert_eq!(session.call(None, &Key("p", true)).unwrap(), CallOutcome::Complete(variant));
    assert_eq!(session.negate(variant, Consumer::Named("n")).unwrap(), Negation::Failed);
}

#[test]
fn cycle_merges_the_path_into_the_owner() {
    let mut session = session();
    let (p, c1) = fresh(&mut session, None, Key("p", false));
    let pv = session.worklist(p).unwrap().variant();
    let (q, c2) = fresh(&mut session, Some(pv), Key("q", false));
    let qv = session.worklist(q).unwrap().variant();
    let (_, c3) = fresh(&mut session, Some(qv), Key("r", false));

    assert_eq!(session.call(Some(qv), &Key("p", false)).unwrap(), CallOutcome::Incomplete(p));
    assert_eq!(session.current(), Some(c1));
    assert_eq!(session.component(c2).unwrap().status(), SccStatus::Merged);
    assert_eq!(session.component(c3).unwrap().status(), SccStatus::Merged);
    assert_eq!(session.worklist(q).unwrap().component(), c1);
    assert_eq!(session.component(c1).unwrap().worklists().len(), 3);

    let mut recorder = Recorder::default();
    assert_eq!(session.completion(c3, &mut recorder).unwrap(), Completion::Merged);
    assert_eq!(session.completion(c1, &mut recorder).unwrap(), Completion::Completed);
    assert!(session.tables().is_complete(qv));
}

#[test]
fn running_an_executing_worklist_is_fatal() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, component) = fresh(&mut session, None, Key("p", false));
    session.subscribe(p, Consumer::Rerun(p)).unwrap();
    unconditional(&mut session, p, 1);

    session.completion(component, &mut recorder).unwrap();
    assert_eq!(recorder.errors.len(), 1);
    assert!(recorder.errors[0].is_fatal());
}

#[test]
fn completed_handles_go_stale() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, component) = fresh(&mut session, None, Key("p", false));
    session.completion(component, &mut recorder).unwrap();

    let err = session.subscribe(p, Consumer::Named("late")).unwrap_err();
    assert!(err.is_fatal());
    let err = session.completion(component, &mut recorder).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn abolish_of_a_live_table_is_deferred() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, component) = fresh(&mut session, None, Key("p", false));
    let variant = session.worklist(p).unwrap().variant();
    unconditional(&mut session, p, 1);

    assert!(!session.abolish(variant).unwrap());
    assert!(session.worklist(p).unwrap().abolish_pending());
    assert_eq!(session.tables().store().answer_count(variant), 1);

    session.completion(component, &mut recorder).unwrap();
    assert_eq!(session.tables().store().answer_count(variant), 0);
    assert!(!session.tables().is_complete(variant));
}

#[test]
fn negative_loop_is_delayed_at_the_fixpoint() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, c1) = fresh(&mut session, None, Key("p", true));
    let pv = session.worklist(p).unwrap().variant();
    let (q, _) = fresh(&mut session, Some(pv), Key("q", true));
    let qv = session.worklist(q).unwrap().variant();

    // q :- tnot p.
    assert_eq!(session.call(Some(qv), &Key("p", true)).unwrap(), CallOutcome::Incomplete(p));
    assert_eq!(session.negate(pv, Consumer::Named("q")).unwrap(), Negation::Suspended);
    // p :- tnot q.
    assert_eq!(session.negate(qv, Consumer::Named("p")).unwrap(), Negation::Suspended);
    assert!(session.worklist(p).unwrap().is_negative());
    assert!(session.worklist(q).unwrap().is_negative());
    assert!(!session.worklist(p).unwrap().is_neg_delayed());

    assert_eq!(session.completion(c1, &mut recorder).unwrap(), Completion::Completed);
    let mut negations = recorder.negations.clone();
    negations.sort_by_key(|&(_, variant, _)| variant);
    assert_eq!(
        negations,
        vec![
            (Consumer::Named("q"), pv, Negation::Delayed),
            (Consumer::Named("p"), qv, Negation::Delayed),
        ]
    );
    assert_eq!(session.component(c1).unwrap().neg_status(), NegStatus::Delay);
    assert_eq!(recorder.neg_delayed, vec![true, true]);
}

#[test]
fn table_completed_early_stays_current_while_live() {
    let mut session = session();
    let (p, _) = fresh(&mut session, None, Key("p", true));
    let variant = session.worklist(p).unwrap().variant();
    // Invalidated before this session recomputes it.
    session.tables_mut().idg_mut().invalidate(variant).unwrap();

    unconditional(&mut session, p, 1);
    assert!(session.tables().is_complete(variant));
    assert!(session.tables().idg().is_invalid(variant));
    assert_eq!(session.call(None, &Key("p", true)).unwrap(), CallOutcome::Complete(variant));

    assert!(!session.abolish(variant).unwrap());
    assert_eq!(session.tables().store().answer_count(variant), 1);
}

#[test]
fn invalidation_of_a_live_table_is_deferred() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, component) = fresh(&mut session, None, Key("p", false));
    let variant = session.worklist(p).unwrap().variant();
    unconditional(&mut session, p, 1);

    assert_eq!(session.invalidate(variant).unwrap(), vec![]);
    assert!(session.worklist(p).unwrap().abolish_pending());
    assert!(!session.tables().idg().is_invalid(variant));

    session.completion(component, &mut recorder).unwrap();
    assert!(session.tables().idg().get(variant).unwrap().falsecount() > 0);
    assert!(session.tables().idg().is_invalid(variant));
    // Invalidation keeps the answers; only a later call re-runs them.
    assert_eq!(session.tables().store().answer_count(variant), 1);
    assert_eq!(session.call(None, &Key("p", false)).unwrap(), CallOutcome::Invalid(variant));
}

#[test]
fn conditional_answer_becomes_true_when_its_condition_fails() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, c1) = fresh(&mut session, None, Key("p", true));
    let pv = session.worklist(p).unwrap().variant();
    let (q, _) = fresh(&mut session, Some(pv), Key("q", true));
    let qv = session.worklist(q).unwrap().variant();
    session.call(Some(qv), &Key("p", true)).unwrap();

    // p :- tnot q, with the literal delayed; q never gets an answer.
    session.init_delay_list().unwrap();
    session.push_delay(qv, Key("q", true), None).unwrap();
    let delays = session.take_delay_list().unwrap();
    let answer = match session.add_answer(p, 1, delays).unwrap() {
        AddAnswer::New(answer) => answer,
        other => panic!("unexpected {:?}", other),
    };
    assert!(session.is_conditional(answer));
    assert_eq!(session.conditions(answer).len(), 1);
    assert!(!session.worklist(p).unwrap().has_answers());

    session.completion(c1, &mut recorder).unwrap();
    assert!(!session.is_conditional(answer));
    assert_eq!(session.answer_truth(answer), TruthValue::True);
}

#[test]
fn push_delay_needs_a_list() {
    let mut session = session();
    let err = session.push_delay(VariantId::new(0), Key("p", true), None).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn clear_abolishes_incomplete_tables() {
    let mut session = session();
    let (p, _) = fresh(&mut session, None, Key("p", false));
    let variant = session.worklist(p).unwrap().variant();
    unconditional(&mut session, p, 1);

    let tables = session.into_tables().unwrap();
    assert_eq!(tables.store().answer_count(variant), 0);
    assert!(!tables.is_complete(variant));
}

#[test]
fn positive_loop_left_after_refutation_is_unfounded() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let (p, c1) = fresh(&mut session, None, Key("p", true));
    let pv = session.worklist(p).unwrap().variant();
    let (q, _) = fresh(&mut session, Some(pv), Key("q", true));
    let qv = session.worklist(q).unwrap().variant();
    let (r, _) = fresh(&mut session, Some(qv), Key("r", true));
    let rv = session.worklist(r).unwrap().variant();
    session.call(Some(rv), &Key("p", true)).unwrap();

    let delayed = |session: &mut Session<Store, Consumer>, literals: Vec<(VariantId, &'static str, Option<AnswerId>)>| {
        session.init_delay_list().unwrap();
        for (variant, name, answer) in literals {
            session.push_delay(variant, Key(name, true), answer).unwrap();
        }
        session.take_delay_list().unwrap()
    };

    // p :- tnot r.
    let list = delayed(&mut session, vec![(rv, "r", None)]);
    let pa = match session.add_answer(p, 1, list).unwrap() {
        AddAnswer::New(answer) => answer,
        other => panic!("unexpected {:?}", other),
    };
    // q :- p.
    let list = delayed(&mut session, vec![(pv, "p", Some(pa))]);
    let qa = match session.add_answer(q, 1, list).unwrap() {
        AddAnswer::New(answer) => answer,
        other => panic!("unexpected {:?}", other),
    };
    // p :- q.
    let list = delayed(&mut session, vec![(qv, "q", Some(qa))]);
    assert_eq!(session.add_answer(p, 1, list).unwrap(), AddAnswer::Duplicate(pa));
    assert_eq!(session.conditions(pa).len(), 2);

    // r succeeds, which leaves p and q supporting only each other.
    unconditional(&mut session, r, 1);
    assert_eq!(session.conditions(pa).len(), 1);

    session.completion(c1, &mut recorder).unwrap();
    let component = session.component(c1).unwrap();
    assert_eq!(component.neg_status(), NegStatus::Simplify);
    assert_eq!(component.simplifications(), 2);
    assert_eq!(session.answer_truth(pa), TruthValue::False);
    assert_eq!(session.answer_truth(qa), TruthValue::False);
    assert_eq!(session.tables().store().answer_count(rv), 1);
}
