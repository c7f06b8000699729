use super::*;

/// Parses one atom such as `edge(a, X)`. Names starting with an
/// uppercase letter are variables, numbered through `vars`.
fn parse_atom(text: &str, vars: &mut HashMap<String, u32>) -> Atom {
    let text = text.trim();
    let open = match text.find('(') {
        Some(open) => open,
        None => return Atom::new(text, vec![]),
    };
    let inner = text[open + 1..].trim_end().trim_end_matches(')');
    let args = inner
        .split(',')
        .map(|arg| {
            let arg = arg.trim();
            if arg.starts_with(|c: char| c.is_ascii_uppercase()) {
                let next = vars.len() as u32;
                Term::Var(*vars.entry(arg.to_string()).or_insert(next))
            } else {
                Term::constant(arg)
            }
        })
        .collect();
    Atom::new(text[..open].trim(), args)
}

fn atom(text: &str) -> Atom {
    parse_atom(text, &mut HashMap::new())
}

/// Splits a clause body on the commas that are not inside parentheses.
fn split_body(body: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn program(text: &str) -> Program {
    let rules = text
        .split('.')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(|clause| {
            let mut vars = HashMap::new();
            let mut parts = clause.splitn(2, ":-");
            let head = parse_atom(parts.next().unwrap(), &mut vars);
            let body = match parts.next() {
                Some(body) => split_body(body)
                    .into_iter()
                    .map(|literal| {
                        let literal = literal.trim();
                        match literal.strip_prefix("tnot ") {
                            Some(negated) => Literal::Negative(parse_atom(negated, &mut vars)),
                            None => Literal::Positive(parse_atom(literal, &mut vars)),
                        }
                    })
                    .collect(),
                None => vec![],
            };
            Rule::new(head, body)
        })
        .collect();
    Program::new(rules)
}

fn engine(rules: &str, facts: &[&str]) -> Engine {
    let mut engine = Engine::new(TablingConfig::default(), program(rules));
    for fact in facts {
        assert!(engine.assert_fact(atom(fact)).unwrap());
    }
    engine
}

fn is_complete(engine: &Engine, goal: &str) -> bool {
    match engine.tables().store().lookup(&atom(goal)) {
        Some(variant) => engine.tables().is_complete(variant),
        None => false,
    }
}

macro_rules! test {
    (program { $program:expr } facts [$($fact:expr),*] goal { $goal:expr } yields [$($answer:expr => $truth:ident),*]) => {{
        let mut engine = engine($program, &[$($fact),*]);
        let mut expected: Vec<(Atom, TruthValue)> = vec![$((atom($answer), TruthValue::$truth)),*];
        expected.sort();
        assert_eq!(engine.solve(&atom($goal)).unwrap(), expected);
        engine
    }};
}

#[test]
fn left_recursion_terminates() {
    test! {
        program {
            "path(X, Y) :- path(X, Z), edge(Z, Y).
             path(X, Y) :- edge(X, Y)."
        }
        facts ["edge(a, b)", "edge(b, c)", "edge(c, a)", "edge(c, d)"]
        goal { "path(a, Y)" }
        yields [
            "path(a, a)" => True,
            "path(a, b)" => True,
            "path(a, c)" => True,
            "path(a, d)" => True
        ]
    };
}

#[test]
fn mutual_recursion_completes_together() {
    let engine = test! {
        program {
            "p(X) :- q(X).
             q(X) :- p(X).
             q(X) :- e(X)."
        }
        facts ["e(a)", "e(b)"]
        goal { "p(X)" }
        yields ["p(a)" => True, "p(b)" => True]
    };
    assert!(is_complete(&engine, "p(X)"));
    assert!(is_complete(&engine, "q(X)"));
}

#[test]
fn ground_goal_completes_early() {
    let engine = test! {
        program {
            "reach(X, Y) :- edge(X, Y).
             reach(X, Y) :- edge(X, Z), reach(Z, Y)."
        }
        facts ["edge(a, b)", "edge(b, c)", "edge(c, a)"]
        goal { "reach(a, c)" }
        yields ["reach(a, c)" => True]
    };
    assert!(is_complete(&engine, "reach(a, c)"));
}

#[test]
fn stratified_negation() {
    test! {
        program {
            "reach(X, Y) :- edge(X, Y).
             reach(X, Y) :- edge(X, Z), reach(Z, Y).
             node(X) :- edge(X, Y).
             node(Y) :- edge(X, Y).
             unreachable(Y) :- node(Y), tnot reach(a, Y)."
        }
        facts ["edge(a, b)", "edge(c, d)"]
        goal { "unreachable(Y)" }
        yields [
            "unreachable(a)" => True,
            "unreachable(c)" => True,
            "unreachable(d)" => True
        ]
    };
}

#[test]
fn self_negation_is_unknown() {
    test! {
        program { "p :- tnot p." }
        facts []
        goal { "p" }
        yields ["p" => Unknown]
    };
}

#[test]
fn win_game() {
    test! {
        program { "win(X) :- move(X, Y), tnot win(Y)." }
        facts ["move(a, b)", "move(b, a)", "move(b, c)", "move(c, d)"]
        goal { "win(X)" }
        yields ["win(a)" => Unknown, "win(b)" => Unknown, "win(c)" => True]
    };
}

#[test]
fn negative_loop_broken_by_a_failing_table() {
    let mut engine = test! {
        program {
            "a :- tnot b.
             b :- tnot a.
             b :- tnot c.
             c :- d.
             d :- c."
        }
        facts []
        goal { "b" }
        yields ["b" => True]
    };
    assert_eq!(engine.solve(&atom("a")).unwrap(), vec![]);
    assert_eq!(engine.solve(&atom("c")).unwrap(), vec![]);
}

#[test]
fn asserted_fact_reaches_dependent_tables() {
    let mut engine = test! {
        program {
            "reach(X, Y) :- edge(X, Y).
             reach(X, Y) :- edge(X, Z), reach(Z, Y)."
        }
        facts ["edge(a, b)"]
        goal { "reach(a, Y)" }
        yields ["reach(a, b)" => True]
    };

    assert!(engine.assert_fact(atom("edge(b, c)")).unwrap());
    assert!(!engine.assert_fact(atom("edge(b, c)")).unwrap());
    assert_eq!(
        engine.solve(&atom("reach(a, Y)")).unwrap(),
        vec![(atom("reach(a, b)"), TruthValue::True), (atom("reach(a, c)"), TruthValue::True)]
    );

    assert!(engine.retract_fact(&atom("edge(a, b)")).unwrap());
    assert_eq!(engine.solve(&atom("reach(a, Y)")).unwrap(), vec![]);
}

#[test]
fn unchanged_table_cuts_the_refresh() {
    let mut engine = test! {
        program {
            "r(X) :- s(X).
             s(X) :- e(X, Y)."
        }
        facts ["e(a, b)"]
        goal { "r(X)" }
        yields ["r(a)" => True]
    };
    assert_eq!(engine.reevaluations(), 0);

    // s(a) is derived again from the new fact, so r need not re-run.
    engine.assert_fact(atom("e(a, c)")).unwrap();
    assert_eq!(engine.solve(&atom("r(X)")).unwrap(), vec![(atom("r(a)"), TruthValue::True)]);
    assert_eq!(engine.reevaluations(), 2);
}

#[test]
fn refresh_through_a_table_completed_early() {
    let mut engine = test! {
        program {
            "p :- b.
             p :- q.
             q :- p, p."
        }
        facts []
        goal { "q" }
        yields []
    };

    // Re-running p completes it early, then reaches it again through q.
    assert!(engine.assert_fact(atom("b")).unwrap());
    assert_eq!(engine.solve(&atom("q")).unwrap(), vec![(atom("q"), TruthValue::True)]);
    assert_eq!(engine.solve(&atom("p")).unwrap(), vec![(atom("p"), TruthValue::True)]);
}

#[test]
fn undefined_answer_becoming_true_reaches_dependents() {
    let mut engine = test! {
        program {
            "q :- p.
             p :- tnot u.
             p :- b.
             u :- tnot u."
        }
        facts []
        goal { "q" }
        yields ["q" => Unknown]
    };

    assert!(engine.assert_fact(atom("b")).unwrap());
    assert_eq!(engine.solve(&atom("p")).unwrap(), vec![(atom("p"), TruthValue::True)]);
    assert_eq!(engine.solve(&atom("q")).unwrap(), vec![(atom("q"), TruthValue::True)]);

    assert!(engine.retract_fact(&atom("b")).unwrap());
    assert_eq!(engine.solve(&atom("q")).unwrap(), vec![(atom("q"), TruthValue::Unknown)]);
}

#[test]
fn rule_defined_predicates_take_no_facts() {
    let mut engine = engine("q(a).", &[]);
    assert!(engine.assert_fact(atom("q(b)")).is_err());
    assert!(engine.assert_fact(atom("e(X)")).is_err());
}

#[test]
fn non_ground_negation_flounders() {
    let mut engine = engine("p(X) :- tnot q(X). q(a).", &[]);
    match engine.solve(&atom("p(X)")) {
        Err(Error(ErrorKind::Floundered(_), _)) => {}
        other => panic!("expected floundering, got {:?}", other),
    }
    assert!(!is_complete(&engine, "p(X)"));
}

#[test]
fn deep_call_chain_overflows() {
    let config = TablingConfig { overflow_depth: 2, ..TablingConfig::default() };
    let mut engine = Engine::new(config, program("p1 :- p2. p2 :- p3. p3 :- p4. p4."));
    match engine.solve(&atom("p1")) {
        Err(Error(ErrorKind::Overflow(2), _)) => {}
        other => panic!("expected overflow, got {:?}", other),
    }
}
