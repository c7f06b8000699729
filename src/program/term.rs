//! Flat Datalog terms: constants and variables, no function symbols.

use crate::store::TableKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Symbol = Arc<str>;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Var(u32),
    Const(Symbol),
}

impl Term {
    pub fn constant(name: &str) -> Self {
        Term::Const(Arc::from(name))
    }

    pub fn is_ground(&self) -> bool {
        match *self {
            Term::Var(_) => false,
            Term::Const(_) => true,
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Term::Var(index) => write!(f, "?{}", index),
            Term::Const(ref name) => write!(f, "{}", name),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub predicate: Symbol,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: &str, args: Vec<Term>) -> Self {
        Atom { predicate: Arc::from(predicate), args }
    }

    /// The IDG key standing for every fact of a base predicate.
    pub fn base_key(predicate: &Symbol) -> Self {
        Atom { predicate: predicate.clone(), args: vec![] }
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }

    /// One more than the highest variable index, or zero.
    pub fn var_count(&self) -> u32 {
        self.args
            .iter()
            .filter_map(|arg| match *arg {
                Term::Var(index) => Some(index + 1),
                Term::Const(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn shift(&self, offset: u32) -> Atom {
        let args = self
            .args
            .iter()
            .map(|arg| match *arg {
                Term::Var(index) => Term::Var(index + offset),
                Term::Const(_) => arg.clone(),
            })
            .collect();
        Atom { predicate: self.predicate.clone(), args }
    }

    /// Renumbers variables in order of first occurrence, so that two
    /// atoms that differ only in variable names become equal.
    pub fn variant(&self) -> Atom {
        let mut renaming: HashMap<u32, u32> = HashMap::new();
        let args = self
            .args
            .iter()
            .map(|arg| match *arg {
                Term::Var(index) => {
                    let next = renaming.len() as u32;
                    Term::Var(*renaming.entry(index).or_insert(next))
                }
                Term::Const(_) => arg.clone(),
            })
            .collect();
        Atom { predicate: self.predicate.clone(), args }
    }
}

impl TableKey for Atom {
    fn is_ground(&self) -> bool {
        Atom::is_ground(self)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.predicate)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", arg)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Positive(Atom),
    /// `tnot`: tabled negation, evaluated under the well-founded
    /// semantics.
    Negative(Atom),
}

impl Literal {
    fn atom(&self) -> &Atom {
        match *self {
            Literal::Positive(ref atom) | Literal::Negative(ref atom) => atom,
        }
    }

    fn map<F: FnOnce(&Atom) -> Atom>(&self, op: F) -> Literal {
        match *self {
            Literal::Positive(ref atom) => Literal::Positive(op(atom)),
            Literal::Negative(ref atom) => Literal::Negative(op(atom)),
        }
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Literal::Positive(ref atom) => write!(f, "{:?}", atom),
            Literal::Negative(ref atom) => write!(f, "tnot {:?}", atom),
        }
    }
}

/// `head :- body`. A rule with an empty body is a fact of a tabled
/// predicate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Rule { head, body }
    }

    pub fn var_count(&self) -> u32 {
        self.body.iter().map(|literal| literal.atom().var_count()).fold(self.head.var_count(), u32::max)
    }

    /// Renames the rule apart by moving every variable up by `offset`.
    pub fn shift(&self, offset: u32) -> Rule {
        Rule {
            head: self.head.shift(offset),
            body: self.body.iter().map(|literal| literal.map(|atom| atom.shift(offset))).collect(),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- {:?}", self.body)?;
        }
        Ok(())
    }
}

/// A substitution from variables to terms.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substitution {
    bindings: HashMap<u32, Term>,
}

impl Substitution {
    pub fn new() -> Self {
        Substitution::default()
    }

    pub fn apply(&self, term: &Term) -> Term {
        match *term {
            Term::Var(index) => match self.bindings.get(&index) {
                Some(bound) => self.apply(bound),
                None => term.clone(),
            },
            Term::Const(_) => term.clone(),
        }
    }

    pub fn apply_atom(&self, atom: &Atom) -> Atom {
        Atom {
            predicate: atom.predicate.clone(),
            args: atom.args.iter().map(|arg| self.apply(arg)).collect(),
        }
    }

    pub fn apply_literal(&self, literal: &Literal) -> Literal {
        literal.map(|atom| self.apply_atom(atom))
    }

    /// Without function symbols there is nothing to occur-check.
    pub fn unify(&mut self, left: &Term, right: &Term) -> bool {
        let left = self.apply(left);
        let right = self.apply(right);
        match (left, right) {
            (Term::Const(a), Term::Const(b)) => a == b,
            (Term::Var(a), Term::Var(b)) if a == b => true,
            (Term::Var(var), term) | (term, Term::Var(var)) => {
                self.bindings.insert(var, term);
                true
            }
        }
    }

    pub fn unify_atoms(&mut self, left: &Atom, right: &Atom) -> bool {
        left.predicate == right.predicate
            && left.args.len() == right.args.len()
            && left.args.iter().zip(&right.args).all(|(l, r)| self.unify(l, r))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(index: u32) -> Term {
        Term::Var(index)
    }

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    #[test]
    fn variants_ignore_variable_names() {
        let left = Atom::new("p", vec![var(7), c("a"), var(3), var(7)]);
        let right = Atom::new("p", vec![var(0), c("a"), var(9), var(0)]);
        assert_eq!(left.variant(), right.variant());
        assert_eq!(format!("{:?}", left.variant()), "p(?0, a, ?1, ?0)");
        assert_eq!(left.var_count(), 8);
    }

    #[test]
    fn unification_binds_through_chains() {
        let mut subst = Substitution::new();
        let pattern = Atom::new("e", vec![var(0), var(1), var(0)]);
        assert!(subst.unify_atoms(&pattern, &Atom::new("e", vec![var(1), c("b"), var(2)])));
        assert_eq!(subst.apply_atom(&pattern), Atom::new("e", vec![c("b"), c("b"), c("b")]));

        let mut subst = Substitution::new();
        assert!(!subst.unify_atoms(
            &Atom::new("e", vec![var(0), var(0)]),
            &Atom::new("e", vec![c("a"), c("b")])
        ));
    }
}
