//! The resumable iteration protocol over a compiled pattern.
//!
//! A graph starts `Fresh`. [`ConstraintGraph::seek`] (or the first `next`)
//! positions it on the smallest assignment not below a requested index; the
//! following `next` replays that assignment, and later calls advance. Results
//! come out in strictly increasing lexicographic order of the domain-ordered
//! id vector, which makes resuming from any returned index exact.

use tracing::debug;

use crate::dictionary::Dictionary;
use crate::error::{Result, TriplexError};
use crate::key::Id;
use crate::query::constraint::Kind;
use crate::query::solver::Solver;
use crate::statement::{Source, Statement, read_statements};
use crate::store::Transaction;
use crate::term::Term;

/// What occupies one place of one query triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A constant; `None` when the dictionary has never seen it.
    Constant(Option<Id>),
    /// A variable, by domain position.
    Variable(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing sought yet.
    Fresh,
    /// Sitting on an assignment that has not been returned.
    Positioned,
    /// The current assignment has been returned.
    Active,
    /// No further assignments; terminal.
    Exhausted,
}

pub struct ConstraintGraph {
    solver: Solver,
    domain: Vec<Term>,
    pivot: usize,
    slots: Vec<[Slot; 3]>,
    state: State,
    empty: bool,
    dictionary: Dictionary,
    txn: Option<Box<dyn Transaction>>,
}

impl ConstraintGraph {
    pub(crate) fn new(
        solver: Solver,
        pivot: usize,
        slots: Vec<[Slot; 3]>,
        dictionary: Dictionary,
        txn: Box<dyn Transaction>,
    ) -> Self {
        let domain = solver
            .variables
            .iter()
            .map(|variable| variable.label.clone())
            .collect();
        Self {
            solver,
            domain,
            pivot,
            slots,
            state: State::Fresh,
            empty: false,
            dictionary,
            txn: Some(txn),
        }
    }

    /// A graph that is known to have no results.
    pub(crate) fn empty(
        domain: Vec<Term>,
        pivot: usize,
        slots: Vec<[Slot; 3]>,
        dictionary: Dictionary,
        txn: Box<dyn Transaction>,
    ) -> Self {
        Self {
            solver: Solver::default(),
            domain,
            pivot,
            slots,
            state: State::Exhausted,
            empty: true,
            dictionary,
            txn: Some(txn),
        }
    }

    /// Every variable in domain order: the exposed ones first, then the
    /// internal ones in the order the search visits them.
    pub fn domain(&self) -> &[Term] {
        &self.domain
    }

    /// Number of exposed variables at the front of the domain.
    pub fn pivot(&self) -> usize {
        self.pivot
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_closed(&self) -> bool {
        self.txn.is_none()
    }

    /// Sorted positions that must be bound before `position`.
    pub fn dependencies(&self, position: usize) -> &[usize] {
        self.solver
            .inbound
            .get(position)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Sorted positions depending on `position`.
    pub fn dependents(&self, position: usize) -> &[usize] {
        self.solver
            .outbound
            .get(position)
            .map_or(&[][..], Vec::as_slice)
    }

    fn position(&mut self, bounds: &[Id]) -> Result<()> {
        let txn = self.txn.as_deref().ok_or(TriplexError::Closed)?;
        self.state = match self.solver.search(0, false, bounds, txn)? {
            Some(_) => State::Positioned,
            None => State::Exhausted,
        };
        debug!(state = ?self.state, bounds = bounds.len(), "positioned");
        Ok(())
    }

    /// Positions the graph on the smallest assignment that is not below
    /// `index` in lexicographic order. The next call to `next` returns it.
    pub fn seek(&mut self, index: &[Term]) -> Result<()> {
        if self.txn.is_none() {
            return Err(TriplexError::Closed);
        }
        if index.len() > self.domain.len() {
            return Err(TriplexError::InvalidIndex(format!(
                "index of {} terms for a domain of {}",
                index.len(),
                self.domain.len()
            )));
        }
        let txn = self.txn.as_deref().ok_or(TriplexError::Closed)?;
        let mut bounds = Vec::with_capacity(index.len());
        for term in index {
            match self.dictionary.get_id(term, None, txn) {
                Ok(id) => bounds.push(id),
                Err(TriplexError::NotFound(_)) | Err(TriplexError::InvalidTerm(_)) => {
                    return Err(TriplexError::InvalidIndex(format!("unknown term {}", term)));
                }
                Err(e) => return Err(e),
            }
        }
        if self.empty {
            self.state = State::Exhausted;
            return Ok(());
        }
        self.position(&bounds)
    }

    /// Advances and returns the values from the lowest changed position to
    /// the end of the domain. `None` advances the last variable, `Some`
    /// advances the given one. The first call after positioning returns the
    /// full current assignment without advancing.
    pub fn next(&mut self, variable: Option<&Term>) -> Result<Option<Vec<Term>>> {
        match self.next_position(variable)? {
            Some(start) => self.translate(start).map(Some),
            None => Ok(None),
        }
    }

    /// As [`ConstraintGraph::next`], reporting only the lowest changed position.
    pub fn next_position(&mut self, variable: Option<&Term>) -> Result<Option<usize>> {
        if self.txn.is_none() || self.empty {
            self.state = State::Exhausted;
            return Ok(None);
        }
        if self.state == State::Fresh {
            self.position(&[])?;
        }
        match self.state {
            State::Exhausted => return Ok(None),
            State::Positioned => {
                self.state = State::Active;
                return Ok(Some(0));
            }
            _ => {}
        }
        let start = match variable {
            None => self.domain.len().saturating_sub(1),
            Some(term) => self
                .domain
                .iter()
                .position(|label| label == term)
                .ok_or_else(|| TriplexError::InvalidDomain(format!("{} is not in the domain", term)))?,
        };
        let txn = self.txn.as_deref().ok_or(TriplexError::Closed)?;
        match self.solver.search(start, true, &[], txn)? {
            Some(lowest) => Ok(Some(lowest)),
            None => {
                self.solver.rollback();
                self.state = State::Exhausted;
                debug!("exhausted");
                Ok(None)
            }
        }
    }

    /// The current assignment in domain order, if there is one.
    pub fn ids(&self) -> Option<Vec<Id>> {
        if self.empty {
            return None;
        }
        self.solver.variables.iter().map(|variable| variable.value).collect()
    }

    /// The current assignment translated back to terms.
    pub fn index(&mut self) -> Result<Option<Vec<Term>>> {
        if self.ids().is_none() {
            return Ok(None);
        }
        self.translate(0).map(Some)
    }

    fn translate(&mut self, start: usize) -> Result<Vec<Term>> {
        let txn = self.txn.as_deref().ok_or(TriplexError::Closed)?;
        let mut terms = Vec::with_capacity(self.solver.len().saturating_sub(start));
        for variable in &self.solver.variables[start..] {
            let id = variable.value.ok_or_else(|| {
                TriplexError::NotFound(format!("no value bound for {}", variable.label))
            })?;
            terms.push(self.dictionary.get_term(id, None, txn)?);
        }
        Ok(terms)
    }

    /// For every query triple, the statements asserting it under the current
    /// assignment. Empty when the graph holds no assignment.
    pub fn sources(&mut self) -> Result<Vec<Vec<Source>>> {
        let Some(values) = self.ids() else {
            return Ok(Vec::new());
        };
        let txn = self.txn.as_deref().ok_or(TriplexError::Closed)?;
        let value_at = |slot: Slot| match slot {
            Slot::Constant(id) => id,
            Slot::Variable(v) => values.get(v).copied(),
        };
        let mut sources = Vec::with_capacity(self.slots.len());
        for (t, slot) in self.slots.iter().enumerate() {
            let constraint = self.solver.constraints.iter().find(|c| c.index == t);
            let statements = match constraint {
                Some(constraint) => {
                    let partner = match constraint.kind {
                        Kind::Pair { partner } => value_at(slot[partner.index()]),
                        _ => None,
                    };
                    match value_at(slot[constraint.place.index()]) {
                        Some(value) => constraint.sources(value, partner, txn)?,
                        None => Vec::new(),
                    }
                }
                None => match slot.map(value_at) {
                    [Some(s), Some(p), Some(o)] => read_statements(txn, &[s, p, o])?,
                    _ => Vec::new(),
                },
            };
            let mut translated = Vec::with_capacity(statements.len());
            for Statement {
                origin,
                index,
                graph,
            } in statements
            {
                let origin = self.dictionary.get_term(origin, None, txn)?;
                let base = match &origin {
                    Term::Iri { value } => Some(value.clone()),
                    _ => None,
                };
                let graph = self.dictionary.get_term(graph, base.as_deref(), txn)?;
                translated.push(Source {
                    origin,
                    index,
                    graph,
                });
            }
            sources.push(translated);
        }
        Ok(sources)
    }

    /// Releases every cursor and the read transaction. Safe to call any
    /// number of times.
    pub fn close(&mut self) {
        for constraint in &mut self.solver.constraints {
            constraint.close();
        }
        if let Some(txn) = self.txn.take() {
            txn.discard();
            debug!("closed graph");
        }
        self.dictionary.clear();
        self.state = State::Exhausted;
    }

    /// Whether any constraint still holds a cursor.
    pub fn has_open_cursors(&self) -> bool {
        self.solver.constraints.iter().any(|c| c.is_open())
    }
}

impl Drop for ConstraintGraph {
    fn drop(&mut self) {
        self.close();
    }
}
