//! Depth-first search over the domain-ordered variables.
//!
//! Variables are bound in domain order. Binding a variable pushes its value
//! into the dual constraints of every later variable it shares a triple with,
//! so those variables scan fully bound ternary ranges. A variable that runs
//! dry on first arrival jumps back to the deepest variable it depends on;
//! otherwise the search steps back one variable at a time.

use roaring::RoaringBitmap;
use tracing::trace;

use crate::counts::{BinaryCache, UnaryCache};
use crate::error::Result;
use crate::key::Id;
use crate::query::constraint::{Constraint, ConstraintState};
use crate::query::variable::Variable;
use crate::store::Transaction;

/// Prior state of whatever a search has changed, each item saved on first
/// change, so that a failed advance can leave the graph where it was.
#[derive(Debug, Default)]
pub struct Journal {
    values: Vec<(usize, Option<Id>)>,
    orders: Vec<(usize, Vec<usize>)>,
    constraints: Vec<(usize, ConstraintState)>,
    seen_values: RoaringBitmap,
    seen_orders: RoaringBitmap,
    seen_constraints: RoaringBitmap,
}

impl Journal {
    fn value(&mut self, i: usize, variable: &Variable) {
        if self.seen_values.insert(i as u32) {
            self.values.push((i, variable.value));
        }
    }

    fn order(&mut self, i: usize, variable: &Variable) {
        if self.seen_orders.insert(i as u32) {
            self.orders.push((i, variable.constraints.clone()));
        }
    }

    fn constraint(&mut self, c: usize, constraint: &Constraint) {
        if self.seen_constraints.insert(c as u32) {
            self.constraints.push((c, constraint.state()));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Find the first value at or above the floor.
    Seek,
    /// Move strictly past the current value.
    Advance,
}

#[derive(Debug, Default)]
pub struct Solver {
    pub constraints: Vec<Constraint>,
    pub variables: Vec<Variable>,
    /// `inbound[i]`: sorted positions that must be bound before `i`.
    pub inbound: Vec<Vec<usize>>,
    /// `outbound[i]`: sorted positions that depend on `i`.
    pub outbound: Vec<Vec<usize>>,
    pub unary: UnaryCache,
    pub binary: BinaryCache,
    pub(crate) journal: Journal,
}

impl Solver {
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn values(&self) -> Vec<Option<Id>> {
        self.variables.iter().map(|variable| variable.value).collect()
    }

    /// Undoes every change made by the last search.
    pub fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        trace!(
            values = journal.values.len(),
            constraints = journal.constraints.len(),
            "rolling back search"
        );
        for (i, value) in journal.values {
            self.variables[i].value = value;
        }
        for (i, order) in journal.orders {
            self.variables[i].constraints = order;
        }
        for (c, state) in journal.constraints {
            self.constraints[c].restore(state);
        }
    }

    fn clear(&mut self, range: std::ops::Range<usize>) {
        for i in range {
            self.journal.value(i, &self.variables[i]);
            self.variables[i].value = None;
        }
    }

    /// Binds position `i` and propagates the value to its dependents.
    fn bind(&mut self, i: usize, value: Id, txn: &dyn Transaction) -> Result<()> {
        self.journal.value(i, &self.variables[i]);
        self.variables[i].value = Some(value);
        let Solver {
            constraints,
            variables,
            unary,
            binary,
            journal,
            ..
        } = self;
        for crossing in variables[i].edges.values() {
            for &c in crossing {
                if let Some(dual) = constraints[c].dual {
                    journal.constraint(dual, &constraints[dual]);
                    constraints[dual].set(value, unary, binary, txn)?;
                }
            }
        }
        let dependents: Vec<usize> = variables[i].edges.keys().copied().collect();
        for dependent in dependents {
            journal.order(dependent, &variables[dependent]);
            variables[dependent].sort(constraints);
        }
        Ok(())
    }

    fn backjump(&self, i: usize) -> Option<usize> {
        self.inbound[i].last().copied().or_else(|| i.checked_sub(1))
    }

    /// Runs the search from position `start`. With `advance`, the variable at
    /// `start` moves past its current value; otherwise it and every later
    /// variable seek the smallest assignment not below `bounds`. Returns the
    /// lowest position whose value changed, or `None` once no assignment is
    /// left. The changes are journaled for [`Solver::rollback`].
    pub fn search(
        &mut self,
        start: usize,
        advance: bool,
        bounds: &[Id],
        txn: &dyn Transaction,
    ) -> Result<Option<usize>> {
        let n = self.variables.len();
        if start >= n {
            return Ok(None);
        }
        self.journal = Journal::default();
        let first_reset = if advance { start + 1 } else { start };
        self.clear(first_reset..n);
        let mut i = start;
        let mut lowest = start;
        let mut step = if advance { Step::Advance } else { Step::Seek };
        // bounds apply while every earlier position sits exactly on its bound
        let mut tight = !advance;
        loop {
            let bounded = tight && i < bounds.len();
            let found = {
                let variable = &self.variables[i];
                match step {
                    Step::Advance => variable.next(&mut self.constraints, txn)?,
                    Step::Seek => {
                        let root = variable.root.unwrap_or(Id::MIN);
                        let floor = if bounded { root.max(bounds[i]) } else { root };
                        variable.seek(floor, &mut self.constraints, txn)?
                    }
                }
            };
            match found {
                Some(value) => {
                    if !bounded || value != bounds[i] {
                        tight = false;
                    }
                    trace!(position = i, %value, "bound");
                    self.bind(i, value, txn)?;
                    i += 1;
                    if i == n {
                        return Ok(Some(lowest));
                    }
                    step = Step::Seek;
                }
                None => {
                    let back = match step {
                        Step::Seek if !bounded => self.backjump(i),
                        _ => i.checked_sub(1),
                    };
                    self.clear(i..i + 1);
                    let Some(j) = back else {
                        return Ok(None);
                    };
                    trace!(from = i, to = j, "backtrack");
                    self.clear(j + 1..i + 1);
                    i = j;
                    lowest = lowest.min(j);
                    tight = false;
                    step = Step::Advance;
                }
            }
        }
    }
}
