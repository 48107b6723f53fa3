//! A query variable: every constraint its value must satisfy, intersected with
//! a leapfrog over their sorted ranges.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::Result;
use crate::key::Id;
use crate::query::constraint::Constraint;
use crate::store::Transaction;
use crate::term::Term;

#[derive(Debug)]
pub struct Variable {
    pub label: Term,
    /// Arena indices, kept sorted by ascending cardinality.
    pub constraints: Vec<usize>,
    /// Constraints of this variable crossing to another variable, keyed by the
    /// other variable's position.
    pub edges: BTreeMap<usize, Vec<usize>>,
    pub value: Option<Id>,
    pub root: Option<Id>,
    pub norm: u64,
    pub size: usize,
}

impl Variable {
    pub fn new(label: Term) -> Self {
        Self {
            label,
            constraints: Vec::new(),
            edges: BTreeMap::new(),
            value: None,
            root: None,
            norm: 0,
            size: 0,
        }
    }

    /// Mean squared cardinality; lower scores are visited first.
    pub fn score(&self) -> f64 {
        if self.size == 0 {
            return f64::INFINITY;
        }
        self.norm as f64 / self.size as f64
    }

    /// Computes the score from the current cardinalities, sorts the
    /// constraints and finds the root value. Returns the root, or `None` when
    /// the constraints share no value.
    pub fn rank(&mut self, arena: &mut [Constraint], txn: &dyn Transaction) -> Result<Option<Id>> {
        self.norm = self
            .constraints
            .iter()
            .map(|&c| {
                let count = u64::from(arena[c].count);
                count * count
            })
            .sum();
        self.size = self.constraints.len();
        self.sort(arena);
        self.root = self.seek(Id::MIN, arena, txn)?;
        trace!(variable = %self.label, norm = self.norm, size = self.size, root = ?self.root, "ranked");
        Ok(self.root)
    }

    pub fn sort(&mut self, arena: &[Constraint]) {
        self.constraints.sort_by_key(|&c| arena[c].count);
    }

    /// Leapfrog intersection: the smallest id greater than or equal to `value`
    /// accepted by every constraint.
    pub fn seek(&self, value: Id, arena: &mut [Constraint], txn: &dyn Transaction) -> Result<Option<Id>> {
        let len = self.constraints.len();
        if len == 0 {
            return Ok(None);
        }
        let mut candidate = value;
        let mut agreed = 0;
        let mut i = 0;
        while agreed < len {
            match arena[self.constraints[i]].seek(candidate, txn)? {
                None => return Ok(None),
                Some(found) if found == candidate => agreed += 1,
                Some(found) => {
                    candidate = found;
                    agreed = 1;
                }
            }
            i = (i + 1) % len;
        }
        Ok(Some(candidate))
    }

    /// The next value of the intersection after the current one.
    pub fn next(&self, arena: &mut [Constraint], txn: &dyn Transaction) -> Result<Option<Id>> {
        let Some(current) = self.value else {
            return Ok(None);
        };
        let Some(&lead) = self.constraints.first() else {
            return Ok(None);
        };
        let start = if arena[lead].current()? == Some(current) {
            arena[lead].next(txn)?
        } else {
            match current.successor() {
                Some(successor) => arena[lead].seek(successor, txn)?,
                None => None,
            }
        };
        match start {
            Some(start) => self.seek(start, arena, txn),
            None => Ok(None),
        }
    }
}
