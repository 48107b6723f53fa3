//! One occurrence of a variable within one query triple.
//!
//! A constraint scans a contiguous key range: with two bound positions it walks
//! a ternary rotation, with one bound position a binary counter range. The
//! trailing id of every key in the range is a candidate value for the
//! constraint's variable.

use tracing::trace;

use crate::counts::{BinaryCache, UnaryCache};
use crate::error::{Result, TriplexError};
use crate::key::{
    Id, Permutation, Place, binary_prefix, ternary_key, ternary_prefix, trailing_id,
};
use crate::statement::{Statement, read_statements};
use crate::store::{RangeCursor, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Two constants, one variable.
    Single,
    /// The variable also occupies `other`; the third place is constant.
    SelfJoin { other: Place },
    /// A different variable occupies `partner`; its dual constraint lives there.
    Pair { partner: Place },
}

/// The mutable part of a constraint, as saved before a search step.
#[derive(Debug, Clone)]
pub struct ConstraintState {
    terms: [Option<Id>; 3],
    count: u32,
    prefix: Vec<u8>,
}

#[derive(Debug)]
pub struct Constraint {
    /// Position of the triple within the query.
    pub index: usize,
    pub place: Place,
    pub kind: Kind,
    pub terms: [Option<Id>; 3],
    pub count: u32,
    pub prefix: Vec<u8>,
    /// Arena index of the sibling constraint of a two-variable triple.
    pub dual: Option<usize>,
    cursor: Option<RangeCursor>,
}

impl Constraint {
    pub fn new(index: usize, place: Place, kind: Kind, terms: [Option<Id>; 3]) -> Self {
        Self {
            index,
            place,
            kind,
            terms,
            count: 0,
            prefix: Vec::new(),
            dual: None,
            cursor: None,
        }
    }

    /// Computes the cardinality and prefix from the bound terms and opens the
    /// cursor. A cardinality of zero means the pattern cannot match.
    pub fn initialize(
        &mut self,
        unary: &mut UnaryCache,
        binary: &mut BinaryCache,
        txn: &dyn Transaction,
    ) -> Result<u32> {
        let middle = self.place.next();
        let last = self.place.prev();
        let (count, prefix) = match (self.terms[middle.index()], self.terms[last.index()]) {
            (Some(a), Some(b)) => (
                binary.get(Permutation::major(middle), a, b, txn)?,
                ternary_prefix(middle, a, b),
            ),
            (None, Some(b)) => {
                let permutation = Permutation::major(last);
                (unary.get(permutation, b, txn)?, binary_prefix(permutation, b))
            }
            (Some(a), None) => {
                let permutation = Permutation::minor(middle);
                (unary.get(permutation, a, txn)?, binary_prefix(permutation, a))
            }
            (None, None) => return Err(TriplexError::AllVariableTriple(self.index)),
        };
        self.count = count;
        self.cursor = Some(RangeCursor::new(prefix.clone(), false));
        self.prefix = prefix;
        Ok(count)
    }

    /// Binds the partner place of a two-variable triple, turning the constraint
    /// into a scan of one ternary rotation.
    pub fn set(
        &mut self,
        value: Id,
        unary: &mut UnaryCache,
        binary: &mut BinaryCache,
        txn: &dyn Transaction,
    ) -> Result<u32> {
        let Kind::Pair { partner } = self.kind else {
            return Err(TriplexError::corruption(format!(
                "set on a {:?} constraint of triple {}",
                self.kind, self.index
            )));
        };
        self.terms[partner.index()] = Some(value);
        self.initialize(unary, binary, txn)
    }

    fn cursor(&mut self) -> &mut RangeCursor {
        let prefix = &self.prefix;
        self.cursor
            .get_or_insert_with(|| RangeCursor::new(prefix.clone(), false))
    }

    /// The value under the cursor, if it is valid.
    pub fn current(&self) -> Result<Option<Id>> {
        match self.cursor.as_ref().and_then(|cursor| cursor.item()) {
            Some(item) => trailing_id(&item.key).map(Some),
            None => Ok(None),
        }
    }

    /// The smallest value greater than or equal to `value` within range.
    pub fn seek(&mut self, value: Id, txn: &dyn Transaction) -> Result<Option<Id>> {
        let mut target = Vec::with_capacity(self.prefix.len() + Id::SIZE);
        target.extend_from_slice(&self.prefix);
        target.extend_from_slice(&value.to_bytes());
        self.cursor().seek(txn, &target)?;
        self.settle(txn)
    }

    /// The next value strictly after the current position.
    pub fn next(&mut self, txn: &dyn Transaction) -> Result<Option<Id>> {
        self.cursor().next(txn)?;
        self.settle(txn)
    }

    /// Skips values a self-join cannot take.
    fn settle(&mut self, txn: &dyn Transaction) -> Result<Option<Id>> {
        loop {
            let Some(value) = self.current()? else {
                return Ok(None);
            };
            if self.admits(value, txn)? {
                trace!(triple = self.index, place = ?self.place, %value, "constraint at");
                return Ok(Some(value));
            }
            self.cursor().next(txn)?;
        }
    }

    fn admits(&self, value: Id, txn: &dyn Transaction) -> Result<bool> {
        let Kind::SelfJoin { other } = self.kind else {
            return Ok(true);
        };
        let mut ids = [value; 3];
        let constant = Place::from_index(3 - self.place.index() - other.index());
        match self.terms[constant.index()] {
            Some(id) => ids[constant.index()] = id,
            None => return Ok(false),
        }
        Ok(txn.get(&ternary_key(Place::Subject, &ids))?.is_some())
    }

    /// Statements of the triple this constraint completes when its variable
    /// takes `value` (and, for a two-variable triple, the partner `partner`).
    pub fn sources(
        &self,
        value: Id,
        partner: Option<Id>,
        txn: &dyn Transaction,
    ) -> Result<Vec<Statement>> {
        let mut ids = self.terms;
        ids[self.place.index()] = Some(value);
        match self.kind {
            Kind::Single => {}
            Kind::SelfJoin { other } => ids[other.index()] = Some(value),
            Kind::Pair { partner: place } => {
                if let Some(partner) = partner {
                    ids[place.index()] = Some(partner);
                }
            }
        }
        match ids {
            [Some(s), Some(p), Some(o)] => read_statements(txn, &[s, p, o]),
            _ => Ok(Vec::new()),
        }
    }

    pub fn state(&self) -> ConstraintState {
        ConstraintState {
            terms: self.terms,
            count: self.count,
            prefix: self.prefix.clone(),
        }
    }

    /// Restores a saved state; the cursor reopens unpositioned.
    pub fn restore(&mut self, state: ConstraintState) {
        self.terms = state.terms;
        self.count = state.count;
        self.cursor = Some(RangeCursor::new(state.prefix.clone(), false));
        self.prefix = state.prefix;
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }
}
