//! Index maintenance for datasets.
//!
//! A dataset is a list of quads published under an origin IRI (or the default
//! graph). Inserting it mints ids relative to the origin, creates the three
//! ternary postings of every new triple, bumps its six binary counters and
//! appends a [`Statement`] to the primary posting. The dataset's quads are
//! recorded under the origin so that it can later be deleted or replaced.

use tracing::{debug, info};

use crate::counts::{BinaryCache, UnaryCache};
use crate::dictionary::{Dictionary, TagScheme};
use crate::error::{Result, TriplexError};
use crate::key::{DATASET_TAG, Id, Permutation, Place, assemble_key, ternary_key};
use crate::statement::Statement;
use crate::store::{RangeCursor, Transaction};
use crate::term::{Quad, Term};

const QUAD_SIZE: usize = 4 * Id::SIZE;

fn dataset_key(origin: Id) -> Vec<u8> {
    assemble_key(DATASET_TAG, &[&origin.to_bytes()])
}

/// The IRI blank nodes of a dataset are scoped to, if any.
fn origin_base(origin: &Term, tags: &dyn TagScheme) -> Result<Option<String>> {
    match origin {
        Term::DefaultGraph => Ok(None),
        Term::Iri { value } if tags.accepts_origin(value) => Ok(Some(value.clone())),
        other => Err(TriplexError::TagScheme(other.to_string())),
    }
}

/// Counter pairs touched by one triple: each place leads one major and one
/// minor permutation.
fn counter_pairs(ids: &[Id; 3]) -> impl Iterator<Item = (Permutation, Id, Id)> + '_ {
    Place::ALL.into_iter().flat_map(move |place| {
        let leading = ids[place.index()];
        [
            (Permutation::major(place), leading, ids[place.next().index()]),
            (Permutation::minor(place), leading, ids[place.prev().index()]),
        ]
    })
}

/// Stores `quads` under `origin`, replacing whatever the origin held before.
/// Returns the number of triples that were new to the index.
pub fn insert(
    origin: &Term,
    quads: &[Quad],
    dictionary: &mut Dictionary,
    txn: &mut dyn Transaction,
) -> Result<usize> {
    let base = origin_base(origin, dictionary.tags().as_ref())?;
    // reject the whole dataset before anything is written
    for (index, quad) in quads.iter().enumerate() {
        if let Some(term) = quad
            .terms()
            .into_iter()
            .find(|term| term.is_variable() || **term == Term::DefaultGraph)
        {
            return Err(TriplexError::InvalidTerm(format!(
                "{} in quad {} of {}",
                term, index, origin
            )));
        }
        if quad.graph.is_variable() {
            return Err(TriplexError::InvalidTerm(format!(
                "{} in quad {} of {}",
                quad.graph, index, origin
            )));
        }
    }
    let origin_id = dictionary.get_or_insert_id(origin, None, txn)?;
    let mut unary = UnaryCache::new();
    let mut binary = BinaryCache::new();
    let removed = remove(origin_id, &mut unary, &mut binary, txn)?;

    let mut record = Vec::with_capacity(quads.len() * QUAD_SIZE);
    let mut added = 0;
    for (index, quad) in quads.iter().enumerate() {
        let mut ids = [Id::MIN; 3];
        for (slot, term) in ids.iter_mut().zip(quad.terms()) {
            *slot = dictionary.get_or_insert_id(term, base.as_deref(), txn)?;
        }
        let graph = dictionary.get_or_insert_id(&quad.graph, base.as_deref(), txn)?;
        let statement = Statement {
            origin: origin_id,
            index: index as u64,
            graph,
        };
        let primary = ternary_key(Place::Subject, &ids);
        match txn.get(&primary)? {
            Some(mut statements) => {
                statements.extend_from_slice(&statement.to_bytes());
                txn.set(&primary, &statements)?;
            }
            None => {
                txn.set(&primary, &statement.to_bytes())?;
                txn.set(&ternary_key(Place::Predicate, &ids), &[])?;
                txn.set(&ternary_key(Place::Object, &ids), &[])?;
                for (permutation, leading, trailing) in counter_pairs(&ids) {
                    binary.increment(permutation, leading, trailing, &mut unary, &*txn)?;
                }
                added += 1;
            }
        }
        for id in ids.iter().chain(std::iter::once(&graph)) {
            record.extend_from_slice(&id.to_bytes());
        }
    }
    txn.set(&dataset_key(origin_id), &record)?;
    binary.commit(txn)?;
    unary.commit(txn)?;
    info!(%origin, quads = quads.len(), added, removed, "inserted dataset");
    Ok(added)
}

/// Removes the dataset stored under `origin`. Returns the number of triples
/// that left the index; an unknown origin removes nothing.
pub fn delete(origin: &Term, dictionary: &mut Dictionary, txn: &mut dyn Transaction) -> Result<usize> {
    let origin_id = match dictionary.get_id(origin, None, &*txn) {
        Ok(id) => id,
        Err(TriplexError::NotFound(_)) => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut unary = UnaryCache::new();
    let mut binary = BinaryCache::new();
    let removed = remove(origin_id, &mut unary, &mut binary, txn)?;
    binary.commit(txn)?;
    unary.commit(txn)?;
    info!(%origin, removed, "deleted dataset");
    Ok(removed)
}

fn remove(
    origin: Id,
    unary: &mut UnaryCache,
    binary: &mut BinaryCache,
    txn: &mut dyn Transaction,
) -> Result<usize> {
    let key = dataset_key(origin);
    let Some(record) = txn.get(&key)? else {
        return Ok(0);
    };
    if record.len() % QUAD_SIZE != 0 {
        return Err(TriplexError::corruption(format!(
            "dataset record of {} bytes",
            record.len()
        )));
    }
    let mut removed = 0;
    for quad in record.chunks_exact(QUAD_SIZE) {
        let ids = [
            Id::from_bytes(&quad[..8])?,
            Id::from_bytes(&quad[8..16])?,
            Id::from_bytes(&quad[16..24])?,
        ];
        let primary = ternary_key(Place::Subject, &ids);
        // a triple repeated within the dataset is gone after its first quad
        let Some(bytes) = txn.get(&primary)? else {
            continue;
        };
        let remaining: Vec<Statement> = Statement::decode_all(&bytes)?
            .into_iter()
            .filter(|statement| statement.origin != origin)
            .collect();
        if !remaining.is_empty() {
            txn.set(&primary, &Statement::encode_all(&remaining))?;
            continue;
        }
        for rotation in Place::ALL {
            txn.delete(&ternary_key(rotation, &ids))?;
        }
        for (permutation, leading, trailing) in counter_pairs(&ids) {
            binary.decrement(permutation, leading, trailing, unary, &*txn)?;
        }
        removed += 1;
    }
    txn.delete(&key)?;
    debug!(%origin, removed, "removed dataset postings");
    Ok(removed)
}

/// The dataset stored under `origin`, with its terms read back relative to
/// the origin. An origin that never held a dataset is not found.
pub fn read(origin: &Term, dictionary: &mut Dictionary, txn: &dyn Transaction) -> Result<Vec<Quad>> {
    let base = origin_base(origin, dictionary.tags().as_ref())?;
    let origin_id = dictionary.get_id(origin, None, txn)?;
    let record = txn
        .get(&dataset_key(origin_id))?
        .ok_or_else(|| TriplexError::NotFound(format!("dataset {}", origin)))?;
    if record.len() % QUAD_SIZE != 0 {
        return Err(TriplexError::corruption(format!(
            "dataset record of {} bytes",
            record.len()
        )));
    }
    let mut quads = Vec::with_capacity(record.len() / QUAD_SIZE);
    for quad in record.chunks_exact(QUAD_SIZE) {
        let mut terms = Vec::with_capacity(4);
        for id in quad.chunks_exact(Id::SIZE) {
            terms.push(dictionary.get_term(Id::from_bytes(id)?, base.as_deref(), txn)?);
        }
        let [subject, predicate, object, graph]: [Term; 4] = terms
            .try_into()
            .map_err(|_| TriplexError::corruption("dataset quad without four terms"))?;
        quads.push(Quad::new(subject, predicate, object, graph));
    }
    Ok(quads)
}

// ------------- Datasets -------------
/// The origins holding a dataset, in the order their ids were minted.
pub struct Datasets {
    txn: Box<dyn Transaction>,
    dictionary: Dictionary,
    cursor: RangeCursor,
    started: bool,
}

impl Datasets {
    /// Positions on `from` (inclusive) or, without one, on the first origin.
    /// A `from` that was never stored is not found.
    pub fn open(from: Option<&Term>, mut dictionary: Dictionary, txn: Box<dyn Transaction>) -> Result<Self> {
        let mut cursor = RangeCursor::new(vec![DATASET_TAG], false);
        match from {
            Some(origin) => {
                let id = dictionary.get_id(origin, None, txn.as_ref())?;
                cursor.seek(txn.as_ref(), &dataset_key(id))?;
            }
            None => cursor.seek(txn.as_ref(), &[DATASET_TAG])?,
        }
        Ok(Self {
            txn,
            dictionary,
            cursor,
            started: false,
        })
    }

    fn current(&mut self) -> Result<Option<Term>> {
        let Some(entry) = self.cursor.item() else {
            return Ok(None);
        };
        let id = Id::from_bytes(&entry.key[1..])?;
        self.dictionary.get_term(id, None, self.txn.as_ref()).map(Some)
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }
}

impl Iterator for Datasets {
    type Item = Result<Term>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.started {
            if let Err(e) = self.cursor.next(self.txn.as_ref()) {
                self.cursor.close();
                return Some(Err(e));
            }
        }
        self.started = true;
        self.current().transpose()
    }
}
