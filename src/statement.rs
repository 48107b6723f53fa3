//! Provenance attached to primary postings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriplexError};
use crate::key::{Id, Place, ternary_key};
use crate::store::Transaction;
use crate::term::Term;

/// One quad of one dataset that asserted a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Statement {
    pub origin: Id,
    /// Position of the quad within its dataset.
    pub index: u64,
    pub graph: Id,
}

impl Statement {
    pub const SIZE: usize = 3 * Id::SIZE;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..8].copy_from_slice(&self.origin.to_bytes());
        bytes[8..16].copy_from_slice(&self.index.to_be_bytes());
        bytes[16..].copy_from_slice(&self.graph.to_bytes());
        bytes
    }

    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Statement>> {
        if bytes.len() % Self::SIZE != 0 {
            return Err(TriplexError::corruption(format!(
                "statement list of {} bytes",
                bytes.len()
            )));
        }
        bytes
            .chunks_exact(Self::SIZE)
            .map(|chunk| {
                Ok(Statement {
                    origin: Id::from_bytes(&chunk[..8])?,
                    index: Id::from_bytes(&chunk[8..16])?.value(),
                    graph: Id::from_bytes(&chunk[16..])?,
                })
            })
            .collect()
    }

    pub fn encode_all(statements: &[Statement]) -> Vec<u8> {
        statements.iter().flat_map(|s| s.to_bytes()).collect()
    }
}

/// Statements recorded for the triple `ids`; empty when it is not stored.
pub fn read_statements(txn: &dyn Transaction, ids: &[Id; 3]) -> Result<Vec<Statement>> {
    match txn.get(&ternary_key(Place::Subject, ids))? {
        Some(bytes) => Statement::decode_all(&bytes),
        None => Ok(Vec::new()),
    }
}

/// A statement translated back to terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub origin: Term,
    pub index: u64,
    pub graph: Term,
}
