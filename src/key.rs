//! Identifiers and the binary key layout shared by postings, counters and the
//! dictionary.
//!
//! Every key is one tag byte followed by fixed-width segments, so a prefix scan
//! over `tag ++ bound ids` yields exactly the ids that complete the binding, in
//! ascending order.

use std::fmt;

use crate::error::{Result, TriplexError};

// ------------- Id -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    pub const SIZE: usize = 8;
    pub const MIN: Id = Id(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }
    pub fn value(&self) -> u64 {
        self.0
    }
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.0.to_be_bytes()
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let fixed: [u8; Self::SIZE] = bytes
            .try_into()
            .map_err(|_| TriplexError::corruption(format!("id of {} bytes", bytes.len())))?;
        Ok(Self(u64::from_be_bytes(fixed)))
    }
    /// The smallest id strictly greater than this one.
    pub fn successor(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

// ------------- Place -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Place {
    Subject = 0,
    Predicate = 1,
    Object = 2,
}

impl Place {
    pub const ALL: [Place; 3] = [Place::Subject, Place::Predicate, Place::Object];

    pub fn index(self) -> usize {
        self as usize
    }
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 3]
    }
    /// The place after this one, wrapping around.
    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }
    pub fn prev(self) -> Self {
        Self::from_index(self.index() + 2)
    }
}

// ------------- Permutation -------------
/// The six orderings of binary counters. The first three ("major") bind
/// `t[q]` and count ids at `t[q+1]`, the last three ("minor") bind `t[q]`
/// and count ids at `t[q+2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permutation {
    SP = 0,
    PO = 1,
    OS = 2,
    SO = 3,
    PS = 4,
    OP = 5,
}

impl Permutation {
    pub const ALL: [Permutation; 6] = [
        Permutation::SP,
        Permutation::PO,
        Permutation::OS,
        Permutation::SO,
        Permutation::PS,
        Permutation::OP,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
    pub fn major(leading: Place) -> Self {
        Self::ALL[leading.index()]
    }
    pub fn minor(leading: Place) -> Self {
        Self::ALL[leading.index() + 3]
    }
    pub fn leading(self) -> Place {
        Place::from_index(self.index())
    }
    pub fn trailing(self) -> Place {
        match self.index() {
            q @ 0..=2 => Place::from_index(q + 1),
            q => Place::from_index(q + 2),
        }
    }
    pub fn tag(self) -> u8 {
        BINARY_TAGS[self.index()]
    }
}

// ------------- Key layout -------------
pub const TERNARY_TAGS: [u8; 3] = [b'a', b'b', b'c'];
pub const BINARY_TAGS: [u8; 6] = [b'i', b'j', b'k', b'l', b'm', b'n'];
pub const UNARY_TAG: u8 = b'u';
pub const ID_TO_VALUE_TAG: u8 = b'p';
pub const VALUE_TO_ID_TAG: u8 = b'q';
pub const SEQUENCE_TAG: u8 = b's';
pub const DATASET_TAG: u8 = b'd';

pub fn assemble_key(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    let length = 1 + parts.iter().map(|part| part.len()).sum::<usize>();
    let mut key = Vec::with_capacity(length);
    key.push(tag);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// The ternary posting for `ids` rotated to start at `rotation`.
pub fn ternary_key(rotation: Place, ids: &[Id; 3]) -> Vec<u8> {
    let r = rotation.index();
    assemble_key(
        TERNARY_TAGS[r],
        &[
            &ids[r].to_bytes(),
            &ids[(r + 1) % 3].to_bytes(),
            &ids[(r + 2) % 3].to_bytes(),
        ],
    )
}

/// Prefix of the rotation starting at `rotation`, fixed on its first two ids.
pub fn ternary_prefix(rotation: Place, first: Id, second: Id) -> Vec<u8> {
    assemble_key(
        TERNARY_TAGS[rotation.index()],
        &[&first.to_bytes(), &second.to_bytes()],
    )
}

pub fn binary_key(permutation: Permutation, leading: Id, trailing: Id) -> Vec<u8> {
    assemble_key(
        permutation.tag(),
        &[&leading.to_bytes(), &trailing.to_bytes()],
    )
}

pub fn binary_prefix(permutation: Permutation, leading: Id) -> Vec<u8> {
    assemble_key(permutation.tag(), &[&leading.to_bytes()])
}

pub fn unary_key(id: Id) -> Vec<u8> {
    assemble_key(UNARY_TAG, &[&id.to_bytes()])
}

/// Reads the id occupying the last segment of `key`.
pub fn trailing_id(key: &[u8]) -> Result<Id> {
    if key.len() < 1 + Id::SIZE {
        return Err(TriplexError::corruption(format!(
            "key of {} bytes has no id segment",
            key.len()
        )));
    }
    Id::from_bytes(&key[key.len() - Id::SIZE..])
}

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_u32(bytes: &[u8]) -> Result<u32> {
    let fixed: [u8; 4] = bytes
        .try_into()
        .map_err(|_| TriplexError::corruption(format!("counter of {} bytes", bytes.len())))?;
    Ok(u32::from_be_bytes(fixed))
}
