//! The term dictionary: a bijection between terms and compact [`Id`]s.
//!
//! Terms are first turned into a canonical string value, which is then stored
//! twice (`p ++ id -> value` and `q ++ value -> id`). Blank nodes, the default
//! graph and variables are only meaningful relative to the dataset (origin)
//! they came from, so with an origin they are stored as fragments of the
//! origin's id. IRIs accepted by the [`TagScheme`] are compressed the same way:
//! `~<hex id of the tag IRI>#fragment`.

use std::fmt;
use std::sync::Arc;

use bimap::BiMap;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::error::{Result, TriplexError};
use crate::key::{ID_TO_VALUE_TAG, Id, SEQUENCE_TAG, VALUE_TO_ID_TAG, assemble_key};
use crate::store::Transaction;
use crate::term::{Term, unescape};

/// First id ever minted; zero stays free as the minimum seek bound.
pub const INITIAL_ID: u64 = 1;
/// Ids leased from the stored sequence at a time.
pub const SEQUENCE_BANDWIDTH: u64 = 512;

lazy_static! {
    static ref LITERAL: Regex =
        Regex::new(r#"^"((?:[^"\\]|\\.)*)"(?:@([A-Za-z0-9\-]+)|\^\^<([^>]*)>)?$"#)
            .expect("literal pattern compiles");
}

// ------------- Tag schemes -------------
pub trait TagScheme: Send + Sync + fmt::Debug {
    /// Splits a compressible IRI into its tag and fragment.
    fn parse<'a>(&self, iri: &'a str) -> Option<(&'a str, &'a str)>;
    /// Whether `origin` may name a dataset.
    fn accepts_origin(&self, origin: &str) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct NoTags;

impl TagScheme for NoTags {
    fn parse<'a>(&self, _iri: &'a str) -> Option<(&'a str, &'a str)> {
        None
    }
    fn accepts_origin(&self, origin: &str) -> bool {
        !origin.is_empty() && !origin.contains('#')
    }
}

/// Tags every IRI that starts with `prefix` and carries a fragment.
#[derive(Debug, Clone)]
pub struct PrefixTags {
    prefix: String,
}

impl PrefixTags {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl TagScheme for PrefixTags {
    fn parse<'a>(&self, iri: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = iri.strip_prefix(self.prefix.as_str())?;
        match rest.find('#') {
            Some(0) | None => None,
            Some(i) => {
                let split = self.prefix.len() + i;
                Some((&iri[..split], &iri[split + 1..]))
            }
        }
    }
    fn accepts_origin(&self, origin: &str) -> bool {
        origin.len() > self.prefix.len() && origin.starts_with(&self.prefix) && !origin.contains('#')
    }
}

// ------------- Dictionary -------------
enum Canonical {
    Plain(String),
    Tagged {
        tag: String,
        separator: char,
        fragment: String,
    },
}

/// A dictionary session bound to the lifetime of one transaction.
#[derive(Debug)]
pub struct Dictionary {
    tags: Arc<dyn TagScheme>,
    writable: bool,
    values: BiMap<String, Id>,
    sequence: Option<u64>,
    // exclusive end of the block already reserved in the store
    leased: u64,
    dirty: bool,
}

impl Dictionary {
    pub fn open(tags: Arc<dyn TagScheme>, writable: bool) -> Self {
        Self {
            tags,
            writable,
            values: BiMap::new(),
            sequence: None,
            leased: 0,
            dirty: false,
        }
    }

    pub fn tags(&self) -> &Arc<dyn TagScheme> {
        &self.tags
    }

    fn canonical(&self, term: &Term, origin: Option<&str>) -> Result<Canonical> {
        let relative = |separator: char, fragment: &str| match origin {
            Some(origin) => Canonical::Tagged {
                tag: origin.to_string(),
                separator,
                fragment: fragment.to_string(),
            },
            None => Canonical::Plain(match separator {
                '?' => format!("?{}", fragment),
                _ if fragment.is_empty() => "@default".to_string(),
                _ => format!("_:{}", fragment),
            }),
        };
        Ok(match term {
            Term::Iri { value } if value.is_empty() => {
                return Err(TriplexError::InvalidTerm("empty IRI".to_string()));
            }
            Term::Iri { value } => match self.tags.parse(value) {
                Some((tag, fragment)) => Canonical::Tagged {
                    tag: tag.to_string(),
                    separator: '#',
                    fragment: fragment.to_string(),
                },
                None => Canonical::Plain(format!("<{}>", value)),
            },
            Term::Literal { .. } => Canonical::Plain(term.to_string()),
            Term::Blank { value } | Term::Variable { value } if value.is_empty() => {
                return Err(TriplexError::InvalidTerm(format!("unlabeled {:?}", term)));
            }
            Term::Blank { value } => relative('#', value),
            Term::Variable { value } => relative('?', value),
            Term::DefaultGraph => relative('#', ""),
        })
    }

    /// Read path: resolves a term without minting.
    pub fn get_id(&mut self, term: &Term, origin: Option<&str>, txn: &dyn Transaction) -> Result<Id> {
        let value = match self.canonical(term, origin)? {
            Canonical::Plain(value) => value,
            Canonical::Tagged {
                tag,
                separator,
                fragment,
            } => {
                let tag = self.lookup(&format!("<{}>", tag), txn)?;
                format!("~{:x}{}{}", tag.value(), separator, fragment)
            }
        };
        self.lookup(&value, txn)
    }

    /// Write path: resolves a term, minting ids for unseen values.
    pub fn get_or_insert_id(
        &mut self,
        term: &Term,
        origin: Option<&str>,
        txn: &mut dyn Transaction,
    ) -> Result<Id> {
        let value = match self.canonical(term, origin)? {
            Canonical::Plain(value) => value,
            Canonical::Tagged {
                tag,
                separator,
                fragment,
            } => {
                let tag = self.insert(&format!("<{}>", tag), txn)?;
                format!("~{:x}{}{}", tag.value(), separator, fragment)
            }
        };
        self.insert(&value, txn)
    }

    pub fn get_term(&mut self, id: Id, origin: Option<&str>, txn: &dyn Transaction) -> Result<Term> {
        let value = self.value_of(id, txn)?;
        self.decode(&value, origin, txn)
    }

    /// Persists the id sequence, returning the unused part of the lease;
    /// nothing to do for sessions that never minted.
    pub fn commit(&mut self, txn: &mut dyn Transaction) -> Result<()> {
        if let (true, Some(next)) = (self.dirty, self.sequence) {
            txn.set(&[SEQUENCE_TAG], &next.to_be_bytes())?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.sequence = None;
        self.leased = 0;
        self.dirty = false;
    }

    fn lookup(&mut self, value: &str, txn: &dyn Transaction) -> Result<Id> {
        if let Some(id) = self.values.get_by_left(value) {
            return Ok(*id);
        }
        let key = assemble_key(VALUE_TO_ID_TAG, &[value.as_bytes()]);
        match txn.get(&key)? {
            Some(bytes) => {
                let id = Id::from_bytes(&bytes)?;
                self.values.insert(value.to_string(), id);
                Ok(id)
            }
            None => Err(TriplexError::NotFound(value.to_string())),
        }
    }

    fn insert(&mut self, value: &str, txn: &mut dyn Transaction) -> Result<Id> {
        if !self.writable {
            return Err(TriplexError::ReadOnly);
        }
        match self.lookup(value, &*txn) {
            Err(TriplexError::NotFound(_)) => {}
            found => return found,
        }
        let next = match self.sequence {
            Some(next) => next,
            None => match txn.get(&[SEQUENCE_TAG])? {
                Some(bytes) => Id::from_bytes(&bytes)?.value(),
                None => INITIAL_ID,
            },
        };
        if next >= self.leased {
            // reserve the block before any id in it reaches the store
            self.leased = next + SEQUENCE_BANDWIDTH;
            txn.set(&[SEQUENCE_TAG], &self.leased.to_be_bytes())?;
        }
        let id = Id::new(next);
        txn.set(&assemble_key(ID_TO_VALUE_TAG, &[&id.to_bytes()]), value.as_bytes())?;
        txn.set(&assemble_key(VALUE_TO_ID_TAG, &[value.as_bytes()]), &id.to_bytes())?;
        self.values.insert(value.to_string(), id);
        self.sequence = Some(next + 1);
        self.dirty = true;
        trace!(%id, value, "minted id");
        Ok(id)
    }

    fn value_of(&mut self, id: Id, txn: &dyn Transaction) -> Result<String> {
        if let Some(value) = self.values.get_by_right(&id) {
            return Ok(value.clone());
        }
        let key = assemble_key(ID_TO_VALUE_TAG, &[&id.to_bytes()]);
        let bytes = txn
            .get(&key)?
            .ok_or_else(|| TriplexError::NotFound(format!("id {}", id)))?;
        let value = String::from_utf8(bytes)
            .map_err(|e| TriplexError::corruption(format!("value of id {}: {}", id, e)))?;
        self.values.insert(value.clone(), id);
        Ok(value)
    }

    fn decode(&mut self, value: &str, origin: Option<&str>, txn: &dyn Transaction) -> Result<Term> {
        if let Some(iri) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
            return Ok(Term::iri(iri));
        }
        if value.starts_with('"') {
            let captures = LITERAL
                .captures(value)
                .ok_or_else(|| TriplexError::corruption(format!("literal {}", value)))?;
            return Ok(Term::Literal {
                value: unescape(captures.get(1).map_or("", |m| m.as_str())),
                language: captures.get(2).map(|m| m.as_str().to_string()),
                datatype: captures.get(3).map(|m| m.as_str().to_string()),
            });
        }
        if value == "@default" {
            return Ok(Term::DefaultGraph);
        }
        if let Some(label) = value.strip_prefix("_:") {
            return Ok(Term::blank(label));
        }
        if let Some(label) = value.strip_prefix('?') {
            return Ok(Term::variable(label));
        }
        let Some(tagged) = value.strip_prefix('~') else {
            return Err(TriplexError::corruption(format!("value {}", value)));
        };
        let split = tagged
            .find(['#', '?'])
            .ok_or_else(|| TriplexError::corruption(format!("tagged value {}", value)))?;
        let tag_id = u64::from_str_radix(&tagged[..split], 16)
            .map_err(|e| TriplexError::corruption(format!("tag of {}: {}", value, e)))?;
        let tag_value = self.value_of(Id::new(tag_id), txn)?;
        let tag = tag_value
            .strip_prefix('<')
            .and_then(|v| v.strip_suffix('>'))
            .ok_or_else(|| TriplexError::corruption(format!("tag {} is not an IRI", tag_value)))?;
        let separator = &tagged[split..split + 1];
        let fragment = &tagged[split + 1..];
        if origin == Some(tag) {
            return Ok(match (separator, fragment) {
                ("?", label) => Term::variable(label),
                (_, "") => Term::DefaultGraph,
                (_, label) => Term::blank(label),
            });
        }
        Ok(Term::iri(format!("{}{}{}", tag, separator, fragment)))
    }
}
