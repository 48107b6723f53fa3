//! Triplex – pattern queries over a permutation-indexed triple store.
//!
//! Datasets of RDF-style quads are published under an *origin* and folded into
//! a single index held in an ordered key-value store. Every triple is stored
//! under three rotations of its ids, and every pair of places carries a
//! counter, so that a query can estimate how selective each of its parts is
//! before touching any data.
//!
//! A query is a list of triples mixing constants with variables (and blank
//! nodes, which act as variables that are not reported). It compiles into a
//! [`query::ConstraintGraph`]: one constraint per variable occurrence, the
//! variables ordered so that the most selective are solved first, and a
//! depth-first search that intersects the constraints of each variable with a
//! leapfrog join. Results come out in lexicographic order of the reported
//! variables, which makes the iteration resumable: any returned assignment can
//! be handed back as an index to continue right after it.
//!
//! ## Modules
//! * [`term`] – Terms, triples and quads.
//! * [`key`] – Ids and the byte layout of every index key.
//! * [`store`] – The [`store::Store`] and [`store::Transaction`] traits, range cursors and chunked writes.
//! * [`memory`] / [`persist`] – In-memory and SQLite backends.
//! * [`dictionary`] – The term to id bijection, including origin-relative and tagged terms.
//! * [`counts`] – Cached unary and binary counters.
//! * [`ingest`] – Inserting, replacing, reading, listing and deleting datasets.
//! * [`parse`] – A line based text format for datasets, patterns and terms.
//! * [`query`] – Compilation and iteration of pattern queries.
//! * [`database`] – The [`Database`] facade.
//!
//! ## Quick Start
//! ```
//! use triplex::{Database, PersistenceMode, Term, parse};
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let quads = parse::dataset("<http://e/a> <http://e/knows> <http://e/b> .").unwrap();
//! db.set(&Term::iri("http://e/people"), &quads).unwrap();
//! let pattern = parse::pattern("?x <http://e/knows> ?y .").unwrap();
//! let mut graph = db
//!     .query(&pattern, &[Term::variable("x"), Term::variable("y")], &[])
//!     .unwrap();
//! let row = graph.next(None).unwrap().unwrap();
//! assert_eq!(row, vec![Term::iri("http://e/a"), Term::iri("http://e/b")]);
//! assert!(graph.next(None).unwrap().is_none());
//! ```

pub mod counts;
pub mod database;
pub mod dictionary;
pub mod error;
pub mod ingest;
pub mod key;
pub mod memory;
pub mod parse;
pub mod persist;
pub mod query;
pub mod settings;
pub mod statement;
pub mod store;
pub mod term;

pub use database::Database;
pub use error::{Result, TriplexError};
pub use ingest::Datasets;
pub use persist::PersistenceMode;
pub use query::{ConstraintGraph, State};
pub use settings::Settings;
pub use statement::Source;
pub use term::{Quad, Term, Triple};
