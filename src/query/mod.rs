//! Pattern compilation and solving.
//!
//! [`compile`] turns query triples into a [`ConstraintGraph`]: one
//! [`constraint::Constraint`] per variable occurrence, grouped into
//! [`variable::Variable`]s, ordered into a domain and linked by the
//! dependencies two-variable triples create.

pub mod assemble;
pub mod constraint;
pub mod graph;
pub mod solver;
pub mod variable;

pub use assemble::{Relabeling, compile};
pub use graph::{ConstraintGraph, State};
