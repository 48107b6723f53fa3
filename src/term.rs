//! Terms, triples and quads as they enter and leave the engine.
//!
//! A [`Term`] is either a constant (IRI, literal, default graph, or a blank node
//! inside a dataset) or, inside a query, an unbound slot. Blank nodes and
//! variables in a query are both slots; the only difference is that callers
//! usually expose variables in the domain and leave blank nodes internal.

use std::fmt;

use serde::{Deserialize, Serialize};

// ------------- Term -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "termType")]
pub enum Term {
    #[serde(rename = "NamedNode")]
    Iri { value: String },
    #[serde(rename = "BlankNode")]
    Blank { value: String },
    #[serde(rename = "Literal")]
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    #[serde(rename = "DefaultGraph")]
    DefaultGraph,
    #[serde(rename = "Variable")]
    Variable { value: String },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank {
            value: label.into(),
        }
    }
    pub fn variable(label: impl Into<String>) -> Self {
        Term::Variable {
            value: label.into(),
        }
    }
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }
    pub fn tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// True for the terms a query treats as unbound slots.
    pub fn is_slot(&self) -> bool {
        matches!(self, Term::Blank { .. } | Term::Variable { .. })
    }
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable { .. })
    }
}

pub(crate) fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{}>", value),
            Term::Blank { value } => write!(f, "_:{}", value),
            Term::Variable { value } => write!(f, "?{}", value),
            Term::DefaultGraph => Ok(()),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape(value))?;
                if let Some(language) = language {
                    write!(f, "@{}", language)
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{}>", datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ------------- Triple and Quad -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Term,
}

impl Quad {
    pub fn new(subject: Term, predicate: Term, object: Term, graph: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph,
        }
    }
    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

impl From<Triple> for Quad {
    fn from(triple: Triple) -> Self {
        Quad::new(
            triple.subject,
            triple.predicate,
            triple.object,
            Term::DefaultGraph,
        )
    }
}
