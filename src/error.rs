use thiserror::Error;

use crate::parse::Rule;

#[derive(Error, Debug)]
pub enum TriplexError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Transaction too large")]
    TransactionTooLarge,
    #[error("Transaction is read-only")]
    ReadOnly,
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        line: Option<usize>,
        col: Option<usize>,
    },
    #[error("Invalid term: {0}")]
    InvalidTerm(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
    #[error("Cannot handle all-variable triple at index {0}")]
    AllVariableTriple(usize),
    #[error("Origin not accepted by the tag scheme: {0}")]
    TagScheme(String),
    #[error("Graph is closed")]
    Closed,
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TriplexError>;

impl TriplexError {
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for TriplexError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<::config::ConfigError> for TriplexError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<pest::error::Error<Rule>> for TriplexError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::Parse {
            message: e.variant.message().to_string(),
            line: Some(line),
            col: Some(col),
        }
    }
}
