//! Runtime settings, read with the `config` crate from built-in defaults, an
//! optional settings file and `TRIPLEX_*` environment variables (in that
//! order of precedence, last wins).

use std::sync::Arc;

use serde::Deserialize;

use crate::dictionary::{NoTags, PrefixTags, TagScheme};
use crate::error::{Result, TriplexError};
use crate::persist::PersistenceMode;

pub const DEFAULT_FILE: &str = "triplex";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// `memory` or `file`.
    pub mode: String,
    /// Database file used in `file` mode.
    pub path: Option<String>,
    /// IRI prefix whose fragment IRIs are stored compressed.
    pub tag_prefix: Option<String>,
    /// Write limit per transaction of the in-memory store.
    pub max_transaction_writes: Option<usize>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: "memory".to_string(),
            path: None,
            tag_prefix: None,
            max_transaction_writes: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Reads `file` (any format `config` recognizes by extension, the
    /// extension may be left out) if it exists, then the environment.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let settings = ::config::Config::builder()
            .set_default("mode", defaults.mode)?
            .set_default("log_filter", defaults.log_filter)?
            .add_source(::config::File::with_name(file.unwrap_or(DEFAULT_FILE)).required(file.is_some()))
            .add_source(::config::Environment::with_prefix("TRIPLEX").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn for_mode(mode: &PersistenceMode) -> Self {
        match mode {
            PersistenceMode::InMemory => Settings::default(),
            PersistenceMode::File(path) => Settings {
                mode: "file".to_string(),
                path: Some(path.clone()),
                ..Settings::default()
            },
        }
    }

    pub fn persistence(&self) -> Result<PersistenceMode> {
        match (self.mode.as_str(), &self.path) {
            ("memory", _) => Ok(PersistenceMode::InMemory),
            ("file", Some(path)) => Ok(PersistenceMode::File(path.clone())),
            ("file", None) => Err(TriplexError::Config("file mode needs a path".to_string())),
            (other, _) => Err(TriplexError::Config(format!("unknown mode {}", other))),
        }
    }

    pub fn tag_scheme(&self) -> Arc<dyn TagScheme> {
        match &self.tag_prefix {
            Some(prefix) => Arc::new(PrefixTags::new(prefix.clone())),
            None => Arc::new(NoTags),
        }
    }
}
