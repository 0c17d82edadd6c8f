//! Error taxonomy.
//!
//! Three families, all fatal:
//! - **configuration** errors (bad or insufficient input) abort before the first tick;
//! - **invariant** violations are programming errors caught between loop stages;
//! - **output** errors happen after a run, while writing its results.
//!
//! Per-tick numeric trouble (zero-norm contexts, non-finite penalties) is never an
//! `Error`: learners and the evaluator absorb it as a zero contribution.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value is missing, out of range, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The platoon needs a lead and at least one trailing unit.
    #[error("configuration error: at least 2 units are required, found {found}")]
    TooFewUnits { found: usize },

    /// Learner name not present in the registry.
    #[error("configuration error: unknown learner `{name}` (known: {known})")]
    UnknownLearner { name: String, known: String },

    /// A row of the initial-state table could not be parsed.
    #[error("initial data error at line {line}: {reason}")]
    InitialData { line: usize, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Stage-to-stage contract broken (e.g. array lengths disagree).
    #[error("simulation invariant violated: {0}")]
    Invariant(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that are raised before any tick runs.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Error::Invariant(_) | Error::Write { .. } | Error::Serialize(_)
        )
    }
}

/// Fail with [`Error::Invariant`] unless `expected == actual`.
pub(crate) fn ensure_len(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::Invariant(format!(
            "{what}: expected {expected} entries, got {actual}"
        )))
    }
}
