use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where a persisted record stopped matching its expected shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataIssue {
    /// Path of the offending value, e.g. `expenses[2].amount`. `None` when the
    /// document could not be parsed far enough to point at a field.
    pub field: Option<String>,
    pub reason: String,
}

impl DataIssue {
    pub fn at(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            reason: reason.into(),
        }
    }

    pub fn document(reason: impl Into<String>) -> Self {
        Self {
            field: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field `{field}`: {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("invalid username: {0:?}")]
    InvalidUsername(String),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("storage error at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt data in {}: {issue}", .path.display())]
    CorruptData { path: PathBuf, issue: DataIssue },
}

impl StoreError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptData { .. })
    }
}
