//! Core types for the inventory sync library
//!
//! This module defines the fundamental types shared by every stage of the
//! pipeline: ingested rows, the identifiers extracted from a page item, and
//! the error taxonomy. None of these types carry behaviour beyond simple
//! accessors - the stages themselves live in their own modules.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// One ingested data record: column name -> cell value
///
/// Keys come from the header line (CSV) or header row (grid).
pub type Row = HashMap<String, String>;

/// Errors that can occur while refreshing or matching
///
/// `Configuration`, `Fetch` and `Validation` abort a refresh attempt and are
/// shown verbatim to whoever asked for the refresh. `Extraction` is per item
/// and never aborts an annotation pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Fetch(String),

    #[error("{0}")]
    Validation(String),

    #[error("No identifier found: {0}")]
    Extraction(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Short category name, used in log lines and diagnostics
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::Fetch(_) => ErrorKind::Fetch,
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Extraction(_) => ErrorKind::Extraction,
            SyncError::Selector(_) => ErrorKind::Configuration,
            SyncError::Store(_) | SyncError::Io(_) => ErrorKind::Store,
        }
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Fetch,
    Validation,
    Extraction,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Fetch => write!(f, "fetch"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Extraction => write!(f, "extraction"),
            ErrorKind::Store => write!(f, "store"),
        }
    }
}

/// Canonical identifiers extracted from one page item
///
/// Either field may be empty - an empty string means the heuristic found
/// nothing for that identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemIdentifiers {
    /// Normalized VIN (see [`crate::normalize::normalize_vin`])
    pub vin: String,
    /// Normalized stock code (see [`crate::normalize::normalize_stock`])
    pub stock: String,
}

impl ItemIdentifiers {
    /// True when neither identifier could be found
    pub fn is_empty(&self) -> bool {
        self.vin.is_empty() && self.stock.is_empty()
    }
}

/// Render an error the way it is reported back to a refresh caller
pub fn status_message(error: Option<&SyncError>) -> String {
    match error {
        None => "OK".to_string(),
        Some(e) => e.to_string(),
    }
}
