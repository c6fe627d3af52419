//! Error types shared across the pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading the guide.
#[derive(Debug, Error)]
pub enum GuideError {
    /// A guide directory could not be read.
    #[error("failed to read guide path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading or writing the identifier cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialisation error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace cache file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal errors for a synchronisation run. Nothing has been mutated remotely
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("guide unavailable: {0}")]
    GuideFetch(#[from] GuideError),

    #[error("failed to list custom formats for {target}: {message}")]
    RemoteListing { target: String, message: String },
}

/// Kind of remote operation an [`ItemFailure`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(op)
    }
}

/// A single create/update/delete that failed. Recorded, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub operation: Operation,
    pub name: String,
    pub remote_id: Option<i64>,
    pub message: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_id {
            Some(id) => write!(
                f,
                "{} of '{}' (id {}) failed: {}",
                self.operation, self.name, id, self.message
            ),
            None => write!(
                f,
                "{} of '{}' failed: {}",
                self.operation, self.name, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_failure_display_includes_id_when_known() {
        let failure = ItemFailure {
            operation: Operation::Update,
            name: "x265 (HD)".into(),
            remote_id: Some(7),
            message: "HTTP 500".into(),
        };
        assert_eq!(
            failure.to_string(),
            "update of 'x265 (HD)' (id 7) failed: HTTP 500"
        );

        let failure = ItemFailure {
            remote_id: None,
            operation: Operation::Create,
            ..failure
        };
        assert_eq!(failure.to_string(), "create of 'x265 (HD)' failed: HTTP 500");
    }

    #[test]
    fn remote_listing_error_names_target() {
        let err = SyncError::RemoteListing {
            target: "movies".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("movies"));
        assert!(err.to_string().contains("connection refused"));
    }
}
