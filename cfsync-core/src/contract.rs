#![allow(unused)]

//! # contract: data models and collaborator traits for the pipeline
//!
//! The pipeline consumes two collaborators:
//! - a [`GuideSource`], producing every custom format definition in the guide;
//! - a [`CustomFormatService`], the remote capability (`list`, `create`,
//!   `update`, `delete`) of one Radarr/Sonarr instance.
//!
//! Both traits are async and annotated for `mockall`, so tests can script
//! remote behaviour deterministically.
//!
//! The remaining types are the plain data flowing between pipeline stages.

use async_trait::async_trait;

use mockall::{automock, predicate::*};

use crate::document::Document;
use crate::error::GuideError;

/// Boxed transport error returned by [`CustomFormatService`] implementations.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// One custom format as published in the guide.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideDefinition {
    /// Stable content identifier (the guide's trash id).
    pub content_id: String,
    pub name: String,
    /// The custom format body, guide metadata already removed.
    pub document: Document,
}

/// A custom format as currently stored by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub remote_id: i64,
    pub document: Document,
}

/// A guide definition that survived selection, joined with its cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDefinition {
    pub content_id: String,
    pub name: String,
    pub document: Document,
    /// Remote id recorded by a previous run, if any.
    pub cached_remote_id: Option<i64>,
}

/// Source of guide definitions.
///
/// A failure is fatal for the whole run: orphan detection needs the complete
/// set of definitions.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GuideSource: Send + Sync {
    async fn fetch_definitions(&self) -> Result<Vec<GuideDefinition>, GuideError>;
}

/// Remote capability for one Radarr/Sonarr instance.
///
/// Implementors own transport, authentication and timeouts. Every error is
/// reported as a boxed [`ServiceError`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CustomFormatService: Send + Sync {
    /// List every custom format currently defined remotely.
    async fn list(&self) -> Result<Vec<RemoteDocument>, ServiceError>;

    /// Create a custom format, returning the id the service assigned.
    async fn create(&self, document: &Document) -> Result<i64, ServiceError>;

    /// Replace the custom format with the given id.
    async fn update(&self, remote_id: i64, document: &Document) -> Result<(), ServiceError>;

    /// Delete the custom format with the given id.
    async fn delete(&self, remote_id: i64) -> Result<(), ServiceError>;
}
