//! External contracts for the transfer pipeline.
//!
//! These traits are the thin seams the worker pool and executor need:
//! authenticated listing/download/upload against Rec, WebDAV primitives, and
//! Rec virtual filesystem path resolution. Concrete implementations perform
//! real HTTP calls; tests substitute in-memory fakes.

pub mod rec_api;
pub mod rec_fs;
pub mod webdav;

pub use rec_api::{RecApiClient, RecFileInfo};
pub use rec_fs::{RecFs, ResolvedSource, RootOnlyRecFs};
pub use webdav::{NoWebDavClient, WebDavClient};

use serde::{Deserialize, Serialize};

/// Both Rec and WebDAV listings are normalized to this shape before
/// reaching a route handler or the worker's folder-expansion logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntry {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}
