//! Transaction building: diff processed definitions against remote state.
//!
//! [`build`] is a pure function. It decides, per processed definition, whether
//! the remote side needs a create, an update, or nothing at all, and which
//! orphaned cache entries should be deleted remotely.
//!
//! Matching order for a definition:
//! 1. the cached remote id, when that custom format still exists remotely;
//! 2. a remote custom format with the same name (case-insensitive), which
//!    recovers identity after a lost cache;
//! 3. otherwise a create.
//!
//! Each remote custom format is claimed by at most one definition or
//! deletion. A claimed id is never scheduled for deletion (again); an orphan
//! pointing at one is treated as stale.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::contract::{ProcessedDefinition, RemoteDocument};
use crate::document::Document;
use crate::persister::Deletion;

/// A merged document to write over an existing remote custom format.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub content_id: String,
    pub name: String,
    pub remote_id: i64,
    pub document: Document,
}

impl Update {
    pub fn cache_entry(&self) -> CacheEntry {
        CacheEntry {
            content_id: self.content_id.clone(),
            remote_id: self.remote_id,
            last_known_name: self.name.clone(),
        }
    }
}

/// The remote changes needed to converge on the selected definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub creates: Vec<ProcessedDefinition>,
    pub updates: Vec<Update>,
    /// Matched definitions whose remote document already equals the merge.
    pub unchanged: Vec<CacheEntry>,
    pub deletes: Vec<Deletion>,
    /// Orphaned entries whose remote custom format is gone or now claimed by
    /// another definition. Only filled when deletion is enabled.
    pub stale: Vec<CacheEntry>,
}

impl Transaction {
    /// True when applying would not touch the remote service.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

pub fn build(
    processed: &[ProcessedDefinition],
    orphaned: &[CacheEntry],
    remote: &[RemoteDocument],
    delete_orphaned: bool,
) -> Transaction {
    let by_id: HashMap<i64, &RemoteDocument> = remote.iter().map(|r| (r.remote_id, r)).collect();
    let mut claimed: HashSet<i64> = HashSet::new();
    let mut transaction = Transaction::default();

    for definition in processed {
        let matched = definition
            .cached_remote_id
            .and_then(|id| by_id.get(&id).copied())
            .filter(|r| !claimed.contains(&r.remote_id))
            .or_else(|| find_by_name(remote, &definition.name, &claimed));

        let Some(remote_doc) = matched else {
            debug!(name = %definition.name, cached_id = ?definition.cached_remote_id, "No remote match, will create");
            transaction.creates.push(definition.clone());
            continue;
        };
        claimed.insert(remote_doc.remote_id);

        let update = Update {
            content_id: definition.content_id.clone(),
            name: definition.name.clone(),
            remote_id: remote_doc.remote_id,
            document: definition.document.overlay_onto(&remote_doc.document),
        };
        if update.document == remote_doc.document {
            debug!(name = %definition.name, remote_id = remote_doc.remote_id, "Remote already up to date");
            transaction.unchanged.push(update.cache_entry());
        } else {
            debug!(name = %definition.name, remote_id = remote_doc.remote_id, "Will update");
            transaction.updates.push(update);
        }
    }

    if delete_orphaned {
        for entry in orphaned {
            // A remote id is deleted at most once, even when several orphans point at it.
            if by_id.contains_key(&entry.remote_id) && claimed.insert(entry.remote_id) {
                transaction.deletes.push(Deletion {
                    content_id: entry.content_id.clone(),
                    name: entry.last_known_name.clone(),
                    remote_id: entry.remote_id,
                });
            } else {
                transaction.stale.push(entry.clone());
            }
        }
    }

    info!(
        creates = transaction.creates.len(),
        updates = transaction.updates.len(),
        unchanged = transaction.unchanged.len(),
        deletes = transaction.deletes.len(),
        stale = transaction.stale.len(),
        "Built custom format transaction"
    );
    transaction
}

fn find_by_name<'a>(
    remote: &'a [RemoteDocument],
    name: &str,
    claimed: &HashSet<i64>,
) -> Option<&'a RemoteDocument> {
    remote.iter().find(|r| {
        !claimed.contains(&r.remote_id)
            && r.document
                .name()
                .is_some_and(|remote_name| remote_name.eq_ignore_ascii_case(name))
    })
}
