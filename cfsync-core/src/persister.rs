//! Applies a [`Transaction`] to a remote [`CustomFormatService`].
//!
//! Stages run in a fixed order: every create, then every update, then every
//! delete. Inside a stage up to [`ApplyOptions::concurrency`] requests are in
//! flight; results keep the transaction's order.
//!
//! Each item stands alone. A failure is recorded in
//! [`AppliedResult::failures`] and the batch carries on. Once the
//! [`Cancellation`] is triggered no further item is started; in-flight
//! requests finish and the rest are counted as skipped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::CacheEntry;
use crate::contract::{CustomFormatService, ServiceError};
use crate::error::{ItemFailure, Operation};
use crate::transaction::Transaction;

/// Default number of concurrent requests per stage.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Cooperative cancellation flag shared between the caller and the persister.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub concurrency: usize,
    pub cancellation: Cancellation,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cancellation: Cancellation::new(),
        }
    }
}

/// A remote custom format scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deletion {
    pub content_id: String,
    pub name: String,
    pub remote_id: i64,
}

/// What actually happened when a transaction was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedResult {
    /// Cache entries for newly created custom formats, carrying their new ids.
    pub created: Vec<CacheEntry>,
    pub updated: Vec<CacheEntry>,
    pub deleted: Vec<Deletion>,
    pub failures: Vec<ItemFailure>,
    /// Items never started because the run was cancelled.
    pub skipped: usize,
}

enum Outcome<T> {
    Done(T),
    Failed(ItemFailure),
    Skipped,
}

pub async fn apply<S>(
    transaction: &Transaction,
    service: &S,
    options: &ApplyOptions,
) -> AppliedResult
where
    S: CustomFormatService + ?Sized,
{
    let mut result = AppliedResult::default();

    let creates = run_stage(&transaction.creates, options, |definition| async move {
        match service.create(&definition.document).await {
            Ok(remote_id) => {
                info!(name = %definition.name, remote_id, "Created custom format");
                Ok(CacheEntry {
                    content_id: definition.content_id.clone(),
                    remote_id,
                    last_known_name: definition.name.clone(),
                })
            }
            Err(e) => Err(failure(Operation::Create, &definition.name, None, e)),
        }
    })
    .await;
    collect(creates, &mut result.created, &mut result.failures, &mut result.skipped);

    let updates = run_stage(&transaction.updates, options, |update| async move {
        match service.update(update.remote_id, &update.document).await {
            Ok(()) => {
                info!(name = %update.name, remote_id = update.remote_id, "Updated custom format");
                Ok(update.cache_entry())
            }
            Err(e) => Err(failure(
                Operation::Update,
                &update.name,
                Some(update.remote_id),
                e,
            )),
        }
    })
    .await;
    collect(updates, &mut result.updated, &mut result.failures, &mut result.skipped);

    let deletes = run_stage(&transaction.deletes, options, |deletion| async move {
        match service.delete(deletion.remote_id).await {
            Ok(()) => {
                info!(name = %deletion.name, remote_id = deletion.remote_id, "Deleted custom format");
                Ok(deletion.clone())
            }
            Err(e) => Err(failure(
                Operation::Delete,
                &deletion.name,
                Some(deletion.remote_id),
                e,
            )),
        }
    })
    .await;
    collect(deletes, &mut result.deleted, &mut result.failures, &mut result.skipped);

    if result.skipped > 0 {
        warn!(skipped = result.skipped, "Cancelled before all custom formats were applied");
    }
    info!(
        created = result.created.len(),
        updated = result.updated.len(),
        deleted = result.deleted.len(),
        failed = result.failures.len(),
        skipped = result.skipped,
        "Applied custom format transaction"
    );
    result
}

async fn run_stage<'a, T, R, F, Fut>(
    items: &'a [T],
    options: &ApplyOptions,
    op: F,
) -> Vec<Outcome<R>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<R, ItemFailure>>,
{
    let cancellation = &options.cancellation;
    stream::iter(items)
        .map(|item| {
            let request = op(item);
            async move {
                // Futures are inert until polled, so this runs when the item starts.
                if cancellation.is_cancelled() {
                    return Outcome::Skipped;
                }
                match request.await {
                    Ok(value) => Outcome::Done(value),
                    Err(failure) => Outcome::Failed(failure),
                }
            }
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await
}

fn collect<T>(
    outcomes: Vec<Outcome<T>>,
    done: &mut Vec<T>,
    failures: &mut Vec<ItemFailure>,
    skipped: &mut usize,
) {
    for outcome in outcomes {
        match outcome {
            Outcome::Done(value) => done.push(value),
            Outcome::Failed(failure) => failures.push(failure),
            Outcome::Skipped => *skipped += 1,
        }
    }
}

fn failure(operation: Operation, name: &str, remote_id: Option<i64>, e: ServiceError) -> ItemFailure {
    error!(%operation, name, remote_id = ?remote_id, error = %e, "Custom format request failed");
    ItemFailure {
        operation,
        name: name.to_string(),
        remote_id,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockCustomFormatService, ProcessedDefinition};
    use crate::document::Document;
    use crate::transaction::Update;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn definition(content_id: &str, name: &str) -> ProcessedDefinition {
        let mut document = Document::new();
        document.insert("name", name.into());
        ProcessedDefinition {
            content_id: content_id.to_string(),
            name: name.to_string(),
            document,
            cached_remote_id: None,
        }
    }

    fn transaction() -> Transaction {
        let updated = definition("b", "B");
        Transaction {
            creates: vec![definition("a", "A")],
            updates: vec![Update {
                content_id: updated.content_id,
                name: updated.name,
                remote_id: 2,
                document: updated.document,
            }],
            deletes: vec![Deletion {
                content_id: "c".to_string(),
                name: "C".to_string(),
                remote_id: 3,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stages_run_creates_then_updates_then_deletes() {
        let mut seq = Sequence::new();
        let mut service = MockCustomFormatService::new();
        service
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(10));
        service
            .expect_update()
            .with(eq(2), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        service
            .expect_delete()
            .with(eq(3))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let result = apply(&transaction(), &service, &ApplyOptions::default()).await;

        assert_eq!(result.created[0].remote_id, 10);
        assert_eq!(result.updated[0].content_id, "b");
        assert_eq!(result.deleted[0].remote_id, 3);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_update_is_recorded_and_delete_still_runs() {
        let mut service = MockCustomFormatService::new();
        service.expect_create().returning(|_| Ok(10));
        service
            .expect_update()
            .returning(|_, _| Err("409 Conflict".into()));
        service.expect_delete().times(1).returning(|_| Ok(()));

        let result = apply(&transaction(), &service, &ApplyOptions::default()).await;

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].operation, Operation::Update);
        assert_eq!(result.failures[0].remote_id, Some(2));
        assert!(result.failures[0].message.contains("409"));
        assert_eq!(result.deleted.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_everything() {
        let service = MockCustomFormatService::new();
        let options = ApplyOptions::default();
        options.cancellation.cancel();

        let result = apply(&transaction(), &service, &options).await;

        assert_eq!(result.skipped, 3);
        assert!(result.created.is_empty() && result.updated.is_empty() && result.deleted.is_empty());
    }
}
