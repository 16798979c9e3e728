use std::sync::Arc;

use anyhow::{Context, anyhow};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domain::{
    ACCOUNT_COLLECTION, Account, BackReference, EntityId, RelationDescriptor, RelationRegistry,
};
use crate::storage::{DocumentStore, Filter};

use super::{AppError, SagaKind, SagaLog};

/// Orchestrates account deletion: the target is deleted first, then every
/// back-reference to it is scrubbed across the related entity types named by
/// the relation registry.
pub struct CascadeEngine {
    store: DocumentStore,
    registry: Arc<RelationRegistry>,
    sagas: SagaLog,
}

impl CascadeEngine {
    pub fn new(store: DocumentStore, registry: Arc<RelationRegistry>, sagas: SagaLog) -> Self {
        Self {
            store,
            registry,
            sagas,
        }
    }

    /// Delete the account matching `filter` and scrub every back-reference
    /// to it. Returns the account's prior state, or `None` when nothing
    /// matched (in which case no relation is touched).
    pub async fn remove(&self, filter: &Filter) -> Result<Option<Account>, AppError> {
        let doc = match self
            .store
            .find_one_and_delete(ACCOUNT_COLLECTION, filter)
            .await?
        {
            Some(doc) => doc,
            None => return Ok(None),
        };
        let account: Account = serde_json::from_value(doc).context("Invalid account document")?;

        let saga = self
            .sagas
            .begin(SagaKind::Cascade, json!({ "id": account.id }))
            .await?;
        self.scrub_references(&account.id).await?;
        self.sagas.complete(&saga).await?;

        info!(id = %account.id, "account removed, back-references scrubbed");
        Ok(Some(account))
    }

    pub async fn remove_by_id(&self, id: &EntityId) -> Result<Option<Account>, AppError> {
        self.remove(&Filter::Id(id.to_string())).await
    }

    /// Re-run cleanup for cascades that recorded intent but never completed.
    /// Returns the number of intents replayed.
    pub async fn resume_pending(&self) -> Result<usize, AppError> {
        let pending = self.sagas.pending(SagaKind::Cascade).await?;
        let count = pending.len();

        for record in pending {
            let target = record
                .payload
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("cascade saga {} has no target id", record.id))?;
            let id = EntityId::parse(target)?;

            self.scrub_references(&id).await?;
            self.sagas.complete(&record.id).await?;
            info!(id = %id, saga = %record.id, "resumed interrupted cascade");
        }

        Ok(count)
    }

    /// Scrub every registered back-reference to `id`. Cleanup updates run
    /// concurrently with no relative ordering; clearing a cleared field and
    /// pulling an absent key are no-ops, so re-running is safe.
    async fn scrub_references(&self, id: &EntityId) -> Result<(), AppError> {
        let mut tasks = Vec::new();
        for descriptor in self.registry.relations_of(ACCOUNT_COLLECTION) {
            let store = self.store.clone();
            let descriptor = descriptor.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                scrub_one(&store, &descriptor, &id).await
            }));
        }

        let mut failure: Option<anyhow::Error> = None;
        for task in tasks {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    warn!(id = %id, "relation cleanup failed: {err:#}");
                    failure.get_or_insert(err);
                }
                Err(err) => {
                    warn!(id = %id, "relation cleanup task failed: {err}");
                    failure.get_or_insert(anyhow!("relation cleanup task failed: {err}"));
                }
            }
        }

        match failure {
            // the saga record stays pending; `resume_pending` can replay it
            Some(err) => Err(AppError::Store(err)),
            None => Ok(()),
        }
    }
}

/// Apply one relation's cleanup: clear a single-valued back-reference, or
/// pull the key out of a multi-valued one.
async fn scrub_one(
    store: &DocumentStore,
    descriptor: &RelationDescriptor,
    id: &EntityId,
) -> anyhow::Result<u64> {
    let key = Value::String(id.to_string());
    let collection = descriptor.target_collection();

    match descriptor.nature.back_reference() {
        BackReference::Single => {
            let filter = Filter::Eq(descriptor.via.clone(), key);
            store.clear_field(&collection, &filter, &descriptor.via).await
        }
        BackReference::Many => {
            let filter = Filter::Contains(descriptor.via.clone(), key.clone());
            store.pull(&collection, &filter, &descriptor.via, &key).await
        }
    }
}
