use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::EntityId;
use crate::storage::{DocumentStore, Filter};

/// Collection the saga log lives under in the document store.
pub const SAGA_COLLECTION: &str = "saga";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaKind {
    Transfer,
    Cascade,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::Transfer => "transfer",
            SagaKind::Cascade => "cascade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaState {
    Pending,
    Done,
    Compensated,
}

impl SagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Pending => "pending",
            SagaState::Done => "done",
            SagaState::Compensated => "compensated",
        }
    }
}

/// One recorded intent: what a multi-document operation was about to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    pub id: EntityId,
    pub kind: SagaKind,
    pub payload: Value,
    pub state: SagaState,
}

/// Intent log backing operations that span more than one document.
///
/// The store offers no cross-document transaction, so intent is recorded
/// before the first mutation and the record is flipped to `done` (or
/// `compensated`) afterwards. A record still `pending` marks an operation
/// that was interrupted mid-flight and can be inspected or replayed.
#[derive(Clone)]
pub struct SagaLog {
    store: DocumentStore,
}

impl SagaLog {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Record a new pending intent and return its id.
    pub async fn begin(&self, kind: SagaKind, payload: Value) -> Result<EntityId> {
        let id = EntityId::generate();
        let record = SagaRecord {
            id: id.clone(),
            kind,
            payload,
            state: SagaState::Pending,
        };
        let doc = serde_json::to_value(&record).context("Failed to encode saga record")?;
        self.store.insert(SAGA_COLLECTION, id.as_str(), &doc).await?;
        Ok(id)
    }

    pub async fn complete(&self, id: &EntityId) -> Result<()> {
        self.mark(id, SagaState::Done).await
    }

    pub async fn compensated(&self, id: &EntityId) -> Result<()> {
        self.mark(id, SagaState::Compensated).await
    }

    async fn mark(&self, id: &EntityId, state: SagaState) -> Result<()> {
        self.store
            .set_fields(
                SAGA_COLLECTION,
                &Filter::Id(id.to_string()),
                &[("state".to_string(), Value::String(state.as_str().to_string()))],
            )
            .await?;
        Ok(())
    }

    /// All recorded intents of a kind that never reached a terminal state.
    pub async fn pending(&self, kind: SagaKind) -> Result<Vec<SagaRecord>> {
        let filter = Filter::And(vec![
            Filter::Eq("kind".to_string(), Value::String(kind.as_str().to_string())),
            Filter::Eq(
                "state".to_string(),
                Value::String(SagaState::Pending.as_str().to_string()),
            ),
        ]);

        let docs = self.store.find(SAGA_COLLECTION, &filter).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).context("Invalid saga record"))
            .collect()
    }
}
