use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};

use crate::domain::{
    ACCOUNT_COLLECTION, Account, Balance, EntityId, OPENING_BALANCE, RelationRegistry,
};
use crate::storage::{DocumentStore, Filter};

use super::{
    AppError, BonusOutcome, CascadeEngine, SagaLog, TransferEngine, TransferPolicy,
};

/// Application service providing the account operations. This is the primary
/// interface for any client (CLI, API, ...).
pub struct AccountService {
    store: DocumentStore,
    transfers: TransferEngine,
    cascade: CascadeEngine,
}

impl AccountService {
    /// Create a new service over an already-connected store.
    pub fn new(store: DocumentStore, registry: RelationRegistry, policy: TransferPolicy) -> Self {
        let registry = Arc::new(registry);
        let sagas = SagaLog::new(store.clone());
        let transfers = TransferEngine::new(store.clone(), sagas.clone(), policy);
        let cascade = CascadeEngine::new(store.clone(), registry, sagas);
        Self {
            store,
            transfers,
            cascade,
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(
        database_path: &str,
        registry: RelationRegistry,
        policy: TransferPolicy,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let store = DocumentStore::init(&db_url).await?;
        Ok(Self::new(store, registry, policy))
    }

    /// Connect to an existing database.
    pub async fn connect(
        database_path: &str,
        registry: RelationRegistry,
        policy: TransferPolicy,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let store = DocumentStore::connect(&db_url).await?;
        Ok(Self::new(store, registry, policy))
    }

    /// Direct access to the underlying store, for callers that manage the
    /// related entity collections themselves.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    // ========================
    // Account CRUD
    // ========================

    /// Create a new account with the given opening balance and pass-through
    /// fields. Relation aliases are stored as plain fields.
    pub async fn create_account(
        &self,
        balance: Balance,
        fields: Map<String, Value>,
    ) -> Result<Account, AppError> {
        let mut account = Account::new(balance);
        account.fields = sanitize_fields(fields, true);

        let doc = serde_json::to_value(&account).context("Failed to encode account")?;
        self.store
            .insert(ACCOUNT_COLLECTION, account.id.as_str(), &doc)
            .await?;
        Ok(account)
    }

    /// Open an account for `owner` with the standard opening balance. The
    /// owner reference is required.
    pub async fn create_account_for_owner(
        &self,
        owner: Option<EntityId>,
        mut fields: Map<String, Value>,
    ) -> Result<Account, AppError> {
        let owner = owner.ok_or(AppError::MissingOwner)?;
        fields.insert("owner".to_string(), Value::String(owner.to_string()));
        self.create_account(OPENING_BALANCE, fields).await
    }

    /// Look up an account; `None` when the id matches nothing.
    pub async fn find_account(&self, id: &EntityId) -> Result<Option<Account>, AppError> {
        match self.store.get(ACCOUNT_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(
                serde_json::from_value(doc).context("Invalid account document")?,
            )),
            None => Ok(None),
        }
    }

    /// Look up an account that must exist.
    pub async fn get_account(&self, id: &EntityId) -> Result<Account, AppError> {
        self.find_account(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.clone()))
    }

    /// All accounts, ordered by creation time.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let docs = self.store.find(ACCOUNT_COLLECTION, &Filter::All).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value::<Account>(doc).context("Invalid account document"))
            .collect::<anyhow::Result<Vec<Account>>>()
            .map_err(AppError::from)
    }

    pub async fn count_accounts(&self) -> Result<i64, AppError> {
        Ok(self.store.count(ACCOUNT_COLLECTION, &Filter::All).await?)
    }

    /// Field-level update. The id and creation time are immutable.
    pub async fn update_account(
        &self,
        id: &EntityId,
        fields: Map<String, Value>,
    ) -> Result<Account, AppError> {
        self.get_account(id).await?;

        let updates: Vec<(String, Value)> = sanitize_fields(fields, false).into_iter().collect();
        if !updates.is_empty() {
            self.store
                .set_fields(ACCOUNT_COLLECTION, &Filter::Id(id.to_string()), &updates)
                .await?;
        }

        self.get_account(id).await
    }

    /// Delete an account and scrub every back-reference to it. `None` when
    /// the id matches nothing; no relation is touched in that case.
    pub async fn remove_account(&self, id: &EntityId) -> Result<Option<Account>, AppError> {
        self.cascade.remove_by_id(id).await
    }

    /// Delete the account matching an arbitrary filter (cascade included).
    pub async fn remove_account_matching(
        &self,
        filter: &Filter,
    ) -> Result<Option<Account>, AppError> {
        self.cascade.remove(filter).await
    }

    // ========================
    // Balance mutations
    // ========================

    /// Transfer `amount` from `source` to `dest`; returns the source account
    /// after the debit.
    pub async fn send(
        &self,
        source: &EntityId,
        dest: &EntityId,
        amount: Balance,
    ) -> Result<Account, AppError> {
        self.transfers.send(source, dest, amount).await
    }

    /// Credit every account with the standard bonus.
    pub async fn bonus(&self) -> Result<BonusOutcome, AppError> {
        self.transfers.bonus().await
    }

    /// Replay cascade cleanup for deletions that were interrupted before
    /// their back-references were fully scrubbed.
    pub async fn recover(&self) -> Result<usize, AppError> {
        self.cascade.resume_pending().await
    }
}

/// Drop fields the caller must not set directly. The balance is kept out of
/// the create path (it arrives as a parameter) but stays editable through the
/// generic update, which is outside the transfer contract.
fn sanitize_fields(mut fields: Map<String, Value>, strip_balance: bool) -> Map<String, Value> {
    fields.remove("id");
    fields.remove("created_at");
    if strip_balance {
        fields.remove("balance");
    }
    fields
}
