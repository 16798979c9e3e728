use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{ACCOUNT_COLLECTION, Account, Balance, EntityId};
use crate::storage::{DocumentStore, Filter};

use super::{AppError, SagaKind, SagaLog};

/// Amount credited to every account by a bulk bonus run.
pub const BONUS_AMOUNT: Balance = 100;

/// Overdraft policy for transfers. The baseline behavior performs no
/// sufficiency check, so overdrafts are allowed unless configured otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    pub allow_negative_balance: bool,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            allow_negative_balance: true,
        }
    }
}

/// Outcome of a bulk bonus run.
#[derive(Debug, Clone, Copy)]
pub struct BonusOutcome {
    /// Post-bonus number of account documents. This is the reported result.
    pub accounts: i64,
    /// Number of documents the bulk update actually touched.
    pub mutated: u64,
}

/// Orchestrates balance mutations: point-to-point transfers and the bulk
/// bonus. Debit and credit are independent single-document atomic
/// increments; the saga log records intent so a failed credit leg can be
/// compensated instead of silently losing money.
pub struct TransferEngine {
    store: DocumentStore,
    sagas: SagaLog,
    policy: TransferPolicy,
}

impl TransferEngine {
    pub fn new(store: DocumentStore, sagas: SagaLog, policy: TransferPolicy) -> Self {
        Self {
            store,
            sagas,
            policy,
        }
    }

    /// Move `amount` from `source` to `dest` and return the source account's
    /// state after the debit. Debit is issued before credit.
    pub async fn send(
        &self,
        source: &EntityId,
        dest: &EntityId,
        amount: Balance,
    ) -> Result<Account, AppError> {
        if amount < 0 {
            return Err(AppError::InvalidAmount(format!(
                "transfer amount must be non-negative, got {amount}"
            )));
        }

        let source_account = self.fetch(source).await?;
        self.fetch(dest).await?;

        if !self.policy.allow_negative_balance && source_account.balance < amount {
            return Err(AppError::InsufficientFunds {
                account: source.clone(),
                balance: source_account.balance,
                required: amount,
            });
        }

        let saga = self
            .sagas
            .begin(
                SagaKind::Transfer,
                json!({ "source": source, "dest": dest, "amount": amount }),
            )
            .await?;

        let debited = self
            .store
            .increment(
                ACCOUNT_COLLECTION,
                &Filter::Id(source.to_string()),
                "balance",
                -amount,
            )
            .await?;
        if debited == 0 {
            // source vanished between the existence check and the debit
            self.sagas.compensated(&saga).await?;
            return Err(AppError::AccountNotFound(source.clone()));
        }

        let credit = self
            .store
            .increment(
                ACCOUNT_COLLECTION,
                &Filter::Id(dest.to_string()),
                "balance",
                amount,
            )
            .await;

        match credit {
            Ok(credited) if credited > 0 => {
                self.sagas.complete(&saga).await?;
            }
            outcome => {
                warn!(source = %source, dest = %dest, amount, "credit leg failed, refunding source");
                self.store
                    .increment(
                        ACCOUNT_COLLECTION,
                        &Filter::Id(source.to_string()),
                        "balance",
                        amount,
                    )
                    .await?;
                self.sagas.compensated(&saga).await?;
                return Err(match outcome {
                    Ok(_) => AppError::AccountNotFound(dest.clone()),
                    Err(err) => AppError::Store(err),
                });
            }
        }

        info!(source = %source, dest = %dest, amount, "transfer complete");
        self.fetch(source).await
    }

    /// Credit every account with the bonus amount in one bulk statement and
    /// report the post-bonus account count.
    pub async fn bonus(&self) -> Result<BonusOutcome, AppError> {
        let mutated = self
            .store
            .increment(ACCOUNT_COLLECTION, &Filter::All, "balance", BONUS_AMOUNT)
            .await?;
        let accounts = self.store.count(ACCOUNT_COLLECTION, &Filter::All).await?;

        info!(accounts, mutated, "bonus applied");
        Ok(BonusOutcome { accounts, mutated })
    }

    async fn fetch(&self, id: &EntityId) -> Result<Account, AppError> {
        let doc = self
            .store
            .get(ACCOUNT_COLLECTION, id.as_str())
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.clone()))?;
        Ok(serde_json::from_value(doc).context("Invalid account document")?)
    }
}
