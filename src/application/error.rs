use thiserror::Error;

use crate::domain::{Balance, EntityId, InvalidEntityId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(EntityId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    InvalidId(#[from] InvalidEntityId),

    #[error("An owner reference is required to open an account")]
    MissingOwner,

    #[error("Insufficient funds in account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: EntityId,
        balance: Balance,
        required: Balance,
    },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}
