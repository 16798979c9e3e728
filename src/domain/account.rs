use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Balances are plain integer units. Fractional amounts are not represented.
pub type Balance = i64;

/// Collection accounts live under in the document store.
pub const ACCOUNT_COLLECTION: &str = "account";

/// Balance assigned when an account is opened for an owner.
pub const OPENING_BALANCE: Balance = 100;

/// A 24-character hexadecimal entity key.
///
/// Construction goes through `parse` (validating) or `generate`; keys are
/// normalized to lowercase so equality is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(24);
        Self(hex)
    }

    /// Parse a key, rejecting anything that is not exactly 24 hex characters.
    pub fn parse(input: &str) -> Result<Self, InvalidEntityId> {
        if input.len() == 24 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(input.to_ascii_lowercase()))
        } else {
            Err(InvalidEntityId(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEntityId(pub String);

impl fmt::Display for InvalidEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid entity id '{}' (expected 24 hex characters)",
            self.0
        )
    }
}

impl std::error::Error for InvalidEntityId {}

/// The balance-bearing entity at the center of the service.
///
/// Besides the fixed columns, an account carries arbitrary pass-through
/// fields (relation aliases included) in a flattened map, so the document
/// round-trips without the service knowing every field upfront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Account {
    pub fn new(balance: Balance) -> Self {
        Self {
            id: EntityId::generate(),
            balance,
            created_at: Utc::now(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
