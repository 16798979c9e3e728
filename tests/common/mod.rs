// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use passbook::application::{AccountService, TransferPolicy};
use passbook::domain::{
    ACCOUNT_COLLECTION, Account, RelationDescriptor, RelationNature, RelationRegistry,
};
use serde_json::Map;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(AccountService, TempDir)> {
    test_service_with(RelationRegistry::new(), TransferPolicy::default()).await
}

/// Helper to create a test service with a custom registry and policy
pub async fn test_service_with(
    registry: RelationRegistry,
    policy: TransferPolicy,
) -> Result<(AccountService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = AccountService::init(db_path.to_str().unwrap(), registry, policy).await?;
    Ok((service, temp_dir))
}

/// Registry mirroring a deployment where widgets point at accounts through a
/// single-valued `owner` field and teams through a multi-valued `members`
/// field.
pub fn widget_team_registry() -> RelationRegistry {
    let mut registry = RelationRegistry::new();
    registry.register(
        ACCOUNT_COLLECTION,
        RelationDescriptor::new("widgets", RelationNature::OneToMany, "owner", "widget"),
    );
    registry.register(
        ACCOUNT_COLLECTION,
        RelationDescriptor::new("teams", RelationNature::ManyToMany, "members", "team"),
    );
    registry
}

/// Create an account with the given balance and no extra fields
pub async fn create_account(service: &AccountService, balance: i64) -> Result<Account> {
    Ok(service.create_account(balance, Map::new()).await?)
}
