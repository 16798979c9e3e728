mod common;

use anyhow::Result;
use common::{create_account, test_service};
use passbook::application::AppError;
use passbook::domain::{EntityId, OPENING_BALANCE};
use serde_json::{Map, json};

#[tokio::test]
async fn test_create_and_fetch_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let mut fields = Map::new();
    fields.insert("label".to_string(), json!("savings"));
    let account = service.create_account(250, fields).await?;

    let fetched = service.get_account(&account.id).await?;
    assert_eq!(fetched.id, account.id);
    assert_eq!(fetched.balance, 250);
    assert_eq!(fetched.field("label"), Some(&json!("savings")));

    Ok(())
}

#[tokio::test]
async fn test_create_strips_reserved_fields() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let mut fields = Map::new();
    fields.insert("id".to_string(), json!("ffffffffffffffffffffffff"));
    fields.insert("balance".to_string(), json!(9999));
    let account = service.create_account(10, fields).await?;

    assert_ne!(account.id.as_str(), "ffffffffffffffffffffffff");
    assert_eq!(account.balance, 10);
    assert_eq!(service.get_account(&account.id).await?.balance, 10);

    Ok(())
}

#[tokio::test]
async fn test_open_account_for_owner_forces_opening_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let owner = EntityId::generate();
    let account = service
        .create_account_for_owner(Some(owner.clone()), Map::new())
        .await?;

    assert_eq!(account.balance, OPENING_BALANCE);
    assert_eq!(account.field("owner"), Some(&json!(owner.to_string())));

    let err = service
        .create_account_for_owner(None, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingOwner));

    Ok(())
}

#[tokio::test]
async fn test_list_and_count_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;

    assert_eq!(service.count_accounts().await?, 0);
    assert!(service.list_accounts().await?.is_empty());

    let a = create_account(&service, 1).await?;
    let b = create_account(&service, 2).await?;
    let c = create_account(&service, 3).await?;

    let accounts = service.list_accounts().await?;
    assert_eq!(accounts.len(), 3);
    assert_eq!(service.count_accounts().await?, 3);

    let ids: Vec<_> = accounts.iter().map(|account| account.id.clone()).collect();
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&b.id));
    assert!(ids.contains(&c.id));

    Ok(())
}

#[tokio::test]
async fn test_update_account_fields() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = create_account(&service, 100).await?;

    let mut fields = Map::new();
    fields.insert("label".to_string(), json!("renamed"));
    fields.insert("balance".to_string(), json!(777));
    let updated = service.update_account(&account.id, fields).await?;

    // generic updates may edit the balance; that path is outside the
    // transfer contract but not rejected
    assert_eq!(updated.balance, 777);
    assert_eq!(updated.field("label"), Some(&json!("renamed")));

    Ok(())
}

#[tokio::test]
async fn test_update_keeps_id_and_creation_time_immutable() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = create_account(&service, 100).await?;

    let mut fields = Map::new();
    fields.insert("id".to_string(), json!("ffffffffffffffffffffffff"));
    fields.insert("created_at".to_string(), json!("1970-01-01T00:00:00Z"));
    let updated = service.update_account(&account.id, fields).await?;

    assert_eq!(updated.id, account.id);
    assert_eq!(updated.created_at, account.created_at);

    Ok(())
}

#[tokio::test]
async fn test_update_missing_account_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let ghost = EntityId::parse("0123456789abcdef01234567")?;
    let err = service.update_account(&ghost, Map::new()).await.unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_missing_account_is_an_explicit_outcome() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let ghost = EntityId::parse("0123456789abcdef01234567")?;

    assert!(service.find_account(&ghost).await?.is_none());

    let err = service.get_account(&ghost).await.unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    Ok(())
}
