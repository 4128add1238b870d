//! Boundary behavior from spec.md §8.

use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::tempdir;
use tiered_store::domain::store::{HealthCheck, PositionStore, StrategyStore};
use tiered_store::infrastructure::FileStore;

#[tokio::test]
async fn all_held_inc_on_empty_account_returns_false_and_leaves_marker_unset() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    assert!(!store.all_held_inc(&"EMPTY".to_string()).await.unwrap());
    assert!(!store.all_held_inc(&"EMPTY".to_string()).await.unwrap());
}

#[tokio::test]
async fn missing_data_files_read_as_absent_and_writes_create_them() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let code = "SH600000".to_string();
    let account = "A1".to_string();

    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), None);
    assert_eq!(store.get_max_price(&code, &account).await.unwrap(), None);

    store.update_held_days(&code, &account, 3).await.unwrap();
    assert!(dir.path().join("held_days.json").exists());
    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), Some(3));
}

#[tokio::test]
async fn unknown_strategy_params_absent_and_save_returns_false() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());

    assert_eq!(store.get_strategy_params("ghost").await.unwrap(), None);

    let mut params = HashMap::new();
    params.insert("x".to_string(), tiered_store::domain::types::ParamValue::Int(1));
    assert!(!store.save_strategy_params("ghost", &params).await.unwrap());
}

#[tokio::test]
async fn file_tier_health_check_passes_for_a_writable_directory() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    assert!(store.health_check().await);
    store.close().await.unwrap();
}

#[tokio::test]
async fn batch_new_held_overwrites_existing_entries_to_zero() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let account = "A1".to_string();
    let code = "SH600000".to_string();

    store.update_held_days(&code, &account, 7).await.unwrap();
    store.batch_new_held(&account, &[code.clone()]).await.unwrap();
    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), Some(0));

    store.batch_new_held(&account, &[code.clone()]).await.unwrap();
    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), Some(0));
}

#[tokio::test]
async fn price_values_round_to_three_decimal_places() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let account = "A1".to_string();
    let code = "SH600000".to_string();

    store.update_max_price(&code, &account, dec!(11.2001)).await.unwrap();
    assert_eq!(store.get_max_price(&code, &account).await.unwrap(), Some(dec!(11.200)));
}
