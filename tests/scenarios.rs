//! End-to-end scenarios against the file tier (spec.md §8 S1-S6, minus
//! the hybrid-dispatcher scenarios S4/S5 which need a live HOT/WARM
//! backend to exercise real failure injection).

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::tempdir;
use tiered_store::domain::store::{AccountStore, PositionStore, StrategyStore, TradeStore};
use tiered_store::domain::types::{AggregateGroupBy, OrderType, ParamValue, StrategyType};
use tiered_store::infrastructure::FileStore;

fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

/// S1: open -> age -> close.
#[tokio::test]
async fn open_age_close_cycle() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let account = "A1".to_string();
    let code = "SH600000".to_string();

    store
        .record_trade(
            &account,
            ts(2025, 1, 10, 9, 30, 0),
            &code,
            "浦发银行",
            OrderType::BuyTrade,
            "open",
            dec!(10.500),
            1000,
            None,
        )
        .await
        .unwrap();
    store.batch_new_held(&account, &[code.clone()]).await.unwrap();

    assert!(store.all_held_inc(&account).await.unwrap());
    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), Some(1));

    store.update_max_price(&code, &account, dec!(11.200)).await.unwrap();
    store.update_min_price(&code, &account, dec!(10.300)).await.unwrap();

    store
        .record_trade(
            &account,
            ts(2025, 1, 11, 14, 0, 0),
            &code,
            "浦发银行",
            OrderType::SellTrade,
            "close",
            dec!(11.300),
            1000,
            None,
        )
        .await
        .unwrap();
    store.delete_held_days(&code, &account).await.unwrap();

    let rows = store
        .query_trades(
            &account,
            Some(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()),
            Some(NaiveDate::from_ymd_opt(2025, 1, 11).unwrap()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].order_type, OrderType::SellTrade);
    assert_eq!(rows[1].order_type, OrderType::BuyTrade);

    assert_eq!(store.get_held_days(&code, &account).await.unwrap(), None);
    assert_eq!(store.get_max_price(&code, &account).await.unwrap(), Some(dec!(11.200)));
}

/// S2: idempotent daily tick under concurrency.
#[tokio::test]
async fn idempotent_daily_tick_under_concurrency() {
    let dir = tempdir().unwrap();
    let store = std::sync::Arc::new(FileStore::new(dir.path()));
    let account = "A2".to_string();

    store.update_held_days(&"C1".to_string(), &account, 2).await.unwrap();
    store.update_held_days(&"C2".to_string(), &account, 5).await.unwrap();
    store.update_held_days(&"C3".to_string(), &account, 10).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let account = account.clone();
        handles.push(tokio::spawn(async move { store.all_held_inc(&account).await.unwrap() }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results.iter().filter(|&&v| v).count(), 1);
    assert_eq!(results.iter().filter(|&&v| !v).count(), 9);

    assert_eq!(store.get_held_days(&"C1".to_string(), &account).await.unwrap(), Some(3));
    assert_eq!(store.get_held_days(&"C2".to_string(), &account).await.unwrap(), Some(6));
    assert_eq!(store.get_held_days(&"C3".to_string(), &account).await.unwrap(), Some(11));

    for _ in 0..10 {
        assert!(!store.all_held_inc(&account).await.unwrap());
    }
    assert_eq!(store.get_held_days(&"C1".to_string(), &account).await.unwrap(), Some(3));
}

/// S3: strategy parameter versioning.
#[tokio::test]
async fn strategy_parameter_versioning() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());

    store
        .create_strategy("问财选股 v1", "wencai_v1", StrategyType::Wencai, "1.0.0", None)
        .await
        .unwrap();

    let mut v1 = HashMap::new();
    v1.insert("slot_count".to_string(), ParamValue::Int(10));
    v1.insert("slot_capacity".to_string(), ParamValue::Int(10000));
    store.save_strategy_params("wencai_v1", &v1).await.unwrap();

    let mut v2 = HashMap::new();
    v2.insert("slot_count".to_string(), ParamValue::Int(12));
    v2.insert("slot_capacity".to_string(), ParamValue::Int(15000));
    store.save_strategy_params("wencai_v1", &v2).await.unwrap();

    let current = store.get_strategy_params("wencai_v1").await.unwrap().unwrap();
    assert_eq!(current.get("slot_count"), Some(&ParamValue::Int(12)));
    assert_eq!(current.get("slot_capacity"), Some(&ParamValue::Int(15000)));

    let mut proposed = v2.clone();
    proposed.insert("stop_loss".to_string(), ParamValue::Float(0.03));
    let diff = store.compare_strategy_params("wencai_v1", &proposed).await.unwrap();
    assert_eq!(diff.added.get("stop_loss"), Some(&ParamValue::Float(0.03)));
    assert!(diff.modified.is_empty());
    assert!(diff.deleted.is_empty());
}

/// S6: aggregation correctness.
#[tokio::test]
async fn aggregation_correctness() {
    let dir = tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let account = "A6".to_string();

    let mut total_amount = dec!(0);
    for i in 0..45u32 {
        let month = (i % 12) + 1;
        let day = (i % 27) + 1;
        let price = dec!(10) + rust_decimal::Decimal::from(i);
        let volume = 100u64 + i as u64;
        let record_ts = ts(2024, month, day, 9, 30, 0);
        store
            .record_trade(
                &account,
                record_ts,
                &"SH600000".to_string(),
                "示例",
                OrderType::BuyTrade,
                "",
                price,
                volume,
                None,
            )
            .await
            .unwrap();
        total_amount += (price * rust_decimal::Decimal::from(volume)).round_dp(2);
    }

    let rows = store
        .aggregate_trades(
            &account,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            AggregateGroupBy::Month,
        )
        .await
        .unwrap();

    assert!(rows.len() <= 12);
    let total_count: u64 = rows.iter().map(|r| r.count).sum();
    assert_eq!(total_count, 45);
    let summed_amount: rust_decimal::Decimal = rows.iter().map(|r| r.total_amount).sum();
    assert_eq!(summed_amount, total_amount);
    for pair in rows.windows(2) {
        assert!(pair[0].total_amount >= pair[1].total_amount);
    }
}
