//! WARM Tier (spec.md §4.4, C4): accounts, strategies, and versioned
//! strategy parameters on SQLite (WAL mode), following `Database::new`'s
//! bootstrap pattern.
//!
//! `strategy_params` carries a composite-unique (strategy_id, param_key,
//! version) and the invariant that at most one row per (strategy_id,
//! param_key) has `is_active = 1`. `save_strategy_params` performs the
//! version rollover — deactivate all active rows, insert the new set at
//! `max(version) + 1` — inside a single transaction.

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::store::{AccountStore, CandleStore, HealthCheck, PositionStore, StrategyStore, TradeStore};
use crate::domain::types::{
    Account, AccountId, AccountStatus, AggregateGroupBy, Broker, Candle, InstrumentCode, OrderType, ParamDiff,
    ParamMap, ParamValue, Strategy, StrategyStatus, StrategyType, TradeAggregate, TradeRecord,
};
use crate::infrastructure::file_store::diff_params;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

const BACKEND: &str = "warm";

#[derive(Clone)]
pub struct WarmStore {
    pool: SqlitePool,
}

impl WarmStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        if let Some(path_part) = database_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::unavailable(BACKEND, e))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::unavailable(BACKEND, e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        info!(backend = BACKEND, %database_url, "connected");

        let store = Self { pool };
        store.init().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(store)
    }

    async fn init(&self) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL UNIQUE,
                account_name TEXT NOT NULL,
                broker TEXT NOT NULL,
                initial_capital TEXT NOT NULL,
                current_capital TEXT NOT NULL,
                total_assets TEXT,
                position_value TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create accounts table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_name TEXT NOT NULL,
                strategy_code TEXT NOT NULL UNIQUE,
                strategy_type TEXT NOT NULL,
                version TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create strategies table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_params (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id INTEGER NOT NULL REFERENCES strategies(id),
                param_key TEXT NOT NULL,
                param_value TEXT NOT NULL,
                param_type TEXT NOT NULL,
                version INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                remark TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (strategy_id, param_key, version)
            );
            CREATE INDEX IF NOT EXISTS idx_strategy_params_active
            ON strategy_params (strategy_id, param_key, is_active);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create strategy_params table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                strategy_id INTEGER NOT NULL REFERENCES strategies(id),
                allocated_capital TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                UNIQUE (account_id, strategy_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create account_strategies table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                permission_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id INTEGER NOT NULL REFERENCES users(id),
                role_id INTEGER NOT NULL REFERENCES roles(id),
                PRIMARY KEY (user_id, role_id)
            );
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id INTEGER NOT NULL REFERENCES roles(id),
                permission_id INTEGER NOT NULL REFERENCES permissions(id),
                PRIMARY KEY (role_id, permission_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create users/roles/permissions tables")?;

        info!(backend = BACKEND, "schema initialized");
        Ok(())
    }
}

fn broker_to_str(b: Broker) -> &'static str {
    match b {
        Broker::Qmt => "QMT",
        Broker::Gm => "GM",
        Broker::Tdx => "TDX",
    }
}

fn status_to_str(s: AccountStatus) -> &'static str {
    match s {
        AccountStatus::Active => "active",
        AccountStatus::Inactive => "inactive",
        AccountStatus::Suspended => "suspended",
    }
}

fn strategy_type_to_str(t: StrategyType) -> &'static str {
    match t {
        StrategyType::Wencai => "wencai",
        StrategyType::Remote => "remote",
        StrategyType::Technical => "technical",
    }
}

#[async_trait]
impl AccountStore for WarmStore {
    async fn create_account(
        &self,
        account_id: &AccountId,
        account_name: &str,
        broker: Broker,
        initial_capital: Decimal,
    ) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts
                (account_id, account_name, broker, initial_capital, current_capital, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4, 'active', ?5, ?5)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(account_name)
        .bind(broker_to_str(broker))
        .bind(initial_capital.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, account_id, account_name, broker, initial_capital, current_capital,
                   total_assets, position_value, status, created_at, updated_at
            FROM accounts WHERE account_id = ?1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        row.map(Account::try_from).transpose()
    }

    async fn update_account_capital(
        &self,
        account_id: &AccountId,
        current_capital: Decimal,
        total_assets: Decimal,
        position_value: Decimal,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET current_capital = ?1, total_assets = ?2, position_value = ?3, updated_at = ?4
            WHERE account_id = ?5
            "#,
        )
        .bind(current_capital.to_string())
        .bind(total_assets.to_string())
        .bind(position_value.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    account_id: String,
    account_name: String,
    broker: String,
    initial_capital: String,
    current_capital: String,
    total_assets: Option<String>,
    position_value: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            account_id: row.account_id,
            account_name: row.account_name,
            broker: row
                .broker
                .parse()
                .map_err(|_| StoreError::DataInconsistency(format!("unknown broker in row: {}", row.broker)))?,
            initial_capital: row
                .initial_capital
                .parse()
                .map_err(|_| StoreError::DataInconsistency("unparsable initial_capital".into()))?,
            current_capital: row
                .current_capital
                .parse()
                .map_err(|_| StoreError::DataInconsistency("unparsable current_capital".into()))?,
            total_assets: row.total_assets.and_then(|v| v.parse().ok()),
            position_value: row.position_value.and_then(|v| v.parse().ok()),
            status: match row.status.as_str() {
                "inactive" => AccountStatus::Inactive,
                "suspended" => AccountStatus::Suspended,
                _ => AccountStatus::Active,
            },
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map_err(|_| StoreError::DataInconsistency("unparsable created_at".into()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .map_err(|_| StoreError::DataInconsistency("unparsable updated_at".into()))?
                .with_timezone(&Utc),
        })
    }
}

#[derive(sqlx::FromRow)]
struct StrategyRow {
    id: i64,
    strategy_name: String,
    strategy_code: String,
    strategy_type: String,
    version: String,
    status: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StrategyRow> for Strategy {
    type Error = StoreError;

    fn try_from(row: StrategyRow) -> Result<Self, Self::Error> {
        Ok(Strategy {
            id: row.id,
            strategy_name: row.strategy_name,
            strategy_code: row.strategy_code,
            strategy_type: row
                .strategy_type
                .parse()
                .map_err(|_| StoreError::DataInconsistency("unknown strategy_type in row".into()))?,
            version: row.version,
            status: match row.status.as_str() {
                "testing" => StrategyStatus::Testing,
                "inactive" => StrategyStatus::Inactive,
                _ => StrategyStatus::Active,
            },
            description: row.description,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map_err(|_| StoreError::DataInconsistency("unparsable created_at".into()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .map_err(|_| StoreError::DataInconsistency("unparsable updated_at".into()))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl StrategyStore for WarmStore {
    async fn create_strategy(
        &self,
        strategy_name: &str,
        strategy_code: &str,
        strategy_type: StrategyType,
        version: &str,
        description: Option<&str>,
    ) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO strategies
                (strategy_name, strategy_code, strategy_type, version, status, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?6)
            ON CONFLICT (strategy_code) DO NOTHING
            "#,
        )
        .bind(strategy_name)
        .bind(strategy_code)
        .bind(strategy_type_to_str(strategy_type))
        .bind(version)
        .bind(description)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_strategy(&self, strategy_code: &str) -> StoreResult<Option<Strategy>> {
        let row = sqlx::query_as::<_, StrategyRow>(
            r#"
            SELECT id, strategy_name, strategy_code, strategy_type, version, status, description,
                   created_at, updated_at
            FROM strategies WHERE strategy_code = ?1
            "#,
        )
        .bind(strategy_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        row.map(Strategy::try_from).transpose()
    }

    async fn get_strategy_params(&self, strategy_code: &str) -> StoreResult<Option<ParamMap>> {
        let strategy_id: Option<i64> = sqlx::query_scalar("SELECT id FROM strategies WHERE strategy_code = ?1")
            .bind(strategy_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let Some(strategy_id) = strategy_id else {
            return Ok(None);
        };

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT param_key, param_value, param_type
            FROM strategy_params
            WHERE strategy_id = ?1 AND is_active = 1
            "#,
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        Ok(Some(
            rows.into_iter()
                .map(|(key, value, type_tag)| (key, ParamValue::deserialize_from_storage(&type_tag, &value)))
                .collect(),
        ))
    }

    async fn save_strategy_params(&self, strategy_code: &str, params: &ParamMap) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let strategy_id: Option<i64> = sqlx::query_scalar("SELECT id FROM strategies WHERE strategy_code = ?1")
            .bind(strategy_code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let Some(strategy_id) = strategy_id else {
            return Ok(false);
        };

        let max_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM strategy_params WHERE strategy_id = ?1")
                .bind(strategy_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        let new_version = max_version.unwrap_or(0) + 1;

        sqlx::query("UPDATE strategy_params SET is_active = 0 WHERE strategy_id = ?1 AND is_active = 1")
            .bind(strategy_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let now = Utc::now().to_rfc3339();
        for (key, value) in params {
            sqlx::query(
                r#"
                INSERT INTO strategy_params
                    (strategy_id, param_key, param_value, param_type, version, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                "#,
            )
            .bind(strategy_id)
            .bind(key)
            .bind(value.serialize_for_storage())
            .bind(value.type_tag())
            .bind(new_version)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        }

        sqlx::query("UPDATE strategies SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(strategy_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        tx.commit().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(true)
    }

    async fn compare_strategy_params(&self, strategy_code: &str, new_params: &ParamMap) -> StoreResult<ParamDiff> {
        let old_params = self.get_strategy_params(strategy_code).await?.unwrap_or_default();
        Ok(diff_params(&old_params, new_params))
    }
}

#[async_trait]
impl PositionStore for WarmStore {
    async fn get_held_days(&self, _code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<u32>> {
        Err(StoreError::unsupported(BACKEND, "get_held_days"))
    }
    async fn update_held_days(&self, _code: &InstrumentCode, _account: &AccountId, _days: u32) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "update_held_days"))
    }
    async fn delete_held_days(&self, _code: &InstrumentCode, _account: &AccountId) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "delete_held_days"))
    }
    async fn batch_new_held(&self, _account: &AccountId, _codes: &[InstrumentCode]) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "batch_new_held"))
    }
    async fn all_held_inc(&self, _account: &AccountId) -> StoreResult<bool> {
        Err(StoreError::unsupported(BACKEND, "all_held_inc"))
    }
    async fn get_max_price(&self, _code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<Decimal>> {
        Err(StoreError::unsupported(BACKEND, "get_max_price"))
    }
    async fn update_max_price(&self, _code: &InstrumentCode, _account: &AccountId, _price: Decimal) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "update_max_price"))
    }
    async fn get_min_price(&self, _code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<Decimal>> {
        Err(StoreError::unsupported(BACKEND, "get_min_price"))
    }
    async fn update_min_price(&self, _code: &InstrumentCode, _account: &AccountId, _price: Decimal) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "update_min_price"))
    }
}

#[async_trait]
impl TradeStore for WarmStore {
    async fn record_trade(
        &self,
        _account: &AccountId,
        _timestamp: DateTime<Utc>,
        _code: &InstrumentCode,
        _name: &str,
        _order_type: OrderType,
        _remark: &str,
        _price: Decimal,
        _volume: u64,
        _strategy_name: Option<&str>,
    ) -> StoreResult<()> {
        Err(StoreError::unsupported(BACKEND, "record_trade"))
    }
    async fn query_trades(
        &self,
        _account: &AccountId,
        _start_date: Option<NaiveDate>,
        _end_date: Option<NaiveDate>,
        _code: Option<&InstrumentCode>,
    ) -> StoreResult<Vec<TradeRecord>> {
        Err(StoreError::unsupported(BACKEND, "query_trades"))
    }
    async fn aggregate_trades(
        &self,
        _account: &AccountId,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
        _group_by: AggregateGroupBy,
    ) -> StoreResult<Vec<TradeAggregate>> {
        Err(StoreError::unsupported(BACKEND, "aggregate_trades"))
    }
}

#[async_trait]
impl CandleStore for WarmStore {
    async fn get_kline(&self, _code: &InstrumentCode, _start: NaiveDate, _end: NaiveDate) -> StoreResult<Vec<Candle>> {
        Err(StoreError::unsupported(BACKEND, "get_kline"))
    }
    async fn batch_get_kline(
        &self,
        _codes: &[InstrumentCode],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> StoreResult<HashMap<InstrumentCode, Vec<Candle>>> {
        Err(StoreError::unsupported(BACKEND, "batch_get_kline"))
    }
}

#[async_trait]
impl HealthCheck for WarmStore {
    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn store() -> WarmStore {
        WarmStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn create_account_rejects_duplicate_account_id() {
        let store = store().await;
        let id = "A1".to_string();
        assert!(store.create_account(&id, "prod", Broker::Qmt, dec!(100000)).await.unwrap());
        assert!(!store.create_account(&id, "prod", Broker::Qmt, dec!(100000)).await.unwrap());
    }

    #[tokio::test]
    async fn get_account_round_trips_fields() {
        let store = store().await;
        let id = "A1".to_string();
        store.create_account(&id, "prod", Broker::Gm, dec!(50000)).await.unwrap();
        let account = store.get_account(&id).await.unwrap().unwrap();
        assert_eq!(account.account_name, "prod");
        assert_eq!(account.broker, Broker::Gm);
        assert_eq!(account.initial_capital, dec!(50000));
    }

    #[tokio::test]
    async fn strategy_param_versions_roll_over_and_deactivate_prior() {
        let store = store().await;
        store
            .create_strategy("问财选股V1", "wencai_v1", StrategyType::Wencai, "1.0.0", None)
            .await
            .unwrap();

        let mut v1 = ParamMap::new();
        v1.insert("slot_count".to_string(), ParamValue::Int(10));
        store.save_strategy_params("wencai_v1", &v1).await.unwrap();

        let mut v2 = ParamMap::new();
        v2.insert("slot_count".to_string(), ParamValue::Int(12));
        store.save_strategy_params("wencai_v1", &v2).await.unwrap();

        let active = store.get_strategy_params("wencai_v1").await.unwrap().unwrap();
        assert_eq!(active.get("slot_count"), Some(&ParamValue::Int(12)));

        let active_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM strategy_params WHERE param_key = 'slot_count' AND is_active = 1",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(active_rows, 1);
    }

    #[tokio::test]
    async fn save_strategy_params_on_unknown_strategy_returns_false() {
        let store = store().await;
        let mut params = ParamMap::new();
        params.insert("x".to_string(), ParamValue::Int(1));
        assert!(!store.save_strategy_params("ghost", &params).await.unwrap());
    }
}
