//! COOL Tier (spec.md §4.5, C5): append-only trade ledger and daily
//! candle data on ClickHouse, month-partitioned.
//!
//! Table shapes are grounded in the migration-DDL pattern used by the
//! observability pack's ClickHouse client (`Client::default().with_url(..)`,
//! idempotent `CREATE TABLE IF NOT EXISTS` run on connect) — generalized
//! here to `trades`/`candles` with `PARTITION BY toYYYYMM(date)`.

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::store::{AccountStore, CandleStore, HealthCheck, PositionStore, StrategyStore, TradeStore};
use crate::domain::types::{
    Account, AccountId, AggregateGroupBy, Broker, Candle, InstrumentCode, OrderType, ParamDiff, ParamMap, Strategy,
    StrategyType, TradeAggregate, TradeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clickhouse::{Client, Row};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

const BACKEND: &str = "cool";

const MIGRATIONS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS trades
(
    account_id      LowCardinality(String),
    timestamp       DateTime64(3, 'UTC'),
    date            Date,
    code            LowCardinality(String),
    name            String,
    order_type      LowCardinality(String),
    remark          String,
    price           Decimal(18, 3),
    volume          UInt64,
    amount          Decimal(18, 2),
    strategy_name   String
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(date)
ORDER BY (account_id, code, timestamp)",
    r"CREATE TABLE IF NOT EXISTS candles
(
    code    LowCardinality(String),
    date    Date,
    open    Decimal(18, 3),
    high    Decimal(18, 3),
    low     Decimal(18, 3),
    close   Decimal(18, 3),
    volume  UInt64,
    amount  Decimal(18, 2)
)
ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(date)
ORDER BY (code, date)",
];

pub struct CoolStore {
    client: Client,
}

impl CoolStore {
    pub async fn connect(url: &str, database: &str, user: &str, password: &str) -> StoreResult<Self> {
        let bootstrap = Client::default().with_url(url).with_user(user).with_password(password);
        bootstrap
            .query(&format!("CREATE DATABASE IF NOT EXISTS {database}"))
            .execute()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let client = bootstrap.with_database(database);
        for sql in MIGRATIONS {
            client.query(sql).execute().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        }
        info!(backend = BACKEND, database, "schema initialized");

        Ok(Self { client })
    }

    /// Bulk-inserts already-parsed trade rows in one ClickHouse insert
    /// session, used by the migration toolkit (C7) instead of one
    /// `record_trade` call per row. Returns the number of rows written.
    pub async fn insert_trades_batch(&self, rows: &[TradeRecord]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut insert = self
            .client
            .insert::<TradeRow>("trades")
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        for record in rows {
            let row = TradeRow {
                account_id: record.account_id.clone(),
                timestamp: record.timestamp.timestamp_millis(),
                date: epoch_days(record.date),
                code: record.code.clone(),
                name: record.name.clone(),
                order_type: record.order_type.as_str().to_string(),
                remark: record.remark.clone(),
                price: decimal_to_fixed(record.price, 3)?,
                volume: record.volume,
                amount: decimal_to_fixed(record.amount, 2)?,
                strategy_name: record.strategy_name.clone().unwrap_or_default(),
            };
            insert.write(&row).await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        }
        insert.end().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(rows.len())
    }

    /// Bulk-inserts candle rows, used by `migrate_klines`.
    pub async fn insert_candles_batch(&self, candles: &[Candle]) -> StoreResult<usize> {
        if candles.is_empty() {
            return Ok(0);
        }
        let mut insert = self
            .client
            .insert::<CandleRow>("candles")
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        for candle in candles {
            if !candle.is_valid() {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid candle for {} on {}",
                    candle.code, candle.date
                )));
            }
            let row = CandleRow {
                code: candle.code.clone(),
                date: epoch_days(candle.date),
                open: decimal_to_fixed(candle.open, 3)?,
                high: decimal_to_fixed(candle.high, 3)?,
                low: decimal_to_fixed(candle.low, 3)?,
                close: decimal_to_fixed(candle.close, 3)?,
                volume: candle.volume,
                amount: decimal_to_fixed(candle.amount, 2)?,
            };
            insert.write(&row).await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        }
        insert.end().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(candles.len())
    }

    /// Row count for `account_id`, used by the consistency verifier to
    /// compare against the file-tier CSV line count.
    pub async fn count_trades(&self, account_id: &AccountId) -> StoreResult<u64> {
        self.client
            .query("SELECT count() FROM trades WHERE account_id = ?")
            .bind(account_id)
            .fetch_one::<u64>()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))
    }
}

#[derive(Row, Serialize, Deserialize)]
struct TradeRow {
    account_id: String,
    timestamp: i64,
    date: i32,
    code: String,
    name: String,
    order_type: String,
    remark: String,
    price: i64,
    volume: u64,
    amount: i64,
    strategy_name: String,
}

fn epoch_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32
}

fn date_from_epoch_days(days: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days as i64)
}

fn decimal_to_fixed(value: Decimal, scale: u32) -> StoreResult<i64> {
    (value.round_dp(scale) * Decimal::from(10i64.pow(scale)))
        .to_i64()
        .ok_or_else(|| StoreError::InvalidArgument("decimal out of range for ClickHouse column".into()))
}

fn fixed_to_decimal(raw: i64, scale: u32) -> Decimal {
    Decimal::from_i64(raw).unwrap_or_default() / Decimal::from(10i64.pow(scale))
}

#[async_trait]
impl TradeStore for CoolStore {
    async fn record_trade(
        &self,
        account: &AccountId,
        timestamp: DateTime<Utc>,
        code: &InstrumentCode,
        name: &str,
        order_type: OrderType,
        remark: &str,
        price: Decimal,
        volume: u64,
        strategy_name: Option<&str>,
    ) -> StoreResult<()> {
        let amount = (price * Decimal::from(volume)).round_dp(2);
        let row = TradeRow {
            account_id: account.clone(),
            timestamp: timestamp.timestamp_millis(),
            date: epoch_days(timestamp.date_naive()),
            code: code.clone(),
            name: name.to_string(),
            order_type: order_type.as_str().to_string(),
            remark: remark.to_string(),
            price: decimal_to_fixed(price, 3)?,
            volume,
            amount: decimal_to_fixed(amount, 2)?,
            strategy_name: strategy_name.unwrap_or_default().to_string(),
        };

        let mut insert = self
            .client
            .insert::<TradeRow>("trades")
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        insert.write(&row).await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        insert.end().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    async fn query_trades(
        &self,
        account: &AccountId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        code: Option<&InstrumentCode>,
    ) -> StoreResult<Vec<TradeRecord>> {
        let mut clauses = vec!["account_id = ?".to_string()];
        if start_date.is_some() {
            clauses.push("date >= ?".to_string());
        }
        if end_date.is_some() {
            clauses.push("date <= ?".to_string());
        }
        if code.is_some() {
            clauses.push("code = ?".to_string());
        }
        let full_sql = format!(
            "SELECT account_id, timestamp, date, code, name, order_type, remark, price, volume, amount, strategy_name \
             FROM trades WHERE {} ORDER BY timestamp DESC",
            clauses.join(" AND ")
        );
        let mut query = self.client.query(&full_sql).bind(account);
        if let Some(start) = start_date {
            query = query.bind(epoch_days(start));
        }
        if let Some(end) = end_date {
            query = query.bind(epoch_days(end));
        }
        if let Some(c) = code {
            query = query.bind(c);
        }

        let rows: Vec<TradeRow> = query.fetch_all().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        rows.into_iter()
            .map(|row| {
                let order_type = row
                    .order_type
                    .parse()
                    .map_err(|_| StoreError::DataInconsistency(format!("unknown order_type: {}", row.order_type)))?;
                Ok(TradeRecord {
                    account_id: row.account_id,
                    timestamp: DateTime::from_timestamp_millis(row.timestamp).unwrap_or_else(Utc::now),
                    date: date_from_epoch_days(row.date),
                    code: row.code,
                    name: row.name,
                    order_type,
                    remark: row.remark,
                    price: fixed_to_decimal(row.price, 3),
                    volume: row.volume,
                    amount: fixed_to_decimal(row.amount, 2),
                    strategy_name: (!row.strategy_name.is_empty()).then_some(row.strategy_name),
                })
            })
            .collect()
    }

    async fn aggregate_trades(
        &self,
        account: &AccountId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        group_by: AggregateGroupBy,
    ) -> StoreResult<Vec<TradeAggregate>> {
        let key_expr = match group_by {
            AggregateGroupBy::Stock => "concat(code, '|', name)",
            AggregateGroupBy::Date => "toString(date)",
            AggregateGroupBy::Month => "toString(toStartOfMonth(date))",
            AggregateGroupBy::Type => "order_type",
        };
        let sql = format!(
            "SELECT {key_expr} AS key, count() AS count, sum(volume) AS total_volume, sum(amount) AS total_amount \
             FROM trades WHERE account_id = ? AND date >= ? AND date <= ? GROUP BY key ORDER BY total_amount DESC"
        );

        #[derive(Row, Deserialize)]
        struct AggRow {
            key: String,
            count: u64,
            total_volume: u64,
            total_amount: i64,
        }

        let rows: Vec<AggRow> = self
            .client
            .query(&sql)
            .bind(account)
            .bind(epoch_days(start_date))
            .bind(epoch_days(end_date))
            .fetch_all()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        Ok(rows
            .into_iter()
            .map(|r| TradeAggregate {
                key: r.key,
                count: r.count,
                total_volume: r.total_volume,
                total_amount: fixed_to_decimal(r.total_amount, 2),
            })
            .collect())
    }
}

#[derive(Row, Serialize, Deserialize)]
struct CandleRow {
    code: String,
    date: i32,
    open: i64,
    high: i64,
    low: i64,
    close: i64,
    volume: u64,
    amount: i64,
}

impl TryFrom<CandleRow> for Candle {
    type Error = StoreError;

    fn try_from(row: CandleRow) -> Result<Self, Self::Error> {
        Ok(Candle {
            code: row.code,
            date: date_from_epoch_days(row.date),
            open: fixed_to_decimal(row.open, 3),
            high: fixed_to_decimal(row.high, 3),
            low: fixed_to_decimal(row.low, 3),
            close: fixed_to_decimal(row.close, 3),
            volume: row.volume,
            amount: fixed_to_decimal(row.amount, 2),
        })
    }
}

#[async_trait]
impl CandleStore for CoolStore {
    async fn get_kline(&self, code: &InstrumentCode, start_date: NaiveDate, end_date: NaiveDate) -> StoreResult<Vec<Candle>> {
        let sql = "SELECT code, date, open, high, low, close, volume, amount FROM candles \
             WHERE code = ? AND date >= ? AND date <= ? ORDER BY date ASC";
        let rows: Vec<CandleRow> = self
            .client
            .query(sql)
            .bind(code)
            .bind(epoch_days(start_date))
            .bind(epoch_days(end_date))
            .fetch_all()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        rows.into_iter().map(Candle::try_from).collect()
    }

    async fn batch_get_kline(
        &self,
        codes: &[InstrumentCode],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> StoreResult<HashMap<InstrumentCode, Vec<Candle>>> {
        let mut out: HashMap<InstrumentCode, Vec<Candle>> = codes.iter().map(|c| (c.clone(), Vec::new())).collect();
        if codes.is_empty() {
            return Ok(out);
        }
        let placeholders = vec!["?"; codes.len()].join(", ");
        let sql = format!(
            "SELECT code, date, open, high, low, close, volume, amount FROM candles \
             WHERE code IN ({placeholders}) AND date >= ? AND date <= ? ORDER BY code, date ASC"
        );
        let mut query = self.client.query(&sql);
        for code in codes {
            query = query.bind(code);
        }
        query = query.bind(epoch_days(start_date)).bind(epoch_days(end_date));
        let rows: Vec<CandleRow> = query.fetch_all().await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        for row in rows {
            let candle = Candle::try_from(row)?;
            out.entry(candle.code.clone()).or_default().push(candle);
        }
        Ok(out)
    }
}

#[async_trait]
impl PositionStore for CoolStore {
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
impl AccountStore for CoolStore {
    async fn create_account(
        &self,
        _account_id: &AccountId,
        _account_name: &str,
        _broker: Broker,
        _initial_capital: Decimal,
    ) -> StoreResult<bool> {
        Err(StoreError::unsupported(BACKEND, "create_account"))
    }
    async fn get_account(&self, _account_id: &AccountId) -> StoreResult<Option<Account>> {
        Err(StoreError::unsupported(BACKEND, "get_account"))
    }
    async fn update_account_capital(
        &self,
        _account_id: &AccountId,
        _current_capital: Decimal,
        _total_assets: Decimal,
        _position_value: Decimal,
    ) -> StoreResult<bool> {
        Err(StoreError::unsupported(BACKEND, "update_account_capital"))
    }
}

#[async_trait]
impl StrategyStore for CoolStore {
    async fn create_strategy(
        &self,
        _strategy_name: &str,
        _strategy_code: &str,
        _strategy_type: StrategyType,
        _version: &str,
        _description: Option<&str>,
    ) -> StoreResult<bool> {
        Err(StoreError::unsupported(BACKEND, "create_strategy"))
    }
    async fn get_strategy(&self, _strategy_code: &str) -> StoreResult<Option<Strategy>> {
        Err(StoreError::unsupported(BACKEND, "get_strategy"))
    }
    async fn get_strategy_params(&self, _strategy_code: &str) -> StoreResult<Option<ParamMap>> {
        Err(StoreError::unsupported(BACKEND, "get_strategy_params"))
    }
    async fn save_strategy_params(&self, _strategy_code: &str, _params: &ParamMap) -> StoreResult<bool> {
        Err(StoreError::unsupported(BACKEND, "save_strategy_params"))
    }
    async fn compare_strategy_params(&self, _strategy_code: &str, _new_params: &ParamMap) -> StoreResult<ParamDiff> {
        Err(StoreError::unsupported(BACKEND, "compare_strategy_params"))
    }
}

#[async_trait]
impl HealthCheck for CoolStore {
    async fn health_check(&self) -> bool {
        self.client.query("SELECT 1").execute().await.is_ok()
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
