//! HOT Tier (spec.md §4.3, C3): Redis-backed position state.
//!
//! Key schema, grounded directly in `original_source/storage/redis_store.py`:
//! `held_days:{account}`, `max_prices:{account}`, `min_prices:{account}`
//! hashes, plus an `_inc_date:{account}` string guarding `all_held_inc`
//! idempotence. Everything outside `PositionStore` is unsupported here —
//! trades, candles and account/strategy administration belong to the
//! COOL and WARM tiers.

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::store::{AccountStore, CandleStore, HealthCheck, PositionStore, StrategyStore, TradeStore};
use crate::domain::types::{
    Account, AccountId, AggregateGroupBy, Broker, Candle, InstrumentCode, OrderType, ParamDiff, ParamMap,
    Strategy, StrategyType, TradeAggregate, TradeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

const BACKEND: &str = "hot";

/// Atomically checks `_inc_date:{account}` against today and, if it
/// hasn't run yet, increments every entry in `held_days:{account}` by one.
/// KEYS[1] = held hash, KEYS[2] = date marker, ARGV[1] = today (YYYY-MM-DD).
/// Returns the number of codes incremented (0 means already run today, or
/// no positions held).
const ALL_HELD_INC_SCRIPT: &str = r#"
local held_key = KEYS[1]
local date_key = KEYS[2]
local today = ARGV[1]

local last_date = redis.call('GET', date_key)
if last_date == today then
    return 0
end

local held_data = redis.call('HGETALL', held_key)
if #held_data == 0 then
    return 0
end

local count = 0
for i = 1, #held_data, 2 do
    local code = held_data[i]
    local days = tonumber(held_data[i + 1])
    redis.call('HSET', held_key, code, days + 1)
    count = count + 1
end

redis.call('SET', date_key, today)
return count
"#;

pub struct HotStore {
    conn: ConnectionManager,
    all_held_inc_script: Script,
}

impl HotStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| StoreError::unavailable(BACKEND, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(Self {
            conn,
            all_held_inc_script: Script::new(ALL_HELD_INC_SCRIPT),
        })
    }

    fn held_key(account: &AccountId) -> String {
        format!("held_days:{account}")
    }
    fn max_price_key(account: &AccountId) -> String {
        format!("max_prices:{account}")
    }
    fn min_price_key(account: &AccountId) -> String {
        format!("min_prices:{account}")
    }
    fn inc_date_key(account: &AccountId) -> String {
        format!("_inc_date:{account}")
    }

    /// Bulk reads/writes for the migration toolkit (C7), grounded in
    /// `migrate_held_days.py`'s pipelined batch writer and
    /// `export_to_file.py`'s `HGETALL` dump — neither fits the
    /// single-key `PositionStore` shape.
    pub async fn read_held_days_map(&self, account: &AccountId) -> StoreResult<HashMap<String, u32>> {
        let mut conn = self.conn.clone();
        conn.hgetall(Self::held_key(account)).await.map_err(|e| StoreError::unavailable(BACKEND, e))
    }

    pub async fn read_max_prices_map(&self, account: &AccountId) -> StoreResult<HashMap<String, Decimal>> {
        self.read_price_map(Self::max_price_key(account)).await
    }

    pub async fn read_min_prices_map(&self, account: &AccountId) -> StoreResult<HashMap<String, Decimal>> {
        self.read_price_map(Self::min_price_key(account)).await
    }

    async fn read_price_map(&self, key: String) -> StoreResult<HashMap<String, Decimal>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(key).await.map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(raw.into_iter().filter_map(|(k, v)| Decimal::from_str(&v).ok().map(|d| (k, d))).collect())
    }

    /// Writes `data` in pipelined batches of `batch_size` (default 100
    /// upstream), overwriting any existing values. Returns
    /// `(succeeded, failed)`.
    pub async fn write_held_days_batch(
        &self,
        account: &AccountId,
        data: &HashMap<String, u32>,
        batch_size: usize,
    ) -> (usize, usize) {
        self.write_batch(Self::held_key(account), data.iter().map(|(k, v)| (k.clone(), *v)), batch_size).await
    }

    pub async fn write_max_prices_batch(
        &self,
        account: &AccountId,
        data: &HashMap<String, Decimal>,
        batch_size: usize,
    ) -> (usize, usize) {
        self.write_batch(
            Self::max_price_key(account),
            data.iter().map(|(k, v)| (k.clone(), v.round_dp(3).to_string())),
            batch_size,
        )
        .await
    }

    pub async fn write_min_prices_batch(
        &self,
        account: &AccountId,
        data: &HashMap<String, Decimal>,
        batch_size: usize,
    ) -> (usize, usize) {
        self.write_batch(
            Self::min_price_key(account),
            data.iter().map(|(k, v)| (k.clone(), v.round_dp(3).to_string())),
            batch_size,
        )
        .await
    }

    async fn write_batch<V>(&self, key: String, entries: impl Iterator<Item = (String, V)>, batch_size: usize) -> (usize, usize)
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        let items: Vec<(String, V)> = entries.collect();
        let mut succeeded = 0;
        let mut failed = 0;
        for chunk in items.chunks(batch_size.max(1)) {
            let mut conn = self.conn.clone();
            let mut pipe = redis::pipe();
            for (code, value) in chunk {
                pipe.hset(&key, code, value).ignore();
            }
            match pipe.query_async::<()>(&mut conn).await {
                Ok(()) => succeeded += chunk.len(),
                Err(e) => {
                    warn!(backend = BACKEND, error = %e, batch_len = chunk.len(), "batch write failed");
                    failed += chunk.len();
                }
            }
        }
        (succeeded, failed)
    }
}

#[async_trait]
impl PositionStore for HotStore {
    async fn get_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<u32>> {
        let mut conn = self.conn.clone();
        let value: Option<u32> = conn
            .hget(Self::held_key(account), code)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(value)
    }

    async fn update_held_days(&self, code: &InstrumentCode, account: &AccountId, days: u32) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(Self::held_key(account), code, days)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    async fn delete_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hdel(Self::held_key(account), code)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    async fn batch_new_held(&self, account: &AccountId, codes: &[InstrumentCode]) -> StoreResult<()> {
        if codes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let key = Self::held_key(account);
        let mut pipe = redis::pipe();
        for code in codes {
            // Overwrite to 0 — the resolved Open Question (spec.md §4.2/§9).
            pipe.hset(&key, code, 0u32).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    async fn all_held_inc(&self, account: &AccountId) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let today = Utc::now().date_naive().to_string();
        let incremented: i64 = self
            .all_held_inc_script
            .key(Self::held_key(account))
            .key(Self::inc_date_key(account))
            .arg(today)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(incremented > 0)
    }

    async fn get_max_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .hget(Self::max_price_key(account), code)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(value.and_then(|s| Decimal::from_str(&s).ok()))
    }

    async fn update_max_price(&self, code: &InstrumentCode, account: &AccountId, price: Decimal) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let rounded = price.round_dp(3).to_string();
        let _: () = conn
            .hset(Self::max_price_key(account), code, rounded)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    async fn get_min_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .hget(Self::min_price_key(account), code)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(value.and_then(|s| Decimal::from_str(&s).ok()))
    }

    async fn update_min_price(&self, code: &InstrumentCode, account: &AccountId, price: Decimal) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let rounded = price.round_dp(3).to_string();
        let _: () = conn
            .hset(Self::min_price_key(account), code, rounded)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for HotStore {
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
impl CandleStore for HotStore {
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
impl AccountStore for HotStore {
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
impl StrategyStore for HotStore {
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
impl HealthCheck for HotStore {
    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => true,
            Err(e) => {
                warn!(backend = BACKEND, error = %e, "health_check failed");
                false
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
