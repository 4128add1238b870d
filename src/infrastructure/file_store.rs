//! File Tier (spec.md §4.2, C2): durable local fallback, and the sole
//! backing store when no database tier is configured.
//!
//! Position documents are NOT nested by `AccountId` — this is the
//! single-account fallback limitation the spec permits as an accepted
//! Open Question (see DESIGN.md). `held_days.json` additionally carries a
//! reserved `_inc_date` key recording the last successful `all_held_inc`.

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::store::{AccountStore, CandleStore, HealthCheck, PositionStore, StrategyStore, TradeStore};
use crate::domain::types::{
    Account, AccountId, AccountStatus, AggregateGroupBy, Broker, Candle, InstrumentCode, OrderType,
    ParamDiff, ParamMap, ParamValue, Strategy, StrategyStatus, StrategyType, TradeAggregate, TradeRecord,
};
use crate::infrastructure::locks::DocumentLocks;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use encoding_rs::{GBK, UTF_8};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const INC_DATE_KEY: &str = "_inc_date";
const TRADE_CSV_HEADER: &[&str] = &[
    "date",
    "time",
    "code",
    "name",
    "order_type",
    "remark",
    "price",
    "volume",
    "amount",
    "strategy_name",
];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

pub struct FileStore {
    cache_dir: PathBuf,
    locks: DocumentLocks,
}

impl FileStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            locks: DocumentLocks::new(),
        }
    }

    fn held_days_path(&self) -> PathBuf {
        self.cache_dir.join("held_days.json")
    }
    fn max_prices_path(&self) -> PathBuf {
        self.cache_dir.join("max_prices.json")
    }
    fn min_prices_path(&self) -> PathBuf {
        self.cache_dir.join("min_prices.json")
    }
    fn trades_path(&self) -> PathBuf {
        self.cache_dir.join("trades.csv")
    }
    fn accounts_path(&self) -> PathBuf {
        self.cache_dir.join("accounts.json")
    }
    fn strategies_path(&self) -> PathBuf {
        self.cache_dir.join("strategies.json")
    }

    async fn ensure_cache_dir(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| StoreError::unavailable("file", e))
    }

    async fn load_map(&self, path: &Path) -> StoreResult<Map<String, Value>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                if raw.trim().is_empty() {
                    Ok(Map::new())
                } else {
                    serde_json::from_str(&raw).map_err(|e| StoreError::unavailable("file", e))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(StoreError::unavailable("file", e)),
        }
    }

    async fn save_map(&self, path: &Path, map: &Map<String, Value>) -> StoreResult<()> {
        self.ensure_cache_dir().await?;
        let body = serde_json::to_string_pretty(map).map_err(|e| StoreError::unavailable("file", e))?;
        tokio::fs::write(path, body)
            .await
            .map_err(|e| StoreError::unavailable("file", e))
    }

    async fn get_price(&self, path: &Path, code: &InstrumentCode) -> StoreResult<Option<Decimal>> {
        let map = self.load_map(path).await?;
        Ok(map
            .get(code)
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok()))
    }

    async fn update_price(&self, path: &Path, code: &InstrumentCode, price: Decimal) -> StoreResult<()> {
        let _guard = self.locks.lock(path).await;
        let mut map = self.load_map(path).await?;
        let rounded = price.round_dp(3);
        map.insert(code.clone(), Value::String(rounded.to_string()));
        self.save_map(path, &map).await
    }

    /// Whole-document reads/writes for the migration toolkit (C7), which
    /// moves data in bulk rather than key-by-key.
    pub async fn read_held_days_map(&self) -> StoreResult<HashMap<String, u32>> {
        let map = self.load_map(&self.held_days_path()).await?;
        Ok(map
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .filter_map(|(k, v)| v.as_u64().map(|d| (k.clone(), d as u32)))
            .collect())
    }

    pub async fn read_max_prices_map(&self) -> StoreResult<HashMap<String, Decimal>> {
        self.read_price_doc(&self.max_prices_path()).await
    }

    pub async fn read_min_prices_map(&self) -> StoreResult<HashMap<String, Decimal>> {
        self.read_price_doc(&self.min_prices_path()).await
    }

    async fn read_price_doc(&self, path: &Path) -> StoreResult<HashMap<String, Decimal>> {
        let map = self.load_map(path).await?;
        Ok(map
            .iter()
            .filter_map(|(k, v)| v.as_str().and_then(|s| Decimal::from_str(s).ok()).map(|d| (k.clone(), d)))
            .collect())
    }

    pub async fn write_held_days_map(&self, data: &HashMap<String, u32>) -> StoreResult<()> {
        let path = self.held_days_path();
        let _guard = self.locks.lock(&path).await;
        let map: Map<String, Value> = data.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect();
        self.save_map(&path, &map).await
    }

    pub async fn write_max_prices_map(&self, data: &HashMap<String, Decimal>) -> StoreResult<()> {
        self.write_price_doc(&self.max_prices_path(), data).await
    }

    pub async fn write_min_prices_map(&self, data: &HashMap<String, Decimal>) -> StoreResult<()> {
        self.write_price_doc(&self.min_prices_path(), data).await
    }

    async fn write_price_doc(&self, path: &Path, data: &HashMap<String, Decimal>) -> StoreResult<()> {
        let _guard = self.locks.lock(path).await;
        let map: Map<String, Value> = data
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.round_dp(3).to_string())))
            .collect();
        self.save_map(path, &map).await
    }

    /// Every account id present in `accounts.json`, used by the export
    /// toolkit to dump the full WARM tier back to file.
    pub async fn list_account_ids(&self) -> StoreResult<Vec<AccountId>> {
        let map = self.load_map(&self.accounts_path()).await?;
        Ok(map.keys().cloned().collect())
    }

    /// Every strategy code present in `strategies.json`.
    pub async fn list_strategy_codes(&self) -> StoreResult<Vec<String>> {
        let map = self.load_map(&self.strategies_path()).await?;
        Ok(map.keys().cloned().collect())
    }

    /// Number of data rows in the trade CSV (header excluded), used by the
    /// consistency verifier to compare against the COOL tier's row count.
    pub async fn count_trade_rows(&self) -> StoreResult<u64> {
        match read_trades_raw(&self.trades_path()).await? {
            Some(bytes) => {
                let text = decode_trades(&bytes);
                let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
                Ok(rdr.records().filter_map(|r| r.ok()).count() as u64)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl PositionStore for FileStore {
    async fn get_held_days(&self, code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<u32>> {
        let map = self.load_map(&self.held_days_path()).await?;
        Ok(map.get(code).and_then(|v| v.as_u64()).map(|v| v as u32))
    }

    async fn update_held_days(&self, code: &InstrumentCode, _account: &AccountId, days: u32) -> StoreResult<()> {
        let path = self.held_days_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        map.insert(code.clone(), Value::from(days));
        self.save_map(&path, &map).await
    }

    async fn delete_held_days(&self, code: &InstrumentCode, _account: &AccountId) -> StoreResult<()> {
        let path = self.held_days_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        map.remove(code);
        self.save_map(&path, &map).await
    }

    async fn batch_new_held(&self, _account: &AccountId, codes: &[InstrumentCode]) -> StoreResult<()> {
        if codes.is_empty() {
            return Ok(());
        }
        let path = self.held_days_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        for code in codes {
            // Overwrite to 0 — the resolved Open Question (spec.md §4.2/§9).
            map.insert(code.clone(), Value::from(0u32));
        }
        self.save_map(&path, &map).await
    }

    async fn all_held_inc(&self, account: &AccountId) -> StoreResult<bool> {
        let path = self.held_days_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        let today = Utc::now().date_naive().to_string();

        if map.get(INC_DATE_KEY).and_then(|v| v.as_str()) == Some(today.as_str()) {
            return Ok(false);
        }

        let codes: Vec<String> = map
            .keys()
            .filter(|k| !k.starts_with('_'))
            .cloned()
            .collect();
        if codes.is_empty() {
            return Ok(false);
        }

        for code in &codes {
            if let Some(days) = map.get(code).and_then(|v| v.as_u64()) {
                map.insert(code.clone(), Value::from(days + 1));
            }
        }
        map.insert(INC_DATE_KEY.to_string(), Value::from(today));
        self.save_map(&path, &map).await?;
        info!(backend = "file", account = %account, incremented = codes.len(), "all_held_inc applied");
        Ok(true)
    }

    async fn get_max_price(&self, code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<Decimal>> {
        self.get_price(&self.max_prices_path(), code).await
    }

    async fn update_max_price(&self, code: &InstrumentCode, _account: &AccountId, price: Decimal) -> StoreResult<()> {
        self.update_price(&self.max_prices_path(), code, price).await
    }

    async fn get_min_price(&self, code: &InstrumentCode, _account: &AccountId) -> StoreResult<Option<Decimal>> {
        self.get_price(&self.min_prices_path(), code).await
    }

    async fn update_min_price(&self, code: &InstrumentCode, _account: &AccountId, price: Decimal) -> StoreResult<()> {
        self.update_price(&self.min_prices_path(), code, price).await
    }
}

fn column_index(header: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    header.iter().position(|h| {
        let h = h.trim().trim_start_matches('\u{feff}');
        names.iter().any(|n| n.eq_ignore_ascii_case(h))
    })
}

/// English/localized column aliases accepted when reading the trade CSV
/// (spec.md §6).
fn aliases(field: &str) -> &'static [&'static str] {
    match field {
        "date" => &["date", "日期"],
        "time" => &["time", "时间"],
        "code" => &["code", "stock_code", "代码"],
        "name" => &["name", "stock_name", "名称"],
        "order_type" => &["order_type", "类型"],
        "remark" => &["remark", "注释"],
        "price" => &["price", "成交价"],
        "volume" => &["volume", "成交量"],
        "amount" => &["amount", "成交金额"],
        "strategy_name" => &["strategy_name", "策略名称"],
        _ => &[],
    }
}

async fn read_trades_raw(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::unavailable("file", e)),
    }
}

/// Tolerant decode: try UTF-8 first, then GBK (spec.md §4.2).
fn decode_trades(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    let (text, _, had_errors) = UTF_8.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }
    let (text, _, _) = GBK.decode(bytes);
    text.into_owned()
}

#[async_trait]
impl TradeStore for FileStore {
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
        let path = self.trades_path();
        let _guard = self.locks.lock(&path).await;
        self.ensure_cache_dir().await?;

        let trade = TradeRecord::new(
            account.clone(),
            timestamp,
            code.clone(),
            name.to_string(),
            order_type,
            remark.to_string(),
            price,
            volume,
            strategy_name.map(str::to_string),
        );

        let is_new = !path.exists();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::unavailable("file", e))?;

        if is_new {
            file.write_all(&UTF8_BOM)
                .await
                .map_err(|e| StoreError::unavailable("file", e))?;
            file.write_all(TRADE_CSV_HEADER.join(",").as_bytes())
                .await
                .map_err(|e| StoreError::unavailable("file", e))?;
            file.write_all(b"\n").await.map_err(|e| StoreError::unavailable("file", e))?;
        }

        let line = format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            trade.date,
            trade.timestamp.format("%H:%M:%S"),
            trade.code,
            trade.name,
            trade.order_type.as_str(),
            trade.remark,
            trade.price,
            trade.volume,
            trade.amount,
            trade.strategy_name.unwrap_or_default(),
        );
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::unavailable("file", e))?;
        Ok(())
    }

    async fn query_trades(
        &self,
        account: &AccountId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        code: Option<&InstrumentCode>,
    ) -> StoreResult<Vec<TradeRecord>> {
        let path = self.trades_path();
        let Some(bytes) = read_trades_raw(&path).await? else {
            return Ok(Vec::new());
        };
        let text = decode_trades(&bytes);

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
        let header = reader.headers().map_err(|e| StoreError::unavailable("file", e))?.clone();

        let idx = |field: &str| column_index(&header, aliases(field));
        let (date_i, time_i, code_i, name_i, type_i, remark_i, price_i, volume_i, strategy_i) = (
            idx("date"),
            idx("time"),
            idx("code"),
            idx("name"),
            idx("order_type"),
            idx("remark"),
            idx("price"),
            idx("volume"),
            idx("strategy_name"),
        );

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| StoreError::unavailable("file", e))?;
            let get = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("");

            let Some(date_str) = date_i.map(|_| get(date_i)) else { continue };
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else { continue };
            if start_date.is_some_and(|s| date < s) || end_date.is_some_and(|e| date > e) {
                continue;
            }
            let row_code = get(code_i).to_string();
            if let Some(c) = code
                && *c != row_code
            {
                continue;
            }

            let time_str = get(time_i);
            let datetime_str = format!("{date} {}", if time_str.is_empty() { "00:00:00" } else { time_str });
            let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&datetime_str, "%Y-%m-%d %H:%M:%S") else {
                continue;
            };
            let timestamp = naive.and_utc();

            let Ok(price) = get(price_i).parse::<Decimal>() else { continue };
            let Ok(volume) = get(volume_i).parse::<u64>() else { continue };
            let Ok(order_type) = get(type_i).parse::<OrderType>() else { continue };

            rows.push(TradeRecord::new(
                account.clone(),
                timestamp,
                row_code,
                get(name_i).to_string(),
                order_type,
                get(remark_i).to_string(),
                price,
                volume,
                strategy_i.map(|_| get(strategy_i)).filter(|s| !s.is_empty()).map(str::to_string),
            ));
        }

        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows)
    }

    async fn aggregate_trades(
        &self,
        account: &AccountId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        group_by: AggregateGroupBy,
    ) -> StoreResult<Vec<TradeAggregate>> {
        let trades = self.query_trades(account, Some(start_date), Some(end_date), None).await?;
        let mut groups: HashMap<String, (u64, u64, Decimal)> = HashMap::new();

        for t in &trades {
            let key = match group_by {
                AggregateGroupBy::Stock => format!("{}|{}", t.code, t.name),
                AggregateGroupBy::Date => t.date.to_string(),
                AggregateGroupBy::Month => t.date.format("%Y-%m").to_string(),
                AggregateGroupBy::Type => t.order_type.as_str().to_string(),
            };
            let entry = groups.entry(key).or_insert((0, 0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += t.volume;
            entry.2 += t.amount;
        }

        let mut rows: Vec<TradeAggregate> = groups
            .into_iter()
            .map(|(key, (count, total_volume, total_amount))| TradeAggregate {
                key,
                count,
                total_volume,
                total_amount,
            })
            .collect();
        rows.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
        Ok(rows)
    }
}

#[async_trait]
impl CandleStore for FileStore {
    /// Candle storage is deliberately out of the file tier's contract
    /// (spec.md §4.2): this is a stub returning empty, not an error.
    async fn get_kline(&self, _code: &InstrumentCode, _start: NaiveDate, _end: NaiveDate) -> StoreResult<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn batch_get_kline(
        &self,
        _codes: &[InstrumentCode],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> StoreResult<HashMap<InstrumentCode, Vec<Candle>>> {
        Ok(HashMap::new())
    }
}

fn account_to_json(account_id: &AccountId, name: &str, broker: Broker, initial: Decimal, now: DateTime<Utc>) -> Value {
    serde_json::json!({
        "account_id": account_id,
        "account_name": name,
        "broker": broker.to_string(),
        "initial_capital": initial.to_string(),
        "current_capital": initial.to_string(),
        "total_assets": Value::Null,
        "position_value": Value::Null,
        "status": "active",
        "created_at": now.to_rfc3339(),
        "updated_at": now.to_rfc3339(),
    })
}

fn json_to_account(account_id: &str, v: &Value) -> Option<Account> {
    let broker: Broker = v.get("broker")?.as_str()?.parse().ok()?;
    let status = match v.get("status").and_then(|s| s.as_str()) {
        Some("inactive") => AccountStatus::Inactive,
        Some("suspended") => AccountStatus::Suspended,
        _ => AccountStatus::Active,
    };
    Some(Account {
        id: 0,
        account_id: account_id.to_string(),
        account_name: v.get("account_name")?.as_str()?.to_string(),
        broker,
        initial_capital: Decimal::from_str(v.get("initial_capital")?.as_str()?).ok()?,
        current_capital: Decimal::from_str(v.get("current_capital")?.as_str()?).ok()?,
        total_assets: v.get("total_assets").and_then(|x| x.as_str()).and_then(|s| Decimal::from_str(s).ok()),
        position_value: v.get("position_value").and_then(|x| x.as_str()).and_then(|s| Decimal::from_str(s).ok()),
        status,
        created_at: v
            .get("created_at")
            .and_then(|x| x.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        updated_at: v
            .get("updated_at")
            .and_then(|x| x.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl AccountStore for FileStore {
    async fn create_account(
        &self,
        account_id: &AccountId,
        account_name: &str,
        broker: Broker,
        initial_capital: Decimal,
    ) -> StoreResult<bool> {
        let path = self.accounts_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        if map.contains_key(account_id) {
            return Ok(false);
        }
        map.insert(
            account_id.clone(),
            account_to_json(account_id, account_name, broker, initial_capital, Utc::now()),
        );
        self.save_map(&path, &map).await?;
        Ok(true)
    }

    async fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>> {
        let map = self.load_map(&self.accounts_path()).await?;
        Ok(map.get(account_id).and_then(|v| json_to_account(account_id, v)))
    }

    async fn update_account_capital(
        &self,
        account_id: &AccountId,
        current_capital: Decimal,
        total_assets: Decimal,
        position_value: Decimal,
    ) -> StoreResult<bool> {
        let path = self.accounts_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        let Some(entry) = map.get_mut(account_id) else {
            return Ok(false);
        };
        entry["current_capital"] = Value::from(current_capital.to_string());
        entry["total_assets"] = Value::from(total_assets.to_string());
        entry["position_value"] = Value::from(position_value.to_string());
        entry["updated_at"] = Value::from(Utc::now().to_rfc3339());
        self.save_map(&path, &map).await?;
        Ok(true)
    }
}

#[async_trait]
impl StrategyStore for FileStore {
    async fn create_strategy(
        &self,
        strategy_name: &str,
        strategy_code: &str,
        strategy_type: StrategyType,
        version: &str,
        description: Option<&str>,
    ) -> StoreResult<bool> {
        let path = self.strategies_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        if map.contains_key(strategy_code) {
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        map.insert(
            strategy_code.to_string(),
            serde_json::json!({
                "strategy_name": strategy_name,
                "strategy_type": match strategy_type {
                    StrategyType::Wencai => "wencai",
                    StrategyType::Remote => "remote",
                    StrategyType::Technical => "technical",
                },
                "version": version,
                "status": "active",
                "description": description,
                "params": {},
                "created_at": now,
                "updated_at": now,
            }),
        );
        self.save_map(&path, &map).await?;
        Ok(true)
    }

    async fn get_strategy(&self, strategy_code: &str) -> StoreResult<Option<Strategy>> {
        let map = self.load_map(&self.strategies_path()).await?;
        let Some(v) = map.get(strategy_code) else { return Ok(None) };
        let strategy_type = v
            .get("strategy_type")
            .and_then(|x| x.as_str())
            .and_then(|s| s.parse::<StrategyType>().ok())
            .unwrap_or(StrategyType::Technical);
        let status = match v.get("status").and_then(|s| s.as_str()) {
            Some("testing") => StrategyStatus::Testing,
            Some("inactive") => StrategyStatus::Inactive,
            _ => StrategyStatus::Active,
        };
        Ok(Some(Strategy {
            id: 0,
            strategy_name: v.get("strategy_name").and_then(|x| x.as_str()).unwrap_or_default().to_string(),
            strategy_code: strategy_code.to_string(),
            strategy_type,
            version: v.get("version").and_then(|x| x.as_str()).unwrap_or_default().to_string(),
            status,
            description: v.get("description").and_then(|x| x.as_str()).map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }))
    }

    async fn get_strategy_params(&self, strategy_code: &str) -> StoreResult<Option<ParamMap>> {
        let map = self.load_map(&self.strategies_path()).await?;
        let Some(entry) = map.get(strategy_code) else { return Ok(None) };
        let params = entry.get("params").and_then(|p| p.as_object()).cloned().unwrap_or_default();
        Ok(Some(
            params
                .into_iter()
                .map(|(k, v)| (k, ParamValue::from_json(v)))
                .collect(),
        ))
    }

    async fn save_strategy_params(&self, strategy_code: &str, params: &ParamMap) -> StoreResult<bool> {
        let path = self.strategies_path();
        let _guard = self.locks.lock(&path).await;
        let mut map = self.load_map(&path).await?;
        let Some(entry) = map.get_mut(strategy_code) else {
            warn!(backend = "file", strategy_code, "save_strategy_params: strategy not found");
            return Ok(false);
        };
        let params_json: Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), param_value_to_json(v)))
            .collect();
        entry["params"] = Value::Object(params_json);
        entry["updated_at"] = Value::from(Utc::now().to_rfc3339());
        self.save_map(&path, &map).await?;
        Ok(true)
    }

    async fn compare_strategy_params(&self, strategy_code: &str, new_params: &ParamMap) -> StoreResult<ParamDiff> {
        let old_params = self.get_strategy_params(strategy_code).await?.unwrap_or_default();
        Ok(diff_params(&old_params, new_params))
    }
}

fn param_value_to_json(v: &ParamValue) -> Value {
    match v {
        ParamValue::Int(i) => Value::from(*i),
        ParamValue::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        ParamValue::Str(s) => Value::from(s.clone()),
        ParamValue::Json(v) => v.clone(),
    }
}

/// Set-algebra diff shared by every tier's `compare_strategy_params`.
pub fn diff_params(old_params: &ParamMap, new_params: &ParamMap) -> ParamDiff {
    let mut diff = ParamDiff::default();
    for (k, v) in new_params {
        match old_params.get(k) {
            None => {
                diff.added.insert(k.clone(), v.clone());
            }
            Some(old) if old != v => {
                diff.modified.insert(k.clone(), (old.clone(), v.clone()));
            }
            _ => {}
        }
    }
    for (k, v) in old_params {
        if !new_params.contains_key(k) {
            diff.deleted.insert(k.clone(), v.clone());
        }
    }
    diff
}

#[async_trait]
impl HealthCheck for FileStore {
    async fn health_check(&self) -> bool {
        if self.ensure_cache_dir().await.is_err() {
            return false;
        }
        let probe = self.cache_dir.join(".health_check");
        let ok = tokio::fs::write(&probe, b"ok").await.is_ok();
        let _ = tokio::fs::remove_file(&probe).await;
        ok
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn store() -> (FileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FileStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn update_then_get_held_days_round_trips() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        let code = "SH600000".to_string();
        store.update_held_days(&code, &account, 5).await.unwrap();
        assert_eq!(store.get_held_days(&code, &account).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn delete_held_days_then_get_yields_absent() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        let code = "SH600000".to_string();
        store.update_held_days(&code, &account, 5).await.unwrap();
        store.delete_held_days(&code, &account).await.unwrap();
        assert_eq!(store.get_held_days(&code, &account).await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_new_held_overwrites_to_zero() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        let codes = vec!["SH600000".to_string(), "SZ000001".to_string()];
        store.update_held_days(&codes[0], &account, 9).await.unwrap();
        store.batch_new_held(&account, &codes).await.unwrap();
        assert_eq!(store.get_held_days(&codes[0], &account).await.unwrap(), Some(0));
        assert_eq!(store.get_held_days(&codes[1], &account).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn all_held_inc_is_idempotent_per_day() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        store.batch_new_held(&account, &["SH600000".to_string()]).await.unwrap();
        store.update_held_days(&"SH600000".to_string(), &account, 2).await.unwrap();

        assert!(store.all_held_inc(&account).await.unwrap());
        assert_eq!(store.get_held_days(&"SH600000".to_string(), &account).await.unwrap(), Some(3));
        assert!(!store.all_held_inc(&account).await.unwrap());
        assert_eq!(store.get_held_days(&"SH600000".to_string(), &account).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn all_held_inc_on_empty_account_returns_false() {
        let (store, _dir) = store().await;
        assert!(!store.all_held_inc(&"EMPTY".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn max_price_rounds_to_three_decimal_places() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        let code = "SH600000".to_string();
        store.update_max_price(&code, &account, dec!(11.23456)).await.unwrap();
        let got = store.get_max_price(&code, &account).await.unwrap().unwrap();
        assert_eq!(got, dec!(11.235));
    }

    #[tokio::test]
    async fn record_and_query_trades_filters_and_orders_desc() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        let early = DateTime::parse_from_rfc3339("2025-01-10T09:30:00Z").unwrap().with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2025-01-11T14:00:00Z").unwrap().with_timezone(&Utc);

        store
            .record_trade(&account, early, &"SH600000".to_string(), "浦发银行", OrderType::BuyTrade, "open", dec!(10.5), 1000, None)
            .await
            .unwrap();
        store
            .record_trade(&account, late, &"SH600000".to_string(), "浦发银行", OrderType::SellTrade, "close", dec!(11.3), 1000, None)
            .await
            .unwrap();

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
    }

    #[tokio::test]
    async fn aggregate_trades_sums_match_filtered_count() {
        let (store, _dir) = store().await;
        let account = "A1".to_string();
        for month in 1..=3 {
            let ts = DateTime::parse_from_rfc3339(&format!("2024-{month:02}-15T09:30:00Z"))
                .unwrap()
                .with_timezone(&Utc);
            store
                .record_trade(&account, ts, &"SH600000".to_string(), "x", OrderType::BuyTrade, "", dec!(10), 100, None)
                .await
                .unwrap();
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
        let total: u64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn create_account_rejects_duplicate() {
        let (store, _dir) = store().await;
        let id = "A1".to_string();
        assert!(store.create_account(&id, "prod", Broker::Qmt, dec!(100000)).await.unwrap());
        assert!(!store.create_account(&id, "prod", Broker::Qmt, dec!(100000)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_strategy_params_are_absent() {
        let (store, _dir) = store().await;
        assert_eq!(store.get_strategy_params("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_strategy_params_on_unknown_strategy_returns_false() {
        let (store, _dir) = store().await;
        let mut params = ParamMap::new();
        params.insert("x".to_string(), ParamValue::Int(1));
        assert!(!store.save_strategy_params("ghost", &params).await.unwrap());
    }

    #[tokio::test]
    async fn strategy_param_round_trip_and_diff() {
        let (store, _dir) = store().await;
        store
            .create_strategy("问财选股V1", "wencai_v1", StrategyType::Wencai, "1.0.0", None)
            .await
            .unwrap();

        let mut v1 = ParamMap::new();
        v1.insert("slot_count".to_string(), ParamValue::Int(10));
        v1.insert("slot_capacity".to_string(), ParamValue::Int(10000));
        store.save_strategy_params("wencai_v1", &v1).await.unwrap();

        let mut v2 = ParamMap::new();
        v2.insert("slot_count".to_string(), ParamValue::Int(12));
        v2.insert("slot_capacity".to_string(), ParamValue::Int(15000));
        store.save_strategy_params("wencai_v1", &v2).await.unwrap();

        let active = store.get_strategy_params("wencai_v1").await.unwrap().unwrap();
        assert_eq!(active.get("slot_count"), Some(&ParamValue::Int(12)));

        let mut v3 = v2.clone();
        v3.insert("stop_loss".to_string(), ParamValue::Float(0.03));
        let diff = store.compare_strategy_params("wencai_v1", &v3).await.unwrap();
        assert_eq!(diff.added.get("stop_loss"), Some(&ParamValue::Float(0.03)));
        assert!(diff.modified.is_empty());
        assert!(diff.deleted.is_empty());
    }
}
