//! Hybrid Dispatcher (spec.md §4.6, C6).
//!
//! Routes each operation to its primary tier, dual-writes to the file
//! tier for durability, and auto-falls-back to the file tier when the
//! primary is unavailable. Directly grounded in
//! `original_source/storage/hybrid_store.py`: reads prefer the primary
//! and fall back to file on error (WARNING-logged); writes fan out to
//! both and succeed if either succeeds (ERROR-logged on primary
//! failure); `all_held_inc` additionally mirrors a successful primary
//! increment into the file tier when dual-write is enabled.

use crate::domain::errors::StoreResult;
use crate::domain::store::{AccountStore, CandleStore, HealthCheck, PositionStore, StrategyStore, TradeStore};
use crate::domain::types::{
    Account, AccountId, AggregateGroupBy, Broker, Candle, InstrumentCode, OrderType, ParamDiff, ParamMap, Strategy,
    StrategyType, TradeAggregate, TradeRecord,
};
use crate::infrastructure::cool_store::CoolStore;
use crate::infrastructure::file_store::FileStore;
use crate::infrastructure::hot_store::HotStore;
use crate::infrastructure::warm_store::WarmStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{error, warn};

pub struct HybridStore {
    file: FileStore,
    hot: Option<HotStore>,
    warm: Option<WarmStore>,
    cool: Option<CoolStore>,
    dual_write: bool,
    auto_fallback: bool,
}

impl HybridStore {
    pub fn new(
        file: FileStore,
        hot: Option<HotStore>,
        warm: Option<WarmStore>,
        cool: Option<CoolStore>,
        dual_write: bool,
        auto_fallback: bool,
    ) -> Self {
        Self { file, hot, warm, cool, dual_write, auto_fallback }
    }
}

#[async_trait]
impl PositionStore for HybridStore {
    async fn get_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<u32>> {
        if let Some(hot) = &self.hot {
            match hot.get_held_days(code, account).await {
                Ok(v) => return Ok(v),
                Err(e) if self.auto_fallback => {
                    warn!(backend = "hot", operation = "get_held_days", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_held_days(code, account).await
    }

    async fn update_held_days(&self, code: &InstrumentCode, account: &AccountId, days: u32) -> StoreResult<()> {
        let mut hot_ok = false;
        if let Some(hot) = &self.hot {
            match hot.update_held_days(code, account, days).await {
                Ok(()) => hot_ok = true,
                Err(e) => error!(backend = "hot", operation = "update_held_days", error = %e, "write failed"),
            }
        }
        if self.dual_write || !hot_ok {
            match self.file.update_held_days(code, account, days).await {
                Ok(()) => return Ok(()),
                Err(e) if hot_ok => {
                    error!(backend = "file", operation = "update_held_days", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn delete_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<()> {
        let mut hot_ok = false;
        if let Some(hot) = &self.hot {
            match hot.delete_held_days(code, account).await {
                Ok(()) => hot_ok = true,
                Err(e) => error!(backend = "hot", operation = "delete_held_days", error = %e, "write failed"),
            }
        }
        if self.dual_write || !hot_ok {
            match self.file.delete_held_days(code, account).await {
                Ok(()) => return Ok(()),
                Err(e) if hot_ok => {
                    error!(backend = "file", operation = "delete_held_days", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn batch_new_held(&self, account: &AccountId, codes: &[InstrumentCode]) -> StoreResult<()> {
        let mut hot_ok = false;
        if let Some(hot) = &self.hot {
            match hot.batch_new_held(account, codes).await {
                Ok(()) => hot_ok = true,
                Err(e) => error!(backend = "hot", operation = "batch_new_held", error = %e, "write failed"),
            }
        }
        if self.dual_write || !hot_ok {
            match self.file.batch_new_held(account, codes).await {
                Ok(()) => return Ok(()),
                Err(e) if hot_ok => {
                    error!(backend = "file", operation = "batch_new_held", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn all_held_inc(&self, account: &AccountId) -> StoreResult<bool> {
        if let Some(hot) = &self.hot {
            match hot.all_held_inc(account).await {
                Ok(incremented) => {
                    if self.dual_write && incremented
                        && let Err(e) = self.file.all_held_inc(account).await
                    {
                        error!(backend = "file", operation = "all_held_inc", error = %e, "dual-write mirror failed");
                    }
                    return Ok(incremented);
                }
                Err(e) if self.auto_fallback => {
                    warn!(backend = "hot", operation = "all_held_inc", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.all_held_inc(account).await
    }

    async fn get_max_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>> {
        if let Some(hot) = &self.hot {
            match hot.get_max_price(code, account).await {
                Ok(v) => return Ok(v),
                Err(e) if self.auto_fallback => {
                    warn!(backend = "hot", operation = "get_max_price", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_max_price(code, account).await
    }

    async fn update_max_price(&self, code: &InstrumentCode, account: &AccountId, price: Decimal) -> StoreResult<()> {
        let mut hot_ok = false;
        if let Some(hot) = &self.hot {
            match hot.update_max_price(code, account, price).await {
                Ok(()) => hot_ok = true,
                Err(e) => error!(backend = "hot", operation = "update_max_price", error = %e, "write failed"),
            }
        }
        if self.dual_write || !hot_ok {
            match self.file.update_max_price(code, account, price).await {
                Ok(()) => return Ok(()),
                Err(e) if hot_ok => {
                    error!(backend = "file", operation = "update_max_price", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn get_min_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>> {
        if let Some(hot) = &self.hot {
            match hot.get_min_price(code, account).await {
                Ok(v) => return Ok(v),
                Err(e) if self.auto_fallback => {
                    warn!(backend = "hot", operation = "get_min_price", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_min_price(code, account).await
    }

    async fn update_min_price(&self, code: &InstrumentCode, account: &AccountId, price: Decimal) -> StoreResult<()> {
        let mut hot_ok = false;
        if let Some(hot) = &self.hot {
            match hot.update_min_price(code, account, price).await {
                Ok(()) => hot_ok = true,
                Err(e) => error!(backend = "hot", operation = "update_min_price", error = %e, "write failed"),
            }
        }
        if self.dual_write || !hot_ok {
            match self.file.update_min_price(code, account, price).await {
                Ok(()) => return Ok(()),
                Err(e) if hot_ok => {
                    error!(backend = "file", operation = "update_min_price", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TradeStore for HybridStore {
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
        let mut cool_ok = false;
        if let Some(cool) = &self.cool {
            match cool
                .record_trade(account, timestamp, code, name, order_type, remark, price, volume, strategy_name)
                .await
            {
                Ok(()) => cool_ok = true,
                Err(e) => error!(backend = "cool", operation = "record_trade", error = %e, "write failed"),
            }
        }
        if self.dual_write || !cool_ok {
            match self
                .file
                .record_trade(account, timestamp, code, name, order_type, remark, price, volume, strategy_name)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if cool_ok => {
                    error!(backend = "file", operation = "record_trade", error = %e, "write failed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn query_trades(
        &self,
        account: &AccountId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        code: Option<&InstrumentCode>,
    ) -> StoreResult<Vec<TradeRecord>> {
        if let Some(cool) = &self.cool {
            match cool.query_trades(account, start_date, end_date, code).await {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "cool", operation = "query_trades", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.query_trades(account, start_date, end_date, code).await
    }

    async fn aggregate_trades(
        &self,
        account: &AccountId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        group_by: AggregateGroupBy,
    ) -> StoreResult<Vec<TradeAggregate>> {
        if let Some(cool) = &self.cool {
            match cool.aggregate_trades(account, start_date, end_date, group_by).await {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "cool", operation = "aggregate_trades", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.aggregate_trades(account, start_date, end_date, group_by).await
    }
}

#[async_trait]
impl CandleStore for HybridStore {
    async fn get_kline(&self, code: &InstrumentCode, start_date: NaiveDate, end_date: NaiveDate) -> StoreResult<Vec<Candle>> {
        if let Some(cool) = &self.cool {
            match cool.get_kline(code, start_date, end_date).await {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "cool", operation = "get_kline", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_kline(code, start_date, end_date).await
    }

    async fn batch_get_kline(
        &self,
        codes: &[InstrumentCode],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> StoreResult<HashMap<InstrumentCode, Vec<Candle>>> {
        if let Some(cool) = &self.cool {
            match cool.batch_get_kline(codes, start_date, end_date).await {
                Ok(rows) if !rows.is_empty() => return Ok(rows),
                Ok(_) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "cool", operation = "batch_get_kline", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.batch_get_kline(codes, start_date, end_date).await
    }
}

#[async_trait]
impl AccountStore for HybridStore {
    async fn create_account(
        &self,
        account_id: &AccountId,
        account_name: &str,
        broker: Broker,
        initial_capital: Decimal,
    ) -> StoreResult<bool> {
        if let Some(warm) = &self.warm {
            match warm.create_account(account_id, account_name, broker, initial_capital).await {
                Ok(created) => {
                    if created && self.dual_write
                        && let Err(e) = self.file.create_account(account_id, account_name, broker, initial_capital).await
                    {
                        error!(backend = "file", operation = "create_account", error = %e, "dual-write mirror failed");
                    }
                    return Ok(created);
                }
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "create_account", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.create_account(account_id, account_name, broker, initial_capital).await
    }

    async fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>> {
        if let Some(warm) = &self.warm {
            match warm.get_account(account_id).await {
                Ok(Some(a)) => return Ok(Some(a)),
                Ok(None) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "get_account", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_account(account_id).await
    }

    async fn update_account_capital(
        &self,
        account_id: &AccountId,
        current_capital: Decimal,
        total_assets: Decimal,
        position_value: Decimal,
    ) -> StoreResult<bool> {
        let mut warm_ok = false;
        if let Some(warm) = &self.warm {
            match warm
                .update_account_capital(account_id, current_capital, total_assets, position_value)
                .await
            {
                Ok(v) => warm_ok = v,
                Err(e) => error!(backend = "warm", operation = "update_account_capital", error = %e, "write failed"),
            }
        }
        if self.dual_write || !warm_ok {
            match self
                .file
                .update_account_capital(account_id, current_capital, total_assets, position_value)
                .await
            {
                Ok(file_ok) => return Ok(warm_ok || file_ok),
                Err(e) if warm_ok => {
                    error!(backend = "file", operation = "update_account_capital", error = %e, "write failed");
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(warm_ok)
    }
}

#[async_trait]
impl StrategyStore for HybridStore {
    async fn create_strategy(
        &self,
        strategy_name: &str,
        strategy_code: &str,
        strategy_type: StrategyType,
        version: &str,
        description: Option<&str>,
    ) -> StoreResult<bool> {
        if let Some(warm) = &self.warm {
            match warm.create_strategy(strategy_name, strategy_code, strategy_type, version, description).await {
                Ok(created) => {
                    if created && self.dual_write
                        && let Err(e) = self
                            .file
                            .create_strategy(strategy_name, strategy_code, strategy_type, version, description)
                            .await
                    {
                        error!(backend = "file", operation = "create_strategy", error = %e, "dual-write mirror failed");
                    }
                    return Ok(created);
                }
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "create_strategy", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file
            .create_strategy(strategy_name, strategy_code, strategy_type, version, description)
            .await
    }

    async fn get_strategy(&self, strategy_code: &str) -> StoreResult<Option<Strategy>> {
        if let Some(warm) = &self.warm {
            match warm.get_strategy(strategy_code).await {
                Ok(Some(s)) => return Ok(Some(s)),
                Ok(None) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "get_strategy", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_strategy(strategy_code).await
    }

    async fn get_strategy_params(&self, strategy_code: &str) -> StoreResult<Option<ParamMap>> {
        if let Some(warm) = &self.warm {
            match warm.get_strategy_params(strategy_code).await {
                Ok(Some(p)) => return Ok(Some(p)),
                Ok(None) => {}
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "get_strategy_params", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.get_strategy_params(strategy_code).await
    }

    async fn save_strategy_params(&self, strategy_code: &str, params: &ParamMap) -> StoreResult<bool> {
        let mut warm_ok = false;
        if let Some(warm) = &self.warm {
            match warm.save_strategy_params(strategy_code, params).await {
                Ok(v) => warm_ok = v,
                Err(e) => error!(backend = "warm", operation = "save_strategy_params", error = %e, "write failed"),
            }
        }
        if self.dual_write || !warm_ok {
            match self.file.save_strategy_params(strategy_code, params).await {
                Ok(file_ok) => return Ok(warm_ok || file_ok),
                Err(e) if warm_ok => {
                    error!(backend = "file", operation = "save_strategy_params", error = %e, "write failed");
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(warm_ok)
    }

    async fn compare_strategy_params(&self, strategy_code: &str, new_params: &ParamMap) -> StoreResult<ParamDiff> {
        if let Some(warm) = &self.warm {
            match warm.compare_strategy_params(strategy_code, new_params).await {
                Ok(diff) => return Ok(diff),
                Err(e) if self.auto_fallback => {
                    warn!(backend = "warm", operation = "compare_strategy_params", error = %e, "degraded to file tier");
                }
                Err(e) => return Err(e),
            }
        }
        self.file.compare_strategy_params(strategy_code, new_params).await
    }
}

#[async_trait]
impl HealthCheck for HybridStore {
    /// Aggregates every configured backend's health, but availability is
    /// ultimately gated on the file tier alone — the same guarantee
    /// `hybrid_store.py::health_check` makes.
    async fn health_check(&self) -> bool {
        if let Some(hot) = &self.hot
            && !hot.health_check().await
        {
            warn!(backend = "hot", "health check failed");
        }
        if let Some(warm) = &self.warm
            && !warm.health_check().await
        {
            warn!(backend = "warm", "health check failed");
        }
        if let Some(cool) = &self.cool
            && !cool.health_check().await
        {
            warn!(backend = "cool", "health check failed");
        }
        self.file.health_check().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.file.close().await?;
        if let Some(hot) = &self.hot {
            hot.close().await?;
        }
        if let Some(warm) = &self.warm {
            warm.close().await?;
        }
        if let Some(cool) = &self.cool {
            cool.close().await?;
        }
        Ok(())
    }
}
