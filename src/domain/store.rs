//! Store Interface (spec.md §4.1, C1).
//!
//! One trait per operation class, following the interface-polymorphism
//! redesign in spec.md §9: each tier implements only the traits natural to
//! it, and the hybrid dispatcher implements all of them. `Store` is the
//! uniform handle callers hold.

use crate::domain::errors::StoreResult;
use crate::domain::types::{
    Account, AccountId, AggregateGroupBy, Broker, Candle, InstrumentCode, ParamDiff, ParamMap,
    OrderType, Strategy, StrategyType, TradeAggregate, TradeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// HOT-class per-account, per-instrument position state.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<u32>>;

    /// Precondition: `days >= 0` (enforced by the `u32` type at the API
    /// boundary; callers constructing from external input should validate
    /// before calling). Overwrites any existing value.
    async fn update_held_days(
        &self,
        code: &InstrumentCode,
        account: &AccountId,
        days: u32,
    ) -> StoreResult<()>;

    /// Idempotent: succeeds even when no record exists for `code`.
    async fn delete_held_days(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<()>;

    /// Initializes each code to held_days = 0. Overwrites existing keys to
    /// 0 — the resolved Open Question from spec.md §9/§4.2.
    async fn batch_new_held(&self, account: &AccountId, codes: &[InstrumentCode]) -> StoreResult<()>;

    /// Atomic, idempotent once-per-calendar-day increment of every
    /// holding-days entry for `account`. Returns `true` iff it performed
    /// the increment (see spec.md §5 for the concurrency contract).
    async fn all_held_inc(&self, account: &AccountId) -> StoreResult<bool>;

    async fn get_max_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>>;
    async fn update_max_price(
        &self,
        code: &InstrumentCode,
        account: &AccountId,
        price: Decimal,
    ) -> StoreResult<()>;
    async fn get_min_price(&self, code: &InstrumentCode, account: &AccountId) -> StoreResult<Option<Decimal>>;
    async fn update_min_price(
        &self,
        code: &InstrumentCode,
        account: &AccountId,
        price: Decimal,
    ) -> StoreResult<()>;
}

/// COOL-class append-only trade ledger.
#[async_trait]
pub trait TradeStore: Send + Sync {
    #[allow(clippy::too_many_arguments)]
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
    ) -> StoreResult<()>;

    /// Returns rows ordered by timestamp DESC, filtered by the AND of all
    /// present predicates. Never returns rows outside `[start, end]`.
    async fn query_trades(
        &self,
        account: &AccountId,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        code: Option<&InstrumentCode>,
    ) -> StoreResult<Vec<TradeRecord>>;

    async fn aggregate_trades(
        &self,
        account: &AccountId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        group_by: AggregateGroupBy,
    ) -> StoreResult<Vec<TradeAggregate>>;
}

/// Daily OHLCV candle data.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn get_kline(
        &self,
        code: &InstrumentCode,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> StoreResult<Vec<Candle>>;

    /// Caller should keep `codes.len()` reasonable (recommended <= 100);
    /// this is advisory, not enforced.
    async fn batch_get_kline(
        &self,
        codes: &[InstrumentCode],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> StoreResult<HashMap<InstrumentCode, Vec<Candle>>>;
}

/// WARM-class account administration.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Returns `Ok(false)` (not an error) if `account_id` already exists.
    async fn create_account(
        &self,
        account_id: &AccountId,
        account_name: &str,
        broker: Broker,
        initial_capital: Decimal,
    ) -> StoreResult<bool>;

    async fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>>;

    async fn update_account_capital(
        &self,
        account_id: &AccountId,
        current_capital: Decimal,
        total_assets: Decimal,
        position_value: Decimal,
    ) -> StoreResult<bool>;
}

/// WARM-class strategy administration and versioned parameters.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn create_strategy(
        &self,
        strategy_name: &str,
        strategy_code: &str,
        strategy_type: StrategyType,
        version: &str,
        description: Option<&str>,
    ) -> StoreResult<bool>;

    async fn get_strategy(&self, strategy_code: &str) -> StoreResult<Option<Strategy>>;

    /// Active-version parameter set. `None` if the strategy itself is
    /// unknown; an empty map if the strategy exists but has no params.
    async fn get_strategy_params(&self, strategy_code: &str) -> StoreResult<Option<ParamMap>>;

    /// Version rollover: deactivates all currently-active rows for this
    /// strategy and inserts `params` at `version = max + 1`, active.
    /// Returns `false` if the strategy is unknown.
    async fn save_strategy_params(&self, strategy_code: &str, params: &ParamMap) -> StoreResult<bool>;

    /// Set-algebra diff of the current active params against `new_params`.
    async fn compare_strategy_params(
        &self,
        strategy_code: &str,
        new_params: &ParamMap,
    ) -> StoreResult<ParamDiff>;
}

/// Per-backend health probe and resource release.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> bool;

    /// Idempotent; safe to call more than once.
    async fn close(&self) -> StoreResult<()>;
}

/// The uniform handle callers hold: every operation class plus health.
/// Only the hybrid dispatcher implements this in full; single tiers
/// implement the subset natural to them and are composed by the
/// dispatcher, not used directly as a `Store` by callers.
pub trait Store: PositionStore + TradeStore + CandleStore + AccountStore + StrategyStore + HealthCheck {}

impl<T> Store for T where T: PositionStore + TradeStore + CandleStore + AccountStore + StrategyStore + HealthCheck {}
