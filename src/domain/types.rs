//! Core value types shared by every tier.
//!
//! `AccountId` and `InstrumentCode` are kept as plain `String` aliases
//! (matching how `Order::symbol` is modeled upstream) rather than
//! newtypes — the tiers pass them around as opaque keys and never parse
//! structure out of them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type AccountId = String;
pub type InstrumentCode = String;

/// Per-(account, instrument) holding-day and price-mark state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub held_days: u32,
    pub max_price: Option<Decimal>,
    pub min_price: Option<Decimal>,
}

/// Order type recorded on a trade row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    BuyOrder,
    SellOrder,
    BuyTrade,
    SellTrade,
    Cancel,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::BuyOrder => "buy_order",
            OrderType::SellOrder => "sell_order",
            OrderType::BuyTrade => "buy_trade",
            OrderType::SellTrade => "sell_trade",
            OrderType::Cancel => "cancel",
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = crate::domain::errors::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy_order" => Ok(OrderType::BuyOrder),
            "sell_order" => Ok(OrderType::SellOrder),
            "buy_trade" => Ok(OrderType::BuyTrade),
            "sell_trade" => Ok(OrderType::SellTrade),
            "cancel" => Ok(OrderType::Cancel),
            other => Err(crate::domain::errors::StoreError::InvalidArgument(format!(
                "unknown order type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, append-only trade row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub code: InstrumentCode,
    pub name: String,
    pub order_type: OrderType,
    pub remark: String,
    pub price: Decimal,
    pub volume: u64,
    pub amount: Decimal,
    pub strategy_name: Option<String>,
}

impl TradeRecord {
    /// Builds a trade record, deriving `date` from `timestamp` and
    /// `amount` from `price * volume` rounded to 2dp, per spec invariant.
    pub fn new(
        account_id: AccountId,
        timestamp: DateTime<Utc>,
        code: InstrumentCode,
        name: String,
        order_type: OrderType,
        remark: String,
        price: Decimal,
        volume: u64,
        strategy_name: Option<String>,
    ) -> Self {
        let amount = (price * Decimal::from(volume)).round_dp(2);
        Self {
            account_id,
            timestamp,
            date: timestamp.date_naive(),
            code,
            name,
            order_type,
            remark,
            price: price.round_dp(3),
            volume,
            amount,
            strategy_name,
        }
    }
}

/// Grouping dimension for `TradeStore::aggregate_trades`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateGroupBy {
    Stock,
    Date,
    Month,
    Type,
}

impl std::str::FromStr for AggregateGroupBy {
    type Err = crate::domain::errors::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(AggregateGroupBy::Stock),
            "date" => Ok(AggregateGroupBy::Date),
            "month" => Ok(AggregateGroupBy::Month),
            "type" => Ok(AggregateGroupBy::Type),
            other => Err(crate::domain::errors::StoreError::InvalidArgument(format!(
                "unknown group_by: {other}"
            ))),
        }
    }
}

/// One row of an aggregated trade report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAggregate {
    pub key: String,
    pub count: u64,
    pub total_volume: u64,
    pub total_amount: Decimal,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub code: InstrumentCode,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub amount: Decimal,
}

impl Candle {
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Broker {
    Qmt,
    Gm,
    Tdx,
}

impl std::str::FromStr for Broker {
    type Err = crate::domain::errors::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QMT" => Ok(Broker::Qmt),
            "GM" => Ok(Broker::Gm),
            "TDX" => Ok(Broker::Tdx),
            other => Err(crate::domain::errors::StoreError::InvalidArgument(format!(
                "unknown broker: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Broker::Qmt => "QMT",
            Broker::Gm => "GM",
            Broker::Tdx => "TDX",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub account_id: AccountId,
    pub account_name: String,
    pub broker: Broker,
    pub initial_capital: Decimal,
    pub current_capital: Decimal,
    pub total_assets: Option<Decimal>,
    pub position_value: Option<Decimal>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Wencai,
    Remote,
    Technical,
}

impl std::str::FromStr for StrategyType {
    type Err = crate::domain::errors::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wencai" => Ok(StrategyType::Wencai),
            "remote" => Ok(StrategyType::Remote),
            "technical" => Ok(StrategyType::Technical),
            other => Err(crate::domain::errors::StoreError::InvalidArgument(format!(
                "unknown strategy type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Active,
    Testing,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub strategy_name: String,
    pub strategy_code: String,
    pub strategy_type: StrategyType,
    pub version: String,
    pub status: StrategyStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tagged value for a strategy parameter.
///
/// Booleans and containers serialize as the `Json` tag, integers and
/// floats keep their native numeric type, everything else is `Str` —
/// see spec.md §4.1 `SaveStrategyParams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
}

impl ParamValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::Json(_) => "json",
        }
    }

    /// Infers a `ParamValue` from an arbitrary JSON value, per the typing
    /// rule in spec.md §4.1: booleans/containers -> json, numbers keep
    /// their numeric kind, everything else -> string.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(_) | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                ParamValue::Json(value)
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParamValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    ParamValue::Float(f)
                } else {
                    ParamValue::Str(n.to_string())
                }
            }
            serde_json::Value::String(s) => ParamValue::Str(s),
            serde_json::Value::Null => ParamValue::Json(serde_json::Value::Null),
        }
    }

    pub fn serialize_for_storage(&self) -> String {
        match self {
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Str(s) => s.clone(),
            ParamValue::Json(v) => v.to_string(),
        }
    }

    pub fn deserialize_from_storage(tag: &str, raw: &str) -> Self {
        match tag {
            "int" => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .unwrap_or_else(|_| ParamValue::Str(raw.to_string())),
            "float" => raw
                .parse::<f64>()
                .map(ParamValue::Float)
                .unwrap_or_else(|_| ParamValue::Str(raw.to_string())),
            "json" => serde_json::from_str(raw)
                .map(ParamValue::Json)
                .unwrap_or_else(|_| ParamValue::Str(raw.to_string())),
            _ => ParamValue::Str(raw.to_string()),
        }
    }
}

pub type ParamMap = HashMap<String, ParamValue>;

/// Result of `StrategyStore::compare_strategy_params`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamDiff {
    pub added: HashMap<String, ParamValue>,
    pub modified: HashMap<String, (ParamValue, ParamValue)>,
    pub deleted: HashMap<String, ParamValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_record_derives_date_and_amount() {
        let ts = DateTime::parse_from_str("2025-01-10 09:30:00 +0000", "%Y-%m-%d %H:%M:%S %z")
            .unwrap()
            .with_timezone(&Utc);
        let trade = TradeRecord::new(
            "A1".to_string(),
            ts,
            "SH600000".to_string(),
            "浦发银行".to_string(),
            OrderType::BuyTrade,
            "open".to_string(),
            dec!(10.500),
            1000,
            None,
        );
        assert_eq!(trade.date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(trade.amount, dec!(10500.00));
    }

    #[test]
    fn candle_validity_checks_low_high_bounds() {
        let c = Candle {
            code: "SH600000".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            open: dec!(10),
            high: dec!(11),
            low: dec!(9),
            close: dec!(10.5),
            volume: 1000,
            amount: dec!(10000),
        };
        assert!(c.is_valid());
        let bad = Candle { low: dec!(12), ..c };
        assert!(!bad.is_valid());
    }

    #[test]
    fn param_value_infers_types_from_json() {
        assert_eq!(ParamValue::from_json(serde_json::json!(10)), ParamValue::Int(10));
        assert_eq!(
            ParamValue::from_json(serde_json::json!(10.5)),
            ParamValue::Float(10.5)
        );
        assert_eq!(
            ParamValue::from_json(serde_json::json!("x")),
            ParamValue::Str("x".to_string())
        );
        assert!(matches!(
            ParamValue::from_json(serde_json::json!(true)),
            ParamValue::Json(_)
        ));
        assert!(matches!(
            ParamValue::from_json(serde_json::json!([1, 2])),
            ParamValue::Json(_)
        ));
    }

    #[test]
    fn param_value_round_trips_through_storage() {
        let v = ParamValue::Int(42);
        let raw = v.serialize_for_storage();
        assert_eq!(ParamValue::deserialize_from_storage(v.type_tag(), &raw), v);
    }
}
