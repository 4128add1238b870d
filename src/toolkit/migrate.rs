//! One-shot migrations: file tier → database tiers.
//!
//! Each function mirrors one `migrate_*.py` script: load the source
//! data, write it to the target tier in batches, and return a
//! [`MigrationReport`] for the caller to print.

use crate::domain::errors::StoreResult;
use crate::domain::store::{AccountStore, StrategyStore, TradeStore};
use crate::domain::types::{AccountId, Candle, InstrumentCode};
use crate::infrastructure::{CoolStore, FileStore, HotStore, WarmStore};
use crate::toolkit::MigrationReport;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Positions JSON → HOT (`migrate_held_days.py`): held days, max prices,
/// and min prices, each pipelined in batches of `batch_size`.
pub async fn migrate_positions(
    file: &FileStore,
    hot: Option<&HotStore>,
    account: &AccountId,
    batch_size: usize,
) -> StoreResult<MigrationReport> {
    let held_days = file.read_held_days_map().await?;
    let max_prices = file.read_max_prices_map().await?;
    let min_prices = file.read_min_prices_map().await?;
    let attempted = held_days.len() + max_prices.len() + min_prices.len();
    info!(attempted, dry_run = hot.is_none(), "migrate_positions: loaded source data");

    let Some(hot) = hot else {
        return Ok(MigrationReport { attempted, succeeded: attempted, failed: 0, elapsed: Duration::default() });
    };

    let start = Instant::now();
    let (s1, f1) = hot.write_held_days_batch(account, &held_days, batch_size).await;
    let (s2, f2) = hot.write_max_prices_batch(account, &max_prices, batch_size).await;
    let (s3, f3) = hot.write_min_prices_batch(account, &min_prices, batch_size).await;
    let elapsed = start.elapsed();

    Ok(MigrationReport { attempted, succeeded: s1 + s2 + s3, failed: f1 + f2 + f3, elapsed })
}

/// Trades CSV → COOL (`migrate_trade_records.py`): inserted in batches
/// of `batch_size` (1000 upstream).
pub async fn migrate_trades(
    file: &FileStore,
    cool: Option<&CoolStore>,
    account: &AccountId,
    batch_size: usize,
) -> StoreResult<MigrationReport> {
    let rows = file.query_trades(account, None, None, None).await?;
    let attempted = rows.len();
    info!(attempted, dry_run = cool.is_none(), "migrate_trades: loaded source rows");

    let Some(cool) = cool else {
        return Ok(MigrationReport { attempted, succeeded: attempted, failed: 0, elapsed: Duration::default() });
    };

    let start = Instant::now();
    let mut succeeded = 0;
    let mut failed = 0;
    for chunk in rows.chunks(batch_size.max(1)) {
        match cool.insert_trades_batch(chunk).await {
            Ok(n) => succeeded += n,
            Err(e) => {
                warn!(error = %e, batch_len = chunk.len(), "migrate_trades: batch insert failed");
                failed += chunk.len();
            }
        }
    }
    Ok(MigrationReport { attempted, succeeded, failed, elapsed: start.elapsed() })
}

/// Maps a candle CSV filename to the `InstrumentCode` it holds: either a
/// market-prefixed form (`SH600000.csv`) or a raw 6-digit form, in which
/// case the leading digit selects the market (`6` -> SH, `0`/`3` -> SZ).
pub fn derive_code_from_filename(path: &Path) -> Option<InstrumentCode> {
    let stem = path.file_stem()?.to_str()?;
    let digits_start = stem.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = stem.split_at(digits_start);
    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != 6 {
        return None;
    }
    let market = match prefix.to_uppercase().as_str() {
        "SH" => "SH",
        "SZ" => "SZ",
        "" => match digits.chars().next()? {
            '6' => "SH",
            '0' | '3' => "SZ",
            _ => return None,
        },
        _ => return None,
    };
    Some(format!("{market}{digits}"))
}

fn parse_candle_csv(code: &InstrumentCode, body: &str) -> Vec<Candle> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(body.as_bytes());
    let Ok(headers) = reader.headers().cloned() else { return Vec::new() };
    let idx = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(date_i), Some(open_i), Some(high_i), Some(low_i), Some(close_i), Some(volume_i)) =
        (idx("date"), idx("open"), idx("high"), idx("low"), idx("close"), idx("volume"))
    else {
        return Vec::new();
    };
    let amount_i = idx("amount");

    reader
        .records()
        .filter_map(|r| r.ok())
        .filter_map(|record| {
            let date = chrono::NaiveDate::parse_from_str(record.get(date_i)?, "%Y-%m-%d").ok()?;
            let open = Decimal::from_str(record.get(open_i)?.trim()).ok()?;
            let high = Decimal::from_str(record.get(high_i)?.trim()).ok()?;
            let low = Decimal::from_str(record.get(low_i)?.trim()).ok()?;
            let close = Decimal::from_str(record.get(close_i)?.trim()).ok()?;
            let volume: u64 = record.get(volume_i)?.trim().parse().ok()?;
            let amount = amount_i
                .and_then(|i| record.get(i))
                .and_then(|s| Decimal::from_str(s.trim()).ok())
                .unwrap_or_else(|| (close * Decimal::from(volume)).round_dp(2));
            Some(Candle { code: code.clone(), date, open, high, low, close, volume, amount })
        })
        .collect()
}

/// Candles CSV directory → COOL (`migrate_kline.py`): one batch insert
/// per file, `batch_size` rows at a time (10000 upstream).
pub async fn migrate_klines(
    data_dir: &Path,
    cool: Option<&CoolStore>,
    batch_size: usize,
) -> StoreResult<MigrationReport> {
    let mut entries = match tokio::fs::read_dir(data_dir).await {
        Ok(rd) => rd,
        Err(_) => return Ok(MigrationReport::default()),
    };
    let mut files: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    info!(file_count = files.len(), dry_run = cool.is_none(), "migrate_klines: found candle files");

    let start = Instant::now();
    let mut attempted = 0;
    let mut succeeded = 0;
    let mut failed = 0;

    for path in files {
        let Some(code) = derive_code_from_filename(&path) else {
            warn!(path = %path.display(), "migrate_klines: could not derive instrument code, skipping");
            continue;
        };
        let Ok(body) = tokio::fs::read_to_string(&path).await else {
            warn!(path = %path.display(), "migrate_klines: failed to read file, skipping");
            continue;
        };
        let candles = parse_candle_csv(&code, &body);
        attempted += candles.len();
        let Some(cool) = cool else {
            succeeded += candles.len();
            continue;
        };
        for chunk in candles.chunks(batch_size.max(1)) {
            match cool.insert_candles_batch(chunk).await {
                Ok(n) => succeeded += n,
                Err(e) => {
                    warn!(error = %e, code, "migrate_klines: batch insert failed");
                    failed += chunk.len();
                }
            }
        }
    }

    Ok(MigrationReport { attempted, succeeded, failed, elapsed: start.elapsed() })
}

/// Accounts file → WARM (`migrate_accounts.py`): idempotent, skips any
/// account id already present in WARM.
pub async fn migrate_accounts(file: &FileStore, warm: Option<&WarmStore>) -> StoreResult<MigrationReport> {
    let ids = file.list_account_ids().await?;
    let attempted = ids.len();
    info!(attempted, dry_run = warm.is_none(), "migrate_accounts: loaded source accounts");
    let Some(warm) = warm else {
        return Ok(MigrationReport { attempted, succeeded: attempted, failed: 0, elapsed: Duration::default() });
    };

    let start = Instant::now();
    let mut succeeded = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for id in ids {
        let Some(account) = file.get_account(&id).await? else { continue };
        match warm.create_account(&id, &account.account_name, account.broker, account.initial_capital).await {
            Ok(true) => succeeded += 1,
            Ok(false) => {
                info!(account_id = %id, "migrate_accounts: already exists, skipping");
                skipped += 1;
            }
            Err(e) => {
                warn!(account_id = %id, error = %e, "migrate_accounts: create failed");
                failed += 1;
            }
        }
    }

    Ok(MigrationReport { attempted, succeeded, failed: failed + skipped, elapsed: start.elapsed() })
}

/// Strategies file → WARM (`migrate_strategies.py`): creates the
/// strategy, then saves its initial parameter set at version 1.
pub async fn migrate_strategies(file: &FileStore, warm: Option<&WarmStore>) -> StoreResult<MigrationReport> {
    let codes = file.list_strategy_codes().await?;
    let attempted = codes.len();
    info!(attempted, dry_run = warm.is_none(), "migrate_strategies: loaded source strategies");
    let Some(warm) = warm else {
        return Ok(MigrationReport { attempted, succeeded: attempted, failed: 0, elapsed: Duration::default() });
    };

    let start = Instant::now();
    let mut succeeded = 0;
    let mut failed = 0;

    for code in codes {
        let Some(strategy) = file.get_strategy(&code).await? else { continue };
        let created = warm
            .create_strategy(
                &strategy.strategy_name,
                &strategy.strategy_code,
                strategy.strategy_type,
                &strategy.version,
                strategy.description.as_deref(),
            )
            .await;
        match created {
            Ok(false) => {
                info!(strategy_code = %code, "migrate_strategies: already exists, skipping");
                continue;
            }
            Err(e) => {
                warn!(strategy_code = %code, error = %e, "migrate_strategies: create failed");
                failed += 1;
                continue;
            }
            Ok(true) => {}
        }
        if let Some(params) = file.get_strategy_params(&code).await?
            && !params.is_empty()
        {
            if let Err(e) = warm.save_strategy_params(&code, &params).await {
                warn!(strategy_code = %code, error = %e, "migrate_strategies: save_params failed");
                failed += 1;
                continue;
            }
        }
        succeeded += 1;
    }

    Ok(MigrationReport { attempted, succeeded, failed, elapsed: start.elapsed() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_code_from_prefixed_filename() {
        assert_eq!(derive_code_from_filename(Path::new("SH600000.csv")).as_deref(), Some("SH600000"));
        assert_eq!(derive_code_from_filename(Path::new("sz000001.csv")).as_deref(), Some("SZ000001"));
    }

    #[test]
    fn derives_code_from_raw_six_digit_filename_by_leading_digit() {
        assert_eq!(derive_code_from_filename(Path::new("600519.csv")).as_deref(), Some("SH600519"));
        assert_eq!(derive_code_from_filename(Path::new("000858.csv")).as_deref(), Some("SZ000858"));
        assert_eq!(derive_code_from_filename(Path::new("300750.csv")).as_deref(), Some("SZ300750"));
    }

    #[test]
    fn rejects_unrecognized_filenames() {
        assert_eq!(derive_code_from_filename(Path::new("readme.csv")), None);
        assert_eq!(derive_code_from_filename(Path::new("12345.csv")), None);
    }

    #[test]
    fn parses_candle_csv_with_standard_header() {
        let body = "date,open,high,low,close,volume\n2024-01-02,10.0,10.5,9.8,10.2,1000000\n";
        let candles = parse_candle_csv(&"SH600000".to_string(), body);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].code, "SH600000");
        assert!(candles[0].is_valid());
    }
}
