//! Database tiers → file layout, for disaster-recovery backups
//! (`export_to_file.py`): the reverse direction of [`super::migrate`].

use crate::domain::errors::StoreResult;
use crate::domain::store::{AccountStore, StrategyStore, TradeStore};
use crate::domain::types::AccountId;
use crate::infrastructure::{CoolStore, FileStore, HotStore, WarmStore};
use tracing::{info, warn};

/// HOT → file: dumps `held_days`/`max_prices`/`min_prices` for `account`
/// into the file tier's JSON documents, overwriting them.
pub async fn export_positions(hot: &HotStore, file: &FileStore, account: &AccountId) -> StoreResult<usize> {
    let held_days = hot.read_held_days_map(account).await?;
    let max_prices = hot.read_max_prices_map(account).await?;
    let min_prices = hot.read_min_prices_map(account).await?;
    let total = held_days.len() + max_prices.len() + min_prices.len();

    file.write_held_days_map(&held_days).await?;
    file.write_max_prices_map(&max_prices).await?;
    file.write_min_prices_map(&min_prices).await?;

    info!(account_id = %account, total, "export_positions: wrote held days and price marks to file tier");
    Ok(total)
}

/// COOL → file: dumps every trade row for `account` into `trades.csv`,
/// reusing [`TradeStore::record_trade`] one row at a time the way the
/// file tier's writer already guards against torn writes.
pub async fn export_trades(cool: &CoolStore, file: &FileStore, account: &AccountId) -> StoreResult<usize> {
    let rows = cool.query_trades(account, None, None, None).await?;
    for row in &rows {
        file.record_trade(
            &row.account_id,
            row.timestamp,
            &row.code,
            &row.name,
            row.order_type,
            &row.remark,
            row.price,
            row.volume,
            row.strategy_name.as_deref(),
        )
        .await?;
    }
    info!(account_id = %account, count = rows.len(), "export_trades: wrote trade rows to file tier");
    Ok(rows.len())
}

/// WARM → file: dumps every account and strategy (with its active
/// parameter set) into `accounts.json`/`strategies.json`.
pub async fn export_accounts_and_strategies(
    warm: &WarmStore,
    file: &FileStore,
    account_ids: &[AccountId],
    strategy_codes: &[String],
) -> StoreResult<usize> {
    let mut total = 0;

    for id in account_ids {
        match warm.get_account(id).await? {
            Some(account) => {
                file.create_account(id, &account.account_name, account.broker, account.initial_capital).await?;
                total += 1;
            }
            None => warn!(account_id = %id, "export_accounts_and_strategies: not found in WARM, skipping"),
        }
    }

    for code in strategy_codes {
        let Some(strategy) = warm.get_strategy(code).await? else {
            warn!(strategy_code = %code, "export_accounts_and_strategies: not found in WARM, skipping");
            continue;
        };
        file.create_strategy(
            &strategy.strategy_name,
            &strategy.strategy_code,
            strategy.strategy_type,
            &strategy.version,
            strategy.description.as_deref(),
        )
        .await?;
        if let Some(params) = warm.get_strategy_params(code).await?
            && !params.is_empty()
        {
            file.save_strategy_params(code, &params).await?;
        }
        total += 1;
    }

    info!(total, "export_accounts_and_strategies: wrote WARM data to file tier");
    Ok(total)
}
