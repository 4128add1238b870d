//! Cross-tier consistency checks (`verify_consistency.py`): compares
//! the file tier against each database tier and reports mismatches.
//! Exit code is the caller's responsibility (0 iff every check passes).

use crate::domain::errors::StoreResult;
use crate::domain::store::AccountStore;
use crate::domain::types::AccountId;
use crate::infrastructure::{CoolStore, FileStore, HotStore, WarmStore};

/// One check's outcome: pass/fail plus up to the first 10 concrete
/// mismatches, matching the original script's truncated report.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub name: String,
    pub consistent: bool,
    pub inconsistencies: Vec<String>,
}

impl ConsistencyReport {
    fn new(name: &str, inconsistencies: Vec<String>) -> Self {
        Self { name: name.to_string(), consistent: inconsistencies.is_empty(), inconsistencies }
    }

    pub fn print(&self) {
        if self.consistent {
            println!("[{}] consistent", self.name);
            return;
        }
        println!("[{}] {} inconsistencies:", self.name, self.inconsistencies.len());
        for line in self.inconsistencies.iter().take(10) {
            println!("  - {line}");
        }
        if self.inconsistencies.len() > 10 {
            println!("  ... {} more", self.inconsistencies.len() - 10);
        }
    }
}

/// Held days: File vs HOT, key-by-key.
pub async fn verify_positions(file: &FileStore, hot: &HotStore, account: &AccountId) -> StoreResult<ConsistencyReport> {
    let file_data = file.read_held_days_map().await?;
    let hot_data = hot.read_held_days_map(account).await?;

    let mut codes: Vec<&String> = file_data.keys().chain(hot_data.keys()).collect();
    codes.sort();
    codes.dedup();

    let mismatches: Vec<String> = codes
        .into_iter()
        .filter_map(|code| {
            let f = file_data.get(code);
            let h = hot_data.get(code);
            if f != h { Some(format!("held_days[{code}]: file={f:?} hot={h:?}")) } else { None }
        })
        .collect();

    Ok(ConsistencyReport::new("held_days", mismatches))
}

/// Trade row count: File CSV vs COOL, for `account`.
pub async fn verify_trade_counts(file: &FileStore, cool: &CoolStore, account: &AccountId) -> StoreResult<ConsistencyReport> {
    let file_count = file.count_trade_rows().await?;
    let cool_count = cool.count_trades(account).await?;

    let mismatches = if file_count != cool_count {
        vec![format!("trade row count: file={file_count} cool={cool_count}")]
    } else {
        Vec::new()
    };
    Ok(ConsistencyReport::new("trade_records", mismatches))
}

/// Account presence and field equality: File vs WARM.
pub async fn verify_accounts(file: &FileStore, warm: &WarmStore, account_id: &AccountId) -> StoreResult<ConsistencyReport> {
    let file_account = file.get_account(account_id).await?;
    let warm_account = warm.get_account(account_id).await?;

    let mismatches = match (&file_account, &warm_account) {
        (None, None) => Vec::new(),
        (Some(_), None) => vec![format!("account {account_id} present in file but missing in warm")],
        (None, Some(_)) => vec![format!("account {account_id} present in warm but missing in file")],
        (Some(f), Some(w)) => {
            let mut diffs = Vec::new();
            if f.account_name != w.account_name {
                diffs.push(format!("account_name: file={} warm={}", f.account_name, w.account_name));
            }
            if f.broker != w.broker {
                diffs.push(format!("broker: file={} warm={}", f.broker, w.broker));
            }
            diffs
        }
    };
    Ok(ConsistencyReport::new("accounts", mismatches))
}
