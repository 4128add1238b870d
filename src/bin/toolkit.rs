//! Migration & verification CLI (spec.md §4.7/§6), exposing each
//! toolkit operation as a subcommand the way `rustrade`'s `src/bin/*.rs`
//! each wrap one operational concern behind a `#[derive(Parser)]` struct.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tiered_store::config::Config;
use tiered_store::infrastructure::{CoolStore, FileStore, HotStore, WarmStore};
use tiered_store::toolkit::{export, migrate, print_header, verify};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about = "Tiered storage migration & verification toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// JSON position marks (held days, max/min price) -> HOT tier
    MigratePositions {
        #[arg(long, default_value = "55009728")]
        account_id: String,
        #[arg(long, default_value = "100")]
        batch_size: usize,
        /// Override the file tier's cache directory (source of the JSON marks)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Preview the migration without writing to HOT
        #[arg(long)]
        dry_run: bool,
    },
    /// Trade CSV -> COOL tier
    MigrateTrades {
        #[arg(long, default_value = "55009728")]
        account_id: String,
        #[arg(long, default_value = "1000")]
        batch_size: usize,
        /// Override the file tier's cache directory (source of the trade CSV)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Preview the migration without writing to COOL
        #[arg(long)]
        dry_run: bool,
    },
    /// Candle CSV directory -> COOL tier
    MigrateKlines {
        /// Directory of per-instrument candle CSV files
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "10000")]
        batch_size: usize,
        /// Preview the migration without writing to COOL
        #[arg(long)]
        dry_run: bool,
    },
    /// Accounts file -> WARM tier
    MigrateAccounts {
        /// Override the file tier's cache directory (source of accounts.json)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Preview the migration without writing to WARM
        #[arg(long)]
        dry_run: bool,
    },
    /// Strategies file -> WARM tier
    MigrateStrategies {
        /// Override the file tier's cache directory (source of strategies)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Preview the migration without writing to WARM
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare file tier against each configured database tier
    Verify {
        #[arg(long, default_value = "55009728")]
        account_id: String,
        /// Override the file tier's cache directory (the source of truth compared against)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Dump database tiers back into the file layout
    Export {
        #[arg(long, default_value = "55009728")]
        account_id: String,
        /// Override the file tier's cache directory (destination of the dump)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Probe every configured tier and print its status
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let file_store = |dir: Option<PathBuf>| FileStore::new(dir.unwrap_or_else(|| config.file.cache_dir.clone()));

    match cli.command {
        Commands::MigratePositions { account_id, batch_size, input, dry_run } => {
            print_header("migrate_positions: JSON -> HOT");
            let file = file_store(input);
            let hot = if dry_run { None } else { Some(HotStore::connect(&config.hot.redis_url).await?) };
            let report = migrate::migrate_positions(&file, hot.as_ref(), &account_id, batch_size).await?;
            report.print_summary(if dry_run { "migrate_positions (dry run)" } else { "migrate_positions" });
            std::process::exit(if report.failed == 0 { 0 } else { 1 });
        }
        Commands::MigrateTrades { account_id, batch_size, input, dry_run } => {
            print_header("migrate_trades: CSV -> COOL");
            let file = file_store(input);
            let cool = if dry_run {
                None
            } else {
                Some(
                    CoolStore::connect(
                        &config.cool.clickhouse_url,
                        &config.cool.database,
                        &config.cool.user,
                        &config.cool.password,
                    )
                    .await?,
                )
            };
            let report = migrate::migrate_trades(&file, cool.as_ref(), &account_id, batch_size).await?;
            report.print_summary(if dry_run { "migrate_trades (dry run)" } else { "migrate_trades" });
            std::process::exit(if report.failed == 0 { 0 } else { 1 });
        }
        Commands::MigrateKlines { input, batch_size, dry_run } => {
            print_header("migrate_klines: CSV directory -> COOL");
            let cool = if dry_run {
                None
            } else {
                Some(
                    CoolStore::connect(
                        &config.cool.clickhouse_url,
                        &config.cool.database,
                        &config.cool.user,
                        &config.cool.password,
                    )
                    .await?,
                )
            };
            let report = migrate::migrate_klines(&input, cool.as_ref(), batch_size).await?;
            report.print_summary(if dry_run { "migrate_klines (dry run)" } else { "migrate_klines" });
            std::process::exit(if report.failed == 0 { 0 } else { 1 });
        }
        Commands::MigrateAccounts { input, dry_run } => {
            print_header("migrate_accounts: file -> WARM");
            let file = file_store(input);
            let warm = if dry_run {
                None
            } else {
                Some(WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await?)
            };
            let report = migrate::migrate_accounts(&file, warm.as_ref()).await?;
            report.print_summary(if dry_run { "migrate_accounts (dry run)" } else { "migrate_accounts" });
            std::process::exit(if report.failed == 0 { 0 } else { 1 });
        }
        Commands::MigrateStrategies { input, dry_run } => {
            print_header("migrate_strategies: file -> WARM");
            let file = file_store(input);
            let warm = if dry_run {
                None
            } else {
                Some(WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await?)
            };
            let report = migrate::migrate_strategies(&file, warm.as_ref()).await?;
            report.print_summary(if dry_run { "migrate_strategies (dry run)" } else { "migrate_strategies" });
            std::process::exit(if report.failed == 0 { 0 } else { 1 });
        }
        Commands::Verify { account_id, input } => {
            print_header("verify_consistency: file vs database tiers");
            let file = file_store(input);
            let hot = HotStore::connect(&config.hot.redis_url).await.ok();
            let warm = WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await.ok();
            let cool = CoolStore::connect(
                &config.cool.clickhouse_url,
                &config.cool.database,
                &config.cool.user,
                &config.cool.password,
            )
            .await
            .ok();

            let mut all_consistent = true;
            if let Some(hot) = &hot {
                let report = verify::verify_positions(&file, hot, &account_id).await?;
                all_consistent &= report.consistent;
                report.print();
            }
            if let Some(cool) = &cool {
                let report = verify::verify_trade_counts(&file, cool, &account_id).await?;
                all_consistent &= report.consistent;
                report.print();
            }
            if let Some(warm) = &warm {
                let report = verify::verify_accounts(&file, warm, &account_id).await?;
                all_consistent &= report.consistent;
                report.print();
            }
            std::process::exit(if all_consistent { 0 } else { 1 });
        }
        Commands::Export { account_id, output } => {
            print_header("export_to_file: database tiers -> file");
            let file = file_store(output);
            if let Ok(hot) = HotStore::connect(&config.hot.redis_url).await {
                let n = export::export_positions(&hot, &file, &account_id).await?;
                println!("exported {n} position records");
            }
            if let Ok(cool) = CoolStore::connect(
                &config.cool.clickhouse_url,
                &config.cool.database,
                &config.cool.user,
                &config.cool.password,
            )
            .await
            {
                let n = export::export_trades(&cool, &file, &account_id).await?;
                println!("exported {n} trade records");
            }
            if let Ok(warm) = WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await {
                let codes = file.list_strategy_codes().await?;
                let n = export::export_accounts_and_strategies(&warm, &file, &[account_id.clone()], &codes).await?;
                println!("exported {n} account/strategy records");
            }
        }
        Commands::Health => {
            print_header("health: per-tier status");
            use tiered_store::domain::store::HealthCheck;
            let file = file_store(None);
            println!("file: {}", file.health_check().await);
            match HotStore::connect(&config.hot.redis_url).await {
                Ok(hot) => println!("hot: {}", hot.health_check().await),
                Err(e) => println!("hot: unavailable ({e})"),
            }
            match WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await {
                Ok(warm) => println!("warm: {}", warm.health_check().await),
                Err(e) => println!("warm: unavailable ({e})"),
            }
            match CoolStore::connect(
                &config.cool.clickhouse_url,
                &config.cool.database,
                &config.cool.user,
                &config.cool.password,
            )
            .await
            {
                Ok(cool) => println!("cool: {}", cool.health_check().await),
                Err(e) => println!("cool: unavailable ({e})"),
            }
        }
    }

    Ok(())
}
