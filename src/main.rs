use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;

use surgebot::analyzer::{self, GainCache};
use surgebot::api::{BinanceClient, Exchange};
use surgebot::config::AppConfig;
use surgebot::db::Store;
use surgebot::execution::BuyExecutor;
use surgebot::profit::ProfitManager;
use surgebot::sampler;
use surgebot::Result;

/// Tasks are ordered the way a cron schedule would run them: download
/// every polling interval, then buy, then take-profit, with the cancel
/// and liquidate tasks for operator intervention.
#[derive(Parser)]
#[command(name = "surgebot", version, about = "Buys hourly surges and manages profit-target sells")]
struct Cli {
    /// Account config file; repeat the flag to process several accounts.
    #[arg(long = "config", global = true, default_value = "surgebot.toml")]
    configs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record current ask prices for all markets into the price store.
    Download,
    /// Rank recent gains and buy the top surging coins per account.
    Buy,
    /// Issue limit sells at the profit target for filled buys.
    TakeProfit,
    /// Cancel all open limit sells so take-profit can re-issue them.
    CancelSells,
    /// Cancel one sell order by its exchange id.
    CancelSellId { sell_id: String },
    /// Liquidate: cancel open sells, then sell holdings at the top bid.
    SellAll,
    /// List all open orders.
    OpenOrders,
    /// List order history for one market.
    OrderHistory { market: String },
    /// Show the status of one order.
    GetOrder { market: String, order_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://surgebot.db?mode=rwc".to_string());
    let store = Store::connect(&database_url).await?;

    let accounts = load_accounts(&cli.configs)?;

    match cli.command {
        Command::Download => {
            // Any account's credentials will do for the public feed.
            let cfg = accounts
                .choose(&mut rand::thread_rng())
                .ok_or("no account configs")?;
            let client = client_for(cfg)?;
            sampler::record_prices(&client, &store).await?;
        }

        Command::Buy => {
            let mut accounts = accounts;
            accounts.shuffle(&mut rand::thread_rng());

            // One analysis per invocation, shared by every account in the
            // pass; the key changes each scheduling cycle.
            let mut cache = GainCache::new();
            let cycle_key = Utc::now().format("%Y-%m-%dT%H:%M").to_string();

            for cfg in &accounts {
                let client = client_for(cfg)?;

                let ranked = match cache.get(&cycle_key) {
                    Some(cached) => cached.to_vec(),
                    None => {
                        let summaries = client.get_market_summaries().await?;
                        let recent = store.recent_samples().await?;
                        let open_orders = client.get_open_orders().await?;
                        let ranked = analyzer::analyze_gain(
                            &summaries,
                            &recent,
                            &open_orders,
                            &cfg.market_filters(),
                        );
                        cache.put(cycle_key.clone(), ranked.clone());
                        ranked
                    }
                };

                let top =
                    analyzer::top_candidates(ranked, cfg.filters.min_gain, cfg.filters.top_n);

                tracing::info!("Buying coins for account {}", cfg.account.label);
                let executor = BuyExecutor::new(
                    &client,
                    &store,
                    cfg.trade_sizing(),
                    cfg.exchange.base_asset.clone(),
                );
                executor.execute(&cfg.account.label, &top).await?;
            }
        }

        Command::TakeProfit => {
            for cfg in &accounts {
                tracing::info!("Setting profit targets for {}", cfg.account.label);
                let client = client_for(cfg)?;
                let manager = ProfitManager::new(&client, &store);
                manager
                    .apply_targets(&cfg.account.label, cfg.trade.takeprofit_pct)
                    .await?;
            }
        }

        Command::CancelSells => {
            for cfg in &accounts {
                tracing::info!("Cancelling open sells for {}", cfg.account.label);
                let client = client_for(cfg)?;
                ProfitManager::new(&client, &store)
                    .cancel_all_open_sells()
                    .await?;
            }
        }

        Command::CancelSellId { sell_id } => {
            let cfg = accounts.first().ok_or("no account configs")?;
            let client = client_for(cfg)?;
            ProfitManager::new(&client, &store)
                .cancel_target(&sell_id)
                .await?;
        }

        Command::SellAll => {
            for cfg in &accounts {
                tracing::info!("Liquidating account {}", cfg.account.label);
                let client = client_for(cfg)?;
                ProfitManager::new(&client, &store)
                    .liquidate(&cfg.account.label)
                    .await?;
            }
        }

        Command::OpenOrders => {
            let cfg = accounts.first().ok_or("no account configs")?;
            let client = client_for(cfg)?;
            for order in client.get_open_orders().await? {
                println!(
                    "{} {} {:?} {} qty {} @ {:.8}",
                    order.order_id,
                    order.market,
                    order.side,
                    order.order_type,
                    order.quantity,
                    order.price
                );
            }
        }

        Command::OrderHistory { market } => {
            let cfg = accounts.first().ok_or("no account configs")?;
            let client = client_for(cfg)?;
            for order in client.get_order_history(&market).await? {
                println!(
                    "{} {:?} {:?} qty {} @ {:.8}",
                    order.order_id, order.side, order.state, order.quantity, order.price
                );
            }
        }

        Command::GetOrder { market, order_id } => {
            let cfg = accounts.first().ok_or("no account configs")?;
            let client = client_for(cfg)?;
            let order = client.get_order(&market, &order_id).await?;
            println!(
                "{} {} {:?} {:?} qty {} @ {:.8}",
                order.order_id, order.market, order.side, order.state, order.quantity, order.price
            );
        }
    }

    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "surgebot=info".to_string()),
        )
        .init();
}

fn load_accounts(paths: &[PathBuf]) -> Result<Vec<AppConfig>> {
    let mut accounts = Vec::with_capacity(paths.len());
    for path in paths {
        let cfg = AppConfig::load(path)?;
        tracing::debug!("Loaded account {} from {}", cfg.account.label, path.display());
        accounts.push(cfg);
    }
    Ok(accounts)
}

fn client_for(cfg: &AppConfig) -> Result<BinanceClient> {
    let api_key = cfg.resolve_api_key()?;
    let client = BinanceClient::new(api_key);
    Ok(match &cfg.exchange.base_url {
        Some(url) => client.with_base_url(url.clone()),
        None => client,
    })
}
