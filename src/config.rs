use std::path::Path;

use serde::Deserialize;

use crate::analyzer::MarketFilters;
use crate::execution::TradeSizing;
use crate::Result;

/// Per-account configuration, loaded from a TOML file with
/// `SURGEBOT_`-prefixed environment overrides. The core treats all of it
/// as read-only input.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub exchange: ExchangeConfig,
    pub filters: FilterConfig,
    pub trade: TradeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Label buy records are keyed by.
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Env var holding the API key, resolved at runtime.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for tests and alternative endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Currency trades are sized in.
    #[serde(default = "default_base_asset")]
    pub base_asset: String,
    /// Trade fee percentage charged by the exchange.
    pub fee_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Coins we wish to avoid.
    #[serde(default)]
    pub ignore_by_in: Vec<String>,
    /// Excludes markets not denominated in the base currency.
    #[serde(default)]
    pub ignore_by_find: Vec<String>,
    pub min_volume: f64,
    pub min_price: f64,
    pub max_orders_per_market: usize,
    pub min_gain: f64,
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfig {
    pub deposit: f64,
    pub trade_pct: f64,
    pub preserve: f64,
    pub takeprofit_pct: f64,
}

fn default_api_key_env() -> String {
    "BINANCE_API_KEY".to_string()
}

fn default_base_asset() -> String {
    "BTC".to_string()
}

impl AppConfig {
    /// Load one account's configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("SURGEBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var(&self.exchange.api_key_env)
            .map_err(|_| format!("{} not found in environment", self.exchange.api_key_env).into())
    }

    pub fn market_filters(&self) -> MarketFilters {
        MarketFilters {
            ignore_by_in: self.filters.ignore_by_in.clone(),
            ignore_by_find: self.filters.ignore_by_find.clone(),
            min_volume: self.filters.min_volume,
            min_price: self.filters.min_price,
            max_orders_per_market: self.filters.max_orders_per_market,
        }
    }

    pub fn trade_sizing(&self) -> TradeSizing {
        TradeSizing {
            deposit: self.trade.deposit,
            trade_pct: self.trade.trade_pct,
            preserve_floor: self.trade.preserve,
            fee_pct: self.exchange.fee_pct,
        }
    }
}
