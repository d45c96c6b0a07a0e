pub mod binance;

pub use binance::BinanceClient;

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use crate::models::{
    AssetBalance, MarketSummary, OpenOrder, OrderBook, OrderReceipt, OrderStatus,
};
use crate::Result;

/// Abstraction over the exchange the bot trades on.
///
/// One implementation talks to the real exchange over HTTP; tests supply
/// canned data. All calls are blocking from the caller's point of view and
/// carry no timeout semantics beyond the HTTP client's own.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Free/locked balance of a single asset.
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance>;

    /// Order book snapshot for a market, best levels first.
    async fn get_order_book(&self, market: &str, depth: u32) -> Result<OrderBook>;

    async fn place_limit_buy(&self, market: &str, quantity: f64, price: f64)
        -> Result<OrderReceipt>;

    async fn place_limit_sell(
        &self,
        market: &str,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReceipt>;

    /// Current status of a single order.
    async fn get_order(&self, market: &str, order_id: &str) -> Result<OrderStatus>;

    /// Cancel an order. Returns the confirmed order id, or `None` when the
    /// exchange did not acknowledge the cancellation with an id.
    async fn cancel_order(&self, market: &str, order_id: &str) -> Result<Option<String>>;

    /// All currently open orders across markets.
    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>>;

    /// 24h ticker summaries keyed by market name.
    async fn get_market_summaries(&self) -> Result<HashMap<String, MarketSummary>>;

    /// Order history for a market, oldest first.
    async fn get_order_history(&self, market: &str) -> Result<Vec<OrderStatus>>;

    /// Exchange name for logging.
    fn name(&self) -> &str;
}

/// Bounded retry with a fixed delay between attempts.
///
/// The exchange feed occasionally returns bodies that fail to decode; the
/// open-orders read path tolerates those by retrying a fixed number of
/// times, then abandoning the cycle.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt < self.max_attempts {
                        tracing::warn!(
                            "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                            what,
                            attempt,
                            self.max_attempts,
                            e,
                            self.delay
                        );
                        sleep(self.delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| format!("{}: all retry attempts failed", what).into()))
    }
}
