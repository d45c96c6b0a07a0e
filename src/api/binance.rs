use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Exchange, RetryPolicy};
use crate::models::{
    AssetBalance, BookLevel, MarketSummary, OpenOrder, OrderBook, OrderReceipt, OrderSide,
    OrderState, OrderStatus,
};
use crate::Result;

const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Client for the Binance REST API.
///
/// Request signing and rate limiting are out of scope; the API key is sent
/// as a header and the operator is expected to run one instance per
/// account on a slow cron cadence.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceRaw>,
}

#[derive(Debug, Deserialize)]
struct BalanceRaw {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    order_id: u64,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    #[serde(default)]
    order_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRaw {
    symbol: String,
    order_id: u64,
    price: String,
    orig_qty: String,
    status: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    ask_price: String,
    quote_volume: String,
}

// ============== Implementation ==============

impl BinanceClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: BINANCE_API_BASE.to_string(),
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    fn order_from_raw(raw: OrderRaw) -> Result<OrderStatus> {
        Ok(OrderStatus {
            order_id: raw.order_id.to_string(),
            market: raw.symbol,
            side: OrderSide::from_wire(&raw.side)
                .ok_or_else(|| format!("unknown order side: {}", raw.side))?,
            state: OrderState::from_wire(&raw.status)
                .ok_or_else(|| format!("unknown order status: {}", raw.status))?,
            price: raw.price.parse()?,
            quantity: raw.orig_qty.parse()?,
        })
    }

    async fn place_order(
        &self,
        market: &str,
        side: &str,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReceipt> {
        let url = format!(
            "{}/api/v3/order?symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={:.8}",
            self.base_url, market, side, quantity, price
        );

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let placed: NewOrderResponse = response.json().await?;

        Ok(OrderReceipt {
            order_id: placed.order_id.to_string(),
            state: OrderState::from_wire(&placed.status)
                .ok_or_else(|| format!("unknown order status: {}", placed.status))?,
        })
    }

    async fn fetch_open_orders_once(&self) -> Result<Vec<OpenOrder>> {
        let raws: Vec<OrderRaw> = self.get_json("/api/v3/openOrders").await?;

        let mut orders = Vec::with_capacity(raws.len());
        for raw in raws {
            orders.push(OpenOrder {
                order_id: raw.order_id.to_string(),
                market: raw.symbol,
                side: OrderSide::from_wire(&raw.side)
                    .ok_or_else(|| format!("unknown order side: {}", raw.side))?,
                order_type: raw.order_type,
                price: raw.price.parse()?,
                quantity: raw.orig_qty.parse()?,
            });
        }

        Ok(orders)
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance> {
        let account: AccountResponse = self.get_json("/api/v3/account").await?;

        let raw = account
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| format!("no balance entry for asset {}", asset))?;

        Ok(AssetBalance {
            asset: raw.asset,
            free: raw.free.parse()?,
            locked: raw.locked.parse()?,
        })
    }

    async fn get_order_book(&self, market: &str, depth: u32) -> Result<OrderBook> {
        let depth: DepthResponse = self
            .get_json(&format!("/api/v3/depth?symbol={}&limit={}", market, depth))
            .await?;

        let parse_levels = |levels: Vec<[String; 2]>| -> Result<Vec<BookLevel>> {
            levels
                .into_iter()
                .map(|[price, quantity]| {
                    Ok(BookLevel {
                        price: price.parse()?,
                        quantity: quantity.parse()?,
                    })
                })
                .collect()
        };

        Ok(OrderBook {
            bids: parse_levels(depth.bids)?,
            asks: parse_levels(depth.asks)?,
        })
    }

    async fn place_limit_buy(
        &self,
        market: &str,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReceipt> {
        self.place_order(market, "BUY", quantity, price).await
    }

    async fn place_limit_sell(
        &self,
        market: &str,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReceipt> {
        self.place_order(market, "SELL", quantity, price).await
    }

    async fn get_order(&self, market: &str, order_id: &str) -> Result<OrderStatus> {
        let raw: OrderRaw = self
            .get_json(&format!(
                "/api/v3/order?symbol={}&orderId={}",
                market, order_id
            ))
            .await?;
        Self::order_from_raw(raw)
    }

    async fn cancel_order(&self, market: &str, order_id: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/api/v3/order?symbol={}&orderId={}",
            self.base_url, market, order_id
        );

        let response = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let cancelled: CancelResponse = response.json().await?;

        Ok(cancelled.order_id.map(|id| id.to_string()))
    }

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
        // The open-orders feed is the one read path that intermittently
        // returns undecodable bodies; retry it on a fixed delay before
        // abandoning the cycle.
        self.retry
            .run("open orders", || self.fetch_open_orders_once())
            .await
    }

    async fn get_market_summaries(&self) -> Result<HashMap<String, MarketSummary>> {
        let tickers: Vec<Ticker24h> = self.get_json("/api/v3/ticker/24hr").await?;

        let mut summaries = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            summaries.insert(
                ticker.symbol.clone(),
                MarketSummary {
                    market: ticker.symbol,
                    ask: ticker.ask_price.parse()?,
                    volume_24h: ticker.quote_volume.parse()?,
                },
            );
        }

        Ok(summaries)
    }

    async fn get_order_history(&self, market: &str) -> Result<Vec<OrderStatus>> {
        let raws: Vec<OrderRaw> = self
            .get_json(&format!("/api/v3/allOrders?symbol={}", market))
            .await?;
        raws.into_iter().map(Self::order_from_raw).collect()
    }

    fn name(&self) -> &str {
        "binance"
    }
}
