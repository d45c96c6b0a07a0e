use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ask-price observation for a market, appended every polling cycle.
/// Rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub market: String,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sell side of a buy record.
///
/// The legacy schema kept `selling_price` and `sell_id` as two nullable
/// columns with a both-or-neither invariant. Modeling them as one tagged
/// state makes a half-set row unrepresentable in memory; loading one from
/// the database is a storage error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SellState {
    Unsold,
    Listed { price: f64, sell_id: String },
}

/// A recorded coin purchase and the lifecycle of its profit-target sell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyRecord {
    pub id: i64,
    /// Account label the purchase belongs to (one config file per account).
    pub account: String,
    /// Exchange-issued id of the buy order.
    pub order_id: String,
    pub market: String,
    pub purchase_price: f64,
    pub amount: f64,
    pub sell: SellState,
    pub timestamp: DateTime<Utc>,
}

impl BuyRecord {
    /// A record is open for selling while no sell order is listed.
    pub fn is_unsold(&self) -> bool {
        self.sell == SellState::Unsold
    }
}

/// A market that passed the eligibility filters, ranked by one-interval gain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub market: String,
    pub gain_pct: f64,
    pub latest_ask: f64,
    pub previous_ask: f64,
    /// Human-facing chart link, carried along for logs and reports.
    pub url: String,
}

/// 24h summary for a market from the exchange ticker feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market: String,
    pub ask: f64,
    pub volume_24h: f64,
}

/// Free/locked balance of a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot. Bids and asks are sorted best-first as returned
/// by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

/// Exchange-reported lifecycle state of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderState {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderState::New),
            "PARTIALLY_FILLED" => Some(OrderState::PartiallyFilled),
            "FILLED" => Some(OrderState::Filled),
            "CANCELED" => Some(OrderState::Canceled),
            "REJECTED" => Some(OrderState::Rejected),
            "EXPIRED" => Some(OrderState::Expired),
            _ => None,
        }
    }
}

/// Immediate response to placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub state: OrderState,
}

/// Full status of an order as queried from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub state: OrderState,
    pub price: f64,
    pub quantity: f64,
}

/// An order the exchange still considers open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub order_type: String,
    pub price: f64,
    pub quantity: f64,
}
