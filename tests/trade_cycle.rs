use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use surgebot::api::Exchange;
use surgebot::db::Store;
use surgebot::execution::{BuyExecutor, TradeSizing};
use surgebot::models::{
    AssetBalance, BookLevel, Candidate, MarketSummary, OpenOrder, OrderBook, OrderReceipt,
    OrderSide, OrderState, OrderStatus, SellState,
};
use surgebot::profit::ProfitManager;
use surgebot::sampler;
use surgebot::Result;

/// Scripted exchange double: fixed balance and order book, configurable
/// fill/cancel behavior, records what gets placed.
struct MockExchange {
    free_balance: f64,
    asks: Vec<BookLevel>,
    bids: Vec<BookLevel>,
    fill_buys: bool,
    confirm_cancels: bool,
    summaries: HashMap<String, MarketSummary>,
    order_states: Mutex<HashMap<String, OrderState>>,
    open_orders: Mutex<Vec<OpenOrder>>,
    placed_sells: Mutex<Vec<(String, f64, f64)>>,
    next_id: AtomicU64,
}

impl MockExchange {
    fn new(free_balance: f64) -> Self {
        Self {
            free_balance,
            asks: vec![
                BookLevel {
                    price: 0.01,
                    quantity: 5.0,
                },
                BookLevel {
                    price: 0.02,
                    quantity: 5.0,
                },
            ],
            bids: vec![BookLevel {
                price: 0.0099,
                quantity: 10.0,
            }],
            fill_buys: true,
            confirm_cancels: true,
            summaries: HashMap::new(),
            order_states: Mutex::new(HashMap::new()),
            open_orders: Mutex::new(Vec::new()),
            placed_sells: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_order_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Rewrite an order's reported state (e.g. pretend a buy never filled).
    fn set_order_state(&self, order_id: &str, state: OrderState) {
        self.order_states
            .lock()
            .unwrap()
            .insert(order_id.to_string(), state);
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance> {
        Ok(AssetBalance {
            asset: asset.to_string(),
            free: self.free_balance,
            locked: 0.0,
        })
    }

    async fn get_order_book(&self, _market: &str, _depth: u32) -> Result<OrderBook> {
        Ok(OrderBook {
            bids: self.bids.clone(),
            asks: self.asks.clone(),
        })
    }

    async fn place_limit_buy(
        &self,
        _market: &str,
        _quantity: f64,
        _price: f64,
    ) -> Result<OrderReceipt> {
        let order_id = self.next_order_id();
        let state = if self.fill_buys {
            OrderState::Filled
        } else {
            OrderState::New
        };
        self.set_order_state(&order_id, state);
        Ok(OrderReceipt { order_id, state })
    }

    async fn place_limit_sell(
        &self,
        market: &str,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReceipt> {
        let order_id = self.next_order_id();
        self.set_order_state(&order_id, OrderState::New);
        self.placed_sells
            .lock()
            .unwrap()
            .push((market.to_string(), quantity, price));
        self.open_orders.lock().unwrap().push(OpenOrder {
            order_id: order_id.clone(),
            market: market.to_string(),
            side: OrderSide::Sell,
            order_type: "LIMIT".to_string(),
            price,
            quantity,
        });
        Ok(OrderReceipt {
            order_id,
            state: OrderState::New,
        })
    }

    async fn get_order(&self, market: &str, order_id: &str) -> Result<OrderStatus> {
        let state = *self
            .order_states
            .lock()
            .unwrap()
            .get(order_id)
            .ok_or_else(|| format!("unknown order {}", order_id))?;
        Ok(OrderStatus {
            order_id: order_id.to_string(),
            market: market.to_string(),
            side: OrderSide::Buy,
            state,
            price: 0.0,
            quantity: 0.0,
        })
    }

    async fn cancel_order(&self, _market: &str, order_id: &str) -> Result<Option<String>> {
        if !self.confirm_cancels {
            return Ok(None);
        }
        self.open_orders
            .lock()
            .unwrap()
            .retain(|o| o.order_id != order_id);
        Ok(Some(order_id.to_string()))
    }

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
        Ok(self.open_orders.lock().unwrap().clone())
    }

    async fn get_market_summaries(&self) -> Result<HashMap<String, MarketSummary>> {
        Ok(self.summaries.clone())
    }

    async fn get_order_history(&self, _market: &str) -> Result<Vec<OrderStatus>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn sizing() -> TradeSizing {
    TradeSizing {
        deposit: 1.0,
        trade_pct: 10.0,
        preserve_floor: 0.05,
        fee_pct: 0.05,
    }
}

fn candidate(market: &str) -> Candidate {
    Candidate {
        market: market.to_string(),
        gain_pct: 10.0,
        latest_ask: 0.02,
        previous_ask: 0.0182,
        url: format!("https://www.binance.com/en/trade/{}", market),
    }
}

#[tokio::test]
async fn test_filled_buy_is_recorded() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    let executor = BuyExecutor::new(&exchange, &store, sizing(), "BTC");
    executor
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let unsold = store.unsold_buys("main").await.unwrap();
    assert_eq!(unsold.len(), 1);
    assert_eq!(unsold[0].market, "XRPBTC");
    // Spend of ~0.1 BTC walks past the 0.01 level into the 0.02 level.
    assert_eq!(unsold[0].purchase_price, 0.02);
    assert!(unsold[0].is_unsold());
}

#[tokio::test]
async fn test_unfilled_buy_leaves_no_record() {
    let mut exchange = MockExchange::new(0.5);
    exchange.fill_buys = false;
    let store = Store::in_memory().await.unwrap();

    let executor = BuyExecutor::new(&exchange, &store, sizing(), "BTC");
    executor
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    assert!(store.unsold_buys("main").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_balance_means_no_trade() {
    let exchange = MockExchange::new(0.03); // below the preserve floor
    let store = Store::in_memory().await.unwrap();

    let executor = BuyExecutor::new(&exchange, &store, sizing(), "BTC");
    executor
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    assert!(store.unsold_buys("main").await.unwrap().is_empty());
}

/// The balance snapshot is taken once per pass and not refreshed between
/// candidates, so a multi-candidate pass can commit the same funds more
/// than once. Documented behavior, not a target for a silent fix.
#[tokio::test]
async fn test_balance_snapshot_shared_across_candidates() {
    let exchange = MockExchange::new(0.15);
    let store = Store::in_memory().await.unwrap();

    let executor = BuyExecutor::new(&exchange, &store, sizing(), "BTC");
    executor
        .execute("main", &[candidate("XRPBTC"), candidate("ADABTC")])
        .await
        .unwrap();

    // Both trades sized at 0.1 BTC against the same 0.15 snapshot.
    assert_eq!(store.unsold_buys("main").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_take_profit_lists_sell_at_target() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();

    // Record moved out of the unsold set with both sell fields set.
    assert!(store.unsold_buys("main").await.unwrap().is_empty());

    let sells = exchange.placed_sells.lock().unwrap();
    assert_eq!(sells.len(), 1);
    let (market, _, price) = &sells[0];
    assert_eq!(market, "XRPBTC");
    assert!((price - 0.02 * 1.05).abs() < 1e-12);
}

#[tokio::test]
async fn test_take_profit_skips_unfilled_buy() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    // The fill was reported at placement; pretend the exchange now says
    // the order is still open.
    let buy_order_id = store.unsold_buys("main").await.unwrap()[0].order_id.clone();
    exchange.set_order_state(&buy_order_id, OrderState::New);

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();

    // Still unsold, nothing placed.
    assert_eq!(store.unsold_buys("main").await.unwrap().len(), 1);
    assert!(exchange.placed_sells.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_returns_record_to_unsold() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();

    let sell_id = {
        let open = exchange.open_orders.lock().unwrap();
        open[0].order_id.clone()
    };

    // Both-or-neither: listed now, unsold after the cancel.
    let listed = store.find_by_sell_id(&sell_id).await.unwrap().unwrap();
    assert!(matches!(listed.sell, SellState::Listed { .. }));

    manager.cancel_target(&sell_id).await.unwrap();

    let unsold = store.unsold_buys("main").await.unwrap();
    assert_eq!(unsold.len(), 1);
    assert!(unsold[0].is_unsold());
    assert!(exchange.open_orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_sell_id_is_fatal_and_mutates_nothing() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    let result = manager.cancel_target("does-not-exist").await;

    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("no buy record with sell id"));
    // The one real record is untouched.
    assert_eq!(store.unsold_buys("main").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unconfirmed_cancel_is_fatal_and_keeps_listing() {
    let mut exchange = MockExchange::new(0.5);
    exchange.confirm_cancels = false;
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();

    let sell_id = exchange.open_orders.lock().unwrap()[0].order_id.clone();
    let result = manager.cancel_target(&sell_id).await;

    assert!(result.is_err());
    // Record still carries the listing; no half-cancelled state.
    let record = store.find_by_sell_id(&sell_id).await.unwrap().unwrap();
    assert!(matches!(record.sell, SellState::Listed { .. }));
}

#[tokio::test]
async fn test_cancel_all_open_sells_clears_every_listing() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC"), candidate("ADABTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();
    assert_eq!(exchange.open_orders.lock().unwrap().len(), 2);

    manager.cancel_all_open_sells().await.unwrap();

    assert!(exchange.open_orders.lock().unwrap().is_empty());
    let unsold = store.unsold_buys("main").await.unwrap();
    assert_eq!(unsold.len(), 2);
    assert!(unsold.iter().all(|r| r.is_unsold()));
}

#[tokio::test]
async fn test_liquidate_sells_holdings_at_top_bid() {
    let exchange = MockExchange::new(0.5);
    let store = Store::in_memory().await.unwrap();

    BuyExecutor::new(&exchange, &store, sizing(), "BTC")
        .execute("main", &[candidate("XRPBTC")])
        .await
        .unwrap();

    let manager = ProfitManager::new(&exchange, &store);
    manager.apply_targets("main", 5.0).await.unwrap();

    manager.liquidate("main").await.unwrap();

    {
        let sells = exchange.placed_sells.lock().unwrap();
        // First the profit-target sell, then the liquidation sell at top bid.
        assert_eq!(sells.len(), 2);
        let (_, _, liquidation_price) = sells[1];
        assert_eq!(liquidation_price, 0.0099);
    }

    // The liquidation listing is persisted, so the record has left the
    // unsold set and a take-profit pass places nothing further.
    assert!(store.unsold_buys("main").await.unwrap().is_empty());
    manager.apply_targets("main", 5.0).await.unwrap();
    assert_eq!(exchange.placed_sells.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_record_prices_appends_one_sample_per_market() {
    let mut exchange = MockExchange::new(0.5);
    for (market, ask) in [("XRPBTC", 0.000021), ("ADABTC", 0.000009)] {
        exchange.summaries.insert(
            market.to_string(),
            MarketSummary {
                market: market.to_string(),
                ask,
                volume_24h: 100.0,
            },
        );
    }
    let store = Store::in_memory().await.unwrap();

    let recorded = sampler::record_prices(&exchange, &store).await.unwrap();
    assert_eq!(recorded, 2);

    let recent = store.recent_samples().await.unwrap();
    assert_eq!(recent["XRPBTC"].len(), 1);
    assert_eq!(recent["XRPBTC"][0].ask, 0.000021);
    assert_eq!(recent["ADABTC"][0].ask, 0.000009);
}
