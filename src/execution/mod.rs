use crate::api::Exchange;
use crate::db::Store;
use crate::models::{Candidate, OrderBook, OrderState};
use crate::Result;

/// Walk this far past the intended spend before trusting a book level.
const BOOK_DEPTH_FACTOR: f64 = 1.4;

/// Order book depth requested when looking for an executable rate.
const BOOK_DEPTH: u32 = 1000;

/// Trade sizing parameters, read-only configuration.
#[derive(Debug, Clone)]
pub struct TradeSizing {
    /// Seed deposit the per-trade fraction is computed from.
    pub deposit: f64,
    /// Percentage of the deposit allocated to each trade.
    pub trade_pct: f64,
    /// Keep at least this much base currency untouched.
    pub preserve_floor: f64,
    /// Exchange trade fee percentage.
    pub fee_pct: f64,
}

/// Convert a percentage to a ratio, e.g. 5 -> 0.05.
fn percent2ratio(percentage: f64) -> f64 {
    percentage / 100.0
}

/// How much base currency to spend on one buy.
///
/// Zero means no trade: either the balance is at or below the preserve
/// floor, or it cannot cover a full-size trade. There are no partial
/// trades.
pub fn trade_size(sizing: &TradeSizing, available: f64) -> f64 {
    if available <= sizing.preserve_floor {
        tracing::info!(
            "Balance {:.8} at or below preserve floor {:.8}, not trading",
            available,
            sizing.preserve_floor
        );
        return 0.0;
    }

    let size = sizing.deposit * percent2ratio(sizing.trade_pct);
    if available >= size {
        return size;
    }

    tracing::info!(
        "Balance {:.8} cannot cover full trade size {:.8}, not trading",
        available,
        size
    );
    0.0
}

/// The spend that remains after the exchange takes its fee.
pub fn fee_adjust(spend: f64, fee_pct: f64) -> f64 {
    spend - spend * percent2ratio(fee_pct)
}

/// Find the ask level deep enough to absorb the intended spend.
///
/// Accumulates price*quantity down the ask side until the running total
/// exceeds `BOOK_DEPTH_FACTOR` times the spend; that level's price is the
/// rate and the coin amount is spend/rate. Returns `None` when the book is
/// never deep enough.
pub fn rate_for(book: &OrderBook, spend: f64) -> Option<(f64, f64)> {
    let mut accumulated = 0.0;

    for level in &book.asks {
        accumulated += level.price * level.quantity;
        if accumulated > BOOK_DEPTH_FACTOR * spend {
            return Some((level.price, spend / level.price));
        }
    }

    None
}

/// Places buys for ranked candidates and records the fills.
pub struct BuyExecutor<'a> {
    exchange: &'a dyn Exchange,
    store: &'a Store,
    sizing: TradeSizing,
    base_asset: String,
}

impl<'a> BuyExecutor<'a> {
    pub fn new(
        exchange: &'a dyn Exchange,
        store: &'a Store,
        sizing: TradeSizing,
        base_asset: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            store,
            sizing,
            base_asset: base_asset.into(),
        }
    }

    /// Buy into each candidate market in ranked order.
    ///
    /// Known limitation: the available balance is snapshotted once and NOT
    /// refreshed between candidates, so a pass over several candidates can
    /// commit the same funds more than once. Preserved as documented
    /// behavior.
    pub async fn execute(&self, account: &str, candidates: &[Candidate]) -> Result<()> {
        let balance = self.exchange.get_balance(&self.base_asset).await?;
        tracing::info!(
            "Available {}: {:.8} (locked {:.8})",
            self.base_asset,
            balance.free,
            balance.locked
        );

        for candidate in candidates {
            self.buy_one(account, candidate, balance.free).await?;
        }

        Ok(())
    }

    async fn buy_one(&self, account: &str, candidate: &Candidate, available: f64) -> Result<()> {
        let size = trade_size(&self.sizing, available);
        if size == 0.0 {
            return Ok(());
        }

        let spend = fee_adjust(size, self.sizing.fee_pct);
        tracing::info!(
            "Trading {:.8} {} into {} after {}% fee",
            spend,
            self.base_asset,
            candidate.market,
            self.sizing.fee_pct
        );

        let book = self
            .exchange
            .get_order_book(&candidate.market, BOOK_DEPTH)
            .await?;

        let Some((rate, amount)) = rate_for(&book, spend) else {
            tracing::info!(
                "{}: book not deep enough for {:.8} {}, no trade",
                candidate.market,
                spend,
                self.base_asset
            );
            return Ok(());
        };

        tracing::info!(
            "Buying {:.4} {} at {:.8}",
            amount,
            candidate.market,
            rate
        );

        let receipt = self
            .exchange
            .place_limit_buy(&candidate.market, amount, rate)
            .await?;

        if receipt.state == OrderState::Filled {
            let id = self
                .store
                .insert_buy(account, &receipt.order_id, &candidate.market, rate, amount)
                .await?;
            tracing::info!(
                "Buy filled: order {} recorded as buy {}",
                receipt.order_id,
                id
            );
        } else {
            tracing::warn!(
                "Buy of {} not filled (status {:?}), nothing recorded",
                candidate.market,
                receipt.state
            );
        }

        Ok(())
    }
}
