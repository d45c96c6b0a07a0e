use thiserror::Error;

use crate::api::Exchange;
use crate::db::Store;
use crate::models::{OrderState, SellState};
use crate::Result;

/// Fatal conditions of the sell lifecycle. Everything else is logged and
/// skipped; these stop the operation.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("no buy record with sell id {0}")]
    SellRecordNotFound(String),
    #[error("exchange did not confirm cancellation of order {0}")]
    CancelRejected(String),
}

/// Target sell price for an entry and a configured gain percentage.
pub fn profit_target(entry: f64, percent: f64) -> f64 {
    entry * (1.0 + percent / 100.0)
}

/// Places and cancels the limit sells that realize profit targets.
pub struct ProfitManager<'a> {
    exchange: &'a dyn Exchange,
    store: &'a Store,
}

impl<'a> ProfitManager<'a> {
    pub fn new(exchange: &'a dyn Exchange, store: &'a Store) -> Self {
        Self { exchange, store }
    }

    /// Issue a limit sell at the profit target for every filled buy that
    /// has no sell order yet.
    ///
    /// Buys the exchange has not filled are skipped; the caller re-invokes
    /// this on a periodic cadence, so no retry is scheduled here.
    pub async fn apply_targets(&self, account: &str, percent: f64) -> Result<()> {
        let unsold = self.store.unsold_buys(account).await?;
        tracing::info!(
            "{} buy(s) open for selling on account {}",
            unsold.len(),
            account
        );

        for record in unsold {
            let order = self
                .exchange
                .get_order(&record.market, &record.order_id)
                .await?;

            if order.state != OrderState::Filled {
                tracing::info!(
                    "Buy {} on {} not filled yet ({:?}); cannot set a profit target until it is. \
                     Consider cancelling it manually if it lingers.",
                    record.order_id,
                    record.market,
                    order.state
                );
                continue;
            }

            let target = profit_target(record.purchase_price, percent);
            tracing::info!(
                "Entry {:.8} on {}: profit target {:.8} for {}% gain",
                record.purchase_price,
                record.market,
                target,
                percent
            );

            let receipt = self
                .exchange
                .place_limit_sell(&record.market, record.amount, target)
                .await?;

            // Any non-empty receipt counts as listed; no stronger
            // confirmation of acceptance is checked.
            if !receipt.order_id.is_empty() {
                self.store
                    .set_sell(record.id, target, &receipt.order_id)
                    .await?;
                tracing::info!(
                    "Listed sell {} for buy {} at {:.8}",
                    receipt.order_id,
                    record.id,
                    target
                );
            } else {
                tracing::warn!(
                    "Sell placement on {} returned no order id, record left unsold",
                    record.market
                );
            }
        }

        Ok(())
    }

    /// Cancel one listed sell and return its buy record to "open for
    /// selling". Missing record or unconfirmed cancellation are fatal; no
    /// rollback or retry.
    pub async fn cancel_target(&self, sell_id: &str) -> Result<()> {
        let record = self
            .store
            .find_by_sell_id(sell_id)
            .await?
            .ok_or_else(|| TradeError::SellRecordNotFound(sell_id.to_string()))?;

        match self.exchange.cancel_order(&record.market, sell_id).await? {
            Some(confirmed) => {
                self.store.clear_sell(record.id).await?;
                tracing::info!(
                    "Cancelled sell {} on {}; buy {} open for selling again",
                    confirmed,
                    record.market,
                    record.id
                );
                Ok(())
            }
            None => Err(TradeError::CancelRejected(sell_id.to_string()).into()),
        }
    }

    /// Cancel every open limit order, sequentially. No batching; a failure
    /// partway leaves earlier cancellations in place.
    ///
    /// The exchange expires long-lived sell limits after a fixed number of
    /// days; cancelling here lets `apply_targets` re-issue them.
    pub async fn cancel_all_open_sells(&self) -> Result<()> {
        let open = self.exchange.get_open_orders().await?;

        let mut count = 0;
        for order in open.iter().filter(|o| o.order_type == "LIMIT") {
            count += 1;
            tracing::info!(
                "{}: cancelling {} on {}",
                count,
                order.order_id,
                order.market
            );
            self.cancel_target(&order.order_id).await?;
        }

        tracing::info!("Cancelled {} open limit order(s)", count);
        Ok(())
    }

    /// Liquidate an account: cancel all open sells, then sell every
    /// recorded holding at the current top bid. Used when restarting or
    /// abandoning the bot.
    ///
    /// Liquidation sells are persisted like profit-target sells, so a
    /// `take-profit` run afterwards will not list a second sell for coins
    /// already committed to the liquidation order.
    pub async fn liquidate(&self, account: &str) -> Result<()> {
        self.cancel_all_open_sells().await?;

        for record in self.store.unsold_buys(account).await? {
            debug_assert_eq!(record.sell, SellState::Unsold);

            let book = self.exchange.get_order_book(&record.market, 50).await?;
            let Some(bid) = book.bids.first() else {
                tracing::warn!("{}: no bids, cannot liquidate buy {}", record.market, record.id);
                continue;
            };

            let receipt = self
                .exchange
                .place_limit_sell(&record.market, record.amount, bid.price)
                .await?;

            if !receipt.order_id.is_empty() {
                self.store
                    .set_sell(record.id, bid.price, &receipt.order_id)
                    .await?;
                tracing::info!(
                    "Liquidating buy {}: sell {} of {:.4} {} at top bid {:.8}",
                    record.id,
                    receipt.order_id,
                    record.amount,
                    record.market,
                    bid.price
                );
            } else {
                tracing::warn!(
                    "Liquidation sell on {} returned no order id, record left unsold",
                    record.market
                );
            }
        }

        Ok(())
    }
}
