use chrono::Utc;

use crate::api::Exchange;
use crate::db::Store;
use crate::Result;

/// Append one price sample per market from the current summary feed.
///
/// Run once per polling interval by the external scheduler; the analyzer
/// needs two cycles of data before a market becomes eligible.
pub async fn record_prices(exchange: &dyn Exchange, store: &Store) -> Result<usize> {
    let summaries = exchange.get_market_summaries().await?;
    let now = Utc::now();

    for summary in summaries.values() {
        store.record_price(&summary.market, summary.ask, now).await?;
    }

    tracing::info!("Recorded {} price samples", summaries.len());
    Ok(summaries.len())
}
