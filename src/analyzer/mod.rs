use std::collections::HashMap;

use crate::models::{Candidate, MarketSummary, OpenOrder, PriceSample};

/// The percentage increase from `old` to `new`.
pub fn percent_gain(new: f64, old: f64) -> f64 {
    (new - old) / old * 100.0
}

/// Number of open orders the exchange still holds on one market.
pub fn open_orders_in(open_orders: &[OpenOrder], market: &str) -> usize {
    open_orders.iter().filter(|o| o.market == market).count()
}

/// Eligibility filters applied before ranking. Plain configuration data,
/// evaluated in order.
#[derive(Debug, Clone)]
pub struct MarketFilters {
    /// Coins we do not trust; any market whose name contains one of these
    /// is skipped.
    pub ignore_by_in: Vec<String>,
    /// Substrings excluding non-base-currency markets (e.g. ETH, USDT).
    pub ignore_by_find: Vec<String>,
    /// Minimum 24h quote volume.
    pub min_volume: f64,
    /// Markets cheaper than this cannot move a meaningful percentage per
    /// price tick.
    pub min_price: f64,
    /// A coin can surge on the hour while dropping on the day; capping the
    /// open sell orders per market keeps the bot from chasing that chart.
    pub max_orders_per_market: usize,
}

impl MarketFilters {
    fn should_skip(&self, name: &str) -> bool {
        for ignorable in &self.ignore_by_in {
            if name.contains(ignorable.as_str()) {
                tracing::debug!("Ignoring {}: {} is in the ignore list", name, ignorable);
                return true;
            }
        }

        for ignore_string in &self.ignore_by_find {
            if name.contains(ignore_string.as_str()) {
                tracing::debug!("Ignoring {} by find: {}", name, ignore_string);
                return true;
            }
        }

        false
    }
}

/// Rank all markets by one-interval percent gain, best first.
///
/// A market needs two recent samples to be eligible; fewer is the first
/// ever poll, not an error. A market absent from the summary feed is
/// filtered out, not a fault.
pub fn analyze_gain(
    summaries: &HashMap<String, MarketSummary>,
    recent: &HashMap<String, Vec<PriceSample>>,
    open_orders: &[OpenOrder],
    filters: &MarketFilters,
) -> Vec<Candidate> {
    tracing::info!("Analyzing gain across {} markets", recent.len());

    let mut candidates = Vec::new();

    for (name, samples) in recent {
        if samples.len() < 2 {
            tracing::debug!("{}: need 2 samples, have {}", name, samples.len());
            continue;
        }

        if filters.should_skip(name) {
            continue;
        }

        match summaries.get(name) {
            Some(summary) if summary.volume_24h < filters.min_volume => {
                tracing::debug!(
                    "{}: 24h volume {:.2} below minimum {:.2}",
                    name,
                    summary.volume_24h,
                    filters.min_volume
                );
                continue;
            }
            None => {
                tracing::debug!("{}: absent from summary feed", name);
                continue;
            }
            Some(_) => {}
        }

        if open_orders_in(open_orders, name) >= filters.max_orders_per_market {
            tracing::debug!("{}: too many open orders", name);
            continue;
        }

        // Samples are ordered newest first.
        let latest = &samples[0];
        let previous = &samples[1];

        if latest.ask < filters.min_price {
            tracing::debug!("{}: ask {:.8} below minimum price", name, latest.ask);
            continue;
        }

        candidates.push(Candidate {
            market: name.clone(),
            gain_pct: percent_gain(latest.ask, previous.ask),
            latest_ask: latest.ask,
            previous_ask: previous.ask,
            url: format!("https://www.binance.com/en/trade/{}", name),
        });
    }

    candidates.sort_by(|a, b| {
        b.gain_pct
            .partial_cmp(&a.gain_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
}

/// Second filtering stage: drop candidates below the minimum gain, then
/// truncate to the configured top-N.
pub fn top_candidates(candidates: Vec<Candidate>, min_gain: f64, top_n: usize) -> Vec<Candidate> {
    let mut top: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.gain_pct >= min_gain)
        .collect();
    top.truncate(top_n);

    for candidate in &top {
        tracing::info!(
            "Surging: {} +{:.2}% ({:.8} -> {:.8}) {}",
            candidate.market,
            candidate.gain_pct,
            candidate.previous_ask,
            candidate.latest_ask,
            candidate.url
        );
    }

    top
}

/// Explicit per-cycle memoization of the ranked gain list.
///
/// The buy pass runs once per account in a single invocation; all accounts
/// in one cycle share a single analysis. Changing the key invalidates the
/// cached value.
#[derive(Debug, Default)]
pub struct GainCache {
    key: Option<String>,
    candidates: Vec<Candidate>,
}

impl GainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[Candidate]> {
        match &self.key {
            Some(k) if k == key => Some(&self.candidates),
            _ => None,
        }
    }

    pub fn put(&mut self, key: impl Into<String>, candidates: Vec<Candidate>) {
        self.key = Some(key.into());
        self.candidates = candidates;
    }
}
