use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::models::{BuyRecord, PriceSample, SellState};
use crate::Result;

/// SQLite persistence for price samples and buy records.
///
/// Writes are committed immediately after each mutation; there are no
/// multi-statement transactions spanning an analyze+buy or sell+cancel
/// sequence. A crash between order placement and persistence leaves an
/// exchange-side order with no local record.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to SQLite and run migrations.
    ///
    /// # Arguments
    /// * `database_url` - e.g. `sqlite://surgebot.db?mode=rwc`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to SQLite at {}", database_url);

        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Append one price sample. Samples are never updated or deleted.
    pub async fn record_price(
        &self,
        market: &str,
        ask: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO price_samples (market, ask, timestamp) VALUES ($1, $2, $3)")
            .bind(market)
            .bind(ask)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The two most recent samples per market, newest first.
    ///
    /// Markets with a single sample come back with one entry; the analyzer
    /// skips those.
    pub async fn recent_samples(&self) -> Result<HashMap<String, Vec<PriceSample>>> {
        let rows = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT market, ask, timestamp,
                       ROW_NUMBER() OVER (PARTITION BY market ORDER BY timestamp DESC) AS rn
                FROM price_samples
            )
            SELECT market, ask, timestamp FROM ranked
            WHERE rn <= 2
            ORDER BY market, timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut recent: HashMap<String, Vec<PriceSample>> = HashMap::new();

        for row in rows {
            let market: String = row.get("market");
            let sample = PriceSample {
                market: market.clone(),
                ask: row.get("ask"),
                timestamp: row.get("timestamp"),
            };
            recent.entry(market).or_default().push(sample);
        }

        Ok(recent)
    }

    /// Persist a filled buy. Returns the new record id.
    pub async fn insert_buy(
        &self,
        account: &str,
        order_id: &str,
        market: &str,
        purchase_price: f64,
        amount: f64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO buys (account, order_id, market, purchase_price, amount, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account)
        .bind(order_id)
        .bind(market)
        .bind(purchase_price)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();

        tracing::debug!(
            "Recorded buy {} of {} {} at {:.8} for {}",
            id,
            amount,
            market,
            purchase_price,
            account
        );

        Ok(id)
    }

    /// Buy records for an account that have no sell order listed.
    pub async fn unsold_buys(&self, account: &str) -> Result<Vec<BuyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account, order_id, market, purchase_price, amount,
                   selling_price, sell_id, timestamp
            FROM buys
            WHERE account = $1 AND selling_price IS NULL
            ORDER BY timestamp ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::buy_from_row).collect()
    }

    /// Look up the buy record carrying a given sell order id.
    pub async fn find_by_sell_id(&self, sell_id: &str) -> Result<Option<BuyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, account, order_id, market, purchase_price, amount,
                   selling_price, sell_id, timestamp
            FROM buys
            WHERE sell_id = $1
            "#,
        )
        .bind(sell_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::buy_from_row).transpose()
    }

    /// Mark a record as listed: set selling price and sell order id together.
    pub async fn set_sell(&self, id: i64, selling_price: f64, sell_id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE buys SET selling_price = $1, sell_id = $2 WHERE id = $3")
                .bind(selling_price)
                .bind(sell_id)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(format!("no buy record with id {}", id).into());
        }

        Ok(())
    }

    /// Return a record to "open for selling": null both sell columns.
    pub async fn clear_sell(&self, id: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE buys SET selling_price = NULL, sell_id = NULL WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(format!("no buy record with id {}", id).into());
        }

        Ok(())
    }

    fn buy_from_row(row: sqlx::sqlite::SqliteRow) -> Result<BuyRecord> {
        let id: i64 = row.get("id");
        let selling_price: Option<f64> = row.get("selling_price");
        let sell_id: Option<String> = row.get("sell_id");

        let sell = match (selling_price, sell_id) {
            (None, None) => SellState::Unsold,
            (Some(price), Some(sell_id)) => SellState::Listed { price, sell_id },
            _ => return Err(format!("buy record {} has inconsistent sell columns", id).into()),
        };

        Ok(BuyRecord {
            id,
            account: row.get("account"),
            order_id: row.get("order_id"),
            market: row.get("market"),
            purchase_price: row.get("purchase_price"),
            amount: row.get("amount"),
            sell,
            timestamp: row.get("timestamp"),
        })
    }
}
