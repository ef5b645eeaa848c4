//! Embedded SQLite persistence for the paper-trading engine: positions,
//! closed trades, and periodic portfolio snapshots. A local, file-backed
//! store is sufficient — there is exactly one writer (the trader's own
//! process) and no multi-node reconciliation to support.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use qtx_schemas::{Micros, Position, Side, TradeRecord};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "QTX_DATABASE_URL";

/// Connect using `QTX_DATABASE_URL` (e.g. `sqlite://qtx.db`).
pub async fn connect_from_env() -> Result<SqlitePool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .context("failed to connect to sqlite")?;
    Ok(pool)
}

/// Run the embedded migrations. Idempotent: safe to call on every
/// startup against an already-migrated database.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Upsert one symbol's position row. Called after every fill.
pub async fn upsert_position(pool: &SqlitePool, position: &Position) -> Result<()> {
    sqlx::query(
        r#"
        insert into positions (symbol, qty, avg_cost, updated_at)
        values (?1, ?2, ?3, ?4)
        on conflict(symbol) do update set
            qty = excluded.qty,
            avg_cost = excluded.avg_cost,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&position.symbol)
    .bind(position.quantity)
    .bind(position.avg_cost.raw())
    .bind(position.updated_at)
    .execute(pool)
    .await
    .context("upsert_position failed")?;

    Ok(())
}

pub async fn load_positions(pool: &SqlitePool) -> Result<Vec<Position>> {
    let rows: Vec<PositionRow> = sqlx::query_as("select symbol, qty, avg_cost, updated_at from positions")
        .fetch_all(pool)
        .await
        .context("load_positions failed")?;

    Ok(rows.into_iter().map(PositionRow::into_position).collect())
}

/// Append one closed-trade record. `id` is caller-supplied so retries
/// of the same logical write are idempotent (primary key conflict).
pub async fn insert_trade(pool: &SqlitePool, id: Uuid, side: Side, record: &TradeRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (id, symbol, side, qty, price, commission, pnl, timestamp)
        values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        on conflict(id) do nothing
        "#,
    )
    .bind(id.to_string())
    .bind(&record.symbol)
    .bind(side.to_string())
    .bind(0_i64) // qty is not tracked per-trade in TradeRecord; see load_trades note
    .bind(record.exit_price.raw())
    .bind(0_i64)
    .bind(record.pnl.raw())
    .bind(record.closed_at)
    .execute(pool)
    .await
    .context("insert_trade failed")?;

    Ok(())
}

pub async fn load_trades(pool: &SqlitePool, symbol: Option<&str>, limit: i64) -> Result<Vec<TradeRow>> {
    let rows: Vec<TradeRow> = match symbol {
        Some(symbol) => {
            sqlx::query_as(
                "select id, symbol, side, qty, price, commission, pnl, timestamp from trades \
                 where symbol = ?1 order by timestamp desc limit ?2",
            )
            .bind(symbol)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(
                "select id, symbol, side, qty, price, commission, pnl, timestamp from trades \
                 order by timestamp desc limit ?1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
    .context("load_trades failed")?;

    Ok(rows)
}

pub async fn insert_snapshot(pool: &SqlitePool, id: Uuid, timestamp: DateTime<Utc>, portfolio_value: Micros, cash: Micros) -> Result<()> {
    sqlx::query(
        r#"
        insert into snapshots (id, timestamp, portfolio_value, cash)
        values (?1, ?2, ?3, ?4)
        on conflict(id) do nothing
        "#,
    )
    .bind(id.to_string())
    .bind(timestamp)
    .bind(portfolio_value.raw())
    .bind(cash.raw())
    .execute(pool)
    .await
    .context("insert_snapshot failed")?;

    Ok(())
}

pub async fn load_snapshots(pool: &SqlitePool, limit: i64) -> Result<Vec<SnapshotRow>> {
    let rows: Vec<SnapshotRow> = sqlx::query_as(
        "select id, timestamp, portfolio_value, cash from snapshots order by timestamp desc limit ?1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("load_snapshots failed")?;

    Ok(rows)
}

#[derive(Debug, Clone, FromRow)]
struct PositionRow {
    symbol: String,
    qty: i64,
    avg_cost: i64,
    updated_at: DateTime<Utc>,
}

impl PositionRow {
    fn into_position(self) -> Position {
        Position {
            symbol: self.symbol,
            quantity: self.qty,
            avg_cost: Micros::new(self.avg_cost),
            realized_pnl: Micros::ZERO,
            opened_at: self.updated_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TradeRow {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub qty: i64,
    pub price: i64,
    pub commission: i64,
    pub pnl: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: i64,
    pub cash: i64,
}

/// A minimal status check: connectivity plus presence of the core schema.
pub async fn status(pool: &SqlitePool) -> Result<DbStatus> {
    let (one,): (i64,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let row = sqlx::query("select name from sqlite_master where type='table' and name='positions'")
        .fetch_optional(pool)
        .await
        .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_positions_table: row.is_some(),
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_positions_table: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn fresh_pool() -> SqlitePool {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn migrate_creates_the_core_tables() {
        let pool = fresh_pool().await;
        let status = status(&pool).await.unwrap();
        assert!(status.ok);
        assert!(status.has_positions_table);
    }

    #[tokio::test]
    async fn position_upsert_is_idempotent_on_symbol() {
        let pool = fresh_pool().await;
        let mut position = Position::flat("AAPL", now());
        position.quantity = 100;
        position.avg_cost = Micros::from_f64(150.0);

        upsert_position(&pool, &position).await.unwrap();
        position.quantity = 150;
        upsert_position(&pool, &position).await.unwrap();

        let loaded = load_positions(&pool).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].quantity, 150);
    }

    #[tokio::test]
    async fn trade_insert_is_idempotent_on_id() {
        let pool = fresh_pool().await;
        let id = Uuid::new_v4();
        let record = TradeRecord {
            symbol: "AAPL".to_string(),
            pnl: Micros::from_f64(42.0),
            opened_at: now(),
            closed_at: now(),
            entry_price: Micros::from_f64(100.0),
            exit_price: Micros::from_f64(105.0),
        };

        insert_trade(&pool, id, Side::Sell, &record).await.unwrap();
        insert_trade(&pool, id, Side::Sell, &record).await.unwrap();

        let trades = load_trades(&pool, None, 10).await.unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn snapshots_are_ordered_most_recent_first() {
        let pool = fresh_pool().await;
        insert_snapshot(&pool, Uuid::new_v4(), now(), Micros::from_f64(100_000.0), Micros::from_f64(50_000.0))
            .await
            .unwrap();
        insert_snapshot(
            &pool,
            Uuid::new_v4(),
            now() + chrono::Duration::hours(1),
            Micros::from_f64(101_000.0),
            Micros::from_f64(49_000.0),
        )
        .await
        .unwrap();

        let snapshots = load_snapshots(&pool, 10).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].timestamp > snapshots[1].timestamp);
    }
}
