//! Market data the router and schedulers consume to make sizing and
//! timing decisions. Implemented by `qtx-md`; rate-limiting is the
//! implementation's concern — callers only need to tolerate the
//! backpressure an implementation introduces (e.g. an `await` that
//! resolves later than usual when a sliding window is saturated).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qtx_schemas::Micros;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quote {
    pub bid: Micros,
    pub ask: Micros,
    pub last: Micros,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Micros,
    pub high: Micros,
    pub low: Micros,
    pub close: Micros,
    pub volume: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeframe {
    Minute,
    FiveMinute,
    Hour,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    #[error("market data call failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError>;

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError>;

    async fn average_daily_volume(&self, symbol: &str) -> Result<Option<i64>, MarketDataError>;
}
