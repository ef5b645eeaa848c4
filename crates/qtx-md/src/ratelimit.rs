//! Sliding-window rate limiting for a [`MarketDataSource`].
//!
//! The upstream contract ("200 req / 60 s", sleeps when saturated) is
//! implemented as a bounded check-sleep-recheck loop rather than a
//! single recursive sleep: each iteration prunes the window, checks
//! whether capacity is free, and if not sleeps exactly the deficit
//! before re-checking. A capped retry count turns a pathological
//! always-saturated window into an error instead of an infinite wait.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qtx_execution::{Bar, MarketDataError, MarketDataSource, Quote, Timeframe};
use tokio::time::Instant;

const MAX_WAIT_ITERATIONS: u32 = 32;

struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    fn new(max_requests: usize, window: Duration) -> Self {
        SlidingWindow {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Block (async) until a request slot is free, or error out after
    /// [`MAX_WAIT_ITERATIONS`] sleep-and-recheck cycles.
    async fn acquire(&self) -> Result<(), MarketDataError> {
        for _ in 0..MAX_WAIT_ITERATIONS {
            let deficit = {
                let mut timestamps = self.timestamps.lock().unwrap();
                let now = Instant::now();
                while let Some(&front) = timestamps.front() {
                    if now.duration_since(front) > self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return Ok(());
                }

                let oldest = *timestamps.front().unwrap();
                self.window.saturating_sub(now.duration_since(oldest))
            };
            tokio::time::sleep(deficit).await;
        }
        Err(MarketDataError::Upstream(
            "rate limit window never freed capacity".to_string(),
        ))
    }
}

/// Wraps a [`MarketDataSource`] so every call passes through a shared
/// sliding-window limiter before reaching the inner source.
pub struct RateLimitedMarketData<M> {
    inner: M,
    limiter: SlidingWindow,
}

impl<M: MarketDataSource> RateLimitedMarketData<M> {
    pub fn new(inner: M, max_requests: usize, window: Duration) -> Self {
        RateLimitedMarketData {
            inner,
            limiter: SlidingWindow::new(max_requests, window),
        }
    }

    /// The default upstream contract: 200 requests per 60-second window.
    pub fn with_default_limits(inner: M) -> Self {
        Self::new(inner, 200, Duration::from_secs(60))
    }
}

#[async_trait]
impl<M: MarketDataSource> MarketDataSource for RateLimitedMarketData<M> {
    async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        self.limiter.acquire().await?;
        self.inner.latest_quote(symbol).await
    }

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        self.limiter.acquire().await?;
        self.inner.bars(symbol, timeframe, start, end, limit).await
    }

    async fn average_daily_volume(&self, symbol: &str) -> Result<Option<i64>, MarketDataError> {
        self.limiter.acquire().await?;
        self.inner.average_daily_volume(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticMarketData;

    #[tokio::test]
    async fn requests_within_budget_pass_straight_through() {
        let md = RateLimitedMarketData::new(SyntheticMarketData::new(), 5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(md.latest_quote("AAPL").await.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_window_sleeps_until_a_slot_frees() {
        let md = RateLimitedMarketData::new(SyntheticMarketData::new(), 1, Duration::from_millis(50));
        md.latest_quote("AAPL").await.unwrap();

        let start = tokio::time::Instant::now();
        md.latest_quote("AAPL").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
