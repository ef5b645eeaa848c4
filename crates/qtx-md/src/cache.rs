//! TTL quote cache sitting in front of a [`MarketDataSource`]: repeated
//! quote lookups for the same symbol within the TTL window are served
//! from memory instead of hitting the inner source again. Bars and ADV
//! always pass through uncached since they are called far less often
//! in the hot path.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qtx_execution::{Bar, MarketDataError, MarketDataSource, Quote, Timeframe};

pub struct CachedQuoteSource<M> {
    inner: M,
    ttl: Duration,
    cache: Mutex<BTreeMap<String, (Quote, Instant)>>,
}

impl<M: MarketDataSource> CachedQuoteSource<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        CachedQuoteSource {
            inner,
            ttl,
            cache: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl<M: MarketDataSource> MarketDataSource for CachedQuoteSource<M> {
    async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        if let Some((quote, fetched_at)) = self.cache.lock().unwrap().get(symbol) {
            if fetched_at.elapsed() < self.ttl {
                return Ok(Some(*quote));
            }
        }

        let quote = self.inner.latest_quote(symbol).await?;
        if let Some(quote) = quote {
            self.cache
                .lock()
                .unwrap()
                .insert(symbol.to_string(), (quote, Instant::now()));
        }
        Ok(quote)
    }

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        self.inner.bars(symbol, timeframe, start, end, limit).await
    }

    async fn average_daily_volume(&self, symbol: &str) -> Result<Option<i64>, MarketDataError> {
        self.inner.average_daily_volume(symbol).await
    }
}
