//! Deterministic-shape synthetic market data: no network dependency,
//! suitable for paper trading and tests. The per-symbol base price and
//! its random walk follow the same demo-data shape as the system's
//! original dev-mode fallback (hash-derived base price, bid/ask at
//! +/-10bps, close feeding the next bar's open).

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use qtx_execution::{Bar, MarketDataError, MarketDataSource, Quote, Timeframe};
use qtx_schemas::Micros;

fn symbol_hash(symbol: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    symbol.hash(&mut hasher);
    hasher.finish()
}

fn base_price(symbol: &str) -> f64 {
    100.0 + (symbol_hash(symbol) % 400) as f64
}

fn average_daily_volume_for(symbol: &str) -> i64 {
    500_000 + (symbol_hash(symbol) % 2_000_000) as i64
}

pub struct SyntheticMarketData {
    last_price: Mutex<BTreeMap<String, f64>>,
}

impl Default for SyntheticMarketData {
    fn default() -> Self {
        SyntheticMarketData {
            last_price: Mutex::new(BTreeMap::new()),
        }
    }
}

impl SyntheticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk(&self, symbol: &str, volatility: f64, mut rng: impl FnMut() -> f64) -> f64 {
        let mut prices = self.last_price.lock().unwrap();
        let current = *prices.entry(symbol.to_string()).or_insert_with(|| base_price(symbol));
        let next = (current + rng() * volatility).max(0.01);
        prices.insert(symbol.to_string(), next);
        next
    }
}

#[async_trait]
impl MarketDataSource for SyntheticMarketData {
    async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        let price = self.walk(symbol, 5.0, || rand::random::<f64>() * 2.0 - 1.0);
        Ok(Some(Quote {
            bid: Micros::from_f64(price * 0.999),
            ask: Micros::from_f64(price * 1.001),
            last: Micros::from_f64(price),
            timestamp: Utc::now(),
        }))
    }

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let end = end.unwrap_or_else(Utc::now);
        let step = match timeframe {
            Timeframe::Minute => ChronoDuration::minutes(1),
            Timeframe::FiveMinute => ChronoDuration::minutes(5),
            Timeframe::Hour => ChronoDuration::hours(1),
            Timeframe::Day => ChronoDuration::days(1),
        };

        let mut open = base_price(symbol);
        let mut bars = Vec::with_capacity(limit);
        for i in 0..limit {
            let timestamp = end - step * (limit - i) as i32;
            let volatility = 2.0;
            let o = open;
            let h = o + rand::random::<f64>() * volatility;
            let l = o - rand::random::<f64>() * volatility;
            let c = l + rand::random::<f64>() * (h - l).max(0.01);
            bars.push(Bar {
                timestamp,
                open: Micros::from_f64(o),
                high: Micros::from_f64(h),
                low: Micros::from_f64(l.max(0.01)),
                close: Micros::from_f64(c),
                volume: 100_000 + (rand::random::<u32>() % 9_900_000) as i64,
            });
            open = c;
        }
        Ok(bars)
    }

    async fn average_daily_volume(&self, symbol: &str) -> Result<Option<i64>, MarketDataError> {
        Ok(Some(average_daily_volume_for(symbol)))
    }
}
