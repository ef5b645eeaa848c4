//! Deterministic in-process paper broker.
//!
//! Accepts every order immediately (no rejection beyond "no quote
//! available") and simulates a fill through `qtx_execution`'s slippage
//! model rather than waiting on a real matching engine. MARKET orders
//! always fill; LIMIT orders fill only if marketable against the
//! current quote, otherwise they sit `New` until cancelled — there is
//! no background loop that revisits them as the quote moves.

pub mod types;

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use qtx_execution::{
    calculate, BrokerAdapter, BrokerError, MarketDataSource, OrderStatus, OrderStatusReport,
    SlippageInput,
};
use qtx_schemas::{Micros, OrderType, Side};
use tracing::{debug, info};
use uuid::Uuid;

pub use types::{PaperBrokerConfig, PaperOrder};

pub struct PaperBroker {
    market_data: Box<dyn MarketDataSource>,
    config: PaperBrokerConfig,
    orders: Mutex<BTreeMap<Uuid, PaperOrder>>,
}

impl PaperBroker {
    pub fn new(market_data: Box<dyn MarketDataSource>, config: PaperBrokerConfig) -> Self {
        PaperBroker {
            market_data,
            config,
            orders: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn order(&self, order_id: Uuid) -> Option<PaperOrder> {
        self.orders.lock().unwrap().get(&order_id).cloned()
    }

    fn commission_for(&self, quantity: i64) -> Micros {
        Micros::from_f64(self.config.commission_per_trade)
            + Micros::from_f64(self.config.commission_per_share).scale(quantity as f64)
    }

    fn is_marketable(side: Side, limit_price: Micros, bid: Micros, ask: Micros) -> bool {
        match side {
            Side::Buy => limit_price.raw() >= ask.raw(),
            Side::Sell => limit_price.raw() <= bid.raw(),
        }
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn submit(
        &self,
        symbol: &str,
        quantity: i64,
        side: Side,
        order_type: OrderType,
        limit_price: Option<Micros>,
    ) -> Result<Option<Uuid>, BrokerError> {
        let quote = self
            .market_data
            .latest_quote(symbol)
            .await
            .map_err(|e| BrokerError::Upstream(e.to_string()))?;

        let Some(quote) = quote else {
            debug!(symbol, "paper broker refused order: no quote available");
            return Ok(None);
        };

        let order_id = Uuid::new_v4();
        let commission = self.commission_for(quantity);

        let marketable = match order_type {
            OrderType::Market => true,
            OrderType::Limit => limit_price
                .map(|lp| Self::is_marketable(side, lp, quote.bid, quote.ask))
                .unwrap_or(false),
            OrderType::Stop => false,
        };

        let (status, filled_avg_price, filled_qty) = if marketable {
            let avg_daily_volume = self
                .market_data
                .average_daily_volume(symbol)
                .await
                .map_err(|e| BrokerError::Upstream(e.to_string()))?
                .unwrap_or(0);

            let result = calculate(&SlippageInput {
                current_price: quote.last,
                quantity,
                side,
                order_type,
                base_spread_bps: self.config.base_spread_bps,
                volatility: self.config.assumed_volatility,
                avg_daily_volume,
                urgency_multiplier: self.config.urgency_multiplier,
            });
            info!(symbol, %order_id, fill_price = %result.fill_price, "paper broker filled order");
            (OrderStatus::Filled, Some(result.fill_price), quantity)
        } else {
            (OrderStatus::New, None, 0)
        };

        let order = PaperOrder {
            id: order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type,
            limit_price,
            status,
            filled_avg_price,
            filled_qty,
            commission,
            submitted_at: Utc::now(),
        };
        self.orders.lock().unwrap().insert(order_id, order);

        Ok(Some(order_id))
    }

    async fn status(&self, order_id: Uuid) -> Result<OrderStatusReport, BrokerError> {
        let orders = self.orders.lock().unwrap();
        let order = orders
            .get(&order_id)
            .ok_or_else(|| BrokerError::Upstream(format!("unknown order {order_id}")))?;
        Ok(OrderStatusReport {
            status: order.status,
            filled_avg_price: order.filled_avg_price,
            filled_qty: order.filled_qty,
        })
    }

    async fn cancel(&self, order_id: Uuid) -> Result<bool, BrokerError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::New => {
                order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(BrokerError::Upstream(format!("unknown order {order_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use qtx_execution::{Bar, MarketDataError, Quote, Timeframe};

    struct FixedMarketData {
        quote: Option<Quote>,
        adv: i64,
    }

    #[async_trait]
    impl MarketDataSource for FixedMarketData {
        async fn latest_quote(&self, _symbol: &str) -> Result<Option<Quote>, MarketDataError> {
            Ok(self.quote)
        }

        async fn bars(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _start: Option<DateTime<Utc>>,
            _end: Option<DateTime<Utc>>,
            _limit: usize,
        ) -> Result<Vec<Bar>, MarketDataError> {
            Ok(Vec::new())
        }

        async fn average_daily_volume(&self, _symbol: &str) -> Result<Option<i64>, MarketDataError> {
            Ok(Some(self.adv))
        }
    }

    fn quote() -> Quote {
        Quote {
            bid: Micros::from_f64(99.95),
            ask: Micros::from_f64(100.05),
            last: Micros::from_f64(100.0),
            timestamp: Utc::now(),
        }
    }

    fn broker(q: Option<Quote>) -> PaperBroker {
        PaperBroker::new(
            Box::new(FixedMarketData { quote: q, adv: 1_000_000 }),
            PaperBrokerConfig::default(),
        )
    }

    #[tokio::test]
    async fn market_order_fills_immediately() {
        let broker = broker(Some(quote()));
        let order_id = broker
            .submit("AAPL", 100, Side::Buy, OrderType::Market, None)
            .await
            .unwrap()
            .unwrap();
        let status = broker.status(order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
        assert_eq!(status.filled_qty, 100);
        assert!(status.filled_avg_price.unwrap().to_f64() > 100.0);
    }

    #[tokio::test]
    async fn no_quote_refuses_the_order() {
        let broker = broker(None);
        let order_id = broker
            .submit("AAPL", 100, Side::Buy, OrderType::Market, None)
            .await
            .unwrap();
        assert!(order_id.is_none());
    }

    #[tokio::test]
    async fn unmarketable_limit_order_sits_new() {
        let broker = broker(Some(quote()));
        let order_id = broker
            .submit("AAPL", 100, Side::Buy, OrderType::Limit, Some(Micros::from_f64(90.0)))
            .await
            .unwrap()
            .unwrap();
        let status = broker.status(order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::New);
        assert_eq!(status.filled_qty, 0);
    }

    #[tokio::test]
    async fn marketable_limit_order_fills() {
        let broker = broker(Some(quote()));
        let order_id = broker
            .submit("AAPL", 100, Side::Buy, OrderType::Limit, Some(Micros::from_f64(101.0)))
            .await
            .unwrap()
            .unwrap();
        let status = broker.status(order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn cancelling_a_new_order_succeeds_once() {
        let broker = broker(Some(quote()));
        let order_id = broker
            .submit("AAPL", 100, Side::Buy, OrderType::Limit, Some(Micros::from_f64(90.0)))
            .await
            .unwrap()
            .unwrap();
        assert!(broker.cancel(order_id).await.unwrap());
        assert!(!broker.cancel(order_id).await.unwrap());
    }
}
