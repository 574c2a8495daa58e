use crate::exchange::{Balances, ExchangeGateway, GatewayError};
use crate::models::{OrderReceipt, Side, TradingPair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dry-run wrapper: reads go to the live exchange, orders are only logged
pub struct PaperGateway<G> {
    inner: G,
    next_order_id: AtomicU64,
}

impl<G: ExchangeGateway> PaperGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            next_order_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for PaperGateway<G> {
    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        self.inner.fetch_balances().await
    }

    async fn fetch_ticker_price(&self, pair: &TradingPair) -> Result<Decimal, GatewayError> {
        self.inner.fetch_ticker_price(pair).await
    }

    async fn submit_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt, GatewayError> {
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "📝 [PAPER] {} {} {} (not sent, {})",
            side,
            quantity,
            pair,
            client_order_id
        );

        Ok(OrderReceipt {
            order_id: format!("paper-{}", id),
            symbol: pair.symbol(),
            status: "PAPER".to_string(),
            executed_qty: Some(quantity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingGateway {
        orders: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExchangeGateway for CountingGateway {
        async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
            Ok(Balances::from([("USDT".to_string(), Decimal::from(100))]))
        }

        async fn fetch_ticker_price(&self, _pair: &TradingPair) -> Result<Decimal, GatewayError> {
            Ok(Decimal::from(25))
        }

        async fn submit_market_order(
            &self,
            _pair: &TradingPair,
            _side: Side,
            _quantity: Decimal,
            _client_order_id: &str,
        ) -> Result<OrderReceipt, GatewayError> {
            self.orders.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Rejected {
                status: 400,
                body: "live order".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_orders_never_reach_inner_gateway() {
        let orders = Arc::new(AtomicUsize::new(0));
        let paper = PaperGateway::new(CountingGateway {
            orders: orders.clone(),
        });
        let pair = TradingPair::new("BTC", "USDT");

        let first = paper
            .submit_market_order(&pair, Side::Buy, Decimal::ONE, "a")
            .await
            .unwrap();
        let second = paper
            .submit_market_order(&pair, Side::Sell, Decimal::ONE, "b")
            .await
            .unwrap();

        assert_eq!(orders.load(Ordering::SeqCst), 0);
        assert_eq!(first.order_id, "paper-1");
        assert_eq!(second.order_id, "paper-2");
        assert_eq!(first.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn test_reads_pass_through() {
        let paper = PaperGateway::new(CountingGateway {
            orders: Arc::new(AtomicUsize::new(0)),
        });

        let balances = paper.fetch_balances().await.unwrap();
        assert_eq!(balances["USDT"], Decimal::from(100));

        let price = paper
            .fetch_ticker_price(&TradingPair::new("ETH", "USDT"))
            .await
            .unwrap();
        assert_eq!(price, Decimal::from(25));
    }
}
