// Exchange connectivity
pub mod binance;
pub mod paper;

pub use binance::BinanceGateway;
pub use paper::PaperGateway;

use crate::models::{OrderReceipt, Side, TradingPair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Free balance per asset symbol
pub type Balances = HashMap<String, Decimal>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connect failures, timeouts, 5xx and rate limiting
    #[error("transient exchange failure: {0}")]
    Transient(String),

    #[error("exchange rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected exchange response: {0}")]
    Decode(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Classify an HTTP status that was not a success
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || status == 418 || (500..600).contains(&status) {
            GatewayError::Transient(format!("HTTP {}: {}", status, body))
        } else {
            GatewayError::Rejected { status, body }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return GatewayError::Transient(e.to_string());
        }
        if let Some(status) = e.status() {
            return GatewayError::from_status(status.as_u16(), e.to_string());
        }
        GatewayError::Decode(e.to_string())
    }
}

/// Spot exchange boundary used by the order executor
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Free balance of every asset on the account
    async fn fetch_balances(&self) -> Result<Balances, GatewayError>;

    /// Last traded price of `pair` in quote units
    async fn fetch_ticker_price(&self, pair: &TradingPair) -> Result<Decimal, GatewayError>;

    /// Submit a market order for `quantity` of the base asset
    ///
    /// `client_order_id` must stay the same across retries of one order so the
    /// exchange can reject a duplicate instead of filling it twice.
    async fn submit_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt, GatewayError>;
}

#[async_trait]
impl<T: ExchangeGateway + ?Sized> ExchangeGateway for Arc<T> {
    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        (**self).fetch_balances().await
    }

    async fn fetch_ticker_price(&self, pair: &TradingPair) -> Result<Decimal, GatewayError> {
        (**self).fetch_ticker_price(pair).await
    }

    async fn submit_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt, GatewayError> {
        (**self)
            .submit_market_order(pair, side, quantity, client_order_id)
            .await
    }
}
