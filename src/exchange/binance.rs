use crate::exchange::{Balances, ExchangeGateway, GatewayError};
use crate::models::{OrderReceipt, Side, TradingPair};
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    symbol: String,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
}

/// Binance spot REST gateway
///
/// Signed endpoints use HMAC-SHA256 over the url-encoded query. All requests
/// share one rate limiter so a burst of sells never trips the exchange's
/// request weight limits.
#[derive(Clone)]
pub struct BinanceGateway {
    client: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceGateway {
    pub fn new(
        api_key: String,
        secret_key: String,
        base_url: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let per_second = NonZeroU32::new(requests_per_second)
            .ok_or_else(|| anyhow::anyhow!("requests_per_second must be positive"))?;

        Ok(Self {
            client,
            api_key,
            secret_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    fn sign(&self, mut params: Vec<(&str, String)>) -> Result<String, GatewayError> {
        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query, signature))
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, GatewayError> {
        let query = self.sign(params)?;
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(status.as_u16(), body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, GatewayError> {
    Decimal::from_str(raw).map_err(|e| GatewayError::Decode(format!("{} '{}': {}", field, raw, e)))
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        let account: AccountInfo = self
            .send_signed(Method::GET, "/api/v3/account", vec![])
            .await?;

        account
            .balances
            .into_iter()
            .map(|b| parse_decimal("free", &b.free).map(|free| (b.asset, free)))
            .collect()
    }

    async fn fetch_ticker_price(&self, pair: &TradingPair) -> Result<Decimal, GatewayError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            pair.symbol()
        );

        self.rate_limiter.until_ready().await;
        let response = self.client.get(&url).send().await?;
        let ticker: TickerPrice = decode(response).await?;

        parse_decimal("price", &ticker.price)
    }

    async fn submit_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt, GatewayError> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };

        let params = vec![
            ("symbol", pair.symbol()),
            ("side", side_str.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("newClientOrderId", client_order_id.to_string()),
        ];

        tracing::debug!(
            "Sending MARKET {} {} {} ({})",
            side_str,
            quantity,
            pair,
            client_order_id
        );

        let response: OrderResponse = self
            .send_signed(Method::POST, "/api/v3/order", params)
            .await?;

        let executed_qty = response
            .executed_qty
            .as_deref()
            .map(|raw| parse_decimal("executedQty", raw))
            .transpose()?;

        Ok(OrderReceipt {
            order_id: response.order_id.to_string(),
            symbol: response.symbol,
            status: response.status,
            executed_qty,
        })
    }
}
