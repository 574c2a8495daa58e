// Scripted collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newstrader::exchange::{Balances, ExchangeGateway, GatewayError};
use newstrader::news::{ArticleSource, DatedArticle, NewsError};
use newstrader::oracle::{OracleError, TradeOracle};
use newstrader::{Article, OrderReceipt, Side, TradingPair};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

pub fn article(title: &str, published_at: DateTime<Utc>) -> DatedArticle {
    (
        Article {
            title: title.to_string(),
            text: format!("{} (full text)", title),
            symbols: vec![],
        },
        published_at,
    )
}

/// In-memory exchange recording every order it accepts
#[derive(Default)]
pub struct ScriptedGateway {
    pub balances: Mutex<Balances>,
    pub prices: Mutex<HashMap<String, Decimal>>,
    pub submit_failures: Mutex<VecDeque<GatewayError>>,
    pub submissions: Mutex<Vec<(String, Side, Decimal)>>,
}

impl ScriptedGateway {
    pub fn new(balances: &[(&str, &str)], prices: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(
                balances
                    .iter()
                    .map(|(asset, qty)| (asset.to_string(), dec(qty)))
                    .collect(),
            ),
            prices: Mutex::new(
                prices
                    .iter()
                    .map(|(asset, price)| (format!("{}USDT", asset), dec(price)))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    pub fn fail_next_submit(&self, error: GatewayError) {
        self.submit_failures.lock().unwrap().push_back(error);
    }

    pub fn submissions(&self) -> Vec<(String, Side, Decimal)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn fetch_ticker_price(&self, pair: &TradingPair) -> Result<Decimal, GatewayError> {
        self.prices
            .lock()
            .unwrap()
            .get(&pair.symbol())
            .copied()
            .ok_or_else(|| GatewayError::Rejected {
                status: 400,
                body: format!("Invalid symbol {}", pair.symbol()),
            })
    }

    async fn submit_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
        _client_order_id: &str,
    ) -> Result<OrderReceipt, GatewayError> {
        if let Some(error) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((pair.base.clone(), side, quantity));
        Ok(OrderReceipt {
            order_id: submissions.len().to_string(),
            symbol: pair.symbol(),
            status: "FILLED".to_string(),
            executed_qty: Some(quantity),
        })
    }
}

/// Feed returning queued batches, then nothing
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<DatedArticle>>>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Vec<DatedArticle>>) -> Box<Self> {
        Box::new(Self {
            batches: Mutex::new(batches.into()),
        })
    }
}

#[async_trait]
impl ArticleSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self) -> Result<Vec<DatedArticle>, NewsError> {
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub enum OracleReply {
    Text(&'static str),
    Fail,
    Panic,
}

/// Oracle answering from a script and counting calls
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<OracleReply>>,
    pub calls: Arc<Mutex<usize>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<OracleReply>) -> (Box<Self>, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        (
            Box::new(Self {
                replies: Mutex::new(replies.into()),
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl TradeOracle for ScriptedOracle {
    async fn invoke(&self, _prompt: &str) -> Result<String, OracleError> {
        *self.calls.lock().unwrap() += 1;
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(OracleReply::Text(text)) => Ok(text.to_string()),
            Some(OracleReply::Fail) => Err(OracleError::Api {
                status: 401,
                body: "invalid key".to_string(),
            }),
            Some(OracleReply::Panic) => panic!("oracle blew up"),
            None => Ok(String::new()),
        }
    }
}
