use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// News item handed to the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub symbols: Vec<String>,
}

/// Order direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sell advice liquidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellTarget {
    Asset(String),
    /// Every non-quote asset with a positive balance
    All,
}

/// Parsed oracle recommendation, not yet sized or executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeAdvice {
    Buy { asset: String, duration_hours: u32 },
    Sell { target: SellTarget },
}

impl TradeAdvice {
    pub fn buy(asset: impl Into<String>, duration_hours: u32) -> Self {
        TradeAdvice::Buy {
            asset: asset.into(),
            duration_hours,
        }
    }

    pub fn sell(asset: impl Into<String>) -> Self {
        TradeAdvice::Sell {
            target: SellTarget::Asset(asset.into()),
        }
    }

    pub fn sell_all() -> Self {
        TradeAdvice::Sell {
            target: SellTarget::All,
        }
    }
}

impl fmt::Display for TradeAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAdvice::Buy {
                asset,
                duration_hours,
            } => write!(f, "buy {} {}h", asset, duration_hours),
            TradeAdvice::Sell {
                target: SellTarget::Asset(asset),
            } => write!(f, "sell {}", asset),
            TradeAdvice::Sell {
                target: SellTarget::All,
            } => f.write_str("sell all"),
        }
    }
}

/// Spot market, e.g. BTC/USDT
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Concatenated exchange symbol (`BTCUSDT`)
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A sized instruction submitted to the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub side: Side,
    pub asset: String,
    pub amount: Decimal,
    pub duration_hours: Option<u32>,
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub symbol: String,
    pub status: String,
    pub executed_qty: Option<Decimal>,
}

/// Open position for one asset, keyed by asset symbol in the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub buy_time: DateTime<Utc>,
    pub sell_time: DateTime<Utc>,
}

impl Position {
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        now > self.sell_time
    }
}
