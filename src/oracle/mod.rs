// Text-generation oracle and advice extraction
pub mod openai;

pub use openai::OpenAiOracle;

use crate::advice::AdviceParser;
use crate::models::{Article, TradeAdvice};
use async_trait::async_trait;
use thiserror::Error;

/// Standing instruction sent with every oracle call
pub const SYSTEM_PROMPT: &str = "You are an experienced crypto trader. You will receive a JSON list of \
recent crypto news articles and events and decide which cryptocurrencies to buy or sell. \
Answer only with lines of the form \"buy <ASSET> <HOURS>\" or \"sell <ASSET>\", where ASSET is \
the uppercase ticker symbol and HOURS is how long to hold the bought asset (1-99). \
Answer \"sell all\" to liquidate every holding. Write nothing else.";

#[derive(Debug, Error)]
pub enum OracleError {
    /// Connect failures, timeouts, 5xx and rate limiting
    #[error("transient oracle failure: {0}")]
    Transient(String),

    #[error("oracle API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected oracle response: {0}")]
    Decode(String),

    #[error("oracle returned no completion")]
    Empty,

    #[error("failed to encode articles: {0}")]
    Encode(#[from] serde_json::Error),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_))
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            OracleError::Transient(e.to_string())
        } else {
            OracleError::Decode(e.to_string())
        }
    }
}

/// Free-text completion service
#[async_trait]
pub trait TradeOracle: Send + Sync {
    /// Complete `prompt` under the fixed system instruction
    async fn invoke(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Turns a batch of articles into parsed trade advice
pub struct TradeAdvisor {
    oracle: Box<dyn TradeOracle>,
    parser: AdviceParser,
}

impl TradeAdvisor {
    pub fn new(oracle: Box<dyn TradeOracle>, parser: AdviceParser) -> Self {
        Self { oracle, parser }
    }

    pub async fn advise(&self, articles: &[Article]) -> Result<Vec<TradeAdvice>, OracleError> {
        let prompt = serde_json::to_string(articles)?;
        let response = self.oracle.invoke(&prompt).await?;
        tracing::info!("🤖 Oracle response: {}", response.trim());

        let advices = self.parser.parse(&response);
        if advices.is_empty() {
            tracing::info!("No actionable advice in oracle response");
        } else {
            let listed: Vec<String> = advices.iter().map(|a| a.to_string()).collect();
            tracing::info!("Parsed advice: {}", listed.join(", "));
        }

        Ok(advices)
    }
}
