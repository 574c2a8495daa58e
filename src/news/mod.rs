// News and event feeds
pub mod cryptonews;

pub use cryptonews::{CryptoNewsClient, CryptoNewsFeed};

use crate::models::Article;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Article together with its publication time
pub type DatedArticle = (Article, DateTime<Utc>);

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("news API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unknown news feed '{0}'")]
    UnknownFeed(String),
}

/// One remote feed of dated articles
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Latest items of the feed, in any order
    async fn fetch(&self) -> Result<Vec<DatedArticle>, NewsError>;
}

struct WatchedSource {
    source: Box<dyn ArticleSource>,
    watermark: DateTime<Utc>,
}

/// Merges several feeds and hands out each article only once
///
/// Every source keeps its own watermark: the newest publication time seen so
/// far. An item is new when it was published strictly after the watermark.
/// A failing source is logged and keeps its watermark, so nothing is lost
/// once it recovers.
pub struct ArticleProvider {
    sources: Vec<WatchedSource>,
}

impl ArticleProvider {
    /// Start with every watermark `initial_lookback` in the past
    pub fn new(sources: Vec<Box<dyn ArticleSource>>, initial_lookback: Duration) -> Self {
        Self::starting_at(sources, Utc::now() - initial_lookback)
    }

    pub fn starting_at(sources: Vec<Box<dyn ArticleSource>>, start: DateTime<Utc>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|source| WatchedSource {
                    source,
                    watermark: start,
                })
                .collect(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Articles published since the previous call
    pub async fn fetch_new(&mut self) -> Vec<Article> {
        let mut fresh = Vec::new();

        for watched in &mut self.sources {
            let items = match watched.source.fetch().await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("✗ Failed to fetch {} feed: {}", watched.source.name(), e);
                    continue;
                }
            };

            let mut newest = watched.watermark;
            for (article, published_at) in items {
                if published_at <= watched.watermark {
                    continue;
                }
                tracing::info!("📰 New {} item: \"{}\"", watched.source.name(), article.title);
                newest = newest.max(published_at);
                fresh.push(article);
            }
            watched.watermark = newest;
        }

        fresh
    }
}
