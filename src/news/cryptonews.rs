use crate::models::Article;
use crate::news::{ArticleSource, DatedArticle, NewsError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

pub const CRYPTONEWS_API_BASE: &str = "https://cryptonews-api.com/api/v1";

/// Which cryptonews-api listing to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoNewsFeed {
    /// Ticker news across all coins
    News,
    /// Scheduled and announced events
    Events,
}

impl CryptoNewsFeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoNewsFeed::News => "news",
            CryptoNewsFeed::Events => "events",
        }
    }
}

impl FromStr for CryptoNewsFeed {
    type Err = NewsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "news" => Ok(CryptoNewsFeed::News),
            "events" => Ok(CryptoNewsFeed::Events),
            other => Err(NewsError::UnknownFeed(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<FeedItem>,
}

// News items use title/text, events use event_name/event_text
#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(alias = "event_name")]
    title: String,
    #[serde(alias = "event_text", default)]
    text: String,
    #[serde(default)]
    tickers: Vec<String>,
    date: String,
}

pub struct CryptoNewsClient {
    client: Client,
    base_url: String,
    api_key: String,
    items: u32,
    feed: CryptoNewsFeed,
}

impl CryptoNewsClient {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        items: u32,
        feed: CryptoNewsFeed,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            items,
            feed,
        })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let items = self.items.to_string();
        match self.feed {
            CryptoNewsFeed::News => self
                .client
                .get(format!("{}/category", self.base_url))
                .query(&[
                    ("section", "alltickers"),
                    ("items", items.as_str()),
                    ("page", "1"),
                    ("token", self.api_key.as_str()),
                ]),
            CryptoNewsFeed::Events => self
                .client
                .get(format!("{}/events", self.base_url))
                .query(&[("items", items.as_str()), ("token", self.api_key.as_str())]),
        }
    }
}

/// Feed dates look like `Mon, 15 Jan 2024 10:30:00 -0500`
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[async_trait]
impl ArticleSource for CryptoNewsClient {
    fn name(&self) -> &str {
        self.feed.as_str()
    }

    async fn fetch(&self) -> Result<Vec<DatedArticle>, NewsError> {
        let response = self.request().send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let feed: FeedResponse = response.json().await?;
        let articles = feed
            .data
            .into_iter()
            .filter_map(|item| match parse_date(&item.date) {
                Some(published_at) => Some((
                    Article {
                        title: item.title,
                        text: item.text,
                        symbols: item.tickers,
                    },
                    published_at,
                )),
                None => {
                    tracing::warn!("Skipping \"{}\": unreadable date '{}'", item.title, item.date);
                    None
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!("Fetched {} items from {} feed", articles.len(), self.name());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn client(base_url: &str, feed: CryptoNewsFeed) -> CryptoNewsClient {
        CryptoNewsClient::new("tok".to_string(), base_url, 10, feed, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_parse_date_with_offset() {
        let parsed = parse_date("Mon, 15 Jan 2024 10:30:00 -0500").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_feed_from_str() {
        assert_eq!("News".parse::<CryptoNewsFeed>().unwrap(), CryptoNewsFeed::News);
        assert_eq!("events".parse::<CryptoNewsFeed>().unwrap(), CryptoNewsFeed::Events);
        assert!("tweets".parse::<CryptoNewsFeed>().is_err());
    }

    #[tokio::test]
    async fn test_fetch_news() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/category")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("section".into(), "alltickers".into()),
                Matcher::UrlEncoded("items".into(), "10".into()),
                Matcher::UrlEncoded("token".into(), "tok".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"data":[
                    {"title":"ETF approved","text":"Spot ETF goes live","tickers":["BTC"],"date":"Mon, 15 Jan 2024 10:30:00 -0500","sentiment":"Positive"},
                    {"title":"Broken","text":"x","tickers":[],"date":"not a date"}
                ]}"#,
            )
            .create_async()
            .await;

        let articles = client(&server.url(), CryptoNewsFeed::News)
            .fetch()
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(articles.len(), 1);
        let (article, published_at) = &articles[0];
        assert_eq!(article.title, "ETF approved");
        assert_eq!(article.symbols, vec!["BTC".to_string()]);
        assert_eq!(*published_at, Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_events() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .match_query(Matcher::UrlEncoded("token".into(), "tok".into()))
            .with_status(200)
            .with_body(
                r#"{"data":[{"event_name":"Mainnet launch","event_text":"SOL upgrade","tickers":["SOL"],"date":"Tue, 16 Jan 2024 08:00:00 +0000"}]}"#,
            )
            .create_async()
            .await;

        let articles = client(&server.url(), CryptoNewsFeed::Events)
            .fetch()
            .await
            .unwrap();

        assert_eq!(articles[0].0.title, "Mainnet launch");
        assert_eq!(articles[0].0.text, "SOL upgrade");
    }

    #[tokio::test]
    async fn test_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("invalid token")
            .create_async()
            .await;

        let err = client(&server.url(), CryptoNewsFeed::Events)
            .fetch()
            .await
            .unwrap_err();

        assert!(matches!(err, NewsError::Status { status: 401, .. }));
    }
}
