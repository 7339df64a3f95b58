//! Headline collection.
//!
//! The pipeline only depends on [`HeadlineCollector`]; [`NewsApiCollector`]
//! is the production implementation backed by newsapi.org.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{NewscastError, Result};

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2";
const NEWSAPI_KEY_ENV: &str = "NEWSAPI_KEY";

/// A news item the hosts will talk about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadlineItem {
    pub title: String,
    pub source: String,
    pub summary: String,
    pub url: String,
}

#[async_trait]
pub trait HeadlineCollector: Send + Sync {
    /// Fetch at most `max_articles` headlines matching any of `topics`.
    ///
    /// An empty result is not an error here; callers decide what it means.
    async fn fetch(&self, topics: &[String], max_articles: usize) -> Result<Vec<HeadlineItem>>;
}

/// newsapi.org client: `everything` first, `top-headlines` as a fallback.
#[derive(Debug, Clone)]
pub struct NewsApiCollector {
    api_key: Option<String>,
    base_url: String,
    days_back: i64,
    dump_dir: Option<PathBuf>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSource>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

impl NewsApiCollector {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NewscastError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: NEWSAPI_BASE_URL.to_string(),
            days_back: 1,
            dump_dir: None,
            client,
        })
    }

    /// Build a collector with the key from `NEWSAPI_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var(NEWSAPI_KEY_ENV).ok())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Also write the unprocessed articles to `dir/news.json` for inspection.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    async fn query(
        &self,
        api_key: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", api_key)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NewscastError::Http {
                service: "NewsAPI",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let body: NewsApiResponse = resp
            .json()
            .await
            .map_err(|e| NewscastError::Shape(format!("NewsAPI response: {}", e)))?;
        Ok(body.articles)
    }

    fn dump_articles(&self, articles: &[Value]) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join("news.json");
        let written = std::fs::create_dir_all(dir)
            .map_err(NewscastError::from)
            .and_then(|_| Ok(serde_json::to_string_pretty(articles)?))
            .and_then(|json| Ok(std::fs::write(&path, json)?));
        match written {
            Ok(()) => info!(path = %path.display(), "wrote fetched news"),
            Err(e) => debug!(error = %e, "could not write fetched news"),
        }
    }

    fn finish(&self, articles: Vec<Value>, max_articles: usize) -> Vec<HeadlineItem> {
        self.dump_articles(&articles);

        let items = dedupe_articles(articles, max_articles);
        info!(count = items.len(), "collected headlines");
        items
    }
}

#[async_trait]
impl HeadlineCollector for NewsApiCollector {
    async fn fetch(&self, topics: &[String], max_articles: usize) -> Result<Vec<HeadlineItem>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            NewscastError::Auth(format!("{} environment variable not set", NEWSAPI_KEY_ENV))
        })?;

        let query = topics.join(" OR ");
        let from = (chrono::Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();

        let everything = [
            ("q", query.clone()),
            ("language", "en".to_string()),
            ("sortBy", "publishedAt".to_string()),
            ("pageSize", max_articles.to_string()),
            ("from", from),
        ];
        let everything_failed = match self.query(api_key, "everything", &everything).await {
            Ok(articles) if !articles.is_empty() => {
                return Ok(self.finish(articles, max_articles));
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "NewsAPI 'everything' request failed, trying top-headlines");
                true
            }
        };

        let headlines = [
            ("q", query),
            ("language", "en".to_string()),
            ("pageSize", max_articles.to_string()),
        ];
        let articles = match self.query(api_key, "top-headlines", &headlines).await {
            Ok(articles) => articles,
            Err(e) if everything_failed => return Err(e),
            // `everything` answered, so nothing was found.
            Err(e) => {
                warn!(error = %e, "NewsAPI 'top-headlines' request failed");
                Vec::new()
            }
        };

        Ok(self.finish(articles, max_articles))
    }
}

/// Clean raw articles, dropping those without a URL or with a URL seen before.
fn dedupe_articles(articles: Vec<Value>, max_articles: usize) -> Vec<HeadlineItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for raw in articles {
        if items.len() >= max_articles {
            break;
        }
        let Ok(article) = serde_json::from_value::<NewsApiArticle>(raw) else {
            continue;
        };
        let Some(url) = article.url.filter(|u| !u.is_empty()) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        items.push(HeadlineItem {
            title: article.title.unwrap_or_default().trim().to_string(),
            source: article.source.and_then(|s| s.name).unwrap_or_default(),
            summary: article.description.unwrap_or_default(),
            url,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(title: &str, url: Option<&str>) -> Value {
        json!({
            "source": {"id": null, "name": "Wire"},
            "title": format!("  {title} "),
            "description": "Summary",
            "url": url,
        })
    }

    #[test]
    fn test_dedupe_articles() {
        let items = dedupe_articles(
            vec![
                article("One", Some("https://a")),
                article("Dup", Some("https://a")),
                article("No url", None),
                article("Two", Some("https://b")),
                article("Three", Some("https://c")),
            ],
            2,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "One");
        assert_eq!(items[0].source, "Wire");
        assert_eq!(items[1].url, "https://b");
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let collector = NewsApiCollector::new(None).unwrap();
        let err = collector.fetch(&["tech".into()], 3).await.unwrap_err();
        assert!(matches!(err, NewscastError::Auth(_)));
    }

    #[tokio::test]
    async fn test_fetch_everything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/everything"))
            .and(header("X-Api-Key", "secret"))
            .and(query_param("q", "tech OR world"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "articles": [article("Chips", Some("https://chips"))]
            })))
            .mount(&server)
            .await;

        let collector = NewsApiCollector::new(Some("secret".into()))
            .unwrap()
            .with_base_url(server.uri());
        let items = collector
            .fetch(&["tech".into(), "world".into()], 6)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Chips");
    }

    #[tokio::test]
    async fn test_falls_back_to_top_headlines() {
        let server = MockServer::start().await;
        Mock::given(path("/everything"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/top-headlines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "articles": [article("Fallback", Some("https://fb"))]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let collector = NewsApiCollector::new(Some("k".into()))
            .unwrap()
            .with_base_url(server.uri())
            .with_dump_dir(dir.path());
        let items = collector.fetch(&["tech".into()], 6).await.unwrap();
        assert_eq!(items[0].title, "Fallback");
        assert!(dir.path().join("news.json").exists());
    }

    #[tokio::test]
    async fn test_both_endpoints_failing_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("apiKeyInvalid"))
            .expect(2)
            .mount(&server)
            .await;

        let collector = NewsApiCollector::new(Some("revoked".into()))
            .unwrap()
            .with_base_url(server.uri());
        match collector.fetch(&["tech".into()], 6).await.unwrap_err() {
            NewscastError::Http { service, status, body } => {
                assert_eq!(service, "NewsAPI");
                assert_eq!(status, 401);
                assert_eq!(body, "apiKeyInvalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_everything_then_failed_fallback_is_empty() {
        let server = MockServer::start().await;
        Mock::given(path("/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"articles": []})))
            .mount(&server)
            .await;
        Mock::given(path("/top-headlines"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let collector = NewsApiCollector::new(Some("k".into()))
            .unwrap()
            .with_base_url(server.uri());
        assert!(collector.fetch(&["tech".into()], 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_found_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"articles": []})))
            .mount(&server)
            .await;

        let collector = NewsApiCollector::new(Some("k".into()))
            .unwrap()
            .with_base_url(server.uri());
        assert!(collector.fetch(&["tech".into()], 6).await.unwrap().is_empty());
    }
}
