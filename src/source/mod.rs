//! Repository dump sources.
//!
//! [`HttpRepoSource`] downloads a flattened dump over HTTP, rewriting
//! `github.com` repository URLs to the uithub dump service. [`StaticSource`]
//! serves a dump that is already in memory.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("coderag/", env!("CARGO_PKG_VERSION"));
const DUMP_HOST: &str = "uithub.com";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid repository url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("repository not reachable: {0}")]
    NotReachable(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Supplies the raw dump for a repository URL.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Rewrites `github.com` URLs to the dump service; other URLs pass through.
pub fn to_dump_url(url: &str) -> Result<Url, FetchError> {
    let mut parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if matches!(parsed.host_str(), Some("github.com") | Some("www.github.com")) {
        parsed
            .set_host(Some(DUMP_HOST))
            .map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
    }
    Ok(parsed)
}

pub struct HttpRepoSource {
    client: Client,
}

impl HttpRepoSource {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RepoSource for HttpRepoSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let dump_url = to_dump_url(url)?;
        debug!("Fetching dump from {}", dump_url);

        let response = self
            .client
            .get(dump_url.clone())
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    FetchError::NotReachable(format!("{dump_url}: {e}"))
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NotReachable(format!(
                "{dump_url}: HTTP {status}"
            )));
        }

        let body = response.text().await?;
        info!("Fetched {} bytes from {}", body.len(), dump_url);
        Ok(body)
    }
}

/// Returns the same in-memory dump for every URL.
#[derive(Debug, Clone)]
pub struct StaticSource {
    dump: String,
}

impl StaticSource {
    pub fn new(dump: impl Into<String>) -> Self {
        Self { dump: dump.into() }
    }
}

#[async_trait]
impl RepoSource for StaticSource {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        Ok(self.dump.clone())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_github_url_is_rewritten() {
        let url = to_dump_url("https://github.com/owner/repo").unwrap();
        assert_eq!(url.as_str(), "https://uithub.com/owner/repo");

        let url = to_dump_url("https://www.github.com/owner/repo/tree/main").unwrap();
        assert_eq!(url.host_str(), Some("uithub.com"));
        assert_eq!(url.path(), "/owner/repo/tree/main");
    }

    #[test]
    fn test_other_urls_pass_through() {
        let url = to_dump_url("https://gitlab.com/owner/repo").unwrap();
        assert_eq!(url.as_str(), "https://gitlab.com/owner/repo");

        // Only the host is matched, not the path.
        let url = to_dump_url("https://example.com/github.com/x").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            to_dump_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_fetch_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/owner/repo"))
            .and(header("user-agent", "coderag-test"))
            .and(header("accept", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("└── a.py"))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpRepoSource::new("coderag-test", 5).unwrap();
        let body = source
            .fetch(&format!("{}/owner/repo", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "└── a.py");
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpRepoSource::new(DEFAULT_USER_AGENT, 5).unwrap();
        let err = source
            .fetch(&format!("{}/missing/repo", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotReachable(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new("dump");
        assert_eq!(source.fetch("anything").await.unwrap(), "dump");
    }
}
