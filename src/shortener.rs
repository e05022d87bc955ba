use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ShortenerConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortenerError {
    #[error("the shortening API key was rejected")]
    InvalidCredential,
    #[error("shortening service unreachable: {0}")]
    Unreachable(String),
    #[error("shortening service rate limit reached")]
    RateLimited,
    #[error("unexpected response from shortening service: {0}")]
    MalformedResponse(String),
}

/// Port to an external link shortening provider.
///
/// Retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait Shortener: Send + Sync {
    async fn shorten(&self, credential: &str, long_url: &str) -> Result<String, ShortenerError>;
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default, rename = "shortenedUrl")]
    shortened_url: Option<String>,
}

/// Client for AdLinkFly-style `GET /api?api=KEY&url=URL` providers
pub struct HttpShortener {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpShortener {
    pub fn new(config: &ShortenerConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid shortener base_url '{}': {}", config.base_url, e))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, base_url })
    }

    fn api_url(&self, credential: &str, long_url: &str) -> Result<Url, ShortenerError> {
        let mut url = self
            .base_url
            .join("api")
            .map_err(|e| ShortenerError::Unreachable(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api", credential)
            .append_pair("url", long_url);
        Ok(url)
    }

    /// Links already issued by this provider are passed through unchanged.
    fn is_provider_link(&self, long_url: &str) -> bool {
        match (Url::parse(long_url), self.base_url.host_str()) {
            (Ok(url), Some(provider)) => url
                .host_str()
                .is_some_and(|host| host.eq_ignore_ascii_case(provider)),
            _ => false,
        }
    }
}

#[async_trait]
impl Shortener for HttpShortener {
    async fn shorten(&self, credential: &str, long_url: &str) -> Result<String, ShortenerError> {
        if self.is_provider_link(long_url) {
            debug!("Already shortened, passing through: {}", long_url);
            return Ok(long_url.to_string());
        }

        let url = self.api_url(credential, long_url)?;
        debug!("Requesting short link for {}", long_url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ShortenerError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShortenerError::Unreachable(e.to_string()))?;

        parse_response(status, &body)
    }
}

fn parse_response(status: StatusCode, body: &str) -> Result<String, ShortenerError> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => return Err(ShortenerError::RateLimited),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(ShortenerError::InvalidCredential)
        }
        s if !s.is_success() => {
            return Err(ShortenerError::Unreachable(format!("HTTP {}", s)));
        }
        _ => {}
    }

    let parsed: ShortenResponse = serde_json::from_str(body)
        .map_err(|e| ShortenerError::MalformedResponse(e.to_string()))?;

    if parsed.status.as_deref() == Some("error") {
        let message = parsed
            .message
            .map(|m| match m {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_default();
        if mentions_api_key(&message) {
            return Err(ShortenerError::InvalidCredential);
        }
        return Err(ShortenerError::MalformedResponse(message));
    }

    match parsed.shortened_url {
        Some(short) if !short.trim().is_empty() => Ok(short),
        _ => Err(ShortenerError::MalformedResponse(
            "missing shortenedUrl".to_string(),
        )),
    }
}

/// True when a provider error names the API key, as a phrase or the word "api"
fn mentions_api_key(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("api key")
        || lower.contains("api token")
        || lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == "api")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortener() -> HttpShortener {
        HttpShortener::new(&ShortenerConfig {
            base_url: "https://bdshortner.com".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_api_url_encodes_query() {
        let url = shortener()
            .api_url("k&y", "https://example.com/a?b=1&c=2")
            .unwrap();
        assert_eq!(url.path(), "/api");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("api".to_string(), "k&y".to_string()),
                ("url".to_string(), "https://example.com/a?b=1&c=2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_links_pass_through() {
        let s = shortener();
        let short = "https://bdshortner.com/AbC12";
        assert_eq!(s.shorten("key", short).await.unwrap(), short);
        assert!(!s.is_provider_link("https://example.com/bdshortner.com"));
        assert!(!s.is_provider_link("not a url"));
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{"status":"success","shortenedUrl":"https://bdshortner.com/x1"}"#;
        assert_eq!(
            parse_response(StatusCode::OK, body).unwrap(),
            "https://bdshortner.com/x1"
        );
    }

    #[test]
    fn test_parse_api_error_is_invalid_credential() {
        let body = r#"{"status":"error","message":["Invalid API token"]}"#;
        assert_eq!(
            parse_response(StatusCode::OK, body),
            Err(ShortenerError::InvalidCredential)
        );
    }

    #[test]
    fn test_parse_other_error_is_malformed() {
        let body = r#"{"status":"error","message":"Invalid URL"}"#;
        assert_eq!(
            parse_response(StatusCode::OK, body),
            Err(ShortenerError::MalformedResponse("Invalid URL".to_string()))
        );
    }

    #[test]
    fn test_parse_error_containing_api_substring_is_malformed() {
        let body = r#"{"status":"error","message":"Too many rapid requests"}"#;
        assert_eq!(
            parse_response(StatusCode::OK, body),
            Err(ShortenerError::MalformedResponse(
                "Too many rapid requests".to_string()
            ))
        );
    }

    #[test]
    fn test_mentions_api_key() {
        assert!(mentions_api_key("Invalid API key"));
        assert!(mentions_api_key("api-token expired"));
        assert!(mentions_api_key("Bad API."));
        assert!(!mentions_api_key("capital letters not allowed"));
        assert!(!mentions_api_key("rapid requests"));
    }

    #[test]
    fn test_parse_missing_short_url() {
        assert!(matches!(
            parse_response(StatusCode::OK, r#"{"status":"success"}"#),
            Err(ShortenerError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, "<html>"),
            Err(ShortenerError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_http_status_mapping() {
        assert_eq!(
            parse_response(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(ShortenerError::RateLimited)
        );
        assert_eq!(
            parse_response(StatusCode::FORBIDDEN, ""),
            Err(ShortenerError::InvalidCredential)
        );
        assert!(matches!(
            parse_response(StatusCode::BAD_GATEWAY, ""),
            Err(ShortenerError::Unreachable(_))
        ));
    }
}
