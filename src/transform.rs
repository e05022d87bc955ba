use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::preferences::{PreferenceStore, StoreError, UserId, UserPreferences};
use crate::shortener::{Shortener, ShortenerError};

/// Byte range of a URL inside [`ForwardedMessage::text`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlSpan {
    pub offset: usize,
    pub length: usize,
}

impl UrlSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// `None` when the end offset overflows
    fn range(&self) -> Option<Range<usize>> {
        let end = self.offset.checked_add(self.length)?;
        Some(self.offset..end)
    }
}

/// An incoming forwarded post, already reduced to what the pipeline needs
#[derive(Debug, Clone, Default)]
pub struct ForwardedMessage {
    pub text: String,
    pub url_spans: Vec<UrlSpan>,
    pub has_media: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedMessage {
    pub text: String,
    /// The caller should drop attached media before delivery
    pub suppress_media: bool,
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("no shortening API key configured")]
    NoCredential,
    #[error("no links found to shorten")]
    NoLinksFound,
    #[error("failed to shorten {url}: {source}")]
    ShortenerFailed {
        url: String,
        #[source]
        source: ShortenerError,
    },
    #[error(transparent)]
    StorageUnavailable(#[from] StoreError),
}

/// Rewrites `prefix<segment>` to `prefix<target>` for channel links
struct ChannelLinkRewriter {
    prefix: String,
    pattern: Regex,
}

impl ChannelLinkRewriter {
    fn new(prefix: &str) -> Result<Self> {
        // The prefix must start a host, so `chat.me/` never matches `t.me/`
        let pattern = Regex::new(&format!(r"(^|[^\w.-]){}[\w@+-]+", regex::escape(prefix)))
            .with_context(|| format!("Invalid channel link prefix: {}", prefix))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    /// `https://t.me/mychan` and `t.me/mychan` become `mychan`; anything
    /// else (e.g. `@mychan`) is used verbatim.
    fn normalize_target<'a>(&self, target: &'a str) -> &'a str {
        let target = target.trim();
        let bare = target
            .strip_prefix("https://")
            .or_else(|| target.strip_prefix("http://"))
            .unwrap_or(target);
        match bare.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.split('/').next().unwrap_or(rest),
            None => target,
        }
    }

    fn rewrite(&self, text: &str, target: &str) -> String {
        let target = self.normalize_target(target);
        if target.is_empty() {
            return text.to_string();
        }
        self.pattern
            .replace_all(text, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], self.prefix, target)
            })
            .into_owned()
    }
}

/// Turns forwarded posts into their shortened, user-formatted form
pub struct MessageTransformer {
    store: Arc<dyn PreferenceStore>,
    shortener: Arc<dyn Shortener>,
    channel_links: ChannelLinkRewriter,
    call_timeout: Duration,
}

impl MessageTransformer {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        shortener: Arc<dyn Shortener>,
        channel_link_prefix: &str,
        call_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            store,
            shortener,
            channel_links: ChannelLinkRewriter::new(channel_link_prefix)?,
            call_timeout,
        })
    }

    /// Load the user's preferences and transform the message with them.
    pub async fn transform_for_user(
        &self,
        user_id: UserId,
        message: &ForwardedMessage,
    ) -> Result<TransformedMessage, TransformError> {
        let prefs = self.store.get(user_id).await?;
        self.transform(message, prefs.as_ref()).await
    }

    pub async fn transform(
        &self,
        message: &ForwardedMessage,
        prefs: Option<&UserPreferences>,
    ) -> Result<TransformedMessage, TransformError> {
        let prefs = prefs.ok_or(TransformError::NoCredential)?;
        let credential = prefs
            .shortening_credential
            .as_deref()
            .ok_or(TransformError::NoCredential)?;

        let spans = valid_spans(&message.text, &message.url_spans);
        if spans.is_empty() {
            return Err(TransformError::NoLinksFound);
        }

        let urls: Vec<&str> = spans.iter().map(|r| &message.text[r.clone()]).collect();
        let shortened = self.shorten_all(credential, &urls).await?;

        let mut text = recompose(&message.text, &spans, &shortened);

        if let Some(target) = prefs.channel_target.as_deref() {
            text = self.channel_links.rewrite(&text, target);
        }

        if !prefs.text_visible {
            text = shortened.join(" ");
        }

        if let Some(footer) = prefs.footer.as_deref().filter(|f| !f.is_empty()) {
            text.push('\n');
            text.push_str(footer);
        }

        Ok(TransformedMessage {
            text,
            suppress_media: message.has_media && !prefs.media_visible,
        })
    }

    /// Shorten every URL concurrently; results come back in input order.
    /// Any single failure fails the whole batch.
    async fn shorten_all(
        &self,
        credential: &str,
        urls: &[&str],
    ) -> Result<Vec<String>, TransformError> {
        let calls = urls.iter().map(|url| async move {
            debug!("Shortening {}", url);
            match tokio::time::timeout(self.call_timeout, self.shortener.shorten(credential, url))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ShortenerError::Unreachable(format!(
                    "timed out after {}s",
                    self.call_timeout.as_secs_f32()
                ))),
            }
        });

        let results = join_all(calls).await;

        urls.iter()
            .zip(results)
            .map(|(url, result)| {
                result.map_err(|source| {
                    warn!("Shortening {} failed: {}", url, source);
                    TransformError::ShortenerFailed {
                        url: url.to_string(),
                        source,
                    }
                })
            })
            .collect()
    }
}

/// Ascending, non-overlapping byte ranges that can be sliced out of `text`.
fn valid_spans(text: &str, spans: &[UrlSpan]) -> Vec<Range<usize>> {
    let mut sorted: Vec<&UrlSpan> = spans.iter().collect();
    sorted.sort_by_key(|s| s.offset);

    let mut ranges: Vec<Range<usize>> = Vec::with_capacity(sorted.len());
    for span in sorted {
        let Some(range) = span
            .range()
            .filter(|r| !r.is_empty() && text.get(r.clone()).is_some())
        else {
            warn!("Dropping URL span {:?} outside message text", span);
            continue;
        };
        if ranges.last().is_some_and(|prev| prev.end > range.start) {
            warn!("Dropping URL span {:?} overlapping a previous span", span);
            continue;
        }
        ranges.push(range);
    }
    ranges
}

/// Replace each range with its short link, last range first so earlier
/// offsets stay valid.
fn recompose(text: &str, spans: &[Range<usize>], shortened: &[String]) -> String {
    let mut out = text.to_string();
    for (range, short) in spans.iter().zip(shortened).rev() {
        out.replace_range(range.clone(), short);
    }
    out
}
