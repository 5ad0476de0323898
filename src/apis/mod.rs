pub mod local;
pub mod openalex;
pub mod semantic_scholar;

use async_trait::async_trait;
use thiserror::Error;

use crate::filter::SearchQuery;
use crate::paper::RawRecord;

pub(crate) const USER_AGENT: &str = "lit-review/0.1";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Rate limited by {0}")]
    RateLimited(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A backend translating its native response into raw records.
/// An empty result is a valid outcome, distinct from an error.
#[async_trait]
pub trait PaperSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError>;
}

/// Map non-success HTTP statuses onto the source error taxonomy.
pub(crate) async fn check_status(
    source: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        429 => SourceError::RateLimited(source.to_string()),
        400 => SourceError::InvalidQuery(format!("{}: {}", source, truncate(&body, 200))),
        _ => SourceError::Api(format!("{} returned {}: {}", source, status, truncate(&body, 200))),
    })
}

pub(crate) fn reject_blank(source: &str, query: &SearchQuery) -> Result<(), SourceError> {
    if query.is_blank() {
        return Err(SourceError::InvalidQuery(format!("{} needs a non-empty query", source)));
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_blank() {
        assert!(matches!(
            reject_blank("openalex", &SearchQuery::new("  ", 10)),
            Err(SourceError::InvalidQuery(_))
        ));
        assert!(reject_blank("openalex", &SearchQuery::new("memory", 10)).is_ok());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
