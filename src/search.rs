use std::collections::HashSet;
use std::sync::Arc;

use crate::apis::{PaperSource, SourceError};
use crate::filter::SearchQuery;
use crate::identity::{self, Identity};
use crate::paper::{self, PaperRecord};

/// Records from one source, already normalized, filtered and deduplicated.
pub async fn search_source(
    source: &dyn PaperSource,
    query: &SearchQuery,
) -> Result<Vec<PaperRecord>, SourceError> {
    let raw = source.search(query).await?;
    let fetched = raw.len();
    let records = dedupe(
        raw.iter()
            .map(|r| paper::normalize(r, source.name()))
            .filter(|p| query.accepts(p)),
    );
    tracing::info!(
        "{}: {} fetched, {} kept for {:?}",
        source.name(),
        fetched,
        records.len(),
        query.text
    );
    Ok(records)
}

/// Query several sources in parallel and merge by identity. Fails only if
/// every source failed; the first error is returned in that case.
pub async fn federated_search(
    sources: &[Arc<dyn PaperSource>],
    query: &SearchQuery,
) -> Result<Vec<PaperRecord>, SourceError> {
    let handles: Vec<_> = sources
        .iter()
        .map(|source| {
            let source = Arc::clone(source);
            let query = query.clone();
            tokio::spawn(async move { search_source(source.as_ref(), &query).await })
        })
        .collect();

    let mut merged = Vec::new();
    let mut first_err = None;
    let mut any_ok = false;
    for handle in handles {
        match handle.await {
            Ok(Ok(records)) => {
                any_ok = true;
                merged.extend(records);
            }
            Ok(Err(e)) => {
                tracing::warn!("Source search failed: {}", e);
                first_err.get_or_insert(e);
            }
            Err(e) => tracing::warn!("Source task panicked: {}", e),
        }
    }

    match first_err {
        Some(e) if !any_ok => Err(e),
        _ => {
            let mut records = dedupe(merged);
            if query.limit > 0 {
                records.truncate(query.limit as usize);
            }
            Ok(records)
        }
    }
}

/// Keep the first record per identity, preserving order.
fn dedupe(records: impl IntoIterator<Item = PaperRecord>) -> Vec<PaperRecord> {
    let mut seen: HashSet<Identity> = HashSet::new();
    records
        .into_iter()
        .filter(|p| seen.insert(identity::of(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::RawRecord;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Stub {
        name: &'static str,
        records: Vec<Value>,
    }

    #[async_trait]
    impl PaperSource for Stub {
        fn name(&self) -> &str {
            self.name
        }
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
            Ok(self
                .records
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl PaperSource for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
            Err(SourceError::RateLimited("failing".into()))
        }
    }

    #[tokio::test]
    async fn test_search_source_filters_and_dedupes() {
        let stub = Stub {
            name: "stub",
            records: vec![
                json!({"provider_id": "W1", "title": "A", "year": 2020, "citations": 3}),
                json!({"provider_id": "W1", "title": "A again", "year": 2020, "citations": 3}),
                json!({"provider_id": "W2", "title": "B", "year": 2010, "citations": 50}),
                json!({"title": "No year", "citations": 50}),
            ],
        };
        let query = SearchQuery {
            year_range: Some((2015, 2025)),
            ..SearchQuery::new("a", 10)
        };
        let records = search_source(&stub, &query).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "A");
        assert_eq!(records[0].source, "stub");
    }

    #[tokio::test]
    async fn test_federated_merges_by_identity() {
        let sources: Vec<Arc<dyn PaperSource>> = vec![
            Arc::new(Stub {
                name: "one",
                records: vec![json!({"provider_id": "W1", "title": "A"})],
            }),
            Arc::new(Stub {
                name: "two",
                records: vec![
                    json!({"provider_id": "W1", "title": "A"}),
                    json!({"provider_id": "W2", "title": "B"}),
                ],
            }),
            Arc::new(Failing),
        ];
        let records = federated_search(&sources, &SearchQuery::new("x", 10)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "one");
    }

    #[tokio::test]
    async fn test_federated_all_failed() {
        let sources: Vec<Arc<dyn PaperSource>> = vec![Arc::new(Failing)];
        let err = federated_search(&sources, &SearchQuery::new("x", 10)).await.err().unwrap();
        assert!(matches!(err, SourceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_error() {
        let sources: Vec<Arc<dyn PaperSource>> = vec![Arc::new(Stub { name: "empty", records: vec![] })];
        let records = federated_search(&sources, &SearchQuery::new("x", 10)).await.unwrap();
        assert!(records.is_empty());
    }
}
