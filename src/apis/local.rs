use std::path::{Path, PathBuf};

use super::{PaperSource, SourceError};
use crate::filter::{self, SearchQuery};
use crate::paper::{self, RawRecord};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// Corpus of raw records read from a JSON file. Re-read on [`reload`].
///
/// [`reload`]: LocalCorpus::reload
pub struct LocalCorpus {
    path: PathBuf,
    records: RwLock<Vec<RawRecord>>,
}

impl LocalCorpus {
    /// Accepts a bare list of objects, or an object wrapping the list under
    /// `references` or `articles`. Non-object entries are skipped.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let records = read_corpus(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Like [`load`](Self::load), but an unreadable file yields an empty
    /// corpus that a later reload can fill.
    pub fn open(path: &Path) -> Self {
        match Self::load(path) {
            Ok(corpus) => corpus,
            Err(e) => {
                tracing::warn!("Local corpus {} is empty: {}", path.display(), e);
                Self {
                    path: path.to_path_buf(),
                    records: RwLock::new(Vec::new()),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Re-read the corpus file. On error the previous records stay.
    pub async fn reload(&self) -> Result<usize, SourceError> {
        let records = read_corpus(&self.path)?;
        let count = records.len();
        *self.records.write().await = records;
        tracing::info!("Reloaded {} records from {}", count, self.path.display());
        Ok(count)
    }
}

fn read_corpus(path: &Path) -> Result<Vec<RawRecord>, SourceError> {
    let text = std::fs::read_to_string(path)?;
    parse_corpus(&text)
}

fn parse_corpus(text: &str) -> Result<Vec<RawRecord>, SourceError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SourceError::Parse(format!("corpus file: {}", e)))?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match ["references", "articles", "papers"]
            .iter()
            .find_map(|k| obj.remove(*k))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::Parse(
                    "corpus object has no list of records".to_string(),
                ))
            }
        },
        _ => return Err(SourceError::Parse("corpus is not a list".to_string())),
    };
    Ok(list
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl PaperSource for LocalCorpus {
    fn name(&self) -> &str {
        "local"
    }

    /// Blank queries return the whole corpus (up to `limit`). Year and
    /// citation filters apply to the whole corpus before the limit.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let limit = if query.limit == 0 { usize::MAX } else { query.limit as usize };
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|raw| {
                let paper = paper::normalize(raw, "local");
                filter::matches_text(&paper, &query.text) && query.accepts(&paper)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, Write};
    use tempfile::NamedTempFile;

    const CORPUS: &str = r#"{
        "references": [
            {"id": 1, "title": "Cognitive Drift in Dialogue", "year": 2021,
             "authors": ["A. Smith"], "journal": "Cognition", "keywords": ["drift"],
             "abstract": "Agents lose track of goals."},
            {"id": 2, "title": "Memory Systems Revisited", "year": 2019,
             "authors": ["B. Jones"], "keywords": ["memory"]},
            "not a record"
        ]
    }"#;

    fn corpus_file(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn test_load_and_search() {
        let file = corpus_file(CORPUS);
        let corpus = LocalCorpus::load(file.path()).unwrap();
        assert_eq!(corpus.len().await, 2);

        let hits = corpus.search(&SearchQuery::new("DRIFT", 10)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "Cognitive Drift in Dialogue");

        let all = corpus.search(&SearchQuery::new("", 10)).await.unwrap();
        assert_eq!(all.len(), 2);

        let limited = corpus.search(&SearchQuery::new("", 1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        let none = corpus.search(&SearchQuery::new("quantum", 10)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_filters_apply_before_limit() {
        let mut papers: Vec<Value> = (0..5)
            .map(|i| serde_json::json!({"id": i, "title": format!("Old memory {}", i), "year": 2000}))
            .collect();
        papers.push(serde_json::json!({"id": 5, "title": "New memory", "year": 2022, "citations": 3}));
        let file = corpus_file(&Value::Array(papers).to_string());
        let corpus = LocalCorpus::load(file.path()).unwrap();

        let query = SearchQuery {
            year_range: Some((2020, 2025)),
            ..SearchQuery::new("memory", 3)
        };
        let kept = crate::search::search_source(&corpus, &query).await.unwrap();
        let titles: Vec<&str> = kept.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["New memory"]);

        let query = SearchQuery {
            min_citations: Some(1),
            ..SearchQuery::new("memory", 1)
        };
        let hits = corpus.search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "New memory");
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let mut file = corpus_file(r#"[{"id": 1, "title": "A"}]"#);
        let corpus = LocalCorpus::load(file.path()).unwrap();
        assert_eq!(corpus.len().await, 1);

        file.as_file_mut().set_len(0).unwrap();
        file.rewind().unwrap();
        file.write_all(br#"[{"id": 1, "title": "A"}, {"id": 2, "title": "B"}]"#).unwrap();
        assert_eq!(corpus.reload().await.unwrap(), 2);
        assert_eq!(corpus.search(&SearchQuery::new("b", 10)).await.unwrap().len(), 1);

        file.as_file_mut().set_len(0).unwrap();
        file.rewind().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(matches!(corpus.reload().await, Err(SourceError::Parse(_))));
        assert_eq!(corpus.len().await, 2);
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let corpus = LocalCorpus::open(Path::new("/nonexistent/papers.json"));
        assert_eq!(corpus.len().await, 0);
        assert!(corpus.search(&SearchQuery::new("", 10)).await.unwrap().is_empty());
        assert!(matches!(corpus.reload().await, Err(SourceError::Io(_))));
    }

    #[test]
    fn test_bare_list() {
        let records = parse_corpus(r#"[{"title": "A"}, {"title": "B"}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_bad_corpus() {
        assert!(matches!(parse_corpus("42"), Err(SourceError::Parse(_))));
        assert!(matches!(parse_corpus(r#"{"x": 1}"#), Err(SourceError::Parse(_))));
        assert!(matches!(parse_corpus("{"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = LocalCorpus::load(Path::new("/nonexistent/papers.json")).err().unwrap();
        assert!(matches!(err, SourceError::Io(_)));
    }
}
