use serde::{Deserialize, Serialize};

use crate::paper::PaperRecord;

/// What the user asked a source for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub limit: u32,
    /// Inclusive publication-year bounds.
    pub year_range: Option<(i32, i32)>,
    pub min_citations: Option<u32>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: u32) -> Self {
        Self {
            text: text.into(),
            limit,
            ..Default::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Year and citation constraints. A record with an unknown year fails
    /// any year constraint.
    pub fn accepts(&self, paper: &PaperRecord) -> bool {
        let year_ok = self
            .year_range
            .map(|(lo, hi)| paper.year_known() && paper.year >= lo && paper.year <= hi)
            .unwrap_or(true);
        let citations_ok = self
            .min_citations
            .map(|min| paper.citation_count >= min)
            .unwrap_or(true);
        year_ok && citations_ok
    }
}

/// Case-insensitive substring match over title, abstract, authors and
/// keywords. A blank query matches everything.
pub fn matches_text(paper: &PaperRecord, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    paper.title.to_lowercase().contains(&q)
        || paper.abstract_text.to_lowercase().contains(&q)
        || paper.authors.iter().any(|a| a.to_lowercase().contains(&q))
        || paper.keywords.iter().any(|k| k.to_lowercase().contains(&q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{normalize, RawRecord};
    use serde_json::json;

    fn paper() -> PaperRecord {
        let raw: RawRecord = json!({
            "title": "Memory Consolidation During Sleep",
            "abstract": "We examine hippocampal replay.",
            "authors": ["Ada Lovelace"],
            "keywords": ["Cognitive Drift"],
            "year": 2020,
            "citations": 15
        })
        .as_object()
        .cloned()
        .unwrap();
        normalize(&raw, "local")
    }

    #[test]
    fn test_text_match_fields() {
        let p = paper();
        assert!(matches_text(&p, "memory"));
        assert!(matches_text(&p, "HIPPOCAMPAL"));
        assert!(matches_text(&p, "lovelace"));
        assert!(matches_text(&p, "cognitive drift"));
        assert!(matches_text(&p, "  "));
        assert!(!matches_text(&p, "transformer"));
    }

    #[test]
    fn test_year_and_citation_filters() {
        let p = paper();
        let mut q = SearchQuery::new("memory", 10);
        assert!(q.accepts(&p));
        q.year_range = Some((2021, 2024));
        assert!(!q.accepts(&p));
        q.year_range = Some((2020, 2020));
        assert!(q.accepts(&p));
        q.min_citations = Some(16);
        assert!(!q.accepts(&p));
        q.min_citations = Some(15);
        assert!(q.accepts(&p));
    }

    #[test]
    fn test_unknown_year_fails_year_filter() {
        let mut p = paper();
        p.year = 0;
        let q = SearchQuery {
            year_range: Some((1900, 2100)),
            ..SearchQuery::new("", 10)
        };
        assert!(!q.accepts(&p));
        assert!(SearchQuery::new("", 10).accepts(&p));
    }
}
