use std::path::PathBuf;
use std::sync::Arc;

use crate::apis::{self, local::LocalCorpus, PaperSource};
use crate::ranking::{GeminiClient, GeminiRanker};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MAX_RESULTS: u32 = 20;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub corpus_path: PathBuf,
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub max_results: u32,
    pub enabled_source_names: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gemini_api_key = ["GEMINI_API_KEY", "GEMINI_API_KEY_1", "GEMINI_API_KEY_2", "GEMINI_API_KEY_3"]
            .into_iter()
            .find_map(|k| get(k));

        let max_results = match get("LIT_REVIEW_MAX_RESULTS").map(|v| v.parse::<u32>()) {
            Some(Ok(n)) if n > 0 => n.min(100),
            Some(_) => {
                tracing::warn!("Ignoring invalid LIT_REVIEW_MAX_RESULTS");
                DEFAULT_MAX_RESULTS
            }
            None => DEFAULT_MAX_RESULTS,
        };

        Self {
            corpus_path: get("LIT_REVIEW_CORPUS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("papers.json")),
            semantic_scholar_api_key: get("SEMANTIC_SCHOLAR_API_KEY"),
            openalex_email: get("OPENALEX_EMAIL"),
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_results,
            enabled_source_names: get("LIT_REVIEW_SOURCES")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn should_enable(&self, name: &str) -> bool {
        self.enabled_source_names.is_empty()
            || self.enabled_source_names.iter().any(|n| n == name)
    }

    /// The local corpus, unless filtered out. A missing file yields an
    /// empty corpus that `reload_corpus` can fill later.
    pub fn build_local(&self) -> Option<Arc<LocalCorpus>> {
        self.should_enable("local")
            .then(|| Arc::new(LocalCorpus::open(&self.corpus_path)))
    }

    /// Build the list of enabled paper sources based on configuration.
    pub fn build_sources(&self, local: Option<Arc<LocalCorpus>>) -> Vec<Arc<dyn PaperSource>> {
        let mut sources: Vec<Arc<dyn PaperSource>> = Vec::new();

        if let Some(corpus) = local {
            tracing::info!("Local corpus at {}", corpus.path().display());
            sources.push(corpus);
        }
        if self.should_enable("semantic_scholar") {
            sources.push(Arc::new(apis::semantic_scholar::SemanticScholarClient::new(
                self.semantic_scholar_api_key.clone(),
            )));
        }
        if self.should_enable("openalex") {
            sources.push(Arc::new(apis::openalex::OpenAlexClient::new(
                self.openalex_email.clone(),
            )));
        }

        sources
    }

    /// Build the Gemini-backed ranker if an API key is configured.
    pub fn build_ranker(&self) -> Option<GeminiRanker<GeminiClient>> {
        match &self.gemini_api_key {
            Some(key) => Some(GeminiRanker::new(GeminiClient::new(
                key.clone(),
                self.gemini_model.clone(),
            ))),
            None => {
                tracing::warn!("AI features disabled: GEMINI_API_KEY not set");
                None
            }
        }
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        let mut statuses = vec![
            SourceStatus {
                name: "local".into(),
                enabled: self.corpus_path.exists(),
                note: if self.corpus_path.exists() {
                    format!("Corpus file {}", self.corpus_path.display())
                } else {
                    format!("Disabled: {} not found", self.corpus_path.display())
                },
            },
            SourceStatus {
                name: "semantic_scholar".into(),
                enabled: true,
                note: if self.semantic_scholar_api_key.is_some() { "API key set".into() } else { "No API key (rate limited)".into() },
            },
            SourceStatus {
                name: "openalex".into(),
                enabled: true,
                note: if self.openalex_email.is_some() { "Polite pool email set".into() } else { "No email (limited rate)".into() },
            },
            SourceStatus {
                name: "gemini".into(),
                enabled: self.gemini_api_key.is_some(),
                note: if self.gemini_api_key.is_some() { format!("Model {}", self.gemini_model) } else { "Disabled: GEMINI_API_KEY not set".into() },
            },
        ];

        // Apply filter
        for s in statuses.iter_mut().filter(|s| s.name != "gemini") {
            if !self.should_enable(&s.name) {
                s.enabled = false;
                s.note = "Disabled by LIT_REVIEW_SOURCES filter".into();
            }
        }

        statuses
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.corpus_path, PathBuf::from("papers.json"));
        assert_eq!(c.gemini_model, DEFAULT_MODEL);
        assert_eq!(c.max_results, DEFAULT_MAX_RESULTS);
        assert!(c.gemini_api_key.is_none());
        assert!(c.enabled_source_names.is_empty());
        assert!(c.build_ranker().is_none());
    }

    #[test]
    fn test_numbered_gemini_keys() {
        let c = config(&[("GEMINI_API_KEY_1", " "), ("GEMINI_API_KEY_2", "k2"), ("GEMINI_API_KEY_3", "k3")]);
        assert_eq!(c.gemini_api_key.as_deref(), Some("k2"));
        assert!(c.build_ranker().is_some());
    }

    #[test]
    fn test_source_filter() {
        let c = config(&[("LIT_REVIEW_SOURCES", "OpenAlex, ,semantic_scholar")]);
        assert_eq!(c.enabled_source_names, vec!["openalex", "semantic_scholar"]);
        assert!(c.build_local().is_none());
        let names: Vec<String> = c.build_sources(c.build_local()).iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["semantic_scholar", "openalex"]);

        let status = c.source_status();
        let local = status.iter().find(|s| s.name == "local").unwrap();
        assert!(!local.enabled);
    }

    #[test]
    fn test_local_source_registered_even_without_file() {
        let c = config(&[("LIT_REVIEW_CORPUS", "/nonexistent/papers.json")]);
        let local = c.build_local();
        assert!(local.is_some());
        let names: Vec<String> = c.build_sources(local).iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["local", "semantic_scholar", "openalex"]);
    }

    #[test]
    fn test_max_results() {
        assert_eq!(config(&[("LIT_REVIEW_MAX_RESULTS", "500")]).max_results, 100);
        assert_eq!(config(&[("LIT_REVIEW_MAX_RESULTS", "abc")]).max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(config(&[("LIT_REVIEW_MAX_RESULTS", "0")]).max_results, DEFAULT_MAX_RESULTS);
    }
}
