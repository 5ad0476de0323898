use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::identity::normalize_title;
use crate::paper::PaperRecord;

/// Most records summarized into a single prompt.
pub const MAX_PROMPT_RECORDS: usize = 20;
const ABSTRACT_PREVIEW_CHARS: usize = 300;
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Model error: {0}")]
    Api(String),
    #[error("Empty reply from model")]
    Empty,
}

/// A text-completion backend.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(crate::apis::USER_AGENT)
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key,
            model,
        }
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}
#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}
#[derive(Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}
#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

fn reply_text(resp: GeminiResponse) -> Result<String, AiError> {
    let text = resp
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts.unwrap_or_default())
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    if text.is_empty() {
        return Err(AiError::Empty);
    }
    Ok(text.to_string())
}

#[async_trait]
impl Completion for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        let url = format!("{}/{}:generateContent", GEMINI_URL, model);
        let body = json!({"contents": [{"parts": [{"text": prompt}]}]});
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Api(format!("{} {}", status, text.trim())));
        }
        reply_text(resp.json().await?)
    }
}

/// One cluster parsed from a model reply. Member indices point into the
/// record slice that was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub members: Vec<usize>,
    pub topics: Vec<String>,
}

/// Relevance of one paper to a research question, 0..=10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevanceScore {
    pub score: u8,
    pub reasoning: String,
}

impl RelevanceScore {
    pub fn band(&self) -> &'static str {
        match self.score {
            7.. => "high",
            4..=6 => "medium",
            _ => "low",
        }
    }
}

/// Best-effort AI ranking and clustering. Neither call fails: on any
/// problem the input order, or an empty clustering, comes back.
#[async_trait]
pub trait RankingAdapter: Send + Sync {
    async fn rank(&self, records: &[PaperRecord], query: &str) -> Vec<PaperRecord>;
    async fn cluster(&self, records: &[PaperRecord], query: &str) -> BTreeMap<String, Cluster>;
}

pub struct GeminiRanker<C> {
    completion: C,
}

impl<C: Completion> GeminiRanker<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    pub async fn score_relevance(
        &self,
        record: &PaperRecord,
        question: &str,
    ) -> Result<RelevanceScore, AiError> {
        let prompt = format!(
            "Rate the relevance of this research paper to the following research question on a scale of 1-10, and provide a brief explanation:\n\n\
             Research Question: {}\n\nPaper Title: {}\nAbstract: {}\n\n\
             Please respond in this format:\nScore: [1-10]\nReasoning: [brief explanation]",
            question, record.title, record.abstract_text
        );
        let reply = self.completion.generate(&prompt).await?;
        Ok(parse_score(&reply))
    }

    pub async fn summarize(&self, record: &PaperRecord) -> Result<String, AiError> {
        let prompt = format!(
            "Please provide a concise summary (2-3 sentences) of this research paper:\n\n\
             Title: {}\nAbstract: {}\n\nSummary:",
            record.title, record.abstract_text
        );
        self.completion.generate(&prompt).await
    }

    pub async fn explain_relevance(
        &self,
        record: &PaperRecord,
        query: &str,
    ) -> Result<String, AiError> {
        let prompt = format!(
            "You are helping a graduate student with a literature review.\n\n\
             Search query:\n\"{}\"\n\nPaper title:\n\"{}\"\n\nAbstract:\n\"{}\"\n\nKeywords:\n{}\n\n\
             In 3-4 sentences, explain why this paper might be relevant to the search query. \
             Focus on conceptual relevance, not summary.",
            query,
            record.title,
            record.abstract_text,
            record.keywords.join(", ")
        );
        self.completion.generate(&prompt).await
    }
}

#[async_trait]
impl<C: Completion> RankingAdapter for GeminiRanker<C> {
    async fn rank(&self, records: &[PaperRecord], query: &str) -> Vec<PaperRecord> {
        let shown = &records[..records.len().min(MAX_PROMPT_RECORDS)];
        if shown.len() < 2 {
            return records.to_vec();
        }
        let prompt = format!(
            "Rank the following papers by relevance to the research query \"{}\".\n\
             Reply with the paper numbers only, most relevant first, one per line.\n\n{}",
            query,
            summarize_records(shown)
        );
        let order = match self.completion.generate(&prompt).await {
            Ok(reply) => parse_ranking(&reply, shown),
            Err(e) => {
                tracing::warn!("Ranking call failed, keeping original order: {}", e);
                (0..shown.len()).collect()
            }
        };
        order
            .into_iter()
            .map(|i| records[i].clone())
            .chain(records[shown.len()..].iter().cloned())
            .collect()
    }

    async fn cluster(&self, records: &[PaperRecord], query: &str) -> BTreeMap<String, Cluster> {
        let shown = &records[..records.len().min(MAX_PROMPT_RECORDS)];
        if shown.is_empty() {
            return BTreeMap::new();
        }
        let prompt = format!(
            "Group the following papers, found for the query \"{}\", into thematic clusters.\n\
             For each cluster reply with exactly these three lines:\n\
             Cluster: <short label>\nPapers: <comma-separated paper numbers>\nTopics: <comma-separated topic tags>\n\n{}",
            query,
            summarize_records(shown)
        );
        match self.completion.generate(&prompt).await {
            Ok(reply) => parse_clusters(&reply, shown.len()),
            Err(e) => {
                tracing::warn!("Clustering call failed: {}", e);
                BTreeMap::new()
            }
        }
    }
}

/// Fixed textual summary fed to the model; papers are numbered from 1.
fn summarize_records(records: &[PaperRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let preview: String = p.abstract_text.chars().take(ABSTRACT_PREVIEW_CHARS).collect();
            format!(
                "[{}] {}\nAuthors: {}\nKeywords: {}\nAbstract: {}\n",
                i + 1,
                p.label(),
                p.authors.join(", "),
                p.keywords.join(", "),
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").expect("valid regex"));
static SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)score:\s*\**\s*(\d+)").expect("valid regex"));

/// Zero-based order of `records` as read from the reply. Numbers outside
/// the range and repeats are skipped; lines without a number are matched
/// against titles. Unmentioned papers keep their relative order at the end.
fn parse_ranking(reply: &str, records: &[PaperRecord]) -> Vec<usize> {
    let titles: Vec<String> = records.iter().map(|p| normalize_title(&p.title)).collect();
    let mut order: Vec<usize> = Vec::new();
    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let picked = pick_paper(line, &titles);
        if let Some(i) = picked {
            if !order.contains(&i) {
                order.push(i);
            }
        }
    }
    for i in 0..records.len() {
        if !order.contains(&i) {
            order.push(i);
        }
    }
    order
}

/// `[n]` wins; otherwise a leading list marker is skipped and the first
/// number used, or failing that the text is matched against titles.
fn pick_paper(line: &str, titles: &[String]) -> Option<usize> {
    let in_range = |n: usize| (1..=titles.len()).contains(&n).then(|| n - 1);
    if let Some(c) = BRACKETED.captures(line) {
        return c[1].parse::<usize>().ok().and_then(in_range);
    }
    let rest = match LIST_MARKER.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    match NUMBER.find(rest) {
        Some(m) => m.as_str().parse::<usize>().ok().and_then(in_range),
        None => best_title_match(rest, titles),
    }
}

fn best_title_match(line: &str, titles: &[String]) -> Option<usize> {
    let line = normalize_title(line);
    titles
        .iter()
        .enumerate()
        .map(|(i, t)| (i, strsim::normalized_levenshtein(&line, t)))
        .filter(|(_, sim)| *sim >= 0.85)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Parse `Cluster:` / `Papers:` / `Topics:` blocks. Malformed blocks are
/// dropped; an unparseable reply yields an empty map.
fn parse_clusters(reply: &str, count: usize) -> BTreeMap<String, Cluster> {
    let mut out: BTreeMap<String, Cluster> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in reply.lines() {
        let line = line.trim().trim_start_matches(['*', '-', '#', ' ']);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('*').trim();
        match key.trim().trim_matches('*').to_ascii_lowercase().as_str() {
            "cluster" if !value.is_empty() => {
                out.entry(value.to_string()).or_default();
                current = Some(value.to_string());
            }
            "papers" => {
                if let Some(cluster) = current.as_ref().and_then(|c| out.get_mut(c)) {
                    for n in NUMBER.find_iter(value).filter_map(|m| m.as_str().parse::<usize>().ok()) {
                        if (1..=count).contains(&n) && !cluster.members.contains(&(n - 1)) {
                            cluster.members.push(n - 1);
                        }
                    }
                }
            }
            "topics" => {
                if let Some(cluster) = current.as_ref().and_then(|c| out.get_mut(c)) {
                    cluster.topics.extend(
                        value
                            .split(',')
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty()),
                    );
                }
            }
            _ => {}
        }
    }
    out.retain(|_, c| !c.members.is_empty());
    out
}

/// `Score: N` and `Reasoning: ...`; a reply without a score scores 0 and
/// the whole text becomes the reasoning.
fn parse_score(reply: &str) -> RelevanceScore {
    let score = SCORE
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|s| s.min(10) as u8)
        .unwrap_or(0);
    let lower = reply.to_ascii_lowercase();
    let reasoning = match lower.find("reasoning:") {
        Some(idx) => reply[idx + "reasoning:".len()..].trim().to_string(),
        None => reply.trim().to_string(),
    };
    RelevanceScore { score, reasoning }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{normalize, RawRecord};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn record(v: Value) -> PaperRecord {
        let raw: RawRecord = v.as_object().cloned().unwrap();
        normalize(&raw, "test")
    }

    fn three() -> Vec<PaperRecord> {
        vec![
            record(json!({"provider_id": "W1", "title": "Sleep and Memory"})),
            record(json!({"provider_id": "W2", "title": "Transformer Language Models"})),
            record(json!({"provider_id": "W3", "title": "Working Memory Capacity"})),
        ]
    }

    /// Replays canned replies and records the prompts it saw.
    struct Canned {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self { reply: Ok(reply.to_string()), prompts: Mutex::new(Vec::new()) }
        }
        fn failing() -> Self {
            Self { reply: Err("quota".to_string()), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Completion for Canned {
        async fn generate(&self, prompt: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(AiError::Api)
        }
    }

    #[test]
    fn test_parse_ranking_numbers() {
        let papers = three();
        assert_eq!(parse_ranking("3\n1\n2", &papers), vec![2, 0, 1]);
        assert_eq!(parse_ranking("1. [3]\n2. [1]", &papers), vec![2, 0, 1]);
        assert_eq!(parse_ranking("1) 2\n2) 3", &papers), vec![1, 2, 0]);
    }

    #[test]
    fn test_parse_ranking_skips_noise() {
        let papers = three();
        assert_eq!(parse_ranking("Paper 2\nPaper 2\nPaper 9\n", &papers), vec![1, 0, 2]);
        assert_eq!(parse_ranking("I cannot rank these.", &papers), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_ranking_titles() {
        let papers = three();
        assert_eq!(
            parse_ranking("1. Working memory capacity\nSleep and memory.", &papers),
            vec![2, 0, 1]
        );
    }

    #[test]
    fn test_parse_clusters() {
        let reply = "Here are the clusters:\n\n\
                     **Cluster:** Memory\nPapers: 1, 3\nTopics: sleep, working memory\n\n\
                     Cluster: Language\nPapers: 2, 7\nTopics: NLP\n\n\
                     Cluster: Empty\nPapers: none\n";
        let clusters = parse_clusters(reply, 3);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters["Memory"].members, vec![0, 2]);
        assert_eq!(clusters["Memory"].topics, vec!["sleep", "working memory"]);
        assert_eq!(clusters["Language"].members, vec![1]);
        assert!(parse_clusters("no structure at all", 3).is_empty());
    }

    #[test]
    fn test_parse_score() {
        let s = parse_score("Score: 8\nReasoning: Directly studies memory.");
        assert_eq!(s.score, 8);
        assert_eq!(s.reasoning, "Directly studies memory.");
        assert_eq!(s.band(), "high");

        let s = parse_score("**Score:** 15/10");
        assert_eq!(s.score, 10);

        let s = parse_score("Not sure.");
        assert_eq!(s.score, 0);
        assert_eq!(s.reasoning, "Not sure.");
        assert_eq!(s.band(), "low");
    }

    #[test]
    fn test_reply_text() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": " Score: 5 "}]}}]
        }))
        .unwrap();
        assert_eq!(reply_text(resp).unwrap(), "Score: 5");

        let empty: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(reply_text(empty), Err(AiError::Empty)));
    }

    #[tokio::test]
    async fn test_rank_reorders() {
        let ranker = GeminiRanker::new(Canned::ok("2\n3\n1"));
        let ranked = ranker.rank(&three(), "language").await;
        let titles: Vec<_> = ranked.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Transformer Language Models", "Working Memory Capacity", "Sleep and Memory"]
        );
        let prompts = ranker.completion.prompts.lock().unwrap();
        assert!(prompts[0].contains("[3] Working Memory Capacity"));
    }

    #[tokio::test]
    async fn test_rank_failure_keeps_order() {
        let ranker = GeminiRanker::new(Canned::failing());
        let papers = three();
        assert_eq!(ranker.rank(&papers, "q").await, papers);
        assert!(ranker.cluster(&papers, "q").await.is_empty());
    }

    #[tokio::test]
    async fn test_rank_beyond_prompt_window() {
        let papers: Vec<PaperRecord> = (0..MAX_PROMPT_RECORDS + 2)
            .map(|i| record(json!({"provider_id": format!("W{}", i), "title": format!("Paper {}", i)})))
            .collect();
        let ranker = GeminiRanker::new(Canned::ok("20"));
        let ranked = ranker.rank(&papers, "q").await;
        assert_eq!(ranked.len(), papers.len());
        assert_eq!(ranked[0].title, "Paper 19");
        assert_eq!(ranked[MAX_PROMPT_RECORDS].title, format!("Paper {}", MAX_PROMPT_RECORDS));
    }

    #[tokio::test]
    async fn test_score_and_summary() {
        let ranker = GeminiRanker::new(Canned::ok("Score: 6\nReasoning: Related."));
        let papers = three();
        let score = ranker.score_relevance(&papers[0], "sleep?").await.unwrap();
        assert_eq!(score.score, 6);
        assert_eq!(score.band(), "medium");

        let failing = GeminiRanker::new(Canned::failing());
        assert!(failing.summarize(&papers[0]).await.is_err());
        assert!(failing.explain_relevance(&papers[0], "q").await.is_err());
    }
}
