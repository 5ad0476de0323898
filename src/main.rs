use std::collections::BTreeMap;
use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod apis;
mod config;
mod filter;
mod identity;
mod paper;
mod ranking;
mod search;
mod session;
mod stats;
mod store;

use apis::{local::LocalCorpus, PaperSource};
use config::Config;
use filter::SearchQuery;
use identity::{Identity, Strength};
use paper::PaperRecord;
use ranking::{GeminiClient, GeminiRanker, RankingAdapter, MAX_PROMPT_RECORDS};
use session::{ClusterView, SearchOutcome, Session};
use store::{Insight, Outcome, Relevance};

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Search query (title, abstract, authors, keywords). May be empty for the local corpus.")]
    query: String,
    #[schemars(description = "Source to search: 'local', 'semantic_scholar', 'openalex'. Omit to search all enabled sources.")]
    source: Option<String>,
    #[schemars(description = "Maximum results to return (default from LIT_REVIEW_MAX_RESULTS, max 100)")]
    max_results: Option<u32>,
    #[schemars(description = "Earliest publication year (inclusive)")]
    year_from: Option<i32>,
    #[schemars(description = "Latest publication year (inclusive)")]
    year_to: Option<i32>,
    #[schemars(description = "Minimum citation count")]
    min_citations: Option<u32>,
    #[schemars(description = "On source failure, show the last results for the same query (default true)")]
    use_cache: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PaperIdParams {
    #[schemars(description = "Paper identity as returned by search_papers")]
    id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetPaperParams {
    #[schemars(description = "Paper identity; omit to show the selected paper")]
    id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FeedbackParams {
    #[schemars(description = "Paper identity")]
    id: String,
    #[schemars(description = "'relevant', 'not_relevant' or 'unset'")]
    relevance: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoteParams {
    #[schemars(description = "Paper identity")]
    id: String,
    #[schemars(description = "Note text (replaces any previous note)")]
    note: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListByFeedbackParams {
    #[schemars(description = "'relevant', 'not_relevant' or 'unset'")]
    relevance: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ViewQueryParams {
    #[schemars(description = "Research query; defaults to the query of the current results")]
    query: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExportParams {
    #[schemars(description = "'json' (default) or 'csv'")]
    format: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ScoreParams {
    #[schemars(description = "Paper identity")]
    id: String,
    #[schemars(description = "Research question to score the paper against")]
    question: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExplainParams {
    #[schemars(description = "Paper identity")]
    id: String,
    #[schemars(description = "Search query; defaults to the query of the current results")]
    query: Option<String>,
}

// ── Responses ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PaperView<'a> {
    identity: &'a str,
    identity_strength: Strength,
    #[serde(flatten)]
    paper: &'a PaperRecord,
    relevance: Relevance,
    note: &'a str,
    in_reading_list: bool,
    selected: bool,
    cluster: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insight: Option<&'a Insight>,
}

fn paper_view<'a>(session: &'a Session, id: &'a Identity, paper: &'a PaperRecord) -> PaperView<'a> {
    let store = session.store();
    let feedback = store.feedback_for(id);
    PaperView {
        identity: id.as_str(),
        identity_strength: id.strength(),
        paper,
        relevance: feedback.map(|f| f.relevance).unwrap_or_default(),
        note: feedback.map(|f| f.note.as_str()).unwrap_or(""),
        in_reading_list: store.reading_list().contains(id),
        selected: store.selected() == Some(id),
        cluster: session.cluster_of(id),
        insight: store.insight(id),
    }
}

#[derive(Serialize)]
struct ResultsView<'a> {
    source: &'a str,
    query: &'a str,
    cached: bool,
    ranked: bool,
    count: usize,
    papers: Vec<PaperView<'a>>,
    #[serde(skip_serializing_if = "no_clusters")]
    clusters: &'a BTreeMap<String, ClusterView>,
}

fn no_clusters(clusters: &&BTreeMap<String, ClusterView>) -> bool {
    clusters.is_empty()
}

fn results_view(session: &Session, cached: bool) -> ResultsView<'_> {
    let view = session.view();
    let papers: Vec<PaperView<'_>> = view
        .order
        .iter()
        .filter_map(|id| session.store().get(id).map(|p| paper_view(session, id, p)))
        .collect();
    ResultsView {
        source: &view.source,
        query: &view.query,
        cached,
        ranked: view.ranked,
        count: papers.len(),
        papers,
        clusters: &view.clusters,
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn text_result(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

fn parse_relevance(s: &str) -> Result<Relevance, McpError> {
    match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "relevant" | "true" | "yes" => Ok(Relevance::Relevant),
        "not_relevant" | "irrelevant" | "false" | "no" => Ok(Relevance::NotRelevant),
        "unset" | "none" | "" => Ok(Relevance::Unset),
        other => Err(McpError::invalid_params(
            format!("Unknown relevance '{}': use relevant, not_relevant or unset", other),
            None,
        )),
    }
}

fn outcome_text(outcome: Outcome, id: &str, what: &str) -> String {
    match outcome {
        Outcome::Updated => format!("{}: {}", what, id),
        Outcome::Unchanged => format!("{} (unchanged): {}", what, id),
        Outcome::NotFound => format!("Paper not found: {}", id),
    }
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LitReviewServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    sources: Arc<Vec<Arc<dyn PaperSource>>>,
    local: Option<Arc<LocalCorpus>>,
    ranker: Option<Arc<GeminiRanker<GeminiClient>>>,
    session: Arc<Mutex<Session>>,
}

#[tool_router]
impl LitReviewServer {
    pub fn create() -> Self {
        let config = Config::from_env();
        let local = config.build_local();
        let sources = config.build_sources(local.clone());
        let ranker = config.build_ranker().map(Arc::new);

        tracing::info!(
            "Initialized {} paper sources, AI {}",
            sources.len(),
            if ranker.is_some() { "enabled" } else { "disabled" }
        );

        Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            sources: Arc::new(sources),
            local,
            ranker,
            session: Arc::new(Mutex::new(Session::new())),
        }
    }

    #[tool(description = "List available paper sources and AI status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.config.source_status())
    }

    #[tool(description = "Search papers in one source or all enabled sources. Results join the session's working set; feedback and reading-list state of known papers is kept.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = SearchQuery {
            text: params.query.trim().to_string(),
            limit: params.max_results.unwrap_or(self.config.max_results).clamp(1, 100),
            year_range: match (params.year_from, params.year_to) {
                (None, None) => None,
                (from, to) => Some((from.unwrap_or(1), to.unwrap_or(9999))),
            },
            min_citations: params.min_citations,
        };
        let label = params.source.clone().unwrap_or_else(|| "all".to_string());
        let active: Vec<Arc<dyn PaperSource>> = self
            .sources
            .iter()
            .filter(|s| {
                params
                    .source
                    .as_deref()
                    .map(|name| name.eq_ignore_ascii_case(s.name()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        if active.is_empty() {
            return text_result(format!("No enabled source matches '{}'", label));
        }

        let result = match active.as_slice() {
            [single] => search::search_source(single.as_ref(), &query).await,
            _ => search::federated_search(&active, &query).await,
        };

        let mut session = self.session.lock().await;
        match result {
            Ok(records) => {
                session.apply_results(&label, &query, records);
                json_result(&results_view(&session, false))
            }
            Err(e) => match session.apply_failure(&label, &query, e, params.use_cache.unwrap_or(true)) {
                SearchOutcome::Cached(ids, e) => {
                    tracing::warn!("Search failed, serving {} cached results: {}", ids.len(), e);
                    json_result(&results_view(&session, true))
                }
                SearchOutcome::Failed(e) => text_result(format!(
                    "Search failed: {}. Previous results are unchanged.",
                    e
                )),
            },
        }
    }

    #[tool(description = "Show the current results view (order, cluster tags, annotations)")]
    async fn current_results(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        json_result(&results_view(&session, false))
    }

    #[tool(description = "Get one paper with its annotations; omit id for the selected paper")]
    async fn get_paper(
        &self,
        Parameters(params): Parameters<GetPaperParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        let id = match params.id.as_deref() {
            Some(token) => session.store().resolve(token),
            None => session.store().selected().cloned(),
        };
        match id.as_ref().and_then(|id| session.store().get(id).map(|p| (id, p))) {
            Some((id, paper)) => json_result(&paper_view(&session, id, paper)),
            None => text_result(format!(
                "Paper not found: {}",
                params.id.as_deref().unwrap_or("(no selection)")
            )),
        }
    }

    #[tool(description = "Focus one paper for detail display. An unknown id clears the selection.")]
    async fn select_paper(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let id = session
            .store()
            .resolve(&params.id)
            .unwrap_or_else(|| Identity::from_token(params.id.clone()));
        let outcome = session.store_mut().select(&id);
        text_result(outcome_text(outcome, id.as_str(), "Selected"))
    }

    #[tool(description = "Clear the selected paper")]
    async fn clear_selection(&self) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let outcome = session.store_mut().clear_selection();
        text_result(outcome_text(outcome, "selection", "Cleared"))
    }

    #[tool(description = "Mark a paper relevant, not relevant, or reset its feedback")]
    async fn mark_feedback(
        &self,
        Parameters(params): Parameters<FeedbackParams>,
    ) -> Result<CallToolResult, McpError> {
        let relevance = parse_relevance(&params.relevance)?;
        let mut session = self.session.lock().await;
        let Some(id) = session.store().resolve(&params.id) else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        let outcome = session.store_mut().mark_feedback(&id, relevance);
        text_result(outcome_text(outcome, id.as_str(), "Feedback recorded"))
    }

    #[tool(description = "Attach a note to a paper")]
    async fn set_note(
        &self,
        Parameters(params): Parameters<NoteParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let Some(id) = session.store().resolve(&params.id) else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        let outcome = session.store_mut().set_note(&id, params.note);
        text_result(outcome_text(outcome, id.as_str(), "Note saved"))
    }

    #[tool(description = "Add a paper to the reading list (no duplicates)")]
    async fn add_to_reading_list(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let Some(id) = session.store().resolve(&params.id) else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        let outcome = session.store_mut().add_to_reading_list(&id);
        text_result(outcome_text(outcome, id.as_str(), "Added to reading list"))
    }

    #[tool(description = "Remove a paper from the reading list")]
    async fn remove_from_reading_list(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let id = session
            .store()
            .resolve(&params.id)
            .unwrap_or_else(|| Identity::from_token(params.id.clone()));
        let outcome = session.store_mut().remove_from_reading_list(&id);
        text_result(outcome_text(outcome, id.as_str(), "Removed from reading list"))
    }

    #[tool(description = "Show the reading list in order")]
    async fn list_reading_list(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        let papers: Vec<PaperView<'_>> = session
            .store()
            .reading_list_records()
            .map(|(id, p)| paper_view(&session, id, p))
            .collect();
        json_result(&papers)
    }

    #[tool(description = "List papers by feedback: 'relevant', 'not_relevant' or 'unset'")]
    async fn list_by_feedback(
        &self,
        Parameters(params): Parameters<ListByFeedbackParams>,
    ) -> Result<CallToolResult, McpError> {
        let relevance = parse_relevance(&params.relevance)?;
        let session = self.session.lock().await;

        #[derive(Serialize)]
        struct Entry<'a> {
            identity: Identity,
            title: &'a str,
            year: i32,
            note: &'a str,
        }

        let entries: Vec<Entry<'_>> = session
            .store()
            .list_by_feedback(relevance)
            .map(|(paper, note)| Entry {
                identity: identity::of(paper),
                title: &paper.title,
                year: paper.year,
                note,
            })
            .collect();
        json_result(&entries)
    }

    #[tool(description = "Export the reading list with notes as JSON or CSV")]
    async fn export_reading_list(
        &self,
        Parameters(params): Parameters<ExportParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        match params.format.as_deref().map(str::trim).unwrap_or("json") {
            f if f.eq_ignore_ascii_case("json") => {
                json_result(&stats::export_reading_list(session.store(), chrono::Utc::now()))
            }
            f if f.eq_ignore_ascii_case("csv") => {
                let csv = stats::export_reading_list_csv(session.store())
                    .map_err(|e| McpError::internal_error(format!("CSV export error: {:#}", e), None))?;
                text_result(csv)
            }
            other => Err(McpError::invalid_params(
                format!("Unknown export format '{}': use json or csv", other),
                None,
            )),
        }
    }

    #[tool(description = "Re-read the local corpus file. Papers already in the session are kept.")]
    async fn reload_corpus(&self) -> Result<CallToolResult, McpError> {
        let Some(local) = self.local.as_ref() else {
            return text_result("Local corpus disabled by LIT_REVIEW_SOURCES");
        };
        match local.reload().await {
            Ok(count) => text_result(format!(
                "Reloaded {} records from {}",
                count,
                local.path().display()
            )),
            Err(e) => text_result(format!(
                "Reload failed: {}. Previous corpus is unchanged.",
                e
            )),
        }
    }

    #[tool(description = "Statistics over all papers seen this session")]
    async fn statistics(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        json_result(&stats::compute(session.store()))
    }

    #[tool(description = "Reorder the current results by AI-judged relevance (first 20 papers)")]
    async fn rank_results(
        &self,
        Parameters(params): Parameters<ViewQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(ranker) = self.ranker.as_ref() else {
            return text_result("AI features disabled: GEMINI_API_KEY not set");
        };
        let (records, query, generation) = self.view_snapshot(params.query).await;
        if records.is_empty() {
            return text_result("No results to rank. Run search_papers first.");
        }
        let ranked = ranker.rank(&records, &query).await;

        let mut session = self.session.lock().await;
        if !session.apply_ranking(generation, &ranked) {
            return text_result("Results changed while ranking; ranking discarded.");
        }
        json_result(&results_view(&session, false))
    }

    #[tool(description = "Group the current results into AI-labelled thematic clusters (first 20 papers)")]
    async fn cluster_results(
        &self,
        Parameters(params): Parameters<ViewQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(ranker) = self.ranker.as_ref() else {
            return text_result("AI features disabled: GEMINI_API_KEY not set");
        };
        let (mut records, query, generation) = self.view_snapshot(params.query).await;
        records.truncate(MAX_PROMPT_RECORDS);
        if records.is_empty() {
            return text_result("No results to cluster. Run search_papers first.");
        }
        let clusters = ranker.cluster(&records, &query).await;
        if clusters.is_empty() {
            return text_result("No clustering available for the current results.");
        }

        let mut session = self.session.lock().await;
        if !session.apply_clusters(generation, &records, clusters) {
            return text_result("Results changed while clustering; clusters discarded.");
        }
        json_result(&session.view().clusters)
    }

    #[tool(description = "Score a paper's relevance (0-10) to a research question with AI")]
    async fn score_relevance(
        &self,
        Parameters(params): Parameters<ScoreParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(ranker) = self.ranker.as_ref() else {
            return text_result("AI features disabled: GEMINI_API_KEY not set");
        };
        let Some((id, paper)) = self.lookup(&params.id).await else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        let score = match ranker.score_relevance(&paper, &params.question).await {
            Ok(score) => score,
            Err(e) => return text_result(format!("Gemini error: {}", e)),
        };
        let mut session = self.session.lock().await;
        let _ = session.store_mut().record_insight(&id, |i| {
            i.relevance_score = Some((score.score, score.reasoning.clone()));
        });

        #[derive(Serialize)]
        struct Scored<'a> {
            identity: &'a str,
            band: &'static str,
            #[serde(flatten)]
            score: &'a ranking::RelevanceScore,
        }
        json_result(&Scored { identity: id.as_str(), band: score.band(), score: &score })
    }

    #[tool(description = "Summarize a paper in 2-3 sentences with AI")]
    async fn summarize_paper(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(ranker) = self.ranker.as_ref() else {
            return text_result("AI features disabled: GEMINI_API_KEY not set");
        };
        let Some((id, paper)) = self.lookup(&params.id).await else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        if let Some(summary) = self.cached_insight(&id, |i| i.summary.clone()).await {
            return text_result(summary);
        }
        match ranker.summarize(&paper).await {
            Ok(summary) => {
                let mut session = self.session.lock().await;
                let _ = session.store_mut().record_insight(&id, |i| i.summary = Some(summary.clone()));
                text_result(summary)
            }
            Err(e) => text_result(format!("Gemini error: {}", e)),
        }
    }

    #[tool(description = "Explain with AI why a paper might be relevant to a search query")]
    async fn explain_relevance(
        &self,
        Parameters(params): Parameters<ExplainParams>,
    ) -> Result<CallToolResult, McpError> {
        let Some(ranker) = self.ranker.as_ref() else {
            return text_result("AI features disabled: GEMINI_API_KEY not set");
        };
        let Some((id, paper)) = self.lookup(&params.id).await else {
            return text_result(format!("Paper not found: {}", params.id));
        };
        let query = match params.query {
            Some(q) => q,
            None => self.session.lock().await.view().query.clone(),
        };
        let cached = self
            .cached_insight(&id, |i| {
                i.explanation
                    .as_ref()
                    .filter(|(q, _)| *q == query)
                    .map(|(_, text)| text.clone())
            })
            .await;
        if let Some(text) = cached {
            return text_result(text);
        }
        match ranker.explain_relevance(&paper, &query).await {
            Ok(text) => {
                let mut session = self.session.lock().await;
                let _ = session
                    .store_mut()
                    .record_insight(&id, |i| i.explanation = Some((query.clone(), text.clone())));
                text_result(text)
            }
            Err(e) => text_result(format!("Gemini error: {}", e)),
        }
    }
}

impl LitReviewServer {
    /// Resolve a client token and clone the record so no lock is held
    /// across network calls.
    async fn lookup(&self, token: &str) -> Option<(Identity, PaperRecord)> {
        let session = self.session.lock().await;
        let id = session.store().resolve(token)?;
        let paper = session.store().get(&id)?.clone();
        Some((id, paper))
    }

    async fn cached_insight<T>(&self, id: &Identity, f: impl FnOnce(&Insight) -> Option<T>) -> Option<T> {
        let session = self.session.lock().await;
        session.store().insight(id).and_then(f)
    }

    /// Current view records, the query to rank them against and the view
    /// generation they belong to.
    async fn view_snapshot(&self, query: Option<String>) -> (Vec<PaperRecord>, String, u64) {
        let session = self.session.lock().await;
        let query = query.unwrap_or_else(|| session.view().query.clone());
        (session.view_records(), query, session.view().generation)
    }
}

#[tool_handler]
impl ServerHandler for LitReviewServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Literature review assistant. Search a local JSON corpus, Semantic Scholar \
                 or OpenAlex; mark papers relevant or not, keep notes and a reading list; \
                 rank, cluster, score and summarize results with Gemini. Papers are addressed \
                 by the identity returned from search_papers."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting lit-review MCP server");

    let server = LitReviewServer::create();
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relevance() {
        assert_eq!(parse_relevance("Relevant").unwrap(), Relevance::Relevant);
        assert_eq!(parse_relevance("not relevant").unwrap(), Relevance::NotRelevant);
        assert_eq!(parse_relevance("not-relevant").unwrap(), Relevance::NotRelevant);
        assert_eq!(parse_relevance("unset").unwrap(), Relevance::Unset);
        assert!(parse_relevance("maybe").is_err());
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(outcome_text(Outcome::NotFound, "W1", "Selected"), "Paper not found: W1");
        assert_eq!(outcome_text(Outcome::Updated, "W1", "Selected"), "Selected: W1");
    }

    #[test]
    fn test_results_view_serializes_annotations() {
        let mut session = Session::new();
        let raw = serde_json::json!({"provider_id": "W1", "title": "A", "year": 2020});
        let record = paper::normalize(raw.as_object().unwrap(), "local");
        let ids = session.apply_results("local", &SearchQuery::new("a", 10), vec![record]);
        let _ = session.store_mut().mark_feedback(&ids[0], Relevance::Relevant);
        let _ = session.store_mut().add_to_reading_list(&ids[0]);

        let value = serde_json::to_value(results_view(&session, false)).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["papers"][0]["identity"], "W1");
        assert_eq!(value["papers"][0]["identity_strength"], "strong");
        assert_eq!(value["papers"][0]["relevance"], "relevant");
        assert_eq!(value["papers"][0]["in_reading_list"], true);
        assert_eq!(value["papers"][0]["title"], "A");
        assert!(value.get("clusters").is_none());
    }
}
