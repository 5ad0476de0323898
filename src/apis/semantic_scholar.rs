use super::{check_status, reject_blank, PaperSource, SourceError, USER_AGENT};
use crate::filter::SearchQuery;
use crate::paper::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "paperId,title,authors,year,abstract,venue,citationCount,url,externalIds,fieldsOfStudy";

pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<RawRecord>>,
}

/// The search response's items already carry keys `paper::normalize`
/// understands (`paperId`, `citationCount`, `externalIds.DOI`, ...).
fn parse_search(body: &str) -> Result<Vec<RawRecord>, SourceError> {
    let resp: S2SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("Semantic Scholar response: {}", e)))?;
    Ok(resp.data.unwrap_or_default())
}

fn query_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("query", query.text.trim().to_string()),
        ("limit", query.limit.clamp(1, 100).to_string()),
        ("fields", FIELDS.to_string()),
    ];
    if let Some((lo, hi)) = query.year_range {
        params.push(("year", format!("{}-{}", lo, hi)));
    }
    if let Some(min) = query.min_citations.filter(|m| *m > 0) {
        params.push(("minCitationCount", min.to_string()));
    }
    params
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        reject_blank(self.name(), query)?;
        let url = format!("{}/paper/search", self.base_url);
        let resp = self
            .add_auth(self.client.get(&url).query(&query_params(query)))
            .send()
            .await?;
        let body = check_status(self.name(), resp).await?.text().await?;
        let records = parse_search(&body)?;
        tracing::debug!("semantic_scholar returned {} records for {:?}", records.len(), query.text);
        Ok(records)
    }
}
