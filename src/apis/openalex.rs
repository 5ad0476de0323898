use std::collections::HashMap;

use super::{check_status, reject_blank, PaperSource, SourceError, USER_AGENT};
use crate::filter::SearchQuery;
use crate::paper::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const BASE_URL: &str = "https://api.openalex.org";
const SELECT: &str = "id,title,authorships,publication_year,doi,primary_location,cited_by_count,abstract_inverted_index,concepts,keywords";

pub struct OpenAlexClient {
    client: reqwest::Client,
}

impl OpenAlexClient {
    pub fn new(email: Option<String>) -> Self {
        let ua = match email {
            Some(ref e) => format!("{} (mailto:{})", USER_AGENT, e),
            None => USER_AGENT.to_string(),
        };
        Self {
            client: reqwest::Client::builder()
                .user_agent(ua)
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct OAResponse {
    results: Vec<OAWork>,
}

#[derive(Deserialize)]
struct OAWork {
    id: Option<String>,
    title: Option<String>,
    authorships: Option<Vec<OAAuthorship>>,
    publication_year: Option<i64>,
    doi: Option<String>,
    primary_location: Option<OALocation>,
    cited_by_count: Option<i64>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    concepts: Option<Vec<OATag>>,
    keywords: Option<Vec<OATag>>,
}

#[derive(Deserialize)]
struct OAAuthorship {
    author: OAAuthor,
}
#[derive(Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OALocation {
    source: Option<OASource>,
    landing_page_url: Option<String>,
}
#[derive(Deserialize)]
struct OASource {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OATag {
    display_name: Option<String>,
}

/// OpenAlex ships abstracts as word -> positions; put the words back in order.
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable_by_key(|(p, _)| *p);
    Some(positioned.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" "))
}

fn tag_names(tags: &Option<Vec<OATag>>) -> Vec<String> {
    tags.as_ref()
        .map(|t| t.iter().filter_map(|t| t.display_name.clone()).collect())
        .unwrap_or_default()
}

fn oa_to_raw(w: &OAWork) -> RawRecord {
    let provider_id = w
        .id
        .as_deref()
        .map(|id| id.rsplit('/').next().unwrap_or(id).to_string());
    let doi = w.doi.as_ref().map(|d| d.replace("https://doi.org/", ""));
    let authors: Vec<String> = w
        .authorships
        .as_ref()
        .map(|a| a.iter().filter_map(|a| a.author.display_name.clone()).collect())
        .unwrap_or_default();
    let venue = w
        .primary_location
        .as_ref()
        .and_then(|l| l.source.as_ref())
        .and_then(|s| s.display_name.clone());
    let url = w
        .primary_location
        .as_ref()
        .and_then(|l| l.landing_page_url.clone())
        .or_else(|| w.id.clone());

    let mut keywords = tag_names(&w.keywords);
    keywords.extend(tag_names(&w.concepts));

    let value = json!({
        "provider_id": provider_id,
        "title": w.title,
        "authors": authors,
        "year": w.publication_year,
        "abstract": w.abstract_inverted_index.as_ref().and_then(rebuild_abstract),
        "venue": venue,
        "doi": doi,
        "url": url,
        "keywords": keywords,
        "citation_count": w.cited_by_count,
    });
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}

fn parse_works(body: &str) -> Result<Vec<RawRecord>, SourceError> {
    let resp: OAResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("OpenAlex response: {}", e)))?;
    Ok(resp.results.iter().map(oa_to_raw).collect())
}

fn filter_param(query: &SearchQuery) -> Option<String> {
    let mut parts = Vec::new();
    if let Some((lo, hi)) = query.year_range {
        parts.push(format!("publication_year:{}-{}", lo, hi));
    }
    if let Some(min) = query.min_citations.filter(|m| *m > 0) {
        // cited_by_count only supports a strict greater-than
        parts.push(format!("cited_by_count:>{}", min - 1));
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

#[async_trait]
impl PaperSource for OpenAlexClient {
    fn name(&self) -> &str { "openalex" }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        reject_blank(self.name(), query)?;
        let per_page = query.limit.clamp(1, 200).to_string();
        let mut params = vec![
            ("search", query.text.trim().to_string()),
            ("per_page", per_page),
            ("select", SELECT.to_string()),
        ];
        if let Some(filter) = filter_param(query) {
            params.push(("filter", filter));
        }
        let resp = self.client
            .get(format!("{}/works", BASE_URL))
            .query(&params)
            .send().await?;
        let body = check_status(self.name(), resp).await?.text().await?;
        parse_works(&body)
    }
}
