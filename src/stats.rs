use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::paper::{PaperRecord, NO_VENUE};
use crate::store::PaperStore;

const TOP_VENUES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_papers: usize,
    pub reading_list: usize,
    /// Mean over papers with a known year.
    pub average_year: Option<f64>,
    pub total_citations: u64,
    pub papers_per_year: BTreeMap<i32, usize>,
    pub top_venues: Vec<(String, usize)>,
}

pub fn compute(store: &PaperStore) -> Statistics {
    let papers: Vec<&PaperRecord> = store.iter().map(|(_, p)| p).collect();

    let known_years: Vec<i32> = papers.iter().filter(|p| p.year_known()).map(|p| p.year).collect();
    let average_year = (!known_years.is_empty())
        .then(|| known_years.iter().map(|&y| y as f64).sum::<f64>() / known_years.len() as f64);

    let mut papers_per_year = BTreeMap::new();
    for y in &known_years {
        *papers_per_year.entry(*y).or_insert(0) += 1;
    }

    let mut venues: HashMap<&str, usize> = HashMap::new();
    for p in papers.iter().filter(|p| p.venue != NO_VENUE) {
        *venues.entry(p.venue.as_str()).or_insert(0) += 1;
    }
    let mut top_venues: Vec<(String, usize)> = venues
        .into_iter()
        .map(|(v, n)| (v.to_string(), n))
        .collect();
    top_venues.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_venues.truncate(TOP_VENUES);

    Statistics {
        total_papers: papers.len(),
        reading_list: store.reading_list().len(),
        average_year,
        total_citations: papers.iter().map(|p| p.citation_count as u64).sum(),
        papers_per_year,
        top_venues,
    }
}

#[derive(Debug, Serialize)]
pub struct ExportEntry<'a> {
    pub identity: &'a str,
    #[serde(flatten)]
    pub paper: &'a PaperRecord,
    pub note: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ReadingListExport<'a> {
    pub export_date: String,
    pub selected_count: usize,
    pub articles: Vec<ExportEntry<'a>>,
}

/// Reading list as a JSON-serializable document, in list order.
pub fn export_reading_list(store: &PaperStore, now: DateTime<Utc>) -> ReadingListExport<'_> {
    let articles: Vec<ExportEntry<'_>> = store
        .reading_list_records()
        .map(|(id, paper)| ExportEntry {
            identity: id.as_str(),
            paper,
            note: store
                .feedback_for(id)
                .map(|f| f.note.as_str())
                .filter(|n| !n.is_empty()),
        })
        .collect();
    ReadingListExport {
        export_date: now.to_rfc3339(),
        selected_count: articles.len(),
        articles,
    }
}

const CSV_HEADER: [&str; 9] = [
    "identity", "title", "authors", "year", "venue", "doi", "url", "citation_count", "note",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    identity: &'a str,
    title: &'a str,
    authors: String,
    year: Option<i32>,
    venue: &'a str,
    doi: Option<&'a str>,
    url: Option<&'a str>,
    citation_count: u32,
    note: &'a str,
}

/// Reading list as CSV, one row per paper in list order. The header row is
/// always present; unknown years and missing links are empty cells.
pub fn export_reading_list_csv(store: &PaperStore) -> anyhow::Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER).context("Failed to write CSV header")?;

    for (id, paper) in store.reading_list_records() {
        let row = CsvRow {
            identity: id.as_str(),
            title: &paper.title,
            authors: paper.authors.join("; "),
            year: paper.year_known().then_some(paper.year),
            venue: &paper.venue,
            doi: paper.doi.as_deref(),
            url: paper.url.as_deref(),
            citation_count: paper.citation_count,
            note: store.feedback_for(id).map(|f| f.note.as_str()).unwrap_or(""),
        };
        wtr.serialize(row).context("Failed to write CSV record")?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}
