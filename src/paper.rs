use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A loosely-typed record as handed over by a source adapter.
pub type RawRecord = Map<String, Value>;

pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_AUTHOR: &str = "Unknown author";
pub const NO_ABSTRACT: &str = "No abstract available";
pub const NO_VENUE: &str = "N/A";
/// Sentinel for an unknown publication year.
pub const UNKNOWN_YEAR: i32 = 0;

/// Normalized representation of one paper, whatever source it came from.
/// Every field is populated; absent data carries the placeholder above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub provider_id: Option<String>,
    pub local_id: Option<String>,
    pub title: String,
    pub year: i32,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub venue: String,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub keywords: Vec<String>,
    pub citation_count: u32,
    pub source: String,
}

impl PaperRecord {
    pub fn year_known(&self) -> bool {
        self.year != UNKNOWN_YEAR
    }

    /// Short one-line label used in prompts and tool output.
    pub fn label(&self) -> String {
        if self.year_known() {
            format!("{} ({})", self.title, self.year)
        } else {
            self.title.clone()
        }
    }
}

/// Convert one raw record into a `PaperRecord`. Never fails: malformed or
/// missing values degrade to their documented defaults.
pub fn normalize(raw: &RawRecord, source: &str) -> PaperRecord {
    let authors = match first(raw, &["authors"]) {
        Some(Value::Array(items)) => items.iter().filter_map(name_of).collect::<Vec<_>>(),
        _ => Vec::new(),
    };

    PaperRecord {
        provider_id: first(raw, &["provider_id", "paperId", "paper_id"]).and_then(text_of),
        local_id: first(raw, &["local_id", "id"]).and_then(text_of),
        title: first(raw, &["title"])
            .and_then(text_of)
            .unwrap_or_else(|| UNTITLED.to_string()),
        year: first(raw, &["year", "publication_year"])
            .and_then(int_of)
            .and_then(|y| i32::try_from(y).ok())
            .unwrap_or(UNKNOWN_YEAR),
        authors: if authors.is_empty() {
            vec![UNKNOWN_AUTHOR.to_string()]
        } else {
            authors
        },
        abstract_text: first(raw, &["abstract", "abstract_text"])
            .and_then(text_of)
            .unwrap_or_else(|| NO_ABSTRACT.to_string()),
        venue: first(raw, &["venue", "journal"])
            .and_then(text_of)
            .unwrap_or_else(|| NO_VENUE.to_string()),
        volume: first(raw, &["volume"]).and_then(text_of),
        issue: first(raw, &["issue"]).and_then(text_of),
        pages: first(raw, &["pages"]).and_then(text_of),
        doi: first(raw, &["doi"])
            .and_then(text_of)
            .or_else(|| {
                raw.get("externalIds")
                    .and_then(|ids| ids.get("DOI"))
                    .and_then(text_of)
            }),
        url: first(raw, &["url"]).and_then(text_of),
        keywords: keywords_of(raw),
        citation_count: first(raw, &["citation_count", "citationCount", "citations", "cited_by_count"])
            .and_then(int_of)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(0),
        source: source.to_string(),
    }
}

/// First present, non-null value among the given key aliases.
fn first<'a>(raw: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| raw.get(*k))
        .find(|v| !v.is_null())
}

/// Strings are trimmed, blanks treated as absent; numbers are rendered.
fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => Some(n.to_string()),
        },
        _ => None,
    }
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Author or tag entries are either plain strings or objects with a name.
fn name_of(v: &Value) -> Option<String> {
    match v {
        Value::Object(obj) => ["name", "display_name"]
            .iter()
            .filter_map(|k| obj.get(*k))
            .find_map(text_of),
        other => text_of(other),
    }
}

fn keywords_of(raw: &RawRecord) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in ["keywords", "concepts", "fieldsOfStudy", "fields_of_study"] {
        let Some(Value::Array(items)) = raw.get(key) else {
            continue;
        };
        for kw in items.iter().filter_map(name_of) {
            if !out.iter().any(|seen| seen.eq_ignore_ascii_case(&kw)) {
                out.push(kw);
            }
        }
    }
    out
}
