use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::paper::PaperRecord;

const WEAK_PREFIX: &str = "weak:";

/// URL forms under which providers hand out their own ids.
const PROVIDER_URL_PREFIXES: &[&str] = &[
    "https://openalex.org/",
    "http://openalex.org/",
    "https://www.semanticscholar.org/paper/",
];

const DOI_PREFIXES: &[&str] = &["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"];

/// Opaque key addressing one logical paper within a session.
///
/// Computed exactly once per record by [`of`]; everything downstream
/// carries the token instead of recomputing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    /// Provider-assigned id of a recognized shape.
    Strong,
    /// Unrecognized provider id or a local corpus id, used verbatim.
    Fallback,
    /// Hash of title and year. Distinct papers sharing both collide.
    Weak,
}

impl Identity {
    /// Wrap a token received from outside (e.g. a tool argument).
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn strength(&self) -> Strength {
        if self.0.starts_with(WEAK_PREFIX) {
            Strength::Weak
        } else if is_strong_provider_id(&self.0) {
            Strength::Strong
        } else {
            Strength::Fallback
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single identity function. First match wins:
/// strong provider id, then any provider or local id, then the weak hash.
pub fn of(record: &PaperRecord) -> Identity {
    if let Some(pid) = record.provider_id.as_deref().map(str::trim) {
        if is_strong_provider_id(pid) {
            return Identity(pid.to_string());
        }
    }
    let fallback = record
        .provider_id
        .as_deref()
        .or(record.local_id.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match fallback {
        Some(id) => Identity(id.to_string()),
        None => Identity(weak_hash(&record.title, record.year)),
    }
}

/// OpenAlex work ids (`W123`), Semantic Scholar paper ids (40 hex chars)
/// and Semantic Scholar corpus ids (`CorpusId:123`).
pub fn is_strong_provider_id(id: &str) -> bool {
    let openalex = id
        .strip_prefix('W')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
    let s2_paper = id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit());
    let s2_corpus = id
        .strip_prefix("CorpusId:")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
    openalex || s2_paper || s2_corpus
}

/// `weak:` followed by the first 8 bytes of SHA-256 over the normalized
/// title, a unit separator and the year, in lowercase hex.
pub fn weak_hash(title: &str, year: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update([0x1f]);
    hasher.update(year.to_string().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", WEAK_PREFIX, hex)
}

pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which step of [`resolve`] found the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Exact,
    Coerced,
    /// A strong-shaped token matched `provider_id` while the identity came
    /// from another scheme. Records whose identity was computed by [`of`]
    /// are always matched by an earlier step, so this only fires for
    /// identities produced by some other scheme.
    ProviderField,
    /// A DOI token matched the record's `doi` field.
    Doi,
    WeakHash,
}

/// Re-find the record a previously held token refers to.
///
/// Tokens arriving from clients may not be in the exact form [`of`]
/// produced (URL-prefixed provider ids, `7.0` for a local id `7`), hence
/// the chain. `None` means the holder must drop its reference.
pub fn resolve<'a, I>(held: &str, candidates: I) -> Option<(&'a PaperRecord, MatchedBy)>
where
    I: IntoIterator<Item = &'a PaperRecord>,
    I::IntoIter: Clone,
{
    let candidates = candidates.into_iter();

    if let Some(p) = candidates.clone().find(|p| of(p).as_str() == held) {
        return Some((p, MatchedBy::Exact));
    }

    let coerced = coerce(held);
    if let Some(p) = candidates.clone().find(|p| coerce(of(p).as_str()) == coerced) {
        return Some((p, MatchedBy::Coerced));
    }

    if is_strong_provider_id(&coerced) {
        let by_provider = candidates.clone().find(|p| {
            p.provider_id
                .as_deref()
                .is_some_and(|pid| coerce(pid) == coerced)
        });
        if let Some(p) = by_provider {
            return Some((p, MatchedBy::ProviderField));
        }
    }

    if let Some(doi) = canonical_doi(held) {
        let by_doi = candidates
            .clone()
            .find(|p| p.doi.as_deref().and_then(canonical_doi).as_deref() == Some(doi.as_str()));
        if let Some(p) = by_doi {
            return Some((p, MatchedBy::Doi));
        }
    }

    if coerced.starts_with(WEAK_PREFIX) {
        if let Some(p) = candidates.clone().find(|p| weak_hash(&p.title, p.year) == coerced) {
            return Some((p, MatchedBy::WeakHash));
        }
    }

    None
}

/// Lowercased bare DOI (`10.x/...`) with any resolver prefix removed.
fn canonical_doi(token: &str) -> Option<String> {
    let t = token.trim();
    let lower = t.to_ascii_lowercase();
    let bare = DOI_PREFIXES
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    (bare.starts_with("10.") && bare.contains('/')).then(|| bare.to_string())
}

/// Representation-independent form of a token.
fn coerce(token: &str) -> String {
    let mut t = token.trim();
    for prefix in PROVIDER_URL_PREFIXES {
        if let Some(rest) = t.strip_prefix(prefix) {
            t = rest;
            break;
        }
    }
    if let Ok(f) = t.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
            return (f as i64).to_string();
        }
    }
    if let Some(hex) = t.strip_prefix(WEAK_PREFIX) {
        return format!("{}{}", WEAK_PREFIX, hex.to_ascii_lowercase());
    }
    if !t.is_empty() && t.bytes().all(|b| b.is_ascii_hexdigit()) {
        return t.to_ascii_lowercase();
    }
    t.to_string()
}
