use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::{self, Identity};
use crate::paper::PaperRecord;

/// Tri-state relevance feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    #[default]
    Unset,
    Relevant,
    NotRelevant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub relevance: Relevance,
    pub note: String,
}

/// AI-generated annotations cached per paper.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Insight {
    pub relevance_score: Option<(u8, String)>,
    pub summary: Option<String>,
    /// Query the explanation was produced for, and the explanation.
    pub explanation: Option<(String, String)>,
}

/// Result of an operation addressed by identity. Never an error: a stale
/// identity is an expected outcome.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    Unchanged,
    NotFound,
}

/// Session-scoped working set of papers plus user annotations.
#[derive(Debug, Default)]
pub struct PaperStore {
    records: HashMap<Identity, PaperRecord>,
    /// Identities in the order they were first seen.
    order: Vec<Identity>,
    feedback: HashMap<Identity, Feedback>,
    reading_list: Vec<Identity>,
    selected: Option<Identity>,
    insights: HashMap<Identity, Insight>,
}

impl PaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace each record under its identity. Annotations of an
    /// existing identity are kept; record fields take the latest values.
    /// AI insights are dropped when the title or abstract changed.
    /// Returns the identity of every input record, in input order.
    pub fn upsert<I>(&mut self, records: I) -> Vec<Identity>
    where
        I: IntoIterator<Item = PaperRecord>,
    {
        records
            .into_iter()
            .map(|record| {
                let id = identity::of(&record);
                let changed = |old: &PaperRecord| {
                    old.title != record.title || old.abstract_text != record.abstract_text
                };
                match self.records.get(&id) {
                    None => self.order.push(id.clone()),
                    Some(old) if changed(old) => {
                        self.insights.remove(&id);
                    }
                    Some(_) => {}
                }
                self.records.insert(id.clone(), record);
                id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &Identity) -> Option<&PaperRecord> {
        self.records.get(id)
    }

    /// All records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &PaperRecord)> + Clone + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.records.get(id).map(|r| (id, r)))
    }

    /// Map a client-supplied token onto a stored identity.
    pub fn resolve(&self, token: &str) -> Option<Identity> {
        let candidates = self.iter().map(|(_, r)| r);
        let (record, how) = identity::resolve(token, candidates)?;
        tracing::debug!("Resolved {} via {:?}", token, how);
        Some(identity::of(record))
    }

    pub fn select(&mut self, id: &Identity) -> Outcome {
        if self.contains(id) {
            if self.selected.as_ref() == Some(id) {
                return Outcome::Unchanged;
            }
            self.selected = Some(id.clone());
            Outcome::Updated
        } else {
            self.selected = None;
            Outcome::NotFound
        }
    }

    pub fn clear_selection(&mut self) -> Outcome {
        match self.selected.take() {
            Some(_) => Outcome::Updated,
            None => Outcome::Unchanged,
        }
    }

    pub fn selected(&self) -> Option<&Identity> {
        self.selected.as_ref()
    }

    pub fn mark_feedback(&mut self, id: &Identity, relevance: Relevance) -> Outcome {
        if !self.contains(id) {
            return Outcome::NotFound;
        }
        let entry = self.feedback.entry(id.clone()).or_default();
        if entry.relevance == relevance {
            return Outcome::Unchanged;
        }
        entry.relevance = relevance;
        Outcome::Updated
    }

    pub fn set_note(&mut self, id: &Identity, text: impl Into<String>) -> Outcome {
        if !self.contains(id) {
            return Outcome::NotFound;
        }
        let text = text.into();
        let entry = self.feedback.entry(id.clone()).or_default();
        if entry.note == text {
            return Outcome::Unchanged;
        }
        entry.note = text;
        Outcome::Updated
    }

    pub fn feedback_for(&self, id: &Identity) -> Option<&Feedback> {
        self.feedback.get(id)
    }

    pub fn add_to_reading_list(&mut self, id: &Identity) -> Outcome {
        if !self.contains(id) {
            return Outcome::NotFound;
        }
        if self.reading_list.contains(id) {
            return Outcome::Unchanged;
        }
        self.reading_list.push(id.clone());
        Outcome::Updated
    }

    pub fn remove_from_reading_list(&mut self, id: &Identity) -> Outcome {
        let before = self.reading_list.len();
        self.reading_list.retain(|r| r != id);
        if self.reading_list.len() == before {
            Outcome::Unchanged
        } else {
            Outcome::Updated
        }
    }

    pub fn reading_list(&self) -> &[Identity] {
        &self.reading_list
    }

    /// Reading list entries paired with their records.
    pub fn reading_list_records(&self) -> impl Iterator<Item = (&Identity, &PaperRecord)> + '_ {
        self.reading_list
            .iter()
            .filter_map(move |id| self.records.get(id).map(|r| (id, r)))
    }

    /// Fresh snapshot of every paper whose feedback matches, with its note.
    /// Papers without a feedback entry count as `Unset`.
    pub fn list_by_feedback(
        &self,
        relevance: Relevance,
    ) -> impl Iterator<Item = (&PaperRecord, &str)> + '_ {
        self.iter().filter_map(move |(id, record)| {
            let (r, note) = match self.feedback.get(id) {
                Some(fb) => (fb.relevance, fb.note.as_str()),
                None => (Relevance::Unset, ""),
            };
            (r == relevance).then_some((record, note))
        })
    }

    pub fn record_insight(&mut self, id: &Identity, update: impl FnOnce(&mut Insight)) -> Outcome {
        if !self.contains(id) {
            return Outcome::NotFound;
        }
        update(self.insights.entry(id.clone()).or_default());
        Outcome::Updated
    }

    pub fn insight(&self, id: &Identity) -> Option<&Insight> {
        self.insights.get(id)
    }
}
