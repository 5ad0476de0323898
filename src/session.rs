use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::apis::SourceError;
use crate::filter::SearchQuery;
use crate::identity::{self, Identity};
use crate::paper::PaperRecord;
use crate::ranking::Cluster;
use crate::store::PaperStore;

/// Results of the most recent search as the user sees them.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResultView {
    pub source: String,
    pub query: String,
    pub order: Vec<Identity>,
    pub ranked: bool,
    pub clusters: BTreeMap<String, ClusterView>,
    /// Bumped every time a search replaces the view.
    #[serde(skip)]
    pub generation: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub members: Vec<Identity>,
    pub topics: Vec<String>,
}

#[derive(Debug)]
pub enum SearchOutcome {
    /// The source failed; these are the last good results for the same query.
    Cached(Vec<Identity>, SourceError),
    Failed(SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    query: SearchQuery,
}

/// Everything one user's session owns. Never shared between sessions.
#[derive(Debug, Default)]
pub struct Session {
    store: PaperStore,
    view: ResultView,
    cache: HashMap<CacheKey, Vec<Identity>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &PaperStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PaperStore {
        &mut self.store
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    /// Fold a successful fetch into the store and make it the current view.
    pub fn apply_results(
        &mut self,
        source: &str,
        query: &SearchQuery,
        records: Vec<PaperRecord>,
    ) -> Vec<Identity> {
        let ids = self.store.upsert(records);
        self.cache.insert(
            CacheKey { source: source.to_string(), query: query.clone() },
            ids.clone(),
        );
        self.set_view(source, query, ids.clone());
        ids
    }

    /// A failed fetch leaves the store untouched. With `use_cache` the last
    /// good results for the same source and query become the view again.
    pub fn apply_failure(
        &mut self,
        source: &str,
        query: &SearchQuery,
        error: SourceError,
        use_cache: bool,
    ) -> SearchOutcome {
        let key = CacheKey { source: source.to_string(), query: query.clone() };
        match self.cache.get(&key).filter(|_| use_cache).cloned() {
            Some(ids) => {
                tracing::info!("Serving {} cached results for {:?} after: {}", ids.len(), query.text, error);
                self.set_view(source, query, ids.clone());
                SearchOutcome::Cached(ids, error)
            }
            None => SearchOutcome::Failed(error),
        }
    }

    fn set_view(&mut self, source: &str, query: &SearchQuery, order: Vec<Identity>) {
        self.view = ResultView {
            source: source.to_string(),
            query: query.text.clone(),
            order,
            ranked: false,
            clusters: BTreeMap::new(),
            generation: self.view.generation + 1,
        };
    }

    /// Records of the current view in display order.
    pub fn view_records(&self) -> Vec<PaperRecord> {
        self.view
            .order
            .iter()
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }

    /// Reorder the view after a ranking call. Unknown records are ignored and
    /// view entries the ranking dropped keep their place at the end.
    /// Returns false, changing nothing, if the view was replaced since
    /// `generation` was read.
    pub fn apply_ranking(&mut self, generation: u64, ranked: &[PaperRecord]) -> bool {
        if generation != self.view.generation {
            tracing::info!("Discarding ranking for a replaced result view");
            return false;
        }
        let mut order: Vec<Identity> = Vec::with_capacity(self.view.order.len());
        for id in ranked.iter().map(identity::of) {
            if self.view.order.contains(&id) && !order.contains(&id) {
                order.push(id);
            }
        }
        for id in &self.view.order {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        self.view.order = order;
        self.view.ranked = true;
        true
    }

    /// Attach cluster labels. `sent` is the record slice the clustering ran
    /// over, so member indices can be mapped back to identities. Stale
    /// generations are discarded as in [`apply_ranking`](Self::apply_ranking).
    pub fn apply_clusters(
        &mut self,
        generation: u64,
        sent: &[PaperRecord],
        clusters: BTreeMap<String, Cluster>,
    ) -> bool {
        if generation != self.view.generation {
            tracing::info!("Discarding clusters for a replaced result view");
            return false;
        }
        self.view.clusters = clusters
            .into_iter()
            .map(|(label, cluster)| {
                let members = cluster
                    .members
                    .iter()
                    .filter_map(|&i| sent.get(i))
                    .map(identity::of)
                    .collect();
                (label, ClusterView { members, topics: cluster.topics })
            })
            .filter(|(_, c)| !c.members.is_empty())
            .collect();
        true
    }

    pub fn cluster_of(&self, id: &Identity) -> Option<&str> {
        self.view
            .clusters
            .iter()
            .find(|(_, c)| c.members.contains(id))
            .map(|(label, _)| label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{normalize, RawRecord};
    use crate::store::Relevance;
    use serde_json::{json, Value};

    fn record(v: Value) -> PaperRecord {
        let raw: RawRecord = v.as_object().cloned().unwrap();
        normalize(&raw, "test")
    }

    fn abc() -> Vec<PaperRecord> {
        vec![
            record(json!({"provider_id": "W1", "title": "A"})),
            record(json!({"provider_id": "W2", "title": "B"})),
            record(json!({"provider_id": "W3", "title": "C"})),
        ]
    }

    #[test]
    fn test_apply_results_sets_view() {
        let mut session = Session::new();
        let q = SearchQuery::new("memory", 10);
        let ids = session.apply_results("local", &q, abc());
        assert_eq!(ids.len(), 3);
        assert_eq!(session.view().order, ids);
        assert_eq!(session.view().query, "memory");
        assert_eq!(session.store().len(), 3);
    }

    #[test]
    fn test_failure_keeps_state() {
        let mut session = Session::new();
        let q = SearchQuery::new("memory", 10);
        let ids = session.apply_results("openalex", &q, abc());
        let _ = session.store_mut().mark_feedback(&ids[0], Relevance::Relevant);

        let other = SearchQuery::new("sleep", 10);
        let outcome = session.apply_failure("openalex", &other, SourceError::RateLimited("openalex".into()), true);
        assert!(matches!(outcome, SearchOutcome::Failed(SourceError::RateLimited(_))));
        assert_eq!(session.store().len(), 3);
        assert_eq!(session.view().query, "memory");
        assert_eq!(session.store().feedback_for(&ids[0]).unwrap().relevance, Relevance::Relevant);
    }

    #[test]
    fn test_failure_serves_cache() {
        let mut session = Session::new();
        let q = SearchQuery::new("memory", 10);
        let ids = session.apply_results("openalex", &q, abc());
        session.apply_results("openalex", &SearchQuery::new("other", 10), vec![record(json!({"provider_id": "W9"}))]);

        let outcome = session.apply_failure("openalex", &q, SourceError::Api("boom".into()), true);
        match outcome {
            SearchOutcome::Cached(cached, _) => assert_eq!(cached, ids),
            other => panic!("expected cached, got {:?}", other),
        }
        assert_eq!(session.view().order, ids);

        let outcome = session.apply_failure("openalex", &q, SourceError::Api("boom".into()), false);
        assert!(matches!(outcome, SearchOutcome::Failed(_)));
    }

    #[test]
    fn test_apply_ranking() {
        let mut session = Session::new();
        let records = abc();
        session.apply_results("local", &SearchQuery::new("", 10), records.clone());
        let generation = session.view().generation;
        let ranked = vec![records[2].clone(), records[0].clone(), record(json!({"provider_id": "W99"}))];
        assert!(session.apply_ranking(generation, &ranked));
        let titles: Vec<_> = session.view_records().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
        assert!(session.view().ranked);
    }

    #[test]
    fn test_apply_clusters() {
        let mut session = Session::new();
        let records = abc();
        let ids = session.apply_results("local", &SearchQuery::new("", 10), records.clone());
        let mut clusters = BTreeMap::new();
        clusters.insert("First".to_string(), Cluster { members: vec![0, 2], topics: vec!["x".into()] });
        clusters.insert("Ghost".to_string(), Cluster { members: vec![7], topics: vec![] });
        let generation = session.view().generation;
        assert!(session.apply_clusters(generation, &records, clusters));

        assert_eq!(session.view().clusters.len(), 1);
        assert_eq!(session.cluster_of(&ids[2]), Some("First"));
        assert_eq!(session.cluster_of(&ids[1]), None);
    }

    #[test]
    fn test_stale_ranking_and_clusters_discarded() {
        let mut session = Session::new();
        let records = abc();
        session.apply_results("local", &SearchQuery::new("memory", 10), records.clone());
        let stale = session.view().generation;

        let fresh = vec![record(json!({"provider_id": "W7", "title": "Z"}))];
        let ids = session.apply_results("openalex", &SearchQuery::new("sleep", 10), fresh);
        assert_ne!(session.view().generation, stale);

        let ranked = vec![records[2].clone(), records[0].clone()];
        assert!(!session.apply_ranking(stale, &ranked));
        assert_eq!(session.view().order, ids);
        assert!(!session.view().ranked);

        let mut clusters = BTreeMap::new();
        clusters.insert("Old".to_string(), Cluster { members: vec![0], topics: vec![] });
        assert!(!session.apply_clusters(stale, &records, clusters));
        assert!(session.view().clusters.is_empty());
    }
}
