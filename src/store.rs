use crate::config::RouterConfig;
use crate::error::Result;
use crate::routing::RuleSet;
use crate::rules::parse_rules;
use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of `update_rules`.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub project_id: String,
    pub rule_count: usize,
    pub cached: bool,
    /// The compiled set; for preview loads this is the only handle on it.
    #[serde(skip)]
    pub ruleset: Arc<RuleSet>,
}

/// Per-project ruleset cache, cheaply cloneable.
///
/// Each project owns an `ArcSwap` slot: readers `load_full` a snapshot
/// lock-free and keep using it even if a writer swaps in a new set
/// meanwhile. A new set is fully compiled before it is stored, so a reader
/// never observes a partially built ruleset. Writes to different projects
/// only contend on the map shard, never on each other's slots.
#[derive(Clone)]
pub struct RuleStore {
    projects: Arc<DashMap<String, Arc<ArcSwap<RuleSet>>>>,
    router: Arc<RouterConfig>,
}

impl RuleStore {
    pub fn new(router: RouterConfig) -> Self {
        Self {
            projects: Arc::new(DashMap::new()),
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &RouterConfig {
        &self.router
    }

    /// Parse and compile `rules_data`. With `cache` the project's ruleset is
    /// replaced atomically; without it the set is only returned (preview /
    /// dry-run). On error nothing cached is touched.
    pub fn update_rules(&self, project_id: &str, rules_data: &str, cache: bool) -> Result<LoadSummary> {
        let started = Instant::now();
        let compiled = parse_rules(rules_data).and_then(|rules| RuleSet::compile(rules, &self.router));
        metrics::histogram!("engine_rules_compile_duration_seconds").record(started.elapsed().as_secs_f64());

        let ruleset = match compiled {
            Ok(set) => Arc::new(set),
            Err(e) => {
                tracing::warn!("store: rule update rejected, project={}, error={}", project_id, e);
                metrics::counter!("engine_rules_rejected_total").increment(1);
                return Err(e);
            }
        };

        if cache {
            match self.projects.entry(project_id.to_string()) {
                Entry::Occupied(slot) => slot.get().store(ruleset.clone()),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(ArcSwap::new(ruleset.clone())));
                }
            }
            metrics::gauge!("engine_projects_cached").set(self.projects.len() as f64);
        }

        metrics::counter!("engine_rules_loaded_total").increment(ruleset.len() as u64);
        tracing::info!(
            "store: rules loaded, project={}, count={}, cached={}",
            project_id,
            ruleset.len(),
            cache
        );

        Ok(LoadSummary {
            project_id: project_id.to_string(),
            rule_count: ruleset.len(),
            cached: cache,
            ruleset,
        })
    }

    /// Current snapshot for `project_id`; absence is not an error.
    pub fn lookup(&self, project_id: &str) -> Option<Arc<RuleSet>> {
        self.projects.get(project_id).map(|slot| slot.load_full())
    }

    /// Drop a project's cached ruleset.
    pub fn remove(&self, project_id: &str) -> bool {
        let removed = self.projects.remove(project_id).is_some();
        if removed {
            tracing::info!("store: project removed, project={}", project_id);
            metrics::gauge!("engine_projects_cached").set(self.projects.len() as f64);
        }
        removed
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::routing::RequestUrl;

    const ONE_RULE: &str = r#"[{"id": "a", "source": {"path": "/a"}}]"#;
    const TWO_RULES: &str = r#"[{"id": "a", "source": {"path": "/a"}}, {"id": "b", "source": {"path": "/b"}}]"#;

    #[test]
    fn cached_update_replaces_snapshot() {
        let store = RuleStore::default();
        assert!(store.lookup("p").is_none());

        let summary = store.update_rules("p", ONE_RULE, true).unwrap();
        assert_eq!(summary.rule_count, 1);
        assert!(summary.cached);
        assert_eq!(store.lookup("p").unwrap().len(), 1);

        store.update_rules("p", TWO_RULES, true).unwrap();
        assert_eq!(store.lookup("p").unwrap().len(), 2);
        assert_eq!(store.project_count(), 1);
    }

    #[test]
    fn preview_update_leaves_cache_alone() {
        let store = RuleStore::default();
        store.update_rules("p", ONE_RULE, true).unwrap();

        let summary = store.update_rules("p", TWO_RULES, false).unwrap();
        assert_eq!(summary.rule_count, 2);
        assert!(!summary.cached);
        assert_eq!(summary.ruleset.len(), 2);
        assert_eq!(store.lookup("p").unwrap().len(), 1);

        store.update_rules("fresh", TWO_RULES, false).unwrap();
        assert!(store.lookup("fresh").is_none());
    }

    #[test]
    fn failed_update_keeps_previous_snapshot() {
        let store = RuleStore::default();
        store.update_rules("p", ONE_RULE, true).unwrap();

        let err = store
            .update_rules("p", r#"[{"id": "x", "source": {"path_regex": "("}}]"#, true)
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleParse { index: Some(0), .. }));
        assert_eq!(store.lookup("p").unwrap().len(), 1);
    }

    #[test]
    fn remove_project() {
        let store = RuleStore::default();
        store.update_rules("p", ONE_RULE, true).unwrap();
        assert!(store.remove("p"));
        assert!(!store.remove("p"));
        assert!(store.lookup("p").is_none());
    }

    #[test]
    fn readers_never_see_partial_sets_during_swaps() {
        let store = RuleStore::default();
        store.update_rules("p", ONE_RULE, true).unwrap();
        let url = RequestUrl::parse("/a", store.router());

        std::thread::scope(|s| {
            let writer = store.clone();
            s.spawn(move || {
                for i in 0..200 {
                    let data = if i % 2 == 0 { TWO_RULES } else { ONE_RULE };
                    writer.update_rules("p", data, true).unwrap();
                    writer.update_rules("other", ONE_RULE, true).unwrap();
                }
            });
            for _ in 0..4 {
                let reader = store.clone();
                let url = url.clone();
                s.spawn(move || {
                    for _ in 0..500 {
                        let set = reader.lookup("p").unwrap();
                        assert!(set.len() == 1 || set.len() == 2);
                        assert_eq!(set.match_url(&url).unwrap().id(), "a");
                    }
                });
            }
        });
    }
}
