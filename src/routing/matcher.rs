use crate::config::RouterConfig;
use crate::error::{EngineError, Result};
use crate::routing::trace::{outcome, MatchTrace, Predicate, TraceDecision, TraceStep};
use crate::routing::url::RequestUrl;
use crate::rules::{CompiledRule, HostMatcher, RuleConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The ruleset of one project, an immutable snapshot.
///
/// Rules are held in evaluation order: descending `priority`, declaration
/// order on ties. The first rule whose predicates all succeed wins.
///
/// Candidates are partitioned by host so `match_url` skips rules that
/// cannot match the request host:
/// 1. Exact host (O(1) HashMap lookup)
/// 2. Wildcard / marker host patterns
/// 3. Rules without a host predicate
///
/// The partitions hold indices into `rules` and are merged back into
/// evaluation order, so partitioning never changes precedence.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Arc<CompiledRule>>,
    exact_hosts: HashMap<String, Vec<usize>>,
    pattern_hosts: Vec<usize>,
    any_host: Vec<usize>,
}

impl RuleSet {
    /// Compile rule DTOs into a ruleset. Fails on the first rule that does
    /// not compile or whose id repeats an earlier one.
    pub fn compile(configs: Vec<RuleConfig>, router: &RouterConfig) -> Result<Self> {
        let mut seen: HashSet<String> = HashSet::with_capacity(configs.len());
        let mut compiled = Vec::with_capacity(configs.len());

        for (index, cfg) in configs.into_iter().enumerate() {
            if !seen.insert(cfg.id.clone()) {
                return Err(EngineError::rule(index, &cfg.id, "duplicate rule id"));
            }
            let id = cfg.id.clone();
            let rule = CompiledRule::compile(cfg, router).map_err(|reason| EngineError::rule(index, &id, reason))?;
            tracing::debug!(
                "routing: compiled rule, id={}, priority={}, {}, {}, {}",
                rule.id(),
                rule.priority(),
                rule.describe_scheme(),
                rule.describe_host(),
                rule.describe_path(),
            );
            compiled.push(Arc::new(rule));
        }

        // Stable: ties keep declaration order.
        compiled.sort_by_key(|r| std::cmp::Reverse(r.priority()));

        let mut exact_hosts: HashMap<String, Vec<usize>> = HashMap::new();
        let mut pattern_hosts = Vec::new();
        let mut any_host = Vec::new();

        for (idx, rule) in compiled.iter().enumerate() {
            match rule.host_matcher() {
                None => any_host.push(idx),
                Some(HostMatcher::Exact(host)) => exact_hosts.entry(host.clone()).or_default().push(idx),
                Some(_) => pattern_hosts.push(idx),
            }
        }

        Ok(Self {
            rules: compiled,
            exact_hosts,
            pattern_hosts,
            any_host,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.id() == id)
    }

    /// First rule (in evaluation order) matching `url`.
    pub fn match_url(&self, url: &RequestUrl) -> Option<Arc<CompiledRule>> {
        self.candidates(url)
            .into_iter()
            .map(|idx| &self.rules[idx])
            .find(|rule| rule.is_match(url))
            .cloned()
    }

    /// Evaluate every rule and every predicate, recording each outcome.
    pub fn trace_url(&self, url: &RequestUrl, raw_url: &str) -> MatchTrace {
        let mut steps = Vec::with_capacity(self.rules.len());
        let mut winner: Option<&str> = None;

        for rule in &self.rules {
            let scheme = rule.matches_scheme(url);
            let host = rule.matches_host(url);
            let path = rule.matches_path(url);
            let matched = scheme && host && path;

            if matched && winner.is_none() {
                winner = Some(rule.id());
            }

            steps.push(TraceStep {
                rule_id: rule.id().to_string(),
                priority: rule.priority(),
                matched,
                predicates: vec![
                    outcome(Predicate::Scheme, scheme, rule.describe_scheme(), url.scheme()),
                    outcome(Predicate::Host, host, rule.describe_host(), url.host()),
                    outcome(Predicate::Path, path, rule.describe_path(), Some(url.path_and_query())),
                ],
            });
        }

        let decision = match winner {
            Some(rule_id) => TraceDecision::Selected {
                rule_id: rule_id.to_string(),
            },
            None => TraceDecision::NoMatch,
        };

        MatchTrace {
            url: raw_url.to_string(),
            steps,
            decision,
        }
    }

    /// Indices of rules whose host predicate can succeed, in evaluation order.
    fn candidates(&self, url: &RequestUrl) -> Vec<usize> {
        let exact: &[usize] = url
            .host()
            .and_then(|h| self.exact_hosts.get(h))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let pattern: &[usize] = if url.host().is_some() {
            &self.pattern_hosts
        } else {
            &[]
        };

        let mut candidates = Vec::with_capacity(exact.len() + pattern.len() + self.any_host.len());
        candidates.extend_from_slice(exact);
        candidates.extend_from_slice(pattern);
        candidates.extend_from_slice(&self.any_host);
        candidates.sort_unstable();
        candidates
    }
}
