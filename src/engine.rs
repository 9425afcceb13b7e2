//! The host facing boundary.
//!
//! `Engine` bundles the rule store and the body filter session table behind
//! the operations a host calls per request. Each operation has a typed form
//! and, where the host exchanges data as text, a JSON form. JSON forms never
//! fail on a lookup miss: they return `None` / pass the input through and log.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::filter::header::{apply_actions, Header};
use crate::filter::{BodyFilterEngine, FilterAck};
use crate::redirect::{resolve, RedirectInstruction};
use crate::routing::{MatchTrace, RequestUrl};
use crate::rules::{compile_serialized, Captures, CompiledRule, HeaderAction, HeaderActionKind};
use crate::store::{LoadSummary, RuleStore};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Fallback status used to compute `Location` when only the target matters.
const DEFAULT_REDIRECT_CODE: u16 = 302;

/// Serialized rules kept compiled; the cache is cleared when full.
const RULE_CACHE_CAPACITY: usize = 1024;

pub struct Engine {
    config: EngineConfig,
    store: RuleStore,
    bodies: BodyFilterEngine,
    /// Compiled form of rule payloads seen at the JSON boundary, keyed by
    /// the payload text.
    compiled: DashMap<String, Arc<CompiledRule>>,
    idle_timeout: Duration,
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let idle_timeout = config
            .body_filter
            .idle_timeout()
            .map_err(|e| EngineError::Config(format!("body_filter.idle_timeout: {e}")))?;
        Ok(Self {
            store: RuleStore::new(config.router.clone()),
            bodies: BodyFilterEngine::new(),
            compiled: DashMap::new(),
            config,
            idle_timeout,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn body_filters(&self) -> &BodyFilterEngine {
        &self.bodies
    }

    /// Normalise a raw request URL the way rules see it.
    pub fn request_url(&self, url: &str) -> RequestUrl {
        RequestUrl::parse(url, &self.config.router)
    }

    // --- rules ---

    pub fn update_rules(&self, project_id: &str, rules_data: &str, cache: bool) -> Result<LoadSummary> {
        self.store.update_rules(project_id, rules_data, cache)
    }

    pub fn match_url(&self, project_id: &str, url: &str) -> Option<Arc<CompiledRule>> {
        let Some(ruleset) = self.store.lookup(project_id) else {
            metrics::counter!("engine_match_total", "result" => "no_ruleset").increment(1);
            return None;
        };
        let matched = ruleset.match_url(&self.request_url(url));
        let result = if matched.is_some() { "hit" } else { "miss" };
        metrics::counter!("engine_match_total", "result" => result).increment(1);
        matched
    }

    pub fn trace_url(&self, project_id: &str, url: &str) -> MatchTrace {
        match self.store.lookup(project_id) {
            Some(ruleset) => ruleset.trace_url(&self.request_url(url), url),
            None => MatchTrace::no_ruleset(url),
        }
    }

    // --- redirects and headers ---

    pub fn resolve_redirect(&self, rule: &CompiledRule, url: &str, response_code: u16) -> Option<RedirectInstruction> {
        let redirect = resolve(rule, &self.request_url(url), response_code)?;
        let mut code = itoa::Buffer::new();
        metrics::counter!("engine_redirects_total", "status_code" => code.format(redirect.status_code).to_owned())
            .increment(1);
        Some(redirect)
    }

    /// Apply `rule`'s header actions. With `url` and a redirecting rule a
    /// `Location` replace runs first. `status` is the response status; when
    /// the rule is gated on another status its actions are skipped.
    pub fn filter_headers(
        &self,
        rule: &CompiledRule,
        headers: Vec<Header>,
        url: Option<&str>,
        status: Option<u16>,
    ) -> Vec<Header> {
        let request = url.map(|u| self.request_url(u));
        let mut headers = headers;

        if let Some(request) = request.as_ref().filter(|_| location_applies(rule, status)) {
            if let Some(redirect) = resolve(rule, request, DEFAULT_REDIRECT_CODE) {
                let location = HeaderAction {
                    kind: HeaderActionKind::Replace,
                    name: "Location".to_string(),
                    value: redirect.target,
                };
                // already substituted; no captures so nothing is expanded twice
                headers = apply_actions(std::slice::from_ref(&location), headers, &Captures::new());
            }
        }

        if rule.applies_to_status(status) {
            let captures = request.as_ref().map(|r| rule.captures(r)).unwrap_or_default();
            headers = apply_actions(&rule.header_actions, headers, &captures);
        }
        headers
    }

    // --- bodies ---

    /// Open a body filter session for `rule`. Captures come from `url`; when
    /// the rule is gated on another status the session passes through.
    pub fn create_body_filter(
        &self,
        rule: &CompiledRule,
        filter_id: &str,
        url: Option<&str>,
        status: Option<u16>,
    ) -> FilterAck {
        if !rule.applies_to_status(status) {
            return self.bodies.create_passthrough(filter_id);
        }
        let captures = url
            .map(|u| rule.captures(&self.request_url(u)))
            .unwrap_or_default();
        self.bodies.create(rule, filter_id, &captures)
    }

    pub fn process_body_chunk(&self, filter_id: &str, chunk: &[u8]) -> Bytes {
        self.bodies.process_chunk(filter_id, chunk)
    }

    pub fn try_process_body_chunk(&self, filter_id: &str, chunk: &[u8]) -> Result<Bytes> {
        self.bodies.try_process_chunk(filter_id, chunk)
    }

    pub fn end_body_filter(&self, filter_id: &str) -> Bytes {
        self.bodies.end(filter_id)
    }

    pub fn try_end_body_filter(&self, filter_id: &str) -> Result<Bytes> {
        self.bodies.try_end(filter_id)
    }

    pub fn abandon_body_filter(&self, filter_id: &str) -> bool {
        self.bodies.abandon(filter_id)
    }

    /// Drop sessions idle longer than `body_filter.idle_timeout`.
    pub fn sweep_idle_body_filters(&self) -> usize {
        self.bodies.sweep_idle(self.idle_timeout)
    }

    pub fn active_body_filters(&self) -> usize {
        self.bodies.active_sessions()
    }

    // --- JSON boundary ---

    /// Load summary, or `{"error": "..."}`.
    pub fn update_rules_json(&self, project_id: &str, rules_data: &str, cache: bool) -> String {
        match self.update_rules(project_id, rules_data, cache) {
            Ok(summary) => to_json(&summary),
            Err(e) => to_json(&ErrorReply { error: &e.to_string() }),
        }
    }

    /// Matching rule, serialized so it can be handed back to `get_redirect`,
    /// `header_filter` and `create_body_filter_json`.
    pub fn get_rule_for_url(&self, project_id: &str, url: &str) -> Option<String> {
        self.match_url(project_id, url).map(|rule| to_json(rule.config()))
    }

    pub fn get_trace_for_url(&self, project_id: &str, url: &str) -> String {
        to_json(&self.trace_url(project_id, url))
    }

    pub fn get_redirect(&self, rule_json: &str, url: &str, response_code: u16) -> Option<String> {
        let rule = self.decode_rule(rule_json)?;
        self.resolve_redirect(&rule, url, response_code)
            .map(|redirect| to_json(&redirect))
    }

    /// Filtered headers as JSON. A payload that does not decode is logged and
    /// `headers_json` is returned unchanged.
    pub fn header_filter(&self, rule_json: &str, headers_json: &str, url: Option<&str>, status: Option<u16>) -> String {
        let Some(rule) = self.decode_rule(rule_json) else {
            return headers_json.to_string();
        };
        let headers: Vec<Header> = match serde_json::from_str(headers_json) {
            Ok(headers) => headers,
            Err(e) => {
                tracing::warn!("engine: invalid headers payload, error={}", e);
                return headers_json.to_string();
            }
        };
        to_json(&self.filter_headers(&rule, headers, url, status))
    }

    pub fn create_body_filter_json(
        &self,
        rule_json: &str,
        filter_id: &str,
        url: Option<&str>,
        status: Option<u16>,
    ) -> Result<String> {
        let rule = self.compile_rule(rule_json)?;
        Ok(to_json(&self.create_body_filter(&rule, filter_id, url, status)))
    }

    /// Compile a serialized rule, reusing an earlier compilation of the same
    /// payload.
    fn compile_rule(&self, rule_json: &str) -> Result<Arc<CompiledRule>> {
        if let Some(rule) = self.compiled.get(rule_json) {
            return Ok(Arc::clone(rule.value()));
        }
        let rule = Arc::new(compile_serialized(rule_json, &self.config.router)?);
        if self.compiled.len() >= RULE_CACHE_CAPACITY {
            tracing::debug!("engine: compiled rule cache full, clearing, entries={}", self.compiled.len());
            self.compiled.clear();
        }
        self.compiled.insert(rule_json.to_string(), Arc::clone(&rule));
        Ok(rule)
    }

    fn decode_rule(&self, rule_json: &str) -> Option<Arc<CompiledRule>> {
        match self.compile_rule(rule_json) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!("engine: invalid rule payload, error={}", e);
                None
            }
        }
    }
}

/// `Location` follows the redirect status rather than the gating status: a
/// gated rule rewrites the status first, so its `Location` is emitted for
/// responses carrying the redirect code.
fn location_applies(rule: &CompiledRule, status: Option<u16>) -> bool {
    let Some(gate) = rule.config().match_on_response_status else {
        return true;
    };
    match status {
        None => true,
        Some(status) => status == rule.redirect_code().unwrap_or(gate),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("engine: failed to serialize reply, error={}", e);
        String::from("null")
    })
}
