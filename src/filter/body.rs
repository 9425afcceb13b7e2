use crate::error::{EngineError, Result};
use crate::filter::stream::FilterChain;
use crate::rules::{Captures, CompiledRule};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Returned by `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterAck {
    pub filter_id: String,
    pub rule_id: Option<String>,
    /// Substitution stages in the session; 0 means pass-through.
    pub stages: usize,
    /// A live session with the same id was discarded.
    pub replaced: bool,
}

struct FilterSession {
    rule_id: Option<String>,
    chain: FilterChain,
    /// Chunks processed so far.
    sequence: u64,
    last_activity: Instant,
}

/// Session table for streaming body substitution.
///
/// Sessions are keyed by a host supplied identifier, one per response body.
/// Each entry is only touched while its shard is locked for the duration of
/// one call, so different ids can be driven from different threads.
#[derive(Default)]
pub struct BodyFilterEngine {
    sessions: DashMap<String, FilterSession>,
}

impl BodyFilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session running `rule`'s body filters, with rule-level
    /// placeholders in replacements resolved against `captures`.
    pub fn create(&self, rule: &CompiledRule, filter_id: &str, captures: &Captures) -> FilterAck {
        let chain = FilterChain::from_specs(&rule.body_filters, captures);
        self.insert(filter_id, Some(rule.id().to_string()), chain)
    }

    /// Start a session that passes the body through untouched.
    pub fn create_passthrough(&self, filter_id: &str) -> FilterAck {
        self.insert(filter_id, None, FilterChain::default())
    }

    fn insert(&self, filter_id: &str, rule_id: Option<String>, chain: FilterChain) -> FilterAck {
        let stages = chain.len();
        let session = FilterSession {
            rule_id: rule_id.clone(),
            chain,
            sequence: 0,
            last_activity: Instant::now(),
        };
        let replaced = match self.sessions.insert(filter_id.to_string(), session) {
            Some(previous) => {
                tracing::warn!(
                    "body_filter: replacing live session, filter_id={}, previous_rule={}, chunks_seen={}",
                    filter_id,
                    previous.rule_id.as_deref().unwrap_or("-"),
                    previous.sequence
                );
                true
            }
            None => false,
        };
        self.report_active();
        tracing::debug!(
            "body_filter: session created, filter_id={}, rule={}, stages={}",
            filter_id,
            rule_id.as_deref().unwrap_or("-"),
            stages
        );

        FilterAck {
            filter_id: filter_id.to_string(),
            rule_id,
            stages,
            replaced,
        }
    }

    /// Feed one chunk. An unknown id is logged and the chunk returned as is.
    pub fn process_chunk(&self, filter_id: &str, chunk: &[u8]) -> Bytes {
        match self.try_process_chunk(filter_id, chunk) {
            Ok(out) => out,
            Err(_) => {
                tracing::warn!(
                    "body_filter: unknown filter id on chunk, filter_id={}, bytes={}",
                    filter_id,
                    chunk.len()
                );
                metrics::counter!("engine_body_filter_unknown_total").increment(1);
                Bytes::copy_from_slice(chunk)
            }
        }
    }

    pub fn try_process_chunk(&self, filter_id: &str, chunk: &[u8]) -> Result<Bytes> {
        let mut session = self
            .sessions
            .get_mut(filter_id)
            .ok_or_else(|| EngineError::UnknownFilter(filter_id.to_string()))?;
        session.sequence += 1;
        session.last_activity = Instant::now();
        let out = session.chain.process(chunk);
        drop(session);

        metrics::counter!("engine_body_filter_bytes_total", "direction" => "in").increment(chunk.len() as u64);
        metrics::counter!("engine_body_filter_bytes_total", "direction" => "out").increment(out.len() as u64);
        Ok(Bytes::from(out))
    }

    /// Flush and remove the session. An unknown id is logged and yields no
    /// bytes.
    pub fn end(&self, filter_id: &str) -> Bytes {
        match self.try_end(filter_id) {
            Ok(out) => out,
            Err(_) => {
                tracing::warn!("body_filter: unknown filter id on end, filter_id={}", filter_id);
                metrics::counter!("engine_body_filter_unknown_total").increment(1);
                Bytes::new()
            }
        }
    }

    pub fn try_end(&self, filter_id: &str) -> Result<Bytes> {
        let (_, mut session) = self
            .sessions
            .remove(filter_id)
            .ok_or_else(|| EngineError::UnknownFilter(filter_id.to_string()))?;
        self.report_active();

        let out = session.chain.finish();
        metrics::counter!("engine_body_filter_bytes_total", "direction" => "out").increment(out.len() as u64);
        tracing::debug!(
            "body_filter: session finished, filter_id={}, chunks={}, flushed={}",
            filter_id,
            session.sequence,
            out.len()
        );
        Ok(Bytes::from(out))
    }

    /// Drop a session without flushing. Returns whether it existed.
    pub fn abandon(&self, filter_id: &str) -> bool {
        let removed = self.sessions.remove(filter_id).is_some();
        if removed {
            self.report_active();
            tracing::info!("body_filter: session abandoned, filter_id={}", filter_id);
        }
        removed
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        self.sweep_idle_at(Instant::now(), max_idle)
    }

    pub(crate) fn sweep_idle_at(&self, now: Instant, max_idle: Duration) -> usize {
        let mut swept = 0;
        self.sessions.retain(|filter_id, session| {
            let idle = now.saturating_duration_since(session.last_activity);
            if idle <= max_idle {
                return true;
            }
            tracing::info!(
                "body_filter: dropping idle session, filter_id={}, idle={}",
                filter_id,
                humantime::format_duration(Duration::from_secs(idle.as_secs()))
            );
            swept += 1;
            false
        });
        if swept > 0 {
            self.report_active();
        }
        swept
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Bytes held back across all stages of a session.
    pub fn carried_bytes(&self, filter_id: &str) -> Option<usize> {
        self.sessions.get(filter_id).map(|s| s.chain.carry_len())
    }

    fn report_active(&self) {
        metrics::gauge!("engine_body_filter_sessions_active").set(self.sessions.len() as f64);
    }
}
