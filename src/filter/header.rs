use crate::rules::{substitute, Captures, CompiledRule, HeaderAction, HeaderActionKind};
use serde::{Deserialize, Serialize};

/// One response header. Lists of headers keep order and duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Apply the rule's header actions in declaration order.
pub fn apply(rule: &CompiledRule, headers: Vec<Header>, captures: &Captures) -> Vec<Header> {
    apply_actions(&rule.header_actions, headers, captures)
}

/// Apply `actions` in order. `add` appends, `remove` drops every header with
/// the same name (ASCII case-insensitive), `replace` is remove then add.
///
/// An `add` or `replace` whose substituted value is not a valid header value
/// is skipped and leaves the headers as they were.
pub fn apply_actions(actions: &[HeaderAction], mut headers: Vec<Header>, captures: &Captures) -> Vec<Header> {
    for action in actions {
        match action.kind {
            HeaderActionKind::Remove => remove(&mut headers, &action.name),
            HeaderActionKind::Add => {
                if let Some(header) = resolve(action, captures) {
                    headers.push(header);
                }
            }
            HeaderActionKind::Replace => {
                if let Some(header) = resolve(action, captures) {
                    remove(&mut headers, &action.name);
                    headers.push(header);
                }
            }
        }
    }
    headers
}

fn remove(headers: &mut Vec<Header>, name: &str) {
    headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
}

fn resolve(action: &HeaderAction, captures: &Captures) -> Option<Header> {
    let value = substitute(&action.value, captures).value;
    if let Err(e) = http::HeaderValue::from_str(&value) {
        tracing::warn!(
            "header_filter: substituted value rejected, skipping action, header={}, error={}",
            action.name,
            e
        );
        metrics::counter!("engine_header_values_rejected_total").increment(1);
        return None;
    }
    Some(Header::new(action.name.clone(), value))
}
