pub mod compiled;
pub mod template;
pub mod types;

pub use compiled::{BodyFilterSpec, CompiledRule, HeaderAction, HeaderActionKind, HostMatcher, PathMatcher};
pub use template::{substitute, Captures, Substituted};
pub use types::{BodyFilterConfig, HeaderActionConfig, MarkerConfig, RuleConfig, SourceConfig};

use crate::config::RouterConfig;
use crate::error::{EngineError, Result};

/// Parse rule data text into DTOs.
///
/// Accepts `{"rules": [...]}` or a bare array. Each rule is decoded on its
/// own so the error names the first offending rule.
pub fn parse_rules(data: &str) -> Result<Vec<RuleConfig>> {
    let document: serde_json::Value =
        serde_json::from_str(data).map_err(|e| EngineError::document(e.to_string()))?;

    let items = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("rules") {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(_) => return Err(EngineError::document("'rules' must be an array")),
        },
        _ => return Err(EngineError::document("expected an object or an array of rules")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let id = item
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            serde_json::from_value::<RuleConfig>(item).map_err(|e| EngineError::rule(index, &id, e.to_string()))
        })
        .collect()
}

/// Compile one serialized rule handed back by the host (e.g. to `resolve`).
pub fn compile_serialized(rule: &str, router: &RouterConfig) -> Result<CompiledRule> {
    let config: RuleConfig =
        serde_json::from_str(rule).map_err(|e| EngineError::InvalidPayload(format!("rule: {e}")))?;
    let id = config.id.clone();
    CompiledRule::compile(config, router).map_err(|reason| EngineError::rule(0, &id, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_and_bare() {
        let wrapped = parse_rules(r#"{"rules": [{"id": "a", "source": {"path": "/a"}}]}"#).unwrap();
        let bare = parse_rules(r#"[{"id": "a", "source": {"path": "/a"}}]"#).unwrap();
        assert_eq!(wrapped, bare);
        assert!(parse_rules(r#"{"rules": null}"#).unwrap().is_empty());
    }

    #[test]
    fn reports_first_offending_rule() {
        let data = r#"[
            {"id": "ok", "source": {"path": "/a"}},
            {"id": "broken", "source": {"path": 12}},
            {"id": "also-broken"}
        ]"#;
        match parse_rules(data) {
            Err(EngineError::RuleParse { index, rule_id, .. }) => {
                assert_eq!(index, Some(1));
                assert_eq!(rule_id.as_deref(), Some("broken"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_document() {
        assert!(matches!(
            parse_rules("{not json"),
            Err(EngineError::RuleParse { index: None, .. })
        ));
        assert!(parse_rules(r#""text""#).is_err());
        assert!(parse_rules(r#"{"rules": 3}"#).is_err());
    }

    #[test]
    fn compiles_serialized_rule() {
        let rule = r#"{"id": "a", "source": {"path": "/a"}, "target": "/b", "redirect_code": 301}"#;
        let compiled = compile_serialized(rule, &RouterConfig::default()).unwrap();
        assert_eq!(compiled.id(), "a");
        assert_eq!(compiled.target(), Some("/b"));
        assert!(matches!(
            compile_serialized("[]", &RouterConfig::default()),
            Err(EngineError::InvalidPayload(_))
        ));
    }
}
