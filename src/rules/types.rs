use crate::config::types::deserialize_null_default;
use serde::{Deserialize, Serialize};

/// One declarative rule as it crosses the boundary. Compiled once into a
/// `CompiledRule` at load time; this form is what `match_url` hands back
/// serialized and what `resolve` / filters accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,

    /// Higher value = evaluated earlier. Ties keep declaration order.
    #[serde(default)]
    pub priority: i32,

    /// Absent source matches every URL.
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub markers: Vec<MarkerConfig>,

    /// Redirect target template. `None` or empty means the rule only drives
    /// header/body filters.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub redirect_code: Option<u16>,

    /// Restricts header and body filters to responses with this status.
    #[serde(default)]
    pub match_on_response_status: Option<u16>,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub header_filters: Vec<HeaderActionConfig>,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub body_filters: Vec<BodyFilterConfig>,
}

/// Matcher predicates. Absent scheme/host match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub scheme: Option<String>,

    /// Exact (`example.com`), wildcard suffix (`*.example.com`), wildcard
    /// prefix (`example.*`), or with markers (`@sub.example.com`).
    #[serde(default)]
    pub host: Option<String>,

    /// Path and optional query, with `@marker` placeholders.
    #[serde(default)]
    pub path: Option<String>,

    /// Raw regex alternative to `path`; anchored on both ends.
    #[serde(default)]
    pub path_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub name: String,
    pub regex: String,
}

/// "add", "remove", "replace" (aliases "override", "set").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderActionConfig {
    pub action: String,

    pub header: String,

    /// Ignored for "remove".
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyFilterConfig {
    /// "literal" (default) or "pattern".
    #[serde(default = "default_body_filter_kind")]
    pub kind: String,

    pub pattern: String,

    #[serde(default)]
    pub replacement: String,

    /// Literal filters only: ASCII case-insensitive comparison.
    #[serde(default)]
    pub case_insensitive: bool,

    /// Pattern filters only: longest match the regex can produce. Required,
    /// it bounds the bytes held back between chunks.
    #[serde(default)]
    pub max_match_len: Option<usize>,
}

fn default_body_filter_kind() -> String {
    "literal".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_lists_are_empty() {
        let json = r#"{"id": "a", "source": {"path": "/a"}, "markers": null, "header_filters": null, "body_filters": null}"#;
        let rule: RuleConfig = serde_json::from_str(json).unwrap();
        assert!(rule.markers.is_empty());
        assert!(rule.header_filters.is_empty());
        assert!(rule.body_filters.is_empty());
        assert_eq!(rule.priority, 0);
    }

    #[test]
    fn body_filter_kind_defaults_to_literal() {
        let json = r#"{"pattern": "foo", "replacement": "bar"}"#;
        let f: BodyFilterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(f.kind, "literal");
        assert!(!f.case_insensitive);
        assert!(f.max_match_len.is_none());
    }
}
