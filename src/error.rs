use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// Rule data could not be parsed or compiled. `index` is the position of
    /// the first offending rule, `None` when the document itself is malformed.
    RuleParse {
        index: Option<usize>,
        rule_id: Option<String>,
        reason: String,
    },
    InvalidPayload(String),
    UnknownFilter(String),
    Config(String),
}

impl EngineError {
    pub(crate) fn rule(index: usize, rule_id: &str, reason: impl Into<String>) -> Self {
        EngineError::RuleParse {
            index: Some(index),
            rule_id: if rule_id.is_empty() {
                None
            } else {
                Some(rule_id.to_string())
            },
            reason: reason.into(),
        }
    }

    pub(crate) fn document(reason: impl Into<String>) -> Self {
        EngineError::RuleParse {
            index: None,
            rule_id: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::RuleParse {
                index: Some(index),
                rule_id: Some(id),
                reason,
            } => write!(f, "rule parse error at #{} ({}): {}", index, id, reason),
            EngineError::RuleParse {
                index: Some(index),
                rule_id: None,
                reason,
            } => write!(f, "rule parse error at #{}: {}", index, reason),
            EngineError::RuleParse { reason, .. } => write!(f, "rule parse error: {}", reason),
            EngineError::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            EngineError::UnknownFilter(id) => write!(f, "unknown filter identifier: {}", id),
            EngineError::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rule_parse_with_id() {
        assert_eq!(
            EngineError::rule(2, "r3", "bad regex").to_string(),
            "rule parse error at #2 (r3): bad regex"
        );
    }

    #[test]
    fn display_rule_parse_without_id() {
        assert_eq!(
            EngineError::rule(0, "", "missing source").to_string(),
            "rule parse error at #0: missing source"
        );
    }

    #[test]
    fn display_document_error() {
        assert_eq!(
            EngineError::document("expected value").to_string(),
            "rule parse error: expected value"
        );
    }

    #[test]
    fn display_unknown_filter() {
        assert_eq!(
            EngineError::UnknownFilter("f1".to_string()).to_string(),
            "unknown filter identifier: f1"
        );
    }

    #[test]
    fn display_invalid_payload() {
        assert_eq!(
            EngineError::InvalidPayload("eof".to_string()).to_string(),
            "invalid payload: eof"
        );
    }

    #[test]
    fn display_config() {
        assert_eq!(
            EngineError::Config("bad level".to_string()).to_string(),
            "config error: bad level"
        );
    }
}
