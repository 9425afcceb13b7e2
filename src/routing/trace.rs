//! Evaluation trace types for explaining a routing decision.
//!
//! A trace evaluates every rule of a ruleset and every predicate of every
//! rule, so an operator can see why a later rule did not win or why nothing
//! matched. The terminal `decision` is always the rule `match_url` returns
//! for the same ruleset and URL.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Scheme,
    Host,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateOutcome {
    pub predicate: Predicate,
    pub matched: bool,
    /// e.g. `"host *.example.com did not match example.org"`.
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub rule_id: String,
    pub priority: i32,
    /// All predicates matched.
    pub matched: bool,
    /// In evaluation order: scheme, host, path.
    pub predicates: Vec<PredicateOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TraceDecision {
    Selected { rule_id: String },
    NoMatch,
    /// The project has no cached ruleset.
    NoRuleSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTrace {
    pub url: String,
    pub steps: Vec<TraceStep>,
    pub decision: TraceDecision,
}

impl MatchTrace {
    pub fn no_ruleset(url: &str) -> Self {
        Self {
            url: url.to_string(),
            steps: Vec::new(),
            decision: TraceDecision::NoRuleSet,
        }
    }

    pub fn selected_rule_id(&self) -> Option<&str> {
        match &self.decision {
            TraceDecision::Selected { rule_id } => Some(rule_id),
            _ => None,
        }
    }

    /// Steps whose rule matched, winner first.
    pub fn matching_steps(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(|s| s.matched)
    }
}

pub(crate) fn outcome(predicate: Predicate, matched: bool, expected: String, actual: Option<&str>) -> PredicateOutcome {
    let verb = if matched { "matched" } else { "did not match" };
    PredicateOutcome {
        predicate,
        matched,
        reason: format!("{} {} {}", expected, verb, actual.unwrap_or("(none)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serializes_tagged() {
        let trace = MatchTrace {
            url: "/a".into(),
            steps: vec![],
            decision: TraceDecision::Selected { rule_id: "r1".into() },
        };
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["decision"]["decision"], "selected");
        assert_eq!(json["decision"]["rule_id"], "r1");

        let empty = serde_json::to_value(MatchTrace::no_ruleset("/a")).unwrap();
        assert_eq!(empty["decision"]["decision"], "no_rule_set");
    }

    #[test]
    fn outcome_reason() {
        let o = outcome(Predicate::Host, false, "host example.com".into(), None);
        assert_eq!(o.reason, "host example.com did not match (none)");
        let o = outcome(Predicate::Path, true, "path /a".into(), Some("/a"));
        assert_eq!(o.reason, "path /a matched /a");
    }
}
