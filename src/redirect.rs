use crate::routing::RequestUrl;
use crate::rules::{substitute, CompiledRule};
use serde::{Deserialize, Serialize};

/// Concrete redirect computed for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectInstruction {
    pub target: String,
    pub status_code: u16,
    /// Placeholders left verbatim in `target` because nothing captured them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

impl RedirectInstruction {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Compute the redirect for `rule` against `url`.
///
/// Captures are re-derived from the rule's own matchers, so `rule` may come
/// from a serialized copy handed back by the host. The rule's `redirect_code`
/// wins over `response_code`. Returns `None` when the rule has no target.
pub fn resolve(rule: &CompiledRule, url: &RequestUrl, response_code: u16) -> Option<RedirectInstruction> {
    let target = rule.target()?;
    let substituted = substitute(target, &rule.captures(url));
    Some(RedirectInstruction {
        target: substituted.value,
        status_code: rule.redirect_code().unwrap_or(response_code),
        unresolved: substituted.unresolved,
    })
}
