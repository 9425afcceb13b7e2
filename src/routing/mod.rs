mod matcher;
pub mod trace;
pub mod url;

pub use matcher::RuleSet;
pub use trace::{MatchTrace, Predicate, PredicateOutcome, TraceDecision, TraceStep};
pub use url::RequestUrl;
