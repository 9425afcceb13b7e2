//! Response filters: header actions and streaming body substitution.
//!
//! Both are built from a rule's compiled filter list. Header filtering is a
//! pure function over a header list; body filtering keeps per-response state
//! in a session table keyed by a host supplied identifier.

pub mod body;
pub mod header;
pub mod stream;


pub use body::{BodyFilterEngine, FilterAck};
pub use header::Header;
pub use stream::{apply_whole, FilterChain, Stage};
