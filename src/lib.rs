//! Edge redirect and rewrite engine.
//!
//! Hosts register rules per project, match request URLs against them, and
//! use the matched rule to compute redirects and to rewrite response headers
//! and bodies. The engine performs no I/O; everything it needs is passed in.

pub mod access_log;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod redirect;
pub mod routing;
pub mod rules;
pub mod store;

pub use engine::Engine;
pub use error::{EngineError, Result};
