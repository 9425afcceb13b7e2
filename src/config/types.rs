use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Deserialize a `T` that implements `Default`, treating JSON `null` the same as
/// a missing field (returns `T::default()`).  Use with:
///   `#[serde(default, deserialize_with = "deserialize_null_default")]`
pub(crate) fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level engine configuration.
///
/// Rule data is not part of this file: rules are pushed per project at
/// runtime through `update_rules`. This only tunes how they are evaluated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub body_filter: BodyFilterSettings,

    #[serde(default)]
    pub log: LogConfig,
}

/// URL normalisation applied before rules are matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Lower-case the request host before host predicates run.
    #[serde(default = "default_true")]
    pub ignore_host_case: bool,

    /// Re-order query parameters by key so `?b=2&a=1` matches a rule
    /// written as `?a=1&b=2`.
    #[serde(default = "default_true")]
    pub sort_query: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ignore_host_case: true,
            sort_query: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyFilterSettings {
    /// Sessions without activity for longer than this are dropped by
    /// `sweep_idle`. Humantime syntax, e.g. `"5m"`, `"30s"`.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
}

impl Default for BodyFilterSettings {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl BodyFilterSettings {
    pub fn idle_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.idle_timeout)
    }
}

fn default_idle_timeout() -> String {
    "5m".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
