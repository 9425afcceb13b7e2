pub mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use crate::error::EngineError;
use anyhow::Result;
use std::path::Path;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl EngineConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: EngineConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            EngineConfig::default()
        };

        config.apply_env_overrides();

        config.validate()?;
        tracing::debug!(
            ignore_host_case = config.router.ignore_host_case,
            sort_query = config.router.sort_query,
            idle_timeout = %config.body_filter.idle_timeout,
            "loaded engine configuration"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `REDIRECT_ENGINE_*` overrides read through `lookup`.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |v: String| v == "true" || v == "1";
        if let Some(v) = lookup("REDIRECT_ENGINE_IGNORE_HOST_CASE") {
            self.router.ignore_host_case = flag(v);
        }
        if let Some(v) = lookup("REDIRECT_ENGINE_SORT_QUERY") {
            self.router.sort_query = flag(v);
        }
        if let Some(v) = lookup("REDIRECT_ENGINE_IDLE_TIMEOUT") {
            self.body_filter.idle_timeout = v;
        }
        if let Some(v) = lookup("REDIRECT_ENGINE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("REDIRECT_ENGINE_LOG_JSON") {
            self.log.json = flag(v);
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if let Err(e) = self.body_filter.idle_timeout() {
            return Err(EngineError::Config(format!(
                "body_filter.idle_timeout '{}' is not a duration: {}",
                self.body_filter.idle_timeout, e
            )));
        }
        let level = self.log.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(EngineError::Config(format!(
                "log.level '{}' must be one of {}",
                self.log.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}
