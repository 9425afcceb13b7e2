use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries for rule compilation time (seconds).
const COMPILE_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Thin handle around the global metrics recorder.
///
/// The library only emits through the `metrics` macros; without an installed
/// recorder they are no-ops. A host (or the CLI) calls `Metrics::install()`
/// once to collect them, and keeps the handle to render the exposition text.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("_duration_seconds".to_string()),
                COMPILE_BUCKETS,
            )?
            .install_recorder()?;

        describe();
        Ok(Self { handle })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn describe() {
    // rules
    describe_counter!(
        "engine_rules_loaded_total",
        Unit::Count,
        "Rules compiled by successful rule updates"
    );
    describe_counter!(
        "engine_rules_rejected_total",
        Unit::Count,
        "Rule updates rejected with a parse error"
    );
    describe_histogram!(
        "engine_rules_compile_duration_seconds",
        Unit::Seconds,
        "Time spent parsing and compiling one rule update"
    );
    describe_gauge!(
        "engine_projects_cached",
        Unit::Count,
        "Projects with a cached ruleset"
    );

    // matching
    describe_counter!(
        "engine_match_total",
        Unit::Count,
        "URL match lookups by result (hit, miss, no_ruleset)"
    );
    describe_counter!(
        "engine_redirects_total",
        Unit::Count,
        "Redirects resolved by status code"
    );
    describe_counter!(
        "engine_header_values_rejected_total",
        Unit::Count,
        "Header actions skipped because the substituted value is not a valid header value"
    );

    // body filters
    describe_gauge!(
        "engine_body_filter_sessions_active",
        Unit::Count,
        "Open body filter sessions"
    );
    describe_counter!(
        "engine_body_filter_unknown_total",
        Unit::Count,
        "Body filter calls naming an unknown session"
    );
    describe_counter!(
        "engine_body_filter_bytes_total",
        Unit::Bytes,
        "Body bytes through filter sessions by direction"
    );
}
