use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use redirect_engine::config::{EngineConfig, LogConfig};
use redirect_engine::filter::Header;
use redirect_engine::metrics::Metrics;
use redirect_engine::Engine;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Args)]
pub struct RuleArgs {
    /// Rules file (JSON array or {"rules": [...]})
    #[arg(short, long)]
    pub rules: PathBuf,

    /// Request URL, absolute or path-and-query
    #[arg(short, long)]
    pub url: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the rule selected for a URL
    Match(RuleArgs),
    /// Print the evaluation trace for a URL
    Trace(RuleArgs),
    /// Print the redirect computed for a URL
    Redirect {
        #[command(flatten)]
        rule: RuleArgs,

        /// Status used when the rule has no redirect_code
        #[arg(long, default_value_t = 302)]
        code: u16,
    },
    /// Run the matched rule's header actions
    Headers {
        #[command(flatten)]
        rule: RuleArgs,

        /// Response header, "Name: value"; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Response status
        #[arg(long)]
        status: Option<u16>,
    },
    /// Stream a body through the matched rule's body filters
    Body {
        #[command(flatten)]
        rule: RuleArgs,

        /// Body file; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Bytes per chunk fed to the filter
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Response status
        #[arg(long)]
        status: Option<u16>,
    },
}

const PROJECT: &str = "cli";

/// Load the engine config with a stderr logger in place, since the
/// configured subscriber depends on what is loaded.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    load_config_with(path, filter, std::io::stderr)
}

fn load_config_with<W>(path: &Path, filter: EnvFilter, writer: W) -> Result<EngineConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || EngineConfig::load(path))
}

/// Set up the global subscriber. Logs go to stderr so stdout carries only
/// command output. Keep the guard alive until exit to flush buffered lines.
pub fn init_tracing(log: &LogConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stderr());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(false)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(false),
            )
            .init();
    }

    guard
}

pub fn run(config: EngineConfig, command: Command, print_metrics: bool) -> Result<()> {
    let metrics = if print_metrics {
        Some(Metrics::install().context("failed to install metrics recorder")?)
    } else {
        None
    };
    let engine = Engine::new(config).context("invalid engine configuration")?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Match(args) => {
            load_rules(&engine, &args.rules)?;
            match engine.match_url(PROJECT, &args.url) {
                Some(rule) => writeln!(out, "{}", serde_json::to_string_pretty(rule.config())?)?,
                None => writeln!(out, "no rule matches {}", args.url)?,
            }
        }
        Command::Trace(args) => {
            load_rules(&engine, &args.rules)?;
            let trace = engine.trace_url(PROJECT, &args.url);
            writeln!(out, "{}", serde_json::to_string_pretty(&trace)?)?;
        }
        Command::Redirect { rule: args, code } => {
            load_rules(&engine, &args.rules)?;
            let redirect = engine
                .match_url(PROJECT, &args.url)
                .and_then(|rule| engine.resolve_redirect(&rule, &args.url, code));
            match redirect {
                Some(redirect) => {
                    for placeholder in &redirect.unresolved {
                        tracing::warn!("cli: placeholder kept literal, placeholder={}", placeholder);
                    }
                    writeln!(out, "{}", serde_json::to_string_pretty(&redirect)?)?;
                }
                None => writeln!(out, "no redirect for {}", args.url)?,
            }
        }
        Command::Headers {
            rule: args,
            headers,
            status,
        } => {
            load_rules(&engine, &args.rules)?;
            let headers = headers
                .iter()
                .map(String::as_str)
                .map(parse_header)
                .collect::<Result<Vec<_>>>()?;
            let filtered = match engine.match_url(PROJECT, &args.url) {
                Some(rule) => engine.filter_headers(&rule, headers, Some(&args.url), status),
                None => headers,
            };
            for header in filtered {
                writeln!(out, "{}: {}", header.name, header.value)?;
            }
        }
        Command::Body {
            rule: args,
            input,
            chunk_size,
            status,
        } => {
            load_rules(&engine, &args.rules)?;
            let body = read_body(input.as_deref())?;
            let filter_id = "cli-body";
            match engine.match_url(PROJECT, &args.url) {
                Some(rule) => {
                    engine.create_body_filter(&rule, filter_id, Some(&args.url), status);
                }
                None => {
                    engine.body_filters().create_passthrough(filter_id);
                }
            }
            for chunk in body.chunks(chunk_size.max(1)) {
                out.write_all(&engine.process_body_chunk(filter_id, chunk))?;
            }
            out.write_all(&engine.end_body_filter(filter_id))?;
        }
    }

    if let Some(metrics) = metrics {
        write!(out, "{}", metrics.render())?;
    }
    out.flush()?;
    Ok(())
}

fn load_rules(engine: &Engine, path: &Path) -> Result<()> {
    let data = std::fs::read_to_string(path).with_context(|| format!("failed to read rules from {}", path.display()))?;
    let summary = engine
        .update_rules(PROJECT, &data, true)
        .with_context(|| format!("failed to load rules from {}", path.display()))?;
    tracing::info!(
        "cli: rules loaded, path={}, count={}",
        path.display(),
        summary.rule_count
    );
    Ok(())
}

fn parse_header(raw: &str) -> Result<Header> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header '{raw}' is not 'Name: value'"))?;
    Ok(Header::new(name.trim(), value.trim()))
}

fn read_body(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => std::fs::read(path).with_context(|| format!("failed to read body from {}", path.display())),
        None => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("failed to read body from stdin")?;
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_config_is_logged_while_loading() {
        let captured = Captured::default();
        let writer = captured.clone();
        load_config_with(
            Path::new("/nonexistent/redirect-engine.toml"),
            EnvFilter::new("info"),
            move || writer.clone(),
        )
        .unwrap();

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("config file not found"), "{logged}");
    }

    #[test]
    fn parses_header_arguments() {
        let header = parse_header("X-Test:  a: b ").unwrap();
        assert_eq!(header, Header::new("X-Test", "a: b"));
        assert!(parse_header("no colon").is_err());
    }
}
