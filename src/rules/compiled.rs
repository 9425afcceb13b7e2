use crate::config::RouterConfig;
use crate::routing::url::{normalize_path, RequestUrl};
use crate::rules::template::{has_placeholders, Captures};
use crate::rules::types::{BodyFilterConfig, HeaderActionConfig, MarkerConfig, RuleConfig};

/// Host predicate, compiled once.
#[derive(Debug)]
pub enum HostMatcher {
    Exact(String),
    /// `*.example.com` stored as `.example.com`.
    Suffix(String),
    /// `example.*` stored as `example.`.
    Prefix(String),
    /// Host with markers.
    Pattern(regex::Regex),
}

impl HostMatcher {
    fn matches(&self, host: &str, ignore_case: bool) -> bool {
        let eq = |a: &str, b: &str| {
            if ignore_case {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        match self {
            HostMatcher::Exact(h) => eq(host, h),
            HostMatcher::Suffix(suffix) => {
                host.len() > suffix.len()
                    && host.is_char_boundary(host.len() - suffix.len())
                    && eq(&host[host.len() - suffix.len()..], suffix)
            }
            HostMatcher::Prefix(prefix) => {
                host.len() > prefix.len()
                    && host.is_char_boundary(prefix.len())
                    && eq(&host[..prefix.len()], prefix)
            }
            HostMatcher::Pattern(re) => re.is_match(host),
        }
    }
}

/// Path-and-query predicate, compiled once.
#[derive(Debug)]
pub enum PathMatcher {
    Any,
    Static(String),
    Pattern(regex::Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderActionKind {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone)]
pub struct HeaderAction {
    pub kind: HeaderActionKind,
    pub name: String,
    pub value: String,
}

/// Body substitution, compiled once. Replacement templates are resolved
/// against captures when a filter session is created.
#[derive(Debug, Clone)]
pub enum BodyFilterSpec {
    Literal {
        pattern: Vec<u8>,
        replacement: String,
        case_insensitive: bool,
    },
    Pattern {
        regex: regex::bytes::Regex,
        replacement: String,
        max_match_len: usize,
    },
}

/// A compiled rule, the runtime form of a `RuleConfig`.
///
/// Keeps the `RuleConfig` it was built from so it can be handed back across
/// the boundary unchanged.
#[derive(Debug)]
pub struct CompiledRule {
    config: RuleConfig,
    scheme: Option<String>,
    host: Option<HostMatcher>,
    path: PathMatcher,
    ignore_host_case: bool,
    pub header_actions: Vec<HeaderAction>,
    pub body_filters: Vec<BodyFilterSpec>,
}

impl CompiledRule {
    /// Compile a rule. The error is a human readable reason; callers attach
    /// the rule position.
    pub fn compile(config: RuleConfig, router: &RouterConfig) -> Result<Self, String> {
        if config.id.is_empty() {
            return Err("rule has an empty id".to_string());
        }
        for marker in &config.markers {
            validate_marker(marker)?;
        }

        let scheme = match config.source.scheme.as_deref() {
            None | Some("") => None,
            Some(s) => Some(s.to_ascii_lowercase()),
        };

        let host = match config.source.host.as_deref() {
            None | Some("") => None,
            Some(h) => Some(compile_host(h, &config.markers, router)?),
        };

        let path = match (config.source.path.as_deref(), config.source.path_regex.as_deref()) {
            (Some(_), Some(_)) => return Err("source has both path and path_regex".to_string()),
            (Some(p), None) => compile_path(p, &config.markers, router)?,
            (None, Some(re)) => PathMatcher::Pattern(
                regex::Regex::new(&format!("^(?:{})$", re))
                    .map_err(|e| format!("invalid path_regex: {e}"))?,
            ),
            (None, None) => PathMatcher::Any,
        };

        if let Some(code) = config.redirect_code {
            if !(100..=599).contains(&code) {
                return Err(format!("redirect_code {code} is not an HTTP status"));
            }
        }

        let header_actions = config
            .header_filters
            .iter()
            .map(compile_header_action)
            .collect::<Result<Vec<_>, _>>()?;
        let body_filters = config
            .body_filters
            .iter()
            .map(compile_body_filter)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            scheme,
            host,
            path,
            ignore_host_case: router.ignore_host_case,
            header_actions,
            body_filters,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn host_matcher(&self) -> Option<&HostMatcher> {
        self.host.as_ref()
    }

    pub fn path_matcher(&self) -> &PathMatcher {
        &self.path
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Redirect target template, if the rule redirects.
    pub fn target(&self) -> Option<&str> {
        self.config.target.as_deref().filter(|t| !t.is_empty())
    }

    pub fn redirect_code(&self) -> Option<u16> {
        self.config.redirect_code
    }

    /// Whether header/body filters apply to a response with `status`.
    /// `None` (status unknown) always applies.
    pub fn applies_to_status(&self, status: Option<u16>) -> bool {
        match (self.config.match_on_response_status, status) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }

    pub fn matches_scheme(&self, url: &RequestUrl) -> bool {
        match &self.scheme {
            None => true,
            Some(s) => url.scheme() == Some(s.as_str()),
        }
    }

    pub fn matches_host(&self, url: &RequestUrl) -> bool {
        match &self.host {
            None => true,
            Some(matcher) => url
                .host()
                .is_some_and(|h| matcher.matches(h, self.ignore_host_case)),
        }
    }

    pub fn matches_path(&self, url: &RequestUrl) -> bool {
        match &self.path {
            PathMatcher::Any => true,
            PathMatcher::Static(p) => url.path_and_query() == p,
            PathMatcher::Pattern(re) => re.is_match(url.path_and_query()),
        }
    }

    /// All predicates, cheapest to reject first.
    pub fn is_match(&self, url: &RequestUrl) -> bool {
        self.matches_scheme(url) && self.matches_host(url) && self.matches_path(url)
    }

    /// Captured values of this rule against `url`. Groups that did not
    /// participate (or a URL the rule does not match) yield no entry.
    pub fn captures(&self, url: &RequestUrl) -> Captures {
        let mut captures = Captures::new();
        if let (Some(HostMatcher::Pattern(re)), Some(host)) = (&self.host, url.host()) {
            if let Some(caps) = re.captures(host) {
                captures.record(re, &caps, false);
            }
        }
        if let PathMatcher::Pattern(re) = &self.path {
            if let Some(caps) = re.captures(url.path_and_query()) {
                captures.record(re, &caps, true);
            }
        }
        captures
    }

    /// Human readable description of each predicate, for traces.
    pub fn describe_host(&self) -> String {
        match &self.host {
            None => "any host".to_string(),
            Some(HostMatcher::Exact(h)) => format!("host {h}"),
            Some(HostMatcher::Suffix(s)) => format!("host *{s}"),
            Some(HostMatcher::Prefix(p)) => format!("host {p}*"),
            Some(HostMatcher::Pattern(re)) => format!("host ~ {}", re.as_str()),
        }
    }

    pub fn describe_path(&self) -> String {
        match &self.path {
            PathMatcher::Any => "any path".to_string(),
            PathMatcher::Static(p) => format!("path {p}"),
            PathMatcher::Pattern(re) => format!("path ~ {}", re.as_str()),
        }
    }

    pub fn describe_scheme(&self) -> String {
        match &self.scheme {
            None => "any scheme".to_string(),
            Some(s) => format!("scheme {s}"),
        }
    }
}

fn validate_marker(marker: &MarkerConfig) -> Result<(), String> {
    let mut chars = marker.name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("invalid marker name '{}'", marker.name));
    }
    regex::Regex::new(&marker.regex)
        .map(|_| ())
        .map_err(|e| format!("marker '{}' has invalid regex: {e}", marker.name))
}

/// Expand `@marker` references into a regex. Returns `None` when the text
/// references no marker at all.
fn expand_markers(text: &str, markers: &[MarkerConfig]) -> Option<String> {
    let mut out = String::with_capacity(text.len() * 2);
    let mut seen: Vec<&str> = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(at) = rest.find('@') {
        literal.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match markers.iter().find(|m| m.name == name) {
            Some(marker) => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                if seen.contains(&name) {
                    out.push_str(&format!("(?:{})", marker.regex));
                } else {
                    out.push_str(&format!("(?P<{}>{})", marker.name, marker.regex));
                    seen.push(name);
                }
            }
            None => {
                literal.push('@');
                literal.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    literal.push_str(rest);

    if seen.is_empty() {
        return None;
    }
    out.push_str(&regex::escape(&literal));
    Some(out)
}

fn compile_host(host: &str, markers: &[MarkerConfig], router: &RouterConfig) -> Result<HostMatcher, String> {
    if let Some(pattern) = expand_markers(host, markers) {
        let flags = if router.ignore_host_case { "(?i)" } else { "" };
        return regex::Regex::new(&format!("{flags}^{pattern}$"))
            .map(HostMatcher::Pattern)
            .map_err(|e| format!("invalid host pattern: {e}"));
    }
    let host = if router.ignore_host_case {
        host.to_ascii_lowercase()
    } else {
        host.to_string()
    };
    if let Some(suffix) = host.strip_prefix('*') {
        Ok(HostMatcher::Suffix(suffix.to_string()))
    } else if let Some(prefix) = host.strip_suffix('*') {
        Ok(HostMatcher::Prefix(prefix.to_string()))
    } else {
        Ok(HostMatcher::Exact(host))
    }
}

fn compile_path(path: &str, markers: &[MarkerConfig], router: &RouterConfig) -> Result<PathMatcher, String> {
    let path = normalize_path(path, router);
    match expand_markers(&path, markers) {
        Some(pattern) => regex::Regex::new(&format!("^{pattern}$"))
            .map(PathMatcher::Pattern)
            .map_err(|e| format!("invalid path pattern: {e}")),
        None => Ok(PathMatcher::Static(path)),
    }
}

fn compile_header_action(cfg: &HeaderActionConfig) -> Result<HeaderAction, String> {
    if let Err(e) = http::HeaderName::from_bytes(cfg.header.as_bytes()) {
        return Err(format!("invalid header name '{}': {e}", cfg.header));
    }
    let kind = match cfg.action.to_ascii_lowercase().as_str() {
        "add" => HeaderActionKind::Add,
        "remove" => HeaderActionKind::Remove,
        "replace" | "override" | "set" => HeaderActionKind::Replace,
        other => return Err(format!("unknown header action '{other}'")),
    };
    if kind != HeaderActionKind::Remove
        && !has_placeholders(&cfg.value)
        && http::HeaderValue::from_str(&cfg.value).is_err()
    {
        return Err(format!("invalid value for header '{}'", cfg.header));
    }
    Ok(HeaderAction {
        kind,
        name: cfg.header.clone(),
        value: cfg.value.clone(),
    })
}

fn compile_body_filter(cfg: &BodyFilterConfig) -> Result<BodyFilterSpec, String> {
    if cfg.pattern.is_empty() {
        return Err("body filter has an empty pattern".to_string());
    }
    match cfg.kind.to_ascii_lowercase().as_str() {
        "literal" => Ok(BodyFilterSpec::Literal {
            pattern: cfg.pattern.as_bytes().to_vec(),
            replacement: cfg.replacement.clone(),
            case_insensitive: cfg.case_insensitive,
        }),
        "pattern" => {
            let max_match_len = match cfg.max_match_len {
                Some(n) if n > 0 => n,
                _ => return Err("pattern body filter requires max_match_len > 0".to_string()),
            };
            let regex = regex::bytes::Regex::new(&cfg.pattern)
                .map_err(|e| format!("invalid body filter pattern: {e}"))?;
            if regex.is_match(b"") {
                return Err(format!("body filter pattern '{}' matches the empty string", cfg.pattern));
            }
            match longest_match(&cfg.pattern)? {
                Some(longest) if longest <= max_match_len => {}
                Some(longest) => {
                    return Err(format!(
                        "body filter pattern '{}' can match {longest} bytes, more than max_match_len {max_match_len}",
                        cfg.pattern
                    ))
                }
                None => return Err(format!("body filter pattern '{}' has no maximum match length", cfg.pattern)),
            }
            Ok(BodyFilterSpec::Pattern {
                regex,
                replacement: cfg.replacement.clone(),
                max_match_len,
            })
        }
        other => Err(format!("unknown body filter kind '{other}'")),
    }
}

/// Longest match of `pattern` in bytes, `None` when unbounded. Parsed the
/// way `regex::bytes` parses it, so non UTF-8 classes are allowed.
fn longest_match(pattern: &str) -> Result<Option<usize>, String> {
    let hir = regex_syntax::ParserBuilder::new()
        .utf8(false)
        .build()
        .parse(pattern)
        .map_err(|e| format!("invalid body filter pattern: {e}"))?;
    Ok(hir.properties().maximum_len())
}
