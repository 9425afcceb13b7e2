use crate::config::RouterConfig;
use std::collections::BTreeMap;
use std::fmt::Write;

/// A request URL split into the parts rule predicates look at, normalised
/// according to `RouterConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    scheme: Option<String>,
    host: Option<String>,
    path_and_query: String,
}

impl RequestUrl {
    /// Accepts absolute (`https://host/path?q`) and origin-form (`/path?q`)
    /// URLs. Input that `http::Uri` rejects is matched as a raw path.
    pub fn parse(url: &str, config: &RouterConfig) -> Self {
        let uri = match url.parse::<http::Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::debug!("routing: url not parseable, matching as raw path, url={}, error={}", url, e);
                return Self {
                    scheme: None,
                    host: None,
                    path_and_query: escape_controls(url),
                };
            }
        };

        let host = uri.host().map(|h| {
            if config.ignore_host_case {
                h.to_ascii_lowercase()
            } else {
                h.to_string()
            }
        });

        let path = if uri.path().is_empty() { "/" } else { uri.path() };
        let path_and_query = match uri.query() {
            Some(q) if !q.is_empty() => {
                let query = if config.sort_query {
                    sort_query(q)
                } else {
                    q.to_string()
                };
                if query.is_empty() {
                    path.to_string()
                } else {
                    [path, "?", query.as_str()].concat()
                }
            }
            _ => path.to_string(),
        };

        Self {
            scheme: uri.scheme_str().map(|s| s.to_ascii_lowercase()),
            host,
            path_and_query,
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

/// Order query parameters by key. A repeated key keeps its last value, empty
/// pairs are dropped and an empty value loses its `=`. Pairs are compared
/// as sent, without percent-decoding.
pub(crate) fn sort_query(query: &str) -> String {
    let pairs: BTreeMap<&str, &str> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
        .collect();

    let mut out = String::with_capacity(query.len());
    for (key, value) in pairs {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(key);
        if !value.is_empty() {
            out.push('=');
            out.push_str(value);
        }
    }
    out
}

/// Percent-encode ASCII control characters, so CR/LF in a raw path never
/// reach captures.
fn escape_controls(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_control() {
            let _ = write!(out, "%{:02X}", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

/// Apply `sort_query` to the query part of a rule path, before markers are
/// expanded for dynamic paths.
pub(crate) fn normalize_path(path: &str, config: &RouterConfig) -> String {
    match path.split_once('?') {
        Some((p, q)) if config.sort_query => {
            let query = sort_query(q);
            if query.is_empty() {
                p.to_string()
            } else {
                [p, "?", query.as_str()].concat()
            }
        }
        _ => path.to_string(),
    }
}
