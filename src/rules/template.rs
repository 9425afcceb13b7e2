use std::collections::HashMap;

/// Values captured while matching a rule against a URL.
///
/// Numbered path groups are stored under `"1"`, `"2"`, ...; named groups
/// (markers) under their name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    values: HashMap<String, String>,
}

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Record the groups of one regex match. Unmatched optional groups are
    /// skipped so their placeholders stay unresolved.
    pub(crate) fn record(&mut self, regex: &regex::Regex, caps: &regex::Captures<'_>, numbered: bool) {
        for (idx, name) in regex.capture_names().enumerate().skip(1) {
            let Some(m) = caps.get(idx) else { continue };
            if numbered {
                let mut buf = itoa::Buffer::new();
                self.values
                    .insert(buf.format(idx).to_owned(), m.as_str().to_string());
            }
            if let Some(name) = name {
                self.values.insert(name.to_string(), m.as_str().to_string());
            }
        }
    }
}

/// Result of a template substitution. `unresolved` lists every placeholder
/// key that had no capture; its `{...}` text was kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub value: String,
    pub unresolved: Vec<String>,
}

/// Replace `{key}` / `{key|transformer|...}` placeholders with captured values.
///
/// Anything between braces that is not a valid placeholder is copied as is.
pub fn substitute(template: &str, captures: &Captures) -> Substituted {
    let mut value = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        value.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let placeholder = after
            .find('}')
            .map(|close| (close, &after[..close]))
            .filter(|(_, inner)| is_placeholder(inner));

        match placeholder {
            Some((close, inner)) => {
                let mut parts = inner.split('|');
                let key = parts.next().unwrap_or_default();
                match captures.get(key) {
                    Some(captured) => {
                        let transformed = parts.fold(captured.to_string(), |v, t| transform(t, &v));
                        value.push_str(&transformed);
                    }
                    None => {
                        value.push('{');
                        value.push_str(inner);
                        value.push('}');
                        unresolved.push(key.to_string());
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                value.push('{');
                rest = after;
            }
        }
    }
    value.push_str(rest);

    Substituted { value, unresolved }
}

/// Whether a template contains at least one placeholder.
pub fn has_placeholders(template: &str) -> bool {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        if let Some(close) = after.find('}') {
            if is_placeholder(&after[..close]) {
                return true;
            }
        }
        rest = after;
    }
    false
}

fn is_placeholder(inner: &str) -> bool {
    !inner.is_empty()
        && inner
            .split('|')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Apply one named value transformer. Unknown names leave the value unchanged.
fn transform(name: &str, value: &str) -> String {
    match name {
        "lowercase" => value.to_lowercase(),
        "uppercase" => value.to_uppercase(),
        "slugify" => slugify(value),
        "dasherize" => value.replace(['_', ' '], "-"),
        "underscorize" => value.replace(['-', ' '], "_"),
        "camelize" => camelize(value),
        _ => value.to_string(),
    }
}

fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

fn camelize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, word) in value
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(pairs: &[(&str, &str)]) -> Captures {
        let mut c = Captures::new();
        for (k, v) in pairs {
            c.insert(*k, *v);
        }
        c
    }

    #[test]
    fn numbered_placeholder() {
        let out = substitute("/new/{1}", &caps(&[("1", "abc")]));
        assert_eq!(out.value, "/new/abc");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn missing_capture_keeps_literal() {
        let out = substitute("/new/{2}/{name}", &caps(&[("1", "abc")]));
        assert_eq!(out.value, "/new/{2}/{name}");
        assert_eq!(out.unresolved, vec!["2".to_string(), "name".to_string()]);
    }

    #[test]
    fn braces_that_are_not_placeholders_are_copied() {
        let out = substitute("a{b c}d{}e{", &caps(&[]));
        assert_eq!(out.value, "a{b c}d{}e{");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn transformers_chain_left_to_right() {
        let c = caps(&[("slug", "Hello World_Page")]);
        assert_eq!(substitute("{slug|slugify}", &c).value, "hello-world-page");
        assert_eq!(substitute("{slug|uppercase}", &c).value, "HELLO WORLD_PAGE");
        assert_eq!(substitute("{slug|lowercase|dasherize}", &c).value, "hello-world-page");
        assert_eq!(substitute("{slug|underscorize}", &c).value, "Hello_World_Page");
        assert_eq!(substitute("{slug|camelize}", &c).value, "helloWorldPage");
    }

    #[test]
    fn unknown_transformer_is_identity() {
        let c = caps(&[("x", "Abc")]);
        assert_eq!(substitute("{x|reverse}", &c).value, "Abc");
    }

    #[test]
    fn detects_placeholders() {
        assert!(has_placeholders("/a/{1}"));
        assert!(has_placeholders("{x|lowercase}"));
        assert!(!has_placeholders("/a/{b c}"));
        assert!(!has_placeholders("plain"));
    }

    #[test]
    fn records_numbered_and_named_groups() {
        let re = regex::Regex::new(r"^/(?P<lang>[a-z]{2})/(\d+)(/x)?$").unwrap();
        let m = re.captures("/fr/42").unwrap();
        let mut c = Captures::new();
        c.record(&re, &m, true);
        assert_eq!(c.get("1"), Some("fr"));
        assert_eq!(c.get("lang"), Some("fr"));
        assert_eq!(c.get("2"), Some("42"));
        assert_eq!(c.get("3"), None);
    }
}
