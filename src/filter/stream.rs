//! Chunked substitution over a response body.
//!
//! A `Stage` performs one substitution (a literal or a bounded regex) over a
//! stream of chunks. Each call scans `carry ++ chunk`, replaces every match it
//! can decide, emits everything before the first position that could still
//! start an undecided match, and keeps the rest as carry-over. A position is
//! decided once `window` bytes after it are visible:
//!
//! * literal: `window = pattern.len()`
//! * pattern: `window = max_match_len + LOOKAHEAD`, the extra bytes letting
//!   `\b` / `$`-style assertions see the character after a match.
//!
//! Carry-over is therefore at most `window - 1` bytes whatever the chunk
//! size. Up to `LOOKBEHIND` bytes of already emitted input are kept as
//! `history` so assertions at the start of the carry see the same context
//! they would in the whole body.
//!
//! Matches are leftmost-first and non-overlapping; empty regex matches are
//! skipped. For any split of a body the concatenated output equals
//! `apply_whole` on the unsplit body.

use crate::rules::{substitute, BodyFilterSpec, Captures};

/// Bytes after a candidate match needed to evaluate trailing assertions
/// (one UTF-8 encoded character).
pub const LOOKAHEAD: usize = 4;
/// Bytes before the scan start kept for leading assertions.
pub const LOOKBEHIND: usize = 4;

#[derive(Debug, Clone)]
enum Matcher {
    Literal {
        pattern: Vec<u8>,
        replacement: Vec<u8>,
        case_insensitive: bool,
    },
    Pattern {
        regex: regex::bytes::Regex,
        /// May contain `$1` / `${name}` references to the body match.
        replacement: Vec<u8>,
        max_match_len: usize,
    },
}

/// One substitution with its carry-over state.
#[derive(Debug, Clone)]
pub struct Stage {
    matcher: Matcher,
    history: Vec<u8>,
    carry: Vec<u8>,
}

impl Stage {
    pub fn literal(pattern: impl Into<Vec<u8>>, replacement: impl Into<Vec<u8>>, case_insensitive: bool) -> Self {
        Self::with_matcher(Matcher::Literal {
            pattern: pattern.into(),
            replacement: replacement.into(),
            case_insensitive,
        })
    }

    pub fn pattern(regex: regex::bytes::Regex, replacement: impl Into<Vec<u8>>, max_match_len: usize) -> Self {
        Self::with_matcher(Matcher::Pattern {
            regex,
            replacement: replacement.into(),
            max_match_len: max_match_len.max(1),
        })
    }

    /// Build a stage from a compiled filter, resolving rule-level `{...}`
    /// placeholders in the replacement against `captures`.
    pub fn from_spec(spec: &BodyFilterSpec, captures: &Captures) -> Self {
        match spec {
            BodyFilterSpec::Literal {
                pattern,
                replacement,
                case_insensitive,
            } => Self::literal(
                pattern.clone(),
                substitute(replacement, captures).value,
                *case_insensitive,
            ),
            BodyFilterSpec::Pattern {
                regex,
                replacement,
                max_match_len,
            } => Self::pattern(regex.clone(), substitute(replacement, captures).value, *max_match_len),
        }
    }

    fn with_matcher(matcher: Matcher) -> Self {
        Self {
            matcher,
            history: Vec::new(),
            carry: Vec::new(),
        }
    }

    /// Bytes that must follow a position before it is decided.
    pub fn window(&self) -> usize {
        match &self.matcher {
            Matcher::Literal { pattern, .. } => pattern.len().max(1),
            Matcher::Pattern { max_match_len, .. } => max_match_len + LOOKAHEAD,
        }
    }

    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Feed `input`; with `eof` every pending byte is decided and emitted.
    pub fn feed(&mut self, input: &[u8], eof: bool) -> Vec<u8> {
        let start = self.history.len();
        let mut buf = Vec::with_capacity(start + self.carry.len() + input.len());
        buf.extend_from_slice(&self.history);
        buf.extend_from_slice(&self.carry);
        buf.extend_from_slice(input);

        let mut out = Vec::with_capacity(buf.len() - start);
        let keep_from = match &self.matcher {
            Matcher::Literal {
                pattern,
                replacement,
                case_insensitive,
            } => scan_literal(pattern, replacement, *case_insensitive, &buf, start, eof, &mut out),
            Matcher::Pattern {
                regex,
                replacement,
                max_match_len,
            } => scan_pattern(regex, replacement, max_match_len + LOOKAHEAD, &buf, start, eof, &mut out),
        };

        if eof {
            self.history.clear();
            self.carry.clear();
        } else {
            self.history = buf[keep_from.saturating_sub(LOOKBEHIND)..keep_from].to_vec();
            self.carry = buf[keep_from..].to_vec();
        }
        out
    }
}

/// Returns the first undecided position; `out` receives `buf[start..keep]`
/// with matches replaced.
fn scan_literal(
    pattern: &[u8],
    replacement: &[u8],
    case_insensitive: bool,
    buf: &[u8],
    start: usize,
    eof: bool,
    out: &mut Vec<u8>,
) -> usize {
    let len = buf.len();
    let m = pattern.len();
    if m == 0 {
        out.extend_from_slice(&buf[start..]);
        return len;
    }
    let eq = |candidate: &[u8]| {
        if case_insensitive {
            candidate.eq_ignore_ascii_case(pattern)
        } else {
            candidate == pattern
        }
    };

    let mut pos = start;
    let mut emitted = start;
    while pos + m <= len {
        if eq(&buf[pos..pos + m]) {
            out.extend_from_slice(&buf[emitted..pos]);
            out.extend_from_slice(replacement);
            pos += m;
            emitted = pos;
        } else {
            pos += 1;
        }
    }

    let keep_from = if eof {
        len
    } else {
        emitted.max(len.saturating_sub(m - 1))
    };
    out.extend_from_slice(&buf[emitted..keep_from]);
    keep_from
}

fn scan_pattern(
    regex: &regex::bytes::Regex,
    replacement: &[u8],
    window: usize,
    buf: &[u8],
    start: usize,
    eof: bool,
    out: &mut Vec<u8>,
) -> usize {
    let len = buf.len();
    let mut pos = start;
    let mut emitted = start;

    while pos <= len {
        let Some(caps) = regex.captures_at(buf, pos) else { break };
        let Some(whole) = caps.get(0) else { break };
        if !eof && whole.start() + window > len {
            break;
        }
        if whole.is_empty() {
            pos = whole.end() + 1;
            continue;
        }
        out.extend_from_slice(&buf[emitted..whole.start()]);
        caps.expand(replacement, out);
        pos = whole.end();
        emitted = pos;
    }

    let keep_from = if eof {
        len
    } else {
        emitted.max((len + 1).saturating_sub(window))
    };
    out.extend_from_slice(&buf[emitted..keep_from]);
    keep_from
}

/// Stages applied in order; each stage's output is the next one's input.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn from_specs(specs: &[BodyFilterSpec], captures: &Captures) -> Self {
        Self::new(specs.iter().map(|spec| Stage::from_spec(spec, captures)).collect())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total carried bytes across stages.
    pub fn carry_len(&self) -> usize {
        self.stages.iter().map(Stage::carry_len).sum()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.run(chunk, false)
    }

    /// Flush every stage; incomplete candidates are emitted unchanged.
    pub fn finish(&mut self) -> Vec<u8> {
        self.run(&[], true)
    }

    fn run(&mut self, input: &[u8], eof: bool) -> Vec<u8> {
        let mut data = input.to_vec();
        for stage in &mut self.stages {
            data = stage.feed(&data, eof);
        }
        data
    }
}

/// Substitute over a complete body in one pass.
pub fn apply_whole(stages: Vec<Stage>, body: &[u8]) -> Vec<u8> {
    stages
        .into_iter()
        .fold(body.to_vec(), |data, mut stage| stage.feed(&data, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(pattern: &str) -> regex::bytes::Regex {
        regex::bytes::Regex::new(pattern).unwrap()
    }

    fn stream(stages: Vec<Stage>, chunks: &[&[u8]]) -> Vec<u8> {
        let mut chain = FilterChain::new(stages);
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(chain.process(chunk));
        }
        out.extend(chain.finish());
        out
    }

    #[test]
    fn literal_carry_is_pattern_len_minus_one() {
        let mut stage = Stage::literal("foo", "bar", false);
        assert_eq!(stage.feed(b"xxfo", false), b"xx");
        assert_eq!(stage.carry_len(), 2);
        assert_eq!(stage.feed(b"oyy", false), b"bar");
        assert_eq!(stage.carry_len(), 2);
        assert_eq!(stage.feed(b"", true), b"yy");
        assert_eq!(stage.carry_len(), 0);
    }

    #[test]
    fn literal_case_insensitive() {
        let out = apply_whole(vec![Stage::literal("Foo", "bar", true)], b"FOO foo fOo fo");
        assert_eq!(out, b"bar bar bar fo");
    }

    #[test]
    fn literal_matches_do_not_overlap() {
        assert_eq!(apply_whole(vec![Stage::literal("aa", "b", false)], b"aaaaa"), b"bba");
    }

    #[test]
    fn pattern_expands_body_captures() {
        let stage = Stage::pattern(re(r"(?P<k>[a-z]+)=(\d+)"), "$2:${k}", 16);
        assert_eq!(apply_whole(vec![stage], b"a=1&bb=22"), b"1:a&22:bb");
    }

    #[test]
    fn pattern_matches_replace_all() {
        let regex = re(r"\bcat\b");
        let body: &[u8] = b"cat concat cat. cats bobcat cat";
        let expected = regex.replace_all(body, &b"dog"[..]).into_owned();
        assert_eq!(apply_whole(vec![Stage::pattern(regex, "dog", 3)], body), expected);
    }

    #[test]
    fn word_boundary_decided_across_chunks() {
        let stage = || Stage::pattern(re(r"\bcat\b"), "dog", 3);
        assert_eq!(stream(vec![stage()], &[b"bob", b"cat cat", b" cats cat"]), b"bobcat dog cats dog");
        assert_eq!(stream(vec![stage()], &[b"the c", b"a", b"t", b"!"]), b"the dog!");
    }

    #[test]
    fn start_anchor_only_at_body_start() {
        let stage = || Stage::pattern(re(r"^<!--x-->"), "", 8);
        assert_eq!(stream(vec![stage()], &[b"<!--", b"x--><!--x-->"]), b"<!--x-->");
    }

    #[test]
    fn pattern_carry_bound() {
        let mut stage = Stage::pattern(re(r"a[0-9]{1,6}"), "#", 7);
        let body = b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".repeat(20);
        for chunk in body.chunks(37) {
            stage.feed(chunk, false);
            assert!(stage.carry_len() < stage.window());
        }
    }

    #[test]
    fn stages_chain_in_order() {
        let stages = || vec![Stage::literal("a", "b", false), Stage::literal("b", "c", false)];
        assert_eq!(apply_whole(stages(), b"ab"), b"cc");
        assert_eq!(stream(stages(), &[b"a", b"b"]), b"cc");
    }

    #[test]
    fn empty_chain_passes_through() {
        assert_eq!(stream(vec![], &[b"abc", b"def"]), b"abcdef");
    }

    #[test]
    fn empty_matches_are_skipped() {
        let stage = Stage::pattern(re(r"\bx?"), "<$0>", 1);
        assert_eq!(apply_whole(vec![stage], b"x yx"), b"<x> yx");
    }

    #[test]
    fn rule_placeholders_resolved_at_creation() {
        let spec = BodyFilterSpec::Literal {
            pattern: b"OLD".to_vec(),
            replacement: "{slug}".into(),
            case_insensitive: false,
        };
        let mut captures = Captures::new();
        captures.insert("slug", "new-page");
        let stage = Stage::from_spec(&spec, &captures);
        assert_eq!(apply_whole(vec![stage], b"<a href=OLD>"), b"<a href=new-page>");
    }
}
