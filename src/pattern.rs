//! Glob-style ignore/include patterns compiled to anchored regexes
//!
//! Semantics follow npm-ignore rather than full gitignore:
//!
//! - `**` matches across path separators, `*` within one segment, `?` one
//!   non-separator character.
//! - A pattern containing `/` (after dropping a trailing `/`) is anchored at
//!   the packaging root and matches the path or anything beneath it.
//! - A pattern without `/` only matches a root-level entry.
//! - A trailing `/` marks the pattern as directory-only.

use regex::{Regex, RegexBuilder};
use std::fmt;

/// A compiled pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    negated: bool,
    dir_only: bool,
    matcher: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pattern '{}': {}", self.pattern, self.reason)
    }
}

impl std::error::Error for PatternError {}

impl Pattern {
    /// Compile a pattern whose leading `!` has already been stripped by the caller
    pub fn compile(pattern: &str, negated: bool) -> Result<Self, PatternError> {
        Self::compile_with(pattern, negated, false)
    }

    pub fn compile_with(
        pattern: &str,
        negated: bool,
        case_insensitive: bool,
    ) -> Result<Self, PatternError> {
        let err = |reason: &str| PatternError {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let dir_only = pattern.ends_with('/');
        let body = pattern.trim_end_matches('/');
        let body = body.strip_prefix('/').unwrap_or(body);

        if body.is_empty() {
            return Err(err("empty pattern"));
        }
        if body.split('/').any(|segment| segment == "..") {
            return Err(err("'..' segments are not allowed"));
        }

        let translated = translate(body);
        let anchored = if body.contains('/') {
            format!("^{}(?:$|/.*)", translated)
        } else {
            format!("^{}$", translated)
        };

        let matcher = RegexBuilder::new(&anchored)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| err(&e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            negated,
            dir_only,
            matcher,
        })
    }

    /// Parse a raw line (`!keep.txt`, `build/`) into a pattern
    pub fn parse_line(line: &str) -> Result<Self, PatternError> {
        match line.strip_prefix('!') {
            Some(rest) => Self::compile(rest, true),
            None => Self::compile(line, false),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_dir_only(&self) -> bool {
        self.dir_only
    }

    /// Raw regex test against a `/`-separated relative path
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.matcher.is_match(rel_path)
    }

    /// Whether the pattern selects this exact entry.
    ///
    /// Directory-only patterns never select files.
    pub fn matches_entry(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        self.is_match(rel_path)
    }

    /// Whether the pattern selects a directory enclosing this entry
    pub fn matches_ancestor(&self, rel_path: &str) -> bool {
        ancestors(rel_path).any(|dir| self.is_match(dir))
    }
}

/// Proper ancestors of a relative path, shallowest first: `a/b/c` yields `a`, `a/b`
fn ancestors(rel_path: &str) -> impl Iterator<Item = &str> {
    rel_path
        .match_indices('/')
        .map(move |(idx, _)| &rel_path[..idx])
}

/// Translate glob syntax into a regex fragment, escaping everything else
fn translate(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(p: &str) -> Pattern {
        Pattern::parse_line(p).unwrap()
    }

    #[test]
    fn test_bare_name_matches_root_only() {
        let p = pat("debug.log");
        assert!(p.is_match("debug.log"));
        assert!(!p.is_match("logs/debug.log"));
        assert!(!p.is_negated());
        assert!(!p.is_dir_only());
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let p = pat("*.log");
        assert!(p.is_match("a.log"));
        assert!(!p.is_match("dir/a.log"));
        assert!(!p.is_match("a.logx"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let p = pat("**/*.log");
        assert!(p.is_match("a.log"));
        assert!(p.is_match("x/y/a.log"));
        assert!(!p.is_match("x/y/a.txt"));

        let p = pat("docs/**");
        assert!(p.is_match("docs/a/b.md"));
    }

    #[test]
    fn test_slash_pattern_anchors_and_covers_descendants() {
        let p = pat("src/generated");
        assert!(p.is_match("src/generated"));
        assert!(p.is_match("src/generated/a.cs"));
        assert!(!p.is_match("src/generated2"));
        assert!(!p.is_match("lib/src/generated"));
    }

    #[test]
    fn test_question_mark() {
        let p = pat("file?.txt");
        assert!(p.is_match("file1.txt"));
        assert!(!p.is_match("file/.txt"));
        assert!(!p.is_match("file12.txt"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let p = pat("a+b(1).txt");
        assert!(p.is_match("a+b(1).txt"));
        assert!(!p.is_match("aab1.txt"));

        let p = pat("file.txt");
        assert!(!p.is_match("fileXtxt"));
    }

    #[test]
    fn test_directory_only() {
        let p = pat("build/");
        assert!(p.is_dir_only());
        assert!(p.matches_entry("build", true));
        assert!(!p.matches_entry("build", false));
        assert!(p.matches_ancestor("build/out/x.dll"));
        assert!(!p.matches_ancestor("build"));
    }

    #[test]
    fn test_negation_and_leading_slash() {
        let p = pat("!/keep.txt");
        assert!(p.is_negated());
        assert_eq!(p.source(), "/keep.txt");
        assert!(p.is_match("keep.txt"));
    }

    #[test]
    fn test_case_insensitive() {
        let p = Pattern::compile_with("README*", false, true).unwrap();
        assert!(p.is_match("readme.md"));
        assert!(p.is_match("README"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Pattern::parse_line("!").is_err());
        assert!(Pattern::parse_line("/").is_err());
        assert!(Pattern::parse_line("../secret").is_err());
    }

    #[test]
    fn test_ancestors() {
        let found: Vec<&str> = ancestors("a/b/c.txt").collect();
        assert_eq!(found, vec!["a", "a/b"]);
        assert_eq!(ancestors("top.txt").count(), 0);
    }
}
