//! Evidence hook grammar.
//!
//! A hook is a single line of the form:
//!
//! ```text
//! evidence: <kind> path=<path> [symbol=<id>] [contains="<literal>"] [regex=/<pattern>/]
//! ```
//!
//! with `<kind>` one of `code`, `test`, `doc`. The `path` value may be bare
//! or double-quoted. `contains` is always double-quoted; `regex` is
//! slash-delimited. At most one of `contains`/`regex` may appear. The
//! grammar is line-scoped: hooks never span lines, and lines that do not
//! start with `evidence:` are ignored by this parser.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static HOOK_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*evidence:\s+(\S+)\s*(.*)$").expect("hook line regex is valid"));

// path is extracted first with its own pattern so absolute paths are not
// mistaken for slash-delimited regex values.
static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"path=(?:"((?:[^"\\]|\\.)*)"|(\S+))"#).expect("path regex is valid")
});

static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    // symbol=ident | contains="literal" | regex=/pattern/
    Regex::new(r#"(\w+)=(?:"((?:[^"\\]|\\.)*)"|/((?:[^/\\]|\\.)*)/|(\S+))"#)
        .expect("key-value regex is valid")
});

/// Which artifact class a hook claims evidence for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Code,
    Test,
    Doc,
}

impl EvidenceKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "test" => Some(Self::Test),
            "doc" => Some(Self::Doc),
            _ => None,
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Test => write!(f, "test"),
            Self::Doc => write!(f, "doc"),
        }
    }
}

/// Content predicate: at most one per hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPredicate {
    /// Literal substring search.
    Contains(String),
    /// Pattern matched against each line, anchored to the whole line.
    Regex(String),
}

/// A parsed evidence hook, with the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceHook {
    pub kind: EvidenceKind,
    pub path: String,
    pub symbol: Option<String>,
    pub predicate: Option<ContentPredicate>,
    pub line: usize,
}

/// A line that started `evidence:` but could not be parsed into a hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookParseError {
    pub line: usize,
    pub reason: String,
}

/// Result of attempting to parse one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookLine {
    /// Not an evidence line at all.
    NotAHook,
    Hook(EvidenceHook),
    Invalid(HookParseError),
}

/// Parse a single document line.
///
/// Lines that do not begin with `evidence:` return [`HookLine::NotAHook`].
/// Lines that do but violate the grammar return [`HookLine::Invalid`] with
/// the offending line number, so the report can point at them without
/// failing the whole run.
#[must_use]
pub fn parse_hook_line(text: &str, line: usize) -> HookLine {
    let Some(caps) = HOOK_LINE_RE.captures(text) else {
        return HookLine::NotAHook;
    };

    let Some(kind) = EvidenceKind::parse(&caps[1]) else {
        return HookLine::Invalid(HookParseError {
            line,
            reason: format!("unknown evidence kind '{}' (expected code|test|doc)", &caps[1]),
        });
    };

    let rest = &caps[2];
    let path = PATH_RE.captures(rest).map(|kv| {
        kv.get(1)
            .map(|m| unescape(m.as_str()))
            .or_else(|| kv.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_default()
    });
    let mut symbol: Option<String> = None;
    let mut contains: Option<String> = None;
    let mut regex: Option<String> = None;

    for kv in KEY_VALUE_RE.captures_iter(rest) {
        let key = &kv[1];
        let quoted = kv.get(2).map(|m| unescape(m.as_str()));
        // Only the delimiter is escapable inside /.../; every other
        // backslash belongs to the pattern itself.
        let slashed = kv.get(3).map(|m| m.as_str().replace(r"\/", "/"));
        let bare = kv.get(4).map(|m| m.as_str().to_string());
        match key {
            "path" => {}
            "symbol" => symbol = quoted.or(bare),
            "contains" => {
                if quoted.is_none() {
                    return HookLine::Invalid(HookParseError {
                        line,
                        reason: "contains value must be double-quoted".to_string(),
                    });
                }
                contains = quoted;
            }
            "regex" => {
                if slashed.is_none() {
                    return HookLine::Invalid(HookParseError {
                        line,
                        reason: "regex value must be delimited by forward slashes".to_string(),
                    });
                }
                regex = slashed;
            }
            other => {
                return HookLine::Invalid(HookParseError {
                    line,
                    reason: format!("unknown hook attribute '{other}'"),
                });
            }
        }
    }

    let Some(path) = path else {
        return HookLine::Invalid(HookParseError {
            line,
            reason: "hook is missing the required path attribute".to_string(),
        });
    };
    if contains.is_some() && regex.is_some() {
        return HookLine::Invalid(HookParseError {
            line,
            reason: "at most one of contains/regex may appear on a hook".to_string(),
        });
    }

    let predicate = contains
        .map(ContentPredicate::Contains)
        .or(regex.map(ContentPredicate::Regex));

    HookLine::Hook(EvidenceHook {
        kind,
        path,
        symbol,
        predicate,
        line,
    })
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(text: &str) -> EvidenceHook {
        match parse_hook_line(text, 7) {
            HookLine::Hook(h) => h,
            other => panic!("expected hook, got {other:?}"),
        }
    }

    #[test]
    fn bare_and_quoted_paths_both_parse() {
        let a = hook("evidence: code path=src/auth.py symbol=hash_password");
        assert_eq!(a.kind, EvidenceKind::Code);
        assert_eq!(a.path, "src/auth.py");
        assert_eq!(a.symbol.as_deref(), Some("hash_password"));
        assert_eq!(a.line, 7);

        let b = hook(r#"evidence: test path="tests/test_auth.py" contains="hash_password""#);
        assert_eq!(b.kind, EvidenceKind::Test);
        assert_eq!(b.path, "tests/test_auth.py");
        assert_eq!(
            b.predicate,
            Some(ContentPredicate::Contains("hash_password".to_string()))
        );
    }

    #[test]
    fn regex_is_slash_delimited() {
        let h = hook(r"evidence: code path=src/lib.rs regex=/fn\s+verify/");
        assert_eq!(
            h.predicate,
            Some(ContentPredicate::Regex(r"fn\s+verify".to_string()))
        );
    }

    #[test]
    fn escaped_slashes_in_regex_become_literal() {
        let h = hook(r"evidence: doc path=README.md regex=/docs\/api/");
        assert_eq!(
            h.predicate,
            Some(ContentPredicate::Regex("docs/api".to_string()))
        );
    }

    #[test]
    fn both_predicates_is_a_parse_error() {
        let got = parse_hook_line(
            r#"evidence: code path=a.rs contains="x" regex=/y/"#,
            3,
        );
        match got {
            HookLine::Invalid(err) => {
                assert_eq!(err.line, 3);
                assert!(err.reason.contains("at most one"));
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        assert!(matches!(
            parse_hook_line("evidence: bench path=a.rs", 1),
            HookLine::Invalid(_)
        ));
    }

    #[test]
    fn missing_path_is_a_parse_error() {
        assert!(matches!(
            parse_hook_line("evidence: code symbol=foo", 1),
            HookLine::Invalid(_)
        ));
    }

    #[test]
    fn absolute_paths_parse_and_are_left_to_resolution() {
        // Rejection happens at resolution with a security message, not here.
        let h = hook("evidence: code path=/etc/passwd");
        assert_eq!(h.path, "/etc/passwd");
    }

    #[test]
    fn non_evidence_lines_are_ignored() {
        assert_eq!(parse_hook_line("## Some heading", 1), HookLine::NotAHook);
        assert_eq!(parse_hook_line("- [x] TASK-001", 2), HookLine::NotAHook);
        assert_eq!(parse_hook_line("", 3), HookLine::NotAHook);
    }

    #[test]
    fn quoted_values_may_contain_escapes() {
        let h = hook(r#"evidence: doc path="docs/a b.md" contains="say \"hi\"""#);
        assert_eq!(h.path, "docs/a b.md");
        assert_eq!(
            h.predicate,
            Some(ContentPredicate::Contains(r#"say "hi""#.to_string()))
        );
    }
}
