//! Qualified-name pattern matching.
//!
//! Privacy rules select documentables by their dotted qualified name
//! (`pkg.mod.Class.attr`). Patterns follow glob syntax with the dot acting
//! as the separator: `*` and `?` never cross a dot, `**` does.
//!
//! | Pattern | Matches | Does not match |
//! |---|---|---|
//! | `pkg.mod.*` | `pkg.mod.f` | `pkg.mod.Class.attr` |
//! | `pkg.**` | `pkg.mod.Class.attr` | `other.mod` |
//! | `**.test_*` | `pkg.tests.test_foo` | `pkg.tests.foo` |
//!
//! Matching is implemented by translating dots to path separators and
//! delegating to `globset` with literal separators enabled.

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

/// Error for a pattern that cannot be compiled.
#[derive(Debug, Error)]
#[error("invalid qualified-name pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The offending pattern as supplied.
    pub pattern: String,
    source: globset::Error,
}

/// A compiled qualified-name pattern.
#[derive(Debug, Clone)]
pub struct QnamePattern {
    raw: String,
    matcher: GlobMatcher,
}

impl QnamePattern {
    /// Compile a dotted glob pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let glob = GlobBuilder::new(&pattern.replace('.', "/"))
            .literal_separator(true)
            .build()
            .map_err(|source| PatternError {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(QnamePattern {
            raw: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Whether the pattern matches the given qualified name.
    pub fn matches(&self, qualified_name: &str) -> bool {
        self.matcher.is_match(qualified_name.replace('.', "/"))
    }

    /// The pattern as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        QnamePattern::new(pattern).unwrap().matches(name)
    }

    #[test]
    fn test_exact_name() {
        assert!(matches("pkg.mod.Class", "pkg.mod.Class"));
        assert!(!matches("pkg.mod.Class", "pkg.mod.Other"));
    }

    #[test]
    fn test_star_stays_inside_segment() {
        assert!(matches("pkg.mod.*", "pkg.mod.f"));
        assert!(!matches("pkg.mod.*", "pkg.mod.Class.attr"));
        assert!(matches("pkg.*.Class", "pkg.mod.Class"));
        assert!(!matches("pkg.*.Class", "pkg.a.b.Class"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        assert!(matches("pkg.**", "pkg.mod.Class.attr"));
        assert!(matches("**.test_*", "pkg.tests.test_foo"));
        assert!(!matches("**.test_*", "pkg.tests.foo"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("pkg.m?d", "pkg.mod"));
        assert!(!matches("pkg.m?d", "pkg.mood"));
    }

    #[test]
    fn test_partial_segment_star() {
        assert!(matches("pkg._*", "pkg._private"));
        assert!(!matches("pkg._*", "pkg.public"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = QnamePattern::new("pkg.[oops").unwrap_err();
        assert_eq!(err.pattern, "pkg.[oops");
    }
}
