//! Glob matching against paths relative to the watched root.
//!
//! `*` never crosses a `/`; only `**` spans directories. A pattern that
//! fails to parse is kept as a literal string and compared verbatim.

use glob::{MatchOptions, Pattern};

/// Options shared by every match.
///
/// Case sensitivity follows the host filesystem's usual convention.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: !cfg!(any(windows, target_os = "macos")),
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone, Debug)]
enum Compiled {
    Glob(Pattern),
    Literal,
}

/// A compiled watch pattern such as `**/*.html`.
#[derive(Clone, Debug)]
pub struct WatchPattern {
    source: String,
    compiled: Compiled,
}

impl WatchPattern {
    /// Compile a pattern. Never fails: invalid globs become literals.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let compiled = match Pattern::new(source) {
            Ok(pattern) => Compiled::Glob(pattern),
            Err(e) => {
                tracing::debug!(pattern = source, error = %e, "Treating pattern as literal");
                Compiled::Literal
            }
        };
        Self {
            source: source.to_owned(),
            compiled,
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a `/`-separated path relative to the watched root.
    #[must_use]
    pub fn matches(&self, relative_path: &str) -> bool {
        match &self.compiled {
            Compiled::Glob(pattern) => pattern.matches_with(relative_path, MATCH_OPTIONS),
            Compiled::Literal => self.source == relative_path,
        }
    }
}

/// Match a single pattern against a relative path.
///
/// ```
/// use ars_watch::matches;
///
/// assert!(matches("**/*.html", "pages/about.html"));
/// assert!(!matches("*.html", "pages/about.html"));
/// ```
#[must_use]
pub fn matches(pattern: &str, relative_path: &str) -> bool {
    WatchPattern::new(pattern).matches(relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_matches_any_depth() {
        assert!(matches("**/*.html", "index.html"));
        assert!(matches("**/*.html", "pages/about.html"));
        assert!(matches("**/*.html", "a/b/c.html"));
        assert!(!matches("**/*.html", "style.css"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(matches("*.html", "index.html"));
        assert!(!matches("*.html", "pages/about.html"));
        assert!(matches("pages/*.html", "pages/about.html"));
        assert!(!matches("pages/*.html", "pages/nested/about.html"));
    }

    #[test]
    fn test_double_star_alone_matches_everything() {
        assert!(matches("**/*", "index.html"));
        assert!(matches("**/*", "assets/js/app.js"));
    }

    #[test]
    fn test_literal_segments() {
        assert!(matches("docs/index.html", "docs/index.html"));
        assert!(!matches("docs/index.html", "docs/other.html"));
    }

    #[test]
    fn test_invalid_pattern_is_literal() {
        let pattern = WatchPattern::new("[*.html");
        assert_eq!(pattern.as_str(), "[*.html");
        assert!(!pattern.matches("index.html"));
        assert!(pattern.matches("[*.html"));
    }

    #[test]
    fn test_css_pattern_ignores_other_extensions() {
        assert!(matches("**/*.css", "style.css"));
        assert!(!matches("**/*.css", "script.js"));
    }
}
