//! Name patterns for parameter selection.
//!
//! Patterns are regular expressions anchored at the start of the name,
//! so `x\d` matches `x1` and `x12` but not `ax1`.

use regex::Regex;

use crate::{Error, Result};

/// Single start-anchored name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Regex(Regex),
}

impl NamePattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the expression does not compile.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})")).map_err(|e| Error::InvalidPattern {
            pattern: source.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source,
            matcher: Matcher::Regex(regex),
        })
    }

    /// Pattern that matches exactly one name.
    #[must_use]
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            source: name.into(),
            matcher: Matcher::Literal,
        }
    }

    /// Pattern source text as given by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` matches from its first character.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.source == name,
            Matcher::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Ordered list of patterns; a name is selected if any pattern matches.
///
/// An empty list selects every name.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<NamePattern>,
}

impl PatternList {
    /// Compile a list of pattern sources.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] on the first source that does not compile.
    pub fn new<I, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = sources
            .into_iter()
            .map(NamePattern::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// List that selects every name.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no pattern is set (selects everything).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Selection rule: empty list selects all; otherwise any match,
    /// flipped when `inverse` is set.
    #[must_use]
    pub fn selects(&self, name: &str, inverse: bool) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        inverse != self.patterns.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_anchored_at_start() {
        let pat = NamePattern::new(r"x\d{1,2}").unwrap();
        assert!(pat.matches("x1"));
        assert!(pat.matches("x12"));
        assert!(!pat.matches("ax1"));
    }

    #[test]
    fn test_exact_pattern_escapes_metacharacters() {
        let pat = NamePattern::exact("a.b");
        assert!(pat.matches("a.b"));
        assert!(!pat.matches("axb"));
        assert!(!pat.matches("a.bc"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = NamePattern::new("(").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_list_selects_all() {
        let list = PatternList::all();
        assert!(list.selects("anything", false));
        assert!(list.selects("anything", true));
    }

    #[test]
    fn test_inverse_selection() {
        let list = PatternList::new(["fl", "afb"]).unwrap();
        assert!(list.selects("fl", false));
        assert!(!list.selects("nSig", false));
        assert!(!list.selects("fl", true));
        assert!(list.selects("nSig", true));
    }
}
