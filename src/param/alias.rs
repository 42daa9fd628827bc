//! Alias rules - map parameter names to store keys
//!
//! Several systematic variants of one logical parameter can share a store
//! file by renaming each variant's key (`fl` -> `fl_randEffi`). A rule can
//! also mark names as skipped so they are never synced.

use super::NamePattern;
use crate::Result;

/// What to do with a parameter whose name matched a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasRule {
    /// Store under a different key.
    Rename(String),
    /// Do not sync this parameter at all.
    Skip,
    /// Store under the parameter's own name.
    Identity,
}

/// Outcome of resolving one parameter name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Sync through this store key.
    Key(&'a str),
    /// Leave the parameter out.
    Skip,
}

/// Ordered `(pattern, rule)` list, evaluated first-match-wins.
///
/// A name that matches no rule maps to itself.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    rules: Vec<(NamePattern, AliasRule)>,
}

impl AliasMap {
    /// Empty map: every name maps to itself.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule for exactly one name.
    #[must_use]
    pub fn rule(mut self, name: impl Into<String>, rule: AliasRule) -> Self {
        self.rules.push((NamePattern::exact(name), rule));
        self
    }

    /// Append a rename for exactly one name.
    #[must_use]
    pub fn rename(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.rule(name, AliasRule::Rename(key.into()))
    }

    /// Append a skip rule for exactly one name.
    #[must_use]
    pub fn skip(self, name: impl Into<String>) -> Self {
        self.rule(name, AliasRule::Skip)
    }

    /// Append a rule matching names by start-anchored regex.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if the pattern does not compile.
    pub fn pattern(mut self, pattern: &str, rule: AliasRule) -> Result<Self> {
        self.rules.push((NamePattern::new(pattern)?, rule));
        Ok(self)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rule is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve `name` against the rules.
    #[must_use]
    pub fn resolve<'a>(&'a self, name: &'a str) -> Resolution<'a> {
        let rule = self
            .rules
            .iter()
            .find(|(pat, _)| pat.matches(name))
            .map(|(_, rule)| rule);
        match rule {
            Some(AliasRule::Rename(key)) => Resolution::Key(key),
            Some(AliasRule::Skip) => Resolution::Skip,
            Some(AliasRule::Identity) | None => Resolution::Key(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_name_maps_to_itself() {
        let aliases = AliasMap::new();
        assert_eq!(aliases.resolve("fl"), Resolution::Key("fl"));
    }

    #[test]
    fn test_rename_and_skip() {
        let aliases = AliasMap::new().rename("fl", "fl_randEffi").skip("nll");
        assert_eq!(aliases.resolve("fl"), Resolution::Key("fl_randEffi"));
        assert_eq!(aliases.resolve("nll"), Resolution::Skip);
        assert_eq!(aliases.resolve("afb"), Resolution::Key("afb"));
    }

    #[test]
    fn test_first_match_wins() {
        let aliases = AliasMap::new()
            .rule("x1", AliasRule::Identity)
            .pattern(r"x\d+", AliasRule::Skip)
            .unwrap();
        assert_eq!(aliases.resolve("x1"), Resolution::Key("x1"));
        assert_eq!(aliases.resolve("x2"), Resolution::Skip);
    }
}
