//! Process and stage configuration
//!
//! [`ProcessConfig`] holds process-level state shared by every stage (which
//! physics bin is active, the random seed). [`StageConfig`] is the
//! recognized-keys map each stage is built from: unknown keys are ignored,
//! missing required keys fail with [`Error::Config`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::param::{AliasMap, AliasRule, PatternList};
use crate::{Error, Result};

/// Placeholder expanded to the active bin label in stage string values.
pub const BIN_LABEL_PLACEHOLDER: &str = "{binLabel}";

fn default_bin_key() -> String {
    "summary".to_string()
}

/// One kinematic partition of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinSpec {
    /// Short label used in file names (`bin1`).
    pub label: String,
    /// Lower and upper q² edge.
    pub q2_range: (f64, f64),
    /// Selection cut string for the data reader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut: Option<String>,
}

impl BinSpec {
    /// Create a bin with label and q² range.
    #[must_use]
    pub fn new(label: impl Into<String>, lo: f64, hi: f64) -> Self {
        Self {
            label: label.into(),
            q2_range: (lo, hi),
            cut: None,
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Key of the active bin in [`bins`](Self::bins).
    #[serde(default = "default_bin_key")]
    pub bin_key: String,
    /// Set when running as a batch job.
    #[serde(default)]
    pub is_batch_job: bool,
    /// Seed of the process random source.
    #[serde(default)]
    pub seed: u64,
    /// Known bins, by key.
    #[serde(default)]
    pub bins: BTreeMap<String, BinSpec>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            bin_key: default_bin_key(),
            is_batch_job: false,
            seed: 0,
            bins: BTreeMap::new(),
        }
    }
}

impl ProcessConfig {
    /// Default configuration (`summary` bin, seed 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns IO or JSON errors.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Select the active bin.
    #[must_use]
    pub fn with_bin_key(mut self, key: impl Into<String>) -> Self {
        self.bin_key = key.into();
        self
    }

    /// Register a bin.
    #[must_use]
    pub fn with_bin(mut self, key: impl Into<String>, bin: BinSpec) -> Self {
        self.bins.insert(key.into(), bin);
        self
    }

    /// Active bin, if it is registered.
    #[must_use]
    pub fn active_bin(&self) -> Option<&BinSpec> {
        self.bins.get(&self.bin_key)
    }

    /// Label of the active bin; the bin key itself when the bin is unknown.
    #[must_use]
    pub fn bin_label(&self) -> &str {
        self.active_bin().map_or(self.bin_key.as_str(), |b| b.label.as_str())
    }
}

/// Replace every `{binLabel}` in `template`.
#[must_use]
pub fn expand_bin_label(template: &str, label: &str) -> String {
    template.replace(BIN_LABEL_PLACEHOLDER, label)
}

/// Recognized-keys configuration of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    stage: String,
    values: Map<String, Value>,
}

impl StageConfig {
    /// Build from a JSON object that carries a `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `value` is not an object or has no string `name`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(values) = value else {
            return Err(Error::config("<unnamed>", "<root>", "must be a JSON object"));
        };
        let stage = match values.get("name") {
            Some(Value::String(name)) => name.replace('.', "_"),
            Some(_) => return Err(Error::config("<unnamed>", "name", "must be a string")),
            None => return Err(Error::config("<unnamed>", "name", "is required")),
        };
        Ok(Self { stage, values })
    }

    /// Template merged with overrides, like updating a default dict.
    ///
    /// # Errors
    ///
    /// Same as [`from_value`](Self::from_value) on the merged object.
    pub fn from_template(template: Value, overrides: Value) -> Result<Self> {
        let mut merged = match template {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Value::Object(over) = overrides {
            merged.extend(over);
        }
        Self::from_value(Value::Object(merged))
    }

    /// Stage name (dots replaced by underscores).
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a key, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Merge every key of a JSON object into this config.
    pub fn update(&mut self, overrides: Value) {
        if let Value::Object(over) = overrides {
            self.values.extend(over);
        }
    }

    fn bad(&self, key: &str, reason: &str) -> Error {
        Error::config(self.stage.clone(), key, reason)
    }

    /// Required string value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.values.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(self.bad(key, "must be a string")),
            None => Err(self.bad(key, "is required")),
        }
    }

    /// Optional string value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if present but neither a string nor null.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(self.bad(key, "must be a string")),
        }
    }

    /// Boolean value with default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if present but not a boolean.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            Some(Value::Bool(b)) => Ok(*b),
            None => Ok(default),
            Some(_) => Err(self.bad(key, "must be a boolean")),
        }
    }

    /// Unsigned integer value with default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if present but not a non-negative integer.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| self.bad(key, "must be a non-negative integer")),
        }
    }

    /// A string or list of strings, as a list. Absent means empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for any other shape.
    pub fn str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.bad(key, "must contain only strings"))
                })
                .collect(),
            Some(_) => Err(self.bad(key, "must be a string or a list of strings")),
        }
    }

    /// Compiled selection patterns from a string list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a bad shape or [`Error::InvalidPattern`].
    pub fn patterns(&self, key: &str) -> Result<PatternList> {
        PatternList::new(self.str_list(key)?)
    }

    /// Alias map from an object of `name -> key | null` (null skips).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for any other shape.
    pub fn alias_map(&self, key: &str) -> Result<AliasMap> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(AliasMap::new()),
            Some(Value::Object(entries)) => entries.iter().try_fold(AliasMap::new(), |map, (name, target)| {
                let rule = match target {
                    Value::String(alias) => AliasRule::Rename(alias.clone()),
                    Value::Null => AliasRule::Skip,
                    _ => return Err(self.bad(key, "values must be strings or null")),
                };
                Ok(map.rule(name.clone(), rule))
            }),
            Some(_) => Err(self.bad(key, "must be an object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::Resolution;
    use serde_json::json;

    #[test]
    fn test_bin_label_fallback() {
        let cfg = ProcessConfig::new()
            .with_bin("belowJpsi", BinSpec::new("bin1", 1.0, 8.68))
            .with_bin_key("belowJpsi");
        assert_eq!(cfg.bin_label(), "bin1");

        let unknown = ProcessConfig::new().with_bin_key("jpsi");
        assert_eq!(unknown.bin_label(), "jpsi");
    }

    #[test]
    fn test_process_config_defaults_from_json() {
        let cfg: ProcessConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.bin_key, "summary");
        assert_eq!(cfg.seed, 0);
        assert!(!cfg.is_batch_job);
    }

    #[test]
    fn test_stage_name_replaces_dots() {
        let cfg = StageConfig::from_value(json!({"name": "final.fitter"})).unwrap();
        assert_eq!(cfg.stage_name(), "final_fitter");
    }

    #[test]
    fn test_missing_required_key() {
        let cfg = StageConfig::from_value(json!({"name": "fitter"})).unwrap();
        let err = cfg.require_str("pdf").unwrap_err();
        assert!(matches!(err, Error::Config { ref stage, ref key, .. } if stage == "fitter" && key == "pdf"));
    }

    #[test]
    fn test_template_override_and_unknown_keys() {
        let cfg = StageConfig::from_template(
            json!({"name": "StdFitter", "pdf": "f", "saveToDB": true}),
            json!({"name": "finalFitter", "saveToDB": false, "whatever": 3}),
        )
        .unwrap();
        assert_eq!(cfg.stage_name(), "finalFitter");
        assert_eq!(cfg.require_str("pdf").unwrap(), "f");
        assert!(!cfg.bool_or("saveToDB", true).unwrap());
    }

    #[test]
    fn test_str_list_shapes() {
        let cfg = StageConfig::from_value(json!({"name": "s", "one": "a", "many": ["a", "b"], "bad": 3})).unwrap();
        assert_eq!(cfg.str_list("one").unwrap(), vec!["a"]);
        assert_eq!(cfg.str_list("many").unwrap(), vec!["a", "b"]);
        assert!(cfg.str_list("absent").unwrap().is_empty());
        assert!(cfg.str_list("bad").is_err());
    }

    #[test]
    fn test_alias_map_from_config() {
        let cfg = StageConfig::from_value(json!({
            "name": "s",
            "argAliasInDB": {"fl": "fl_randEffi", "nll": null}
        }))
        .unwrap();
        let aliases = cfg.alias_map("argAliasInDB").unwrap();
        assert_eq!(aliases.resolve("fl"), Resolution::Key("fl_randEffi"));
        assert_eq!(aliases.resolve("nll"), Resolution::Skip);
    }

    #[test]
    fn test_expand_bin_label() {
        assert_eq!(expand_bin_label("fitResults_{binLabel}.db", "bin3"), "fitResults_bin3.db");
    }
}
