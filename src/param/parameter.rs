//! Parameter - live fit parameter and ordered parameter sets

use serde::{Deserialize, Serialize};

use super::PatternList;

/// A named fit/model parameter.
///
/// Only `name` and `value` are always present. Every other attribute is a
/// capability: a bare likelihood-ratio result, for instance, exposes a value
/// but no error or bounds. Serialization writes exactly the populated ones.
///
/// Bounds are transported, never enforced here; the fit engine owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: f64,
    error: Option<f64>,
    asym_error: Option<(f64, f64)>,
    constant: Option<bool>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Parameter {
    /// Create a parameter exposing only a name and a value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            error: None,
            asym_error: None,
            constant: None,
            min: None,
            max: None,
        }
    }

    /// Create a builder for a parameter with the full attribute set.
    #[must_use]
    pub fn builder(name: impl Into<String>, value: f64) -> ParameterBuilder {
        ParameterBuilder::new(name, value)
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Symmetric error, if exposed.
    #[must_use]
    pub const fn error(&self) -> Option<f64> {
        self.error
    }

    /// Asymmetric error as `(lo, hi)`, if exposed.
    #[must_use]
    pub const fn asym_error(&self) -> Option<(f64, f64)> {
        self.asym_error
    }

    /// Constancy flag, if exposed.
    #[must_use]
    pub const fn constant(&self) -> Option<bool> {
        self.constant
    }

    /// True if the parameter is flagged constant.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.constant.unwrap_or(false)
    }

    /// Lower bound, if exposed.
    #[must_use]
    pub const fn min(&self) -> Option<f64> {
        self.min
    }

    /// Upper bound, if exposed.
    #[must_use]
    pub const fn max(&self) -> Option<f64> {
        self.max
    }

    /// Set the value.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Set the symmetric error.
    pub fn set_error(&mut self, error: f64) {
        self.error = Some(error);
    }

    /// Set the asymmetric error; both halves move together.
    pub fn set_asym_error(&mut self, lo: f64, hi: f64) {
        self.asym_error = Some((lo, hi));
    }

    /// Set the constancy flag.
    pub fn set_constant(&mut self, constant: bool) {
        self.constant = Some(constant);
    }

    /// Set both bounds.
    pub fn set_range(&mut self, min: f64, max: f64) {
        self.min = Some(min);
        self.max = Some(max);
    }
}

/// Builder for `Parameter`.
#[derive(Debug)]
pub struct ParameterBuilder {
    param: Parameter,
}

impl ParameterBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            param: Parameter::new(name, value),
        }
    }

    /// Set the symmetric error.
    #[must_use]
    pub const fn error(mut self, error: f64) -> Self {
        self.param.error = Some(error);
        self
    }

    /// Set the asymmetric error pair.
    #[must_use]
    pub const fn asym_error(mut self, lo: f64, hi: f64) -> Self {
        self.param.asym_error = Some((lo, hi));
        self
    }

    /// Set the constancy flag.
    #[must_use]
    pub const fn constant(mut self, constant: bool) -> Self {
        self.param.constant = Some(constant);
        self
    }

    /// Set both bounds.
    #[must_use]
    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.param.min = Some(min);
        self.param.max = Some(max);
        self
    }

    /// Build the `Parameter`.
    #[must_use]
    pub fn build(self) -> Parameter {
        self.param
    }
}

/// Ordered collection of parameters with unique names.
///
/// Owned by a fitting stage for the duration of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any existing one with the same name.
    pub fn insert(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(slot) => *slot = param,
            None => self.params.push(param),
        }
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when the set holds no parameter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Look up a parameter by name for mutation.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    /// Iterate mutably in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.params.iter_mut()
    }

    /// Remove a parameter by name.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let idx = self.params.iter().position(|p| p.name == name)?;
        Some(self.params.remove(idx))
    }

    /// Apply `func` to every parameter selected by `patterns`.
    pub fn for_each_selected<F>(&mut self, patterns: &PatternList, inverse: bool, mut func: F)
    where
        F: FnMut(&mut Parameter),
    {
        for param in &mut self.params {
            if patterns.selects(&param.name, inverse) {
                func(param);
            }
        }
    }

    /// Set constancy on every selected parameter.
    pub fn toggle_constant(&mut self, constant: bool, patterns: &PatternList, inverse: bool) {
        self.for_each_selected(patterns, inverse, |p| p.set_constant(constant));
    }

    /// Subset containing only the selected parameters.
    #[must_use]
    pub fn subset(&self, patterns: &PatternList, inverse: bool) -> Self {
        Self {
            params: self
                .params
                .iter()
                .filter(|p| patterns.selects(&p.name, inverse))
                .cloned()
                .collect(),
        }
    }

    /// Copy values and errors back from a subset produced by [`subset`](Self::subset).
    pub fn absorb(&mut self, other: &Self) {
        for param in &other.params {
            self.insert(param.clone());
        }
    }
}

impl FromIterator<Parameter> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut set = Self::new();
        for param in iter {
            set.insert(param);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> ParameterSet {
        [
            Parameter::builder("fl", 0.5).range(0.0, 1.0).build(),
            Parameter::builder("afb", 0.0).range(-0.75, 0.75).build(),
            Parameter::builder("x1", 0.1).build(),
            Parameter::builder("x12", 0.2).build(),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = sample_set();
        set.insert(Parameter::new("fl", 0.9));
        assert_eq!(set.len(), 4);
        assert!((set.find("fl").unwrap().value() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_toggle_constant_selection() {
        let mut set = sample_set();
        set.toggle_constant(true, &PatternList::all(), false);
        set.toggle_constant(false, &PatternList::new([r"x\d{1,2}"]).unwrap(), false);

        assert!(set.find("fl").unwrap().is_constant());
        assert!(set.find("afb").unwrap().is_constant());
        assert!(!set.find("x1").unwrap().is_constant());
        assert!(!set.find("x12").unwrap().is_constant());
    }

    #[test]
    fn test_subset_inverse() {
        let set = sample_set();
        let sub = set.subset(&PatternList::new(["x"]).unwrap(), true);
        let names: Vec<_> = sub.iter().map(Parameter::name).collect();
        assert_eq!(names, vec!["fl", "afb"]);
    }

    #[test]
    fn test_bare_parameter_exposes_only_value() {
        let p = Parameter::new("nll", 12.5);
        assert!(p.error().is_none());
        assert!(p.asym_error().is_none());
        assert!(p.constant().is_none());
        assert!(p.min().is_none() && p.max().is_none());
    }
}
