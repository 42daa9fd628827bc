//! Parameter Record - stored form of a fit parameter

use serde::{Deserialize, Serialize};

use super::Parameter;
use crate::{Error, Result};

/// Attribute vocabulary shared by [`Parameter`] and [`ParameterRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    /// Central value
    Value,
    /// Symmetric error
    Error,
    /// Upper asymmetric error (positive)
    ErrorHi,
    /// Lower asymmetric error (negative)
    ErrorLo,
    /// Constancy flag
    IsConstant,
    /// Upper bound
    Max,
    /// Lower bound
    Min,
}

impl Attr {
    /// All attributes, in storage order.
    pub const ALL: [Self; 7] = [
        Self::Value,
        Self::Error,
        Self::ErrorHi,
        Self::ErrorLo,
        Self::IsConstant,
        Self::Max,
        Self::Min,
    ];

    /// Field name used in the store file.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Error => "error",
            Self::ErrorHi => "errorHi",
            Self::ErrorLo => "errorLo",
            Self::IsConstant => "isConstant",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// Stored attributes of one parameter.
///
/// Only attributes the live parameter exposed at write time are present;
/// absent attributes are omitted from the file rather than zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_hi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_lo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_constant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
}

impl ParameterRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for a record with explicit fields.
    #[must_use]
    pub fn builder() -> ParameterRecordBuilder {
        ParameterRecordBuilder::default()
    }

    /// Snapshot every attribute the parameter exposes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if any exposed attribute is not
    /// finite; JSON has no representation for NaN or infinity.
    pub fn from_parameter(param: &Parameter) -> Result<Self> {
        let record = Self {
            value: Some(param.value()),
            error: param.error(),
            error_hi: param.asym_error().map(|(_, hi)| hi),
            error_lo: param.asym_error().map(|(lo, _)| lo),
            is_constant: param.constant(),
            max: param.max(),
            min: param.min(),
        };
        for attr in Attr::ALL {
            if let Some(v) = record.float(attr) {
                if !v.is_finite() {
                    return Err(Error::InvalidParameter {
                        name: param.name().to_string(),
                        reason: format!("{} is {v}", attr.as_str()),
                    });
                }
            }
        }
        Ok(record)
    }

    /// Overwrite this record's fields with every field `other` carries.
    ///
    /// Fields `other` lacks are left as they were (read-modify-write).
    pub fn merge_from(&mut self, other: &Self) {
        self.value = other.value.or(self.value);
        self.error = other.error.or(self.error);
        self.error_hi = other.error_hi.or(self.error_hi);
        self.error_lo = other.error_lo.or(self.error_lo);
        self.is_constant = other.is_constant.or(self.is_constant);
        self.max = other.max.or(self.max);
        self.min = other.min.or(self.min);
    }

    /// Floating-point attribute, if stored. `IsConstant` always yields `None`.
    #[must_use]
    pub const fn float(&self, attr: Attr) -> Option<f64> {
        match attr {
            Attr::Value => self.value,
            Attr::Error => self.error,
            Attr::ErrorHi => self.error_hi,
            Attr::ErrorLo => self.error_lo,
            Attr::Max => self.max,
            Attr::Min => self.min,
            Attr::IsConstant => None,
        }
    }

    /// Floating-point attribute required by a strict read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordCorrupt`] naming `key` and the missing field.
    pub fn require(&self, key: &str, attr: Attr) -> Result<f64> {
        self.float(attr).ok_or_else(|| Error::RecordCorrupt {
            key: key.to_string(),
            field: attr.as_str().to_string(),
        })
    }

    /// Stored central value.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Stored symmetric error.
    #[must_use]
    pub const fn error(&self) -> Option<f64> {
        self.error
    }

    /// Stored upper asymmetric error.
    #[must_use]
    pub const fn error_hi(&self) -> Option<f64> {
        self.error_hi
    }

    /// Stored lower asymmetric error.
    #[must_use]
    pub const fn error_lo(&self) -> Option<f64> {
        self.error_lo
    }

    /// Stored `(lo, hi)` pair; present only when both halves are stored.
    #[must_use]
    pub fn asym_error(&self) -> Option<(f64, f64)> {
        self.error_lo.zip(self.error_hi)
    }

    /// Stored constancy flag.
    #[must_use]
    pub const fn is_constant(&self) -> Option<bool> {
        self.is_constant
    }

    /// Stored upper bound.
    #[must_use]
    pub const fn max(&self) -> Option<f64> {
        self.max
    }

    /// Stored lower bound.
    #[must_use]
    pub const fn min(&self) -> Option<f64> {
        self.min
    }

    /// Set the central value.
    pub fn set_value(&mut self, value: f64) {
        self.value = Some(value);
    }
}

/// Builder for `ParameterRecord`.
#[derive(Debug, Default)]
pub struct ParameterRecordBuilder {
    record: ParameterRecord,
}

impl ParameterRecordBuilder {
    /// Set the central value.
    #[must_use]
    pub const fn value(mut self, value: f64) -> Self {
        self.record.value = Some(value);
        self
    }

    /// Set the symmetric error.
    #[must_use]
    pub const fn error(mut self, error: f64) -> Self {
        self.record.error = Some(error);
        self
    }

    /// Set the asymmetric error pair.
    #[must_use]
    pub const fn asym_error(mut self, lo: f64, hi: f64) -> Self {
        self.record.error_lo = Some(lo);
        self.record.error_hi = Some(hi);
        self
    }

    /// Set the constancy flag.
    #[must_use]
    pub const fn constant(mut self, constant: bool) -> Self {
        self.record.is_constant = Some(constant);
        self
    }

    /// Set both bounds.
    #[must_use]
    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.record.min = Some(min);
        self.record.max = Some(max);
        self
    }

    /// Build the `ParameterRecord`.
    #[must_use]
    pub fn build(self) -> ParameterRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_only_present_fields() {
        let record = ParameterRecord::builder().value(1.5).build();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"value":1.5}"#);
    }

    #[test]
    fn test_record_field_names() {
        let record = ParameterRecord::builder()
            .value(0.7)
            .error(0.05)
            .asym_error(-0.04, 0.06)
            .constant(false)
            .range(0.0, 1.0)
            .build();
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        for attr in Attr::ALL {
            assert!(json.get(attr.as_str()).is_some(), "missing {}", attr.as_str());
        }
    }

    #[test]
    fn test_require_missing_field() {
        let record = ParameterRecord::builder().value(1.0).build();
        let err = record.require("fl", Attr::Error).unwrap_err();
        assert!(matches!(err, Error::RecordCorrupt { ref key, ref field } if key == "fl" && field == "error"));
    }

    #[test]
    fn test_from_parameter_rejects_nan() {
        let param = Parameter::new("bad", f64::NAN);
        let err = ParameterRecord::from_parameter(&param).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_merge_keeps_fields_other_lacks() {
        let mut stored = ParameterRecord::builder().value(1.0).error(0.1).build();
        let update = ParameterRecord::builder().value(2.0).build();
        stored.merge_from(&update);
        assert_eq!(stored.value(), Some(2.0));
        assert_eq!(stored.error(), Some(0.1));
    }
}
