//! Typed provider settings.
//!
//! Providers declare their configurable options as a list of
//! [`SettingSchema`] entries; the registry validates incoming
//! [`ProviderSettings`] against that schema before persisting them or handing
//! them to the provider's `configure` hook.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{MuninnError, Result};

/// Shape and constraints of one setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingKind {
    Bool {
        default: bool,
    },
    Integer {
        default: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Float {
        default: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Text {
        #[serde(default)]
        default: String,
    },
    /// One of a closed set of string options.
    Choice {
        default: String,
        options: Vec<String>,
    },
}

impl SettingKind {
    /// Default value for this kind.
    pub fn default_value(&self) -> SettingValue {
        match self {
            Self::Bool { default } => SettingValue::Bool(*default),
            Self::Integer { default, .. } => SettingValue::Integer(*default),
            Self::Float { default, .. } => SettingValue::Float(*default),
            Self::Text { default } | Self::Choice { default, .. } => {
                SettingValue::Text(default.clone())
            }
        }
    }

    /// Check a value against this kind. Returns a human-readable reason on failure.
    fn check(&self, value: &SettingValue) -> std::result::Result<(), String> {
        match (self, value) {
            (Self::Bool { .. }, SettingValue::Bool(_)) => Ok(()),
            (Self::Integer { min, max, .. }, SettingValue::Integer(v)) => {
                check_bounds(*v, *min, *max)
            }
            (Self::Float { min, max, .. }, value) => match value.as_f64() {
                Some(v) => check_bounds(v, *min, *max),
                None => Err(format!("expected a number, got {}", value.type_name())),
            },
            (Self::Text { .. }, SettingValue::Text(_)) => Ok(()),
            (Self::Choice { options, .. }, SettingValue::Text(v)) => {
                if options.contains(v) {
                    Ok(())
                } else {
                    Err(format!("'{v}' is not one of {options:?}"))
                }
            }
            (kind, value) => Err(format!(
                "expected {}, got {}",
                kind.type_name(),
                value.type_name()
            )),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool { .. } => "bool",
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Text { .. } => "text",
            Self::Choice { .. } => "choice",
        }
    }
}

fn check_bounds<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> std::result::Result<(), String> {
    if let Some(min) = min
        && value < min
    {
        return Err(format!("{value} is below minimum {min}"));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(format!("{value} is above maximum {max}"));
    }
    Ok(())
}

/// One declared setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSchema {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: SettingKind,
}

impl SettingSchema {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
        }
    }
}

/// A concrete setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

/// Current setting values for one provider, keyed by [`SettingSchema::key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderSettings {
    values: BTreeMap<String, SettingValue>,
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: SettingValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: SettingValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Validate every value against `schema`.
    ///
    /// Keys absent from the schema are rejected; keys absent from the values
    /// are fine (their defaults apply).
    pub fn validate(&self, provider: &str, schema: &[SettingSchema]) -> Result<()> {
        for (key, value) in &self.values {
            let entry = schema.iter().find(|s| &s.key == key).ok_or_else(|| {
                MuninnError::InvalidSetting {
                    provider: provider.to_string(),
                    key: key.clone(),
                    reason: "not declared by the provider".to_string(),
                }
            })?;
            entry
                .kind
                .check(value)
                .map_err(|reason| MuninnError::InvalidSetting {
                    provider: provider.to_string(),
                    key: key.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    /// Copy of these values with schema defaults filled in for missing keys.
    pub fn resolved(&self, schema: &[SettingSchema]) -> Self {
        let mut resolved = self.clone();
        for entry in schema {
            resolved
                .values
                .entry(entry.key.clone())
                .or_insert_with(|| entry.kind.default_value());
        }
        resolved
    }
}
