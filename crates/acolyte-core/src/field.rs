//! Field rules: type coercion and constraint checks for job arguments.
//!
//! A [`FieldRule`] turns a raw JSON value (or its absence) into a typed,
//! validated value, or a [`FieldError`] carrying the reason tag and the
//! expected constraint.

use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

/// Why a value was rejected by a [`FieldRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldReason {
    Empty,
    InvalidType,
    LessThanMin,
    MoreThanMax,
    LessThanMinLength,
    MoreThanMaxLength,
    InvalidFormat,
}

impl FieldReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::InvalidType => "invalid_type",
            Self::LessThanMin => "less_than_min",
            Self::MoreThanMax => "more_than_max",
            Self::LessThanMinLength => "less_than_min_length",
            Self::MoreThanMaxLength => "more_than_max_length",
            Self::InvalidFormat => "invalid_format",
        }
    }
}

impl std::fmt::Display for FieldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value failed its field rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("field '{field}' rejected: {reason}{}", expect.as_ref().map(|e| format!(" (expect {e})")).unwrap_or_default())]
pub struct FieldError {
    pub field: String,
    pub reason: FieldReason,
    /// Expected type, bound, or pattern.
    pub expect: Option<String>,
}

impl FieldError {
    fn new(field: &str, reason: FieldReason, expect: Option<String>) -> Self {
        Self {
            field: field.to_string(),
            reason,
            expect,
        }
    }
}

/// Type and constraints of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Str {
        min_len: Option<usize>,
        max_len: Option<usize>,
        regex: Option<Regex>,
    },
    Bool,
    List,
    Dict,
    Any,
}

impl FieldKind {
    /// Type name used in `invalid_type` errors and views.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int { .. } => "int",
            Self::Float { .. } => "float",
            Self::Str { .. } => "str",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Any => "any",
        }
    }
}

/// Coercion and validation rule for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl FieldRule {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
            default: None,
        }
    }

    pub fn int() -> Self {
        Self::of(FieldKind::Int {
            min: None,
            max: None,
        })
    }

    pub fn float() -> Self {
        Self::of(FieldKind::Float {
            min: None,
            max: None,
        })
    }

    pub fn string() -> Self {
        Self::of(FieldKind::Str {
            min_len: None,
            max_len: None,
            regex: None,
        })
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Bool)
    }

    pub fn list() -> Self {
        Self::of(FieldKind::List)
    }

    pub fn dict() -> Self {
        Self::of(FieldKind::Dict)
    }

    pub fn any() -> Self {
        Self::of(FieldKind::Any)
    }

    /// Mark the field optional; missing values resolve to the default or null.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the field is missing.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Lower bound for `int` and `float` fields. Ignored for other kinds.
    pub fn min(mut self, bound: i64) -> Self {
        match &mut self.kind {
            FieldKind::Int { min, .. } => *min = Some(bound),
            FieldKind::Float { min, .. } => *min = Some(bound as f64),
            _ => {}
        }
        self
    }

    /// Upper bound for `int` and `float` fields. Ignored for other kinds.
    pub fn max(mut self, bound: i64) -> Self {
        match &mut self.kind {
            FieldKind::Int { max, .. } => *max = Some(bound),
            FieldKind::Float { max, .. } => *max = Some(bound as f64),
            _ => {}
        }
        self
    }

    pub fn min_len(mut self, len: usize) -> Self {
        if let FieldKind::Str { min_len, .. } = &mut self.kind {
            *min_len = Some(len);
        }
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        if let FieldKind::Str { max_len, .. } = &mut self.kind {
            *max_len = Some(len);
        }
        self
    }

    /// Pattern a `str` field must match (search semantics, not full match).
    pub fn regex(mut self, pattern: Regex) -> Self {
        if let FieldKind::Str { regex, .. } = &mut self.kind {
            *regex = Some(pattern);
        }
        self
    }

    /// Coerce and validate `raw` for the field called `name`.
    ///
    /// `None` and JSON `null` are both treated as missing.
    pub fn apply(&self, name: &str, raw: Option<&Value>) -> Result<Value, FieldError> {
        let raw = match raw {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        };

        let Some(value) = raw else {
            if let Some(default) = &self.default {
                return Ok(default.clone());
            }
            if self.required {
                return Err(FieldError::new(name, FieldReason::Empty, None));
            }
            return Ok(Value::Null);
        };

        let coerced = self
            .coerce(value)
            .ok_or_else(|| {
                FieldError::new(
                    name,
                    FieldReason::InvalidType,
                    Some(self.kind.type_name().to_string()),
                )
            })?;
        self.check(name, coerced)
    }

    fn coerce(&self, value: &Value) -> Option<Value> {
        match &self.kind {
            FieldKind::Int { .. } => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(integral_f64))
                    .map(Value::from),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            FieldKind::Float { .. } => match value {
                Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number),
                _ => None,
            },
            FieldKind::Str { .. } => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            FieldKind::Bool => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(Value::Bool(false)),
                    Some(1) => Some(Value::Bool(true)),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(Value::Bool(true)),
                    "false" | "0" | "no" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            FieldKind::List => match value {
                Value::Array(_) => Some(value.clone()),
                Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_array),
                _ => None,
            },
            FieldKind::Dict => match value {
                Value::Object(_) => Some(value.clone()),
                Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
                _ => None,
            },
            FieldKind::Any => Some(value.clone()),
        }
    }

    fn check(&self, name: &str, value: Value) -> Result<Value, FieldError> {
        match &self.kind {
            FieldKind::Int { min, max } => {
                let n = value.as_i64().unwrap_or_default();
                if let Some(min) = min.filter(|m| n < *m) {
                    return Err(FieldError::new(name, FieldReason::LessThanMin, Some(min.to_string())));
                }
                if let Some(max) = max.filter(|m| n > *m) {
                    return Err(FieldError::new(name, FieldReason::MoreThanMax, Some(max.to_string())));
                }
            }
            FieldKind::Float { min, max } => {
                let n = value.as_f64().unwrap_or_default();
                if let Some(min) = min.filter(|m| n < *m) {
                    return Err(FieldError::new(name, FieldReason::LessThanMin, Some(min.to_string())));
                }
                if let Some(max) = max.filter(|m| n > *m) {
                    return Err(FieldError::new(name, FieldReason::MoreThanMax, Some(max.to_string())));
                }
            }
            FieldKind::Str {
                min_len,
                max_len,
                regex,
            } => {
                let s = value.as_str().unwrap_or_default();
                let len = s.chars().count();
                if let Some(min) = min_len.filter(|m| len < *m) {
                    return Err(FieldError::new(
                        name,
                        FieldReason::LessThanMinLength,
                        Some(min.to_string()),
                    ));
                }
                if let Some(max) = max_len.filter(|m| len > *m) {
                    return Err(FieldError::new(
                        name,
                        FieldReason::MoreThanMaxLength,
                        Some(max.to_string()),
                    ));
                }
                if let Some(re) = regex.as_ref().filter(|re| !re.is_match(s)) {
                    return Err(FieldError::new(
                        name,
                        FieldReason::InvalidFormat,
                        Some(re.as_str().to_string()),
                    ));
                }
            }
            FieldKind::Bool | FieldKind::List | FieldKind::Dict | FieldKind::Any => {}
        }
        Ok(value)
    }
}

/// `f` as an `i64` when it is integral and in range. `i64::MAX as f64`
/// rounds up to 2^63, so the upper bound is exclusive.
fn integral_f64(f: f64) -> Option<i64> {
    const LOWER: f64 = i64::MIN as f64;
    const UPPER: f64 = i64::MAX as f64;
    (f.fract() == 0.0 && (LOWER..UPPER).contains(&f)).then_some(f as i64)
}
