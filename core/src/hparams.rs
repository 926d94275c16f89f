//! Hyperparameter documents.
//!
//! A hyperparameter file is a flat YAML mapping of scalar keys to scalar
//! values (training steps, batch size, model dimensions, dropout rates,
//! optimizer coefficients, decoding parameters). The runner does not
//! interpret the values; it only checks their shape and the usual range
//! expectations before a trainer consumes them wholesale.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{Error, Result};


// ---------------------------------------------------------------------------
// HParamValue
// ---------------------------------------------------------------------------

/// A single scalar hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl HParamValue {
    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HParamValue::Int(i) => Some(*i as f64),
            HParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn from_yaml(key: &str, value: &Value) -> Result<HParamValue> {
        match value {
            Value::Bool(b) => Ok(HParamValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(HParamValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(HParamValue::Float(f))
                } else {
                    Err(Error::config(format!("hyperparameter '{}': number out of range", key)))
                }
            }
            Value::String(s) => Ok(HParamValue::Str(s.clone())),
            Value::Null => Err(Error::config(format!("hyperparameter '{}' has no value", key))),
            Value::Sequence(_) | Value::Mapping(_) => Err(Error::config(format!(
                "hyperparameter '{}' must be a scalar, found a nested value",
                key
            ))),
            Value::Tagged(tagged) => Self::from_yaml(key, &tagged.value),
        }
    }
}

impl fmt::Display for HParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HParamValue::Int(i) => write!(f, "{}", i),
            HParamValue::Float(x) => write!(f, "{}", x),
            HParamValue::Bool(b) => write!(f, "{}", b),
            HParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}


// ---------------------------------------------------------------------------
// HParamIssue
// ---------------------------------------------------------------------------

/// One failed range/type expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HParamIssue {
    pub key: String,
    pub problem: String,
}

impl fmt::Display for HParamIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.problem)
    }
}


// ---------------------------------------------------------------------------
// HyperParams
// ---------------------------------------------------------------------------

/// A flat, key-ordered set of hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HyperParams {
    values: BTreeMap<String, HParamValue>,
}

impl HyperParams {
    pub fn load(path: &Path) -> Result<HyperParams> {
        let content = crate::error::read_to_string(path)?;
        Self::parse_at(&content, path)
    }

    pub fn parse(content: &str) -> Result<HyperParams> {
        Self::parse_at(content, Path::new("<hparams>"))
    }

    fn parse_at(content: &str, origin: &Path) -> Result<HyperParams> {
        let doc: Value = serde_yaml::from_str(content).map_err(|e| Error::yaml(origin, e))?;
        let mapping = match doc {
            Value::Mapping(m) => m,
            Value::Null => return Ok(HyperParams::default()),
            _ => {
                return Err(Error::config(format!(
                    "{}: hyperparameters must be a mapping",
                    origin.display()
                )))
            }
        };

        let mut values = BTreeMap::new();
        for (key, value) in &mapping {
            let key = key.as_str().ok_or_else(|| {
                Error::config(format!("{}: hyperparameter keys must be strings", origin.display()))
            })?;
            values.insert(key.to_string(), HParamValue::from_yaml(key, value)?);
        }
        Ok(HyperParams { values })
    }

    pub fn get(&self, key: &str) -> Option<&HParamValue> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HParamValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HParamValue::as_i64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check every value against the range expectation implied by its key.
    /// Keys without a rule are accepted as-is.
    pub fn validate(&self) -> Vec<HParamIssue> {
        let mut issues = Vec::new();
        for (key, value) in &self.values {
            if let Some(problem) = check_value(key, value) {
                issues.push(HParamIssue {
                    key: key.clone(),
                    problem,
                });
            }
        }
        issues
    }

    /// Like [`validate`](Self::validate) but fails on the first set of issues.
    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation {
                issues: issues.iter().map(|i| i.to_string()).collect(),
            })
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.values).unwrap_or_else(|_| "{}".to_string())
    }
}


/// The rule a key falls under, if any.
#[derive(Debug, PartialEq)]
enum Rule {
    /// Numeric in [0, 1].
    Probability,
    /// Numeric in [0, 1).
    Beta,
    /// Integer > 0.
    PositiveCount,
    /// Numeric > 0.
    PositiveReal,
}

fn rule_for(key: &str) -> Option<Rule> {
    if key.contains("dropout") {
        Some(Rule::Probability)
    } else if key.contains("beta") {
        Some(Rule::Beta)
    } else if key.ends_with("_steps") || key.ends_with("_size") || key.starts_with("num_") {
        Some(Rule::PositiveCount)
    } else if key.contains("learning_rate") || key.contains("epsilon") {
        Some(Rule::PositiveReal)
    } else {
        None
    }
}

fn check_value(key: &str, value: &HParamValue) -> Option<String> {
    let rule = rule_for(key)?;
    match rule {
        Rule::Probability => match value.as_f64() {
            Some(x) if (0.0..=1.0).contains(&x) => None,
            Some(x) => Some(format!("{} is outside [0, 1]", x)),
            None => Some(format!("expected a number, got '{}'", value)),
        },
        Rule::Beta => match value.as_f64() {
            Some(x) if (0.0..1.0).contains(&x) => None,
            Some(x) => Some(format!("{} is outside [0, 1)", x)),
            None => Some(format!("expected a number, got '{}'", value)),
        },
        Rule::PositiveCount => match value.as_i64() {
            Some(n) if n > 0 => None,
            Some(n) => Some(format!("{} must be greater than zero", n)),
            None => Some(format!("expected an integer, got '{}'", value)),
        },
        Rule::PositiveReal => match value.as_f64() {
            Some(x) if x > 0.0 => None,
            Some(x) => Some(format!("{} must be greater than zero", x)),
            None => Some(format!("expected a number, got '{}'", value)),
        },
    }
}
