use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single strategy parameter value.
///
/// Serialized untagged so a parameter set is a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Categorical(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Categorical(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:.4}", v),
            Value::Categorical(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered parameter set. Ordering keeps genome hashing stable.
pub type Parameters = BTreeMap<String, Value>;

/// Which half of a split window a metric set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationSample {
    InSample,
    OutOfSample,
}

impl Default for EvaluationSample {
    fn default() -> Self {
        EvaluationSample::OutOfSample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_serialize_flat() {
        let mut params = Parameters::new();
        params.insert("fast_window".to_string(), Value::Integer(12));
        params.insert("entry_z".to_string(), Value::Float(1.5));
        params.insert("signal_factor".to_string(), Value::Categorical("vwap".to_string()));
        params.insert("filter_volume".to_string(), Value::Bool(true));

        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(
            json,
            r#"{"entry_z":1.5,"fast_window":12,"filter_volume":true,"signal_factor":"vwap"}"#
        );

        let back: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_whole_float_stays_float() {
        let json = serde_json::to_string(&Value::Float(2.0)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Float(2.0));
    }
}
