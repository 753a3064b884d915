// TermQuery — grounded on os_dsl_query_term_level_term.go.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, Serialize)]
pub struct TermQueryOptions {
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub boost: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub case_insensitive: bool,
    #[serde(rename = "_name", skip_serializing_if = "String::is_empty")]
    pub name: String,
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

impl TermQueryOptions {
    /// Deep merge: later (`self`) non-default fields win over `base`.
    pub fn merge(base: TermQueryOptions, overrides: TermQueryOptions) -> TermQueryOptions {
        TermQueryOptions {
            boost: if overrides.boost != 0.0 {
                overrides.boost
            } else {
                base.boost
            },
            case_insensitive: overrides.case_insensitive || base.case_insensitive,
            name: if !overrides.name.is_empty() {
                overrides.name
            } else {
                base.name
            },
        }
    }
}

/// A value a `TermQuery` can hold — a closed set since the backend DSL only
/// needs string and boolean term values (§4.C's `TermQuery<T>`).
#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    Text(String),
    Bool(bool),
}

impl From<&str> for TermValue {
    fn from(s: &str) -> Self {
        TermValue::Text(s.to_string())
    }
}

impl From<String> for TermValue {
    fn from(s: String) -> Self {
        TermValue::Text(s)
    }
}

impl From<bool> for TermValue {
    fn from(b: bool) -> Self {
        TermValue::Bool(b)
    }
}

#[derive(Debug, Clone)]
pub struct TermQuery {
    field: String,
    value: Option<TermValue>,
    options: TermQueryOptions,
}

impl TermQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            options: TermQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: TermQueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn value(mut self, value: impl Into<TermValue>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl Builder for TermQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        if let Some(value) = &self.value {
            let v = match value {
                TermValue::Text(s) if !s.is_empty() => Some(json!(s)),
                TermValue::Bool(b) => Some(json!(b)),
                _ => None,
            };
            if let Some(v) = v {
                apply_value(&mut data, "value", v);
            }
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "term": { self.field.clone(): data } })))
    }
}
