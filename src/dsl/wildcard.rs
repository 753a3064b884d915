// WildcardQuery — grounded on os_dsl_query_term_level_wildcard.go.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rewrite {
    ConstantScore,
    ScoringBoolean,
    ConstantScoreBoolean,
    TopTermsN,
    TopTermsBoostN,
    TopTermsBlendedFreqsN,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WildcardQueryOptions {
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub boost: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub case_insensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<Rewrite>,
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Debug, Clone)]
pub struct WildcardQuery {
    field: String,
    value: Option<String>,
    options: WildcardQueryOptions,
}

impl WildcardQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            options: WildcardQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: WildcardQueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl Builder for WildcardQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        if let Some(value) = &self.value {
            apply_value(&mut data, "value", json!(value));
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "wildcard": { self.field.clone(): data } })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_wildcard_shape() {
        let q = WildcardQuery::new("MimeType").value("image/*");
        let v = q.to_json().unwrap();
        assert_eq!(v["wildcard"]["MimeType"]["value"], json!("image/*"));
    }

    #[test]
    fn empty_is_null() {
        assert_eq!(WildcardQuery::new("x").to_json().unwrap(), Value::Null);
    }
}
