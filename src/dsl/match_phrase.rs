// MatchPhraseQuery — grounded on os_dsl_query_full_text_match_phrase.go.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchPhraseQueryOptions {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub analyzer: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub slop: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zero_terms_query: String,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

#[derive(Debug, Clone)]
pub struct MatchPhraseQuery {
    field: String,
    query: Option<String>,
    options: MatchPhraseQueryOptions,
}

impl MatchPhraseQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            query: None,
            options: MatchPhraseQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: MatchPhraseQueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn query(mut self, value: impl Into<String>) -> Self {
        self.query = Some(value.into());
        self
    }
}

impl Builder for MatchPhraseQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        if let Some(query) = &self.query {
            apply_value(&mut data, "query", json!(query));
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "match_phrase": { self.field.clone(): data } })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_match_phrase_shape() {
        let q = MatchPhraseQuery::new("Content").query("hello world");
        let v = q.to_json().unwrap();
        assert_eq!(v["match_phrase"]["Content"]["query"], json!("hello world"));
    }
}
