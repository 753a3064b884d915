// IDsQuery — grounded on os_dsl_query_term_level_ids.go.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IDsQueryOptions {
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub boost: f32,
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Debug, Clone)]
pub struct IDsQuery {
    values: Vec<String>,
    options: IDsQueryOptions,
}

impl IDsQuery {
    /// Duplicates are removed (order of first occurrence preserved), per
    /// §4.C.
    pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut seen = HashSet::new();
        let deduped: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| seen.insert(v.clone()))
            .collect();
        Self {
            values: deduped,
            options: IDsQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: IDsQueryOptions) -> Self {
        self.options = options;
        self
    }
}

impl Builder for IDsQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        apply_value(&mut data, "values", json!(self.values));

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "ids": data })))
    }
}
