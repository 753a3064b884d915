// RootQuery — grounded on os_dsl_query_root.go.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RootQueryHighlight {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_tags: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, RootQueryHighlight>,
}

impl RootQueryHighlight {
    /// Highlighting on `Content` with `<mark>…</mark>` tags, per §4.D.
    pub fn content_marks() -> Self {
        let mut fields = HashMap::new();
        fields.insert("Content".to_string(), RootQueryHighlight::default());
        Self {
            pre_tags: vec!["<mark>".to_string()],
            post_tags: vec!["</mark>".to_string()],
            fields,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RootQueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<RootQueryHighlight>,
}

#[derive(Debug)]
pub struct RootQuery {
    query: Box<dyn Builder>,
    options: RootQueryOptions,
}

impl RootQuery {
    pub fn new(query: Box<dyn Builder>) -> Self {
        Self {
            query,
            options: RootQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: RootQueryOptions) -> Self {
        self.options = options;
        self
    }
}

impl Builder for RootQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        if let Some(q) = self.query.to_map()? {
            apply_value(&mut data, "query", q);
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(Value::Object(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::TermQuery;

    #[test]
    fn wraps_inner_query_under_query_key() {
        let root = RootQuery::new(Box::new(TermQuery::new("Name").value("a")));
        let v = root.to_json().unwrap();
        assert_eq!(v["query"]["term"]["Name"]["value"], "a");
    }

    #[test]
    fn highlight_option_is_emitted() {
        let root = RootQuery::new(Box::new(TermQuery::new("Name").value("a"))).options(
            RootQueryOptions {
                highlight: Some(RootQueryHighlight::content_marks()),
            },
        );
        let v = root.to_json().unwrap();
        assert_eq!(v["highlight"]["pre_tags"][0], "<mark>");
    }
}
