// BoolQuery — grounded on dsl_query_bool.go.

use crate::dsl::{is_empty_map, Builder};
use crate::errors::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoolQueryOptions {
    #[serde(skip_serializing_if = "is_zero_i16", rename = "minimum_should_match")]
    pub minimum_should_match: i16,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub boost: f32,
    #[serde(rename = "_name", skip_serializing_if = "String::is_empty")]
    pub name: String,
}

fn is_zero_i16(v: &i16) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Debug, Default)]
pub struct BoolQuery {
    must: Vec<Box<dyn Builder>>,
    must_not: Vec<Box<dyn Builder>>,
    should: Vec<Box<dyn Builder>>,
    filter: Vec<Box<dyn Builder>>,
    options: BoolQueryOptions,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: BoolQueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn must(mut self, b: Box<dyn Builder>) -> Self {
        self.must.push(b);
        self
    }

    pub fn must_not(mut self, b: Box<dyn Builder>) -> Self {
        self.must_not.push(b);
        self
    }

    pub fn should(mut self, b: Box<dyn Builder>) -> Self {
        self.should.push(b);
        self
    }

    pub fn filter(mut self, b: Box<dyn Builder>) -> Self {
        self.filter.push(b);
        self
    }

    pub fn set_minimum_should_match(&mut self, n: i16) {
        self.options.minimum_should_match = n;
    }

    fn render_clauses(clauses: &[Box<dyn Builder>]) -> Result<Option<Value>> {
        let mut rendered = Vec::new();
        for b in clauses {
            if let Some(v) = b.to_map()? {
                rendered.push(v);
            }
        }
        if rendered.is_empty() {
            Ok(None)
        } else {
            Ok(Some(json!(rendered)))
        }
    }
}

impl Builder for BoolQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        for (key, clauses) in [
            ("must", &self.must),
            ("must_not", &self.must_not),
            ("should", &self.should),
            ("filter", &self.filter),
        ] {
            if let Some(v) = Self::render_clauses(clauses)? {
                data.insert(key.to_string(), v);
            }
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "bool": data })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::TermQuery;

    #[test]
    fn empty_bool_query_is_null() {
        assert_eq!(BoolQuery::new().to_json().unwrap(), Value::Null);
    }

    #[test]
    fn bool_query_renders_must_should_and_min_should_match() {
        let mut q = BoolQuery::new()
            .must(Box::new(TermQuery::new("Name").value("a")))
            .should(Box::new(TermQuery::new("Name").value("b")))
            .should(Box::new(TermQuery::new("Name").value("c")));
        q.set_minimum_should_match(1);

        let v = q.to_json().unwrap();
        assert_eq!(v["bool"]["must"].as_array().unwrap().len(), 1);
        assert_eq!(v["bool"]["should"].as_array().unwrap().len(), 2);
        assert_eq!(v["bool"]["minimum_should_match"], json!(1));
    }
}
