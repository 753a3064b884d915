// RangeQuery — grounded on os_dsl_query_term_level_range.go.
// Setting both gt and gte (or lt and lte) is an error, per §4.C.

use crate::dsl::{apply_value, is_empty_map, Builder};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RangeQueryOptions {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub relation: String,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub boost: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub time_zone: String,
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// §4.C's `RangeQuery<time|string>` — Rust expresses the union as an enum
/// rather than a type parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeValue {
    Time(DateTime<Utc>),
    Text(String),
}

impl RangeValue {
    fn to_json(&self) -> Value {
        match self {
            RangeValue::Time(t) => json!(t.to_rfc3339()),
            RangeValue::Text(s) => json!(s),
        }
    }
}

impl From<DateTime<Utc>> for RangeValue {
    fn from(t: DateTime<Utc>) -> Self {
        RangeValue::Time(t)
    }
}

impl From<&str> for RangeValue {
    fn from(s: &str) -> Self {
        RangeValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RangeQuery {
    field: String,
    gt: Option<RangeValue>,
    gte: Option<RangeValue>,
    lt: Option<RangeValue>,
    lte: Option<RangeValue>,
    options: RangeQueryOptions,
}

impl RangeQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            options: RangeQueryOptions::default(),
        }
    }

    pub fn options(mut self, options: RangeQueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn gt(mut self, v: impl Into<RangeValue>) -> Self {
        self.gt = Some(v.into());
        self
    }

    pub fn gte(mut self, v: impl Into<RangeValue>) -> Self {
        self.gte = Some(v.into());
        self
    }

    pub fn lt(mut self, v: impl Into<RangeValue>) -> Self {
        self.lt = Some(v.into());
        self
    }

    pub fn lte(mut self, v: impl Into<RangeValue>) -> Self {
        self.lte = Some(v.into());
        self
    }
}

impl Builder for RangeQuery {
    fn to_map(&self) -> Result<Option<Value>> {
        if self.gt.is_some() && self.gte.is_some() {
            return Err(Error::InvalidQuery(
                "cannot set both gt and gte in RangeQuery".to_string(),
            ));
        }
        if self.lt.is_some() && self.lte.is_some() {
            return Err(Error::InvalidQuery(
                "cannot set both lt and lte in RangeQuery".to_string(),
            ));
        }

        let mut data = match serde_json::to_value(&self.options)? {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        for (key, value) in [
            ("gt", &self.gt),
            ("gte", &self.gte),
            ("lt", &self.lt),
            ("lte", &self.lte),
        ] {
            if let Some(v) = value {
                apply_value(&mut data, key, v.to_json());
            }
        }

        if is_empty_map(&data) {
            return Ok(None);
        }

        Ok(Some(json!({ "range": { self.field.clone(): data } })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_both_gt_and_gte() {
        let q = RangeQuery::new("Mtime").gt("2024-01-01").gte("2024-02-01");
        assert!(q.to_map().is_err());
    }

    #[test]
    fn emits_range_shape_for_datetime() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let q = RangeQuery::new("Mtime").gt(ts);
        let v = q.to_json().unwrap();
        assert!(v["range"]["Mtime"]["gt"].is_string());
    }
}
