// Backend-DSL builder library — §4.C.
//
// Composable, serialisable query builders whose `to_map()` produces a
// canonical JSON object and whose `Serialize` impl is that same emission
// format. Grounded 1:1 on one Go file per builder kind under
// examples/original_source/services/search/pkg/opensearch/os_dsl*.go —
// `Builder` here plays the role of the Go `osu.Builder` interface
// (`Map() (map[string]any, error)` + JSON marshaling).
//
// Contract (§4.C): empty/default builders elide keys; an all-empty builder
// serialises to `null`; merging two option structs is a deep merge with
// later keys winning (`Options::merge`).

pub mod bool_query;
pub mod ids;
pub mod match_phrase;
pub mod range;
pub mod root;
pub mod term;
pub mod wildcard;

pub use bool_query::{BoolQuery, BoolQueryOptions};
pub use ids::{IDsQuery, IDsQueryOptions};
pub use match_phrase::{MatchPhraseQuery, MatchPhraseQueryOptions};
pub use range::{RangeQuery, RangeQueryOptions, RangeValue};
pub use root::{RootQuery, RootQueryHighlight, RootQueryOptions};
pub use term::{TermQuery, TermQueryOptions, TermValue};
pub use wildcard::{Rewrite, WildcardQuery, WildcardQueryOptions};

use crate::errors::Result;
use serde_json::Value;
use std::fmt::Debug;

/// A query-tree node that can render itself to the backend's canonical JSON
/// shape. `to_map` returns `None` when the builder is empty — callers
/// serialise that as JSON `null`, matching the "null maps return null"
/// clause of §4.C.
pub trait Builder: Debug {
    fn to_map(&self) -> Result<Option<Value>>;

    fn to_json(&self) -> Result<Value> {
        Ok(self.to_map()?.unwrap_or(Value::Null))
    }
}

impl Builder for Box<dyn Builder> {
    fn to_map(&self) -> Result<Option<Value>> {
        (**self).to_map()
    }
}

/// Insert `key: value` into `target` unless `value` serialises to an "empty"
/// JSON value (`null`, `""`, `0`, `[]`, `{}`) — mirrors the Go
/// `applyValue`/`isEmpty` helpers in `os_dsl.go`. A bool is never empty,
/// regardless of its value — `osu.go`'s `isEmpty` explicitly special-cases
/// bools to `return false` before the zero-value switch runs.
pub(crate) fn apply_value(target: &mut serde_json::Map<String, Value>, key: &str, value: Value) {
    if key.is_empty() || is_empty_json(&value) {
        return;
    }
    target.insert(key.to_string(), value);
}

pub(crate) fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(_) => false,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

pub(crate) fn is_empty_map(map: &serde_json::Map<String, Value>) -> bool {
    map.is_empty()
}
