// Index-template / schema manager — §4.E.
//
// Bundled schema JSON embedded via `include_str!`, mirroring the Go
// `//go:embed internal/indices/*.json` directive in `os_index_template.go`.
// Parsed once and compared key-wise to the live index's reported mapping
// and settings; any watched-key drift refuses to proceed.

use crate::errors::{Error, Result};
use serde_json::Value;

/// A versioned schema asset, e.g. `resource_v1`.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    pub name: &'static str,
    body: &'static str,
}

pub const RESOURCE_V1: IndexTemplate = IndexTemplate {
    name: "resource_v1",
    body: include_str!("schema_assets/resource_v1.json"),
};

/// Settings/mapping keys checked for drift between the bundled template
/// and a live index's reported state. Any other key may differ silently.
const WATCHED_SETTINGS_KEYS: &[&str] = &["number_of_shards"];

impl IndexTemplate {
    /// Parse the bundled schema once.
    pub fn parsed(&self) -> Result<Value> {
        serde_json::from_str(self.body).map_err(Error::from)
    }

    /// Deterministic JSON rendering of the bundled schema, for diagnostics.
    pub fn render(&self) -> Result<String> {
        let value = self.parsed()?;
        serde_json::to_string_pretty(&value).map_err(Error::from)
    }

    /// Compare the bundled template against a live index's reported
    /// mapping/settings. Returns `Ok(())` if no watched key differs;
    /// `ManualActionRequired` otherwise. Never silently migrates.
    pub fn check_drift(&self, live_mapping_settings: &Value) -> Result<()> {
        let bundled = self.parsed()?;
        let bundled_settings = bundled
            .pointer("/template/settings")
            .cloned()
            .unwrap_or(Value::Null);
        let live_settings = live_mapping_settings
            .pointer("/settings")
            .cloned()
            .unwrap_or(Value::Null);

        for key in WATCHED_SETTINGS_KEYS {
            let bundled_value = bundled_settings.get(key);
            let live_value = live_settings.get(key);
            if bundled_value != live_value {
                return Err(Error::ManualActionRequired(format!(
                    "index template {} setting {} drifted: bundled={:?} live={:?}",
                    self.name, key, bundled_value, live_value
                )));
            }
        }

        let bundled_props = bundled
            .pointer("/template/mappings/properties")
            .and_then(Value::as_object);
        let live_props = live_mapping_settings
            .pointer("/mappings/properties")
            .and_then(Value::as_object);

        if let (Some(bundled_props), Some(live_props)) = (bundled_props, live_props) {
            for (field, bundled_spec) in bundled_props {
                if let Some(live_spec) = live_props.get(field) {
                    let bundled_type = bundled_spec.get("type");
                    let live_type = live_spec.get("type");
                    if bundled_type != live_type {
                        return Err(Error::ManualActionRequired(format!(
                            "index template {} field {} type drifted: bundled={:?} live={:?}",
                            self.name, field, bundled_type, live_type
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_template_parses() {
        let value = RESOURCE_V1.parsed().unwrap();
        assert_eq!(
            value["template"]["mappings"]["properties"]["Name"]["type"],
            "text"
        );
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(RESOURCE_V1.render().unwrap(), RESOURCE_V1.render().unwrap());
    }

    #[test]
    fn identical_live_state_has_no_drift() {
        let live = serde_json::json!({
            "settings": { "number_of_shards": 1 },
            "mappings": { "properties": { "Name": { "type": "text" } } }
        });
        assert!(RESOURCE_V1.check_drift(&live).is_ok());
    }

    #[test]
    fn shard_count_drift_is_fatal() {
        let live = serde_json::json!({
            "settings": { "number_of_shards": 3 },
            "mappings": { "properties": {} }
        });
        let err = RESOURCE_V1.check_drift(&live).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn field_type_drift_is_fatal() {
        let live = serde_json::json!({
            "settings": { "number_of_shards": 1 },
            "mappings": { "properties": { "Name": { "type": "keyword" } } }
        });
        let err = RESOURCE_V1.check_drift(&live).unwrap_err();
        assert!(err.is_fatal());
    }
}
