// Resource & Activity data model.
// Validated newtypes follow the ValidatedPath/ValidatedDocumentId idiom in
// `types.rs`: construction fails fast, invalid values never circulate.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A globally unique resource identifier, `storageId$spaceId!opaqueId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    storage_id: String,
    space_id: String,
    opaque_id: String,
}

impl ResourceId {
    /// Parse a resource ID of the form `storageId$spaceId!opaqueId`.
    ///
    /// # Invariants
    /// - All three components are non-empty.
    /// - No whitespace in any component.
    pub fn parse(raw: &str) -> Result<Self> {
        let (storage_id, rest) = raw
            .split_once('$')
            .ok_or_else(|| Error::Validation(format!("resource id missing '$': {raw}")))?;
        let (space_id, opaque_id) = rest
            .split_once('!')
            .ok_or_else(|| Error::Validation(format!("resource id missing '!': {raw}")))?;

        if storage_id.is_empty() || space_id.is_empty() || opaque_id.is_empty() {
            return Err(Error::Validation(format!(
                "resource id has an empty component: {raw}"
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(Error::Validation(format!(
                "resource id contains whitespace: {raw}"
            )));
        }

        Ok(Self {
            storage_id: storage_id.to_string(),
            space_id: space_id.to_string(),
            opaque_id: opaque_id.to_string(),
        })
    }

    pub fn new(storage_id: impl Into<String>, space_id: impl Into<String>, opaque_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    /// True when this resource is the root of its own space
    /// (`opaque_id == space_id`, per §3's invariant on RootID).
    pub fn is_space_root(&self) -> bool {
        self.opaque_id == self.space_id
    }

    /// The RootID sharing this resource's storage/space components with the
    /// opaque id set to the space id itself.
    pub fn root_id(&self) -> ResourceId {
        Self {
            storage_id: self.storage_id.clone(),
            space_id: self.space_id.clone(),
            opaque_id: self.space_id.clone(),
        }
    }

    /// Base32 encoding used as the activity-log storage key prefix.
    pub fn to_base32(&self) -> String {
        use base32::Alphabet;
        base32::encode(Alphabet::Rfc4648 { padding: false }, self.to_string().as_bytes())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}!{}", self.storage_id, self.space_id, self.opaque_id)
    }
}

/// A space-relative path, always rooted at `./`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpacePath {
    inner: String,
}

impl SpacePath {
    /// # Invariants
    /// - Starts with `./`.
    /// - No `..` components.
    /// - No trailing slash, except the root path `./` itself.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let mut path = path.into();
        if !path.starts_with("./") {
            if path == "." {
                path = "./".to_string();
            } else {
                return Err(Error::Validation(format!(
                    "space path must start with './': {path}"
                )));
            }
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(Error::Validation(format!(
                "space path must not contain '..': {path}"
            )));
        }
        if path.len() > 2 && path.ends_with('/') {
            path.pop();
        }
        Ok(Self { inner: path })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn is_root(&self) -> bool {
        self.inner == "./"
    }

    /// Final path component (the resource's Name).
    pub fn name(&self) -> &str {
        self.inner.rsplit('/').next().unwrap_or(&self.inner)
    }

    /// True when `self` is `other` or a descendant of `other` (proper
    /// prefix + `/`), matching the Search/Delete/Restore/Purge path-prefix
    /// semantics of §4.D.
    pub fn is_self_or_descendant_of(&self, other: &SpacePath) -> bool {
        if other.is_root() {
            return true;
        }
        self.inner == other.inner || self.inner.starts_with(&format!("{}/", other.inner))
    }

    /// Rewrite `old_prefix` to `new_prefix` at the start of this path,
    /// leaving the remainder untouched. Used by Move to update descendant
    /// paths in place (§3 invariant on Move).
    pub fn rewrite_prefix(&self, old_prefix: &SpacePath, new_prefix: &SpacePath) -> Result<SpacePath> {
        if self.inner == old_prefix.inner {
            return Ok(new_prefix.clone());
        }
        let suffix = self
            .inner
            .strip_prefix(&format!("{}/", old_prefix.inner))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "path {} is not a descendant of {}",
                    self.inner, old_prefix.inner
                ))
            })?;
        SpacePath::new(format!("{}/{}", new_prefix.inner, suffix))
    }

    pub fn join(&self, child_name: &str) -> Result<SpacePath> {
        if self.is_root() {
            SpacePath::new(format!("./{child_name}"))
        } else {
            SpacePath::new(format!("{}/{child_name}", self.inner))
        }
    }
}

impl fmt::Display for SpacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// §3 `Resource.Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Container,
    Reference,
}

/// Audio sub-record (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: Option<String>,
    pub bitrate: Option<u32>,
    pub duration_ms: Option<u64>,
}

/// Image/photo sub-record (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub exif: Option<serde_json::Value>,
}

/// Geolocation sub-record (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// The indexed entity described in §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub root_id: ResourceId,
    pub parent_id: Option<ResourceId>,
    pub path: SpacePath,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub mime_type: String,
    pub resource_type: ResourceType,
    pub tags: HashSet<String>,
    pub deleted: bool,
    pub hidden: bool,
    pub content: Option<String>,
    pub audio: Option<AudioInfo>,
    pub image: Option<ImageInfo>,
    pub location: Option<LocationInfo>,
}

/// The folder MIME type convention used throughout §4.B's alias unfolding.
pub const FOLDER_MIME_TYPE: &str = "httpd/unix-directory";

impl Resource {
    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Look up a field by the canonical KQL/index field name used by
    /// `crate::kql::expand`'s key-remap table (`Name`, `MimeType`, `Hidden`,
    /// `Tags`, `Content`, `Size`, `Mtime`, `Path`, `RootID`, `ParentID`,
    /// `Deleted`). Returns `None` for unknown names, mirroring the
    /// "unknown key passes through unchanged" rule in §9.
    pub fn field(&self, canonical_name: &str) -> Option<serde_json::Value> {
        use serde_json::json;
        Some(match canonical_name {
            "Name" => json!(self.name()),
            "MimeType" => json!(self.mime_type),
            "Hidden" => json!(self.hidden),
            "Deleted" => json!(self.deleted),
            "Tags" => json!(self.tags),
            "Content" => json!(self.content.clone().unwrap_or_default()),
            "Size" => json!(self.size),
            "Mtime" => json!(self.mtime.to_rfc3339()),
            "Path" => json!(self.path.as_str()),
            "RootID" => json!(self.root_id.to_string()),
            "ParentID" => json!(self.parent_id.as_ref().map(|p| p.to_string())),
            _ => return None,
        })
    }

    /// §3 invariant: a resource with no parent is the space root.
    pub fn validate_root_invariant(&self) -> Result<()> {
        if self.id.is_space_root() {
            if self.parent_id.is_some() {
                return Err(Error::Validation(format!(
                    "space root {} must not have a parent",
                    self.id
                )));
            }
        } else if self.parent_id.is_none() {
            return Err(Error::Validation(format!(
                "non-root resource {} must have a parent",
                self.id
            )));
        }
        Ok(())
    }
}

/// A single `(event-id, depth, timestamp)` record (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub event_id: String,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn new(event_id: impl Into<String>, depth: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            depth,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_resource_id() {
        let id = ResourceId::parse("storage1$space1!opaque1").unwrap();
        assert_eq!(id.storage_id(), "storage1");
        assert_eq!(id.space_id(), "space1");
        assert_eq!(id.opaque_id(), "opaque1");
        assert_eq!(id.to_string(), "storage1$space1!opaque1");
    }

    #[test]
    fn rejects_malformed_resource_id() {
        assert!(ResourceId::parse("no-dollar!opaque").is_err());
        assert!(ResourceId::parse("storage$no-bang").is_err());
        assert!(ResourceId::parse("storage$space!").is_err());
        assert!(ResourceId::parse("storage $space!opaque").is_err());
    }

    #[test]
    fn space_root_detection() {
        let root = ResourceId::parse("storage1$space1!space1").unwrap();
        assert!(root.is_space_root());
        let child = ResourceId::parse("storage1$space1!child").unwrap();
        assert!(!child.is_space_root());
        assert_eq!(child.root_id(), root);
    }

    #[test]
    fn space_path_prefix_rewrite() {
        let old_root = SpacePath::new("./a").unwrap();
        let new_root = SpacePath::new("./x").unwrap();
        let child = SpacePath::new("./a/b").unwrap();
        let rewritten = child.rewrite_prefix(&old_root, &new_root).unwrap();
        assert_eq!(rewritten.as_str(), "./x/b");
    }

    #[test]
    fn space_path_descendant_check() {
        let root = SpacePath::new("./x").unwrap();
        assert!(SpacePath::new("./x").unwrap().is_self_or_descendant_of(&root));
        assert!(SpacePath::new("./x/b").unwrap().is_self_or_descendant_of(&root));
        assert!(!SpacePath::new("./xyz").unwrap().is_self_or_descendant_of(&root));
    }

    #[test]
    fn space_path_rejects_traversal() {
        assert!(SpacePath::new("./a/../b").is_err());
        assert!(SpacePath::new("no-leading-dot-slash").is_err());
    }

    #[test]
    fn root_invariant_validation() {
        let root_id = ResourceId::parse("s$sp!sp").unwrap();
        let mut r = Resource {
            id: root_id.clone(),
            root_id: root_id.clone(),
            parent_id: None,
            path: SpacePath::new("./").unwrap(),
            size: 0,
            mtime: Utc::now(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            resource_type: ResourceType::Container,
            tags: HashSet::new(),
            deleted: false,
            hidden: false,
            content: None,
            audio: None,
            image: None,
            location: None,
        };
        assert!(r.validate_root_invariant().is_ok());
        r.parent_id = Some(root_id);
        assert!(r.validate_root_invariant().is_err());
    }
}
