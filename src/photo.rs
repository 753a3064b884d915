// Profile-photo blob service — §4.J.
//
// Grounded on
// `examples/original_source/services/graph/pkg/service/v0/photo.go`'s
// `getPhoto`/`updatePhoto` shape (`profilephoto`/`user` constants,
// empty-body rejection, lazily-initialised storage client) and
// `pkg/systemstorageclient/systemstorageclient.go`'s reserved-space
// convention, adapted to an in-process blob store trait rather than a
// CS3 gateway RPC.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// The fixed namespace/scope/identifier triple the original storage
/// client paths profile photos under (`/<scope>/*/<namespace>/*`).
pub const NAMESPACE: &str = "profilephoto";
pub const SCOPE: &str = "user";
pub const IDENTIFIER: &str = "profilephoto";

/// A single fixed "space" reserved for every profile photo blob,
/// regardless of which user it belongs to. Computed once from a fixed
/// name so every process in a deployment agrees on it without
/// coordination.
pub fn reserved_space_id() -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, b"kota-db:profilephoto")
}

/// The blob persistence contract this service needs — narrowed from the
/// full object-storage surface to exactly `get`/`put`/`delete` keyed by
/// opaque blob name, mirroring `SimpleDownload`/`SimpleUpload`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, space_id: Uuid, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, space_id: Uuid, key: &str, content: Vec<u8>) -> Result<()>;
    async fn delete(&self, space_id: Uuid, key: &str) -> Result<()>;
}

/// Magic-byte tables good enough to cover the common photo formats,
/// equivalent in spirit to Go's `http.DetectContentType` restricted to
/// images: checked against the first bytes of the body, never trusting a
/// caller-supplied content-type header.
fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const GIF87: &[u8] = b"GIF87a";
    const GIF89: &[u8] = b"GIF89a";
    const WEBP_RIFF: &[u8] = b"RIFF";
    const WEBP_TAG: &[u8] = b"WEBP";

    if bytes.starts_with(JPEG) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(PNG) {
        return Some("image/png");
    }
    if bytes.starts_with(GIF87) || bytes.starts_with(GIF89) {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(WEBP_RIFF) && &bytes[8..12] == WEBP_TAG {
        return Some("image/webp");
    }
    None
}

/// The profile-photo service: `Get`/`Upsert`/`Delete` keyed by user id
/// (§4.J). Content-type is never taken from the caller; it is sniffed
/// from the body's magic bytes and must resolve to an `image/*` type.
pub struct ProfilePhotoService {
    store: Arc<dyn BlobStore>,
    space_id: Uuid,
}

impl ProfilePhotoService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            space_id: reserved_space_id(),
        }
    }

    /// Read the photo blob for `user_id`, or `Ok(None)` if none is set.
    pub async fn get(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(self.space_id, user_id).await
    }

    /// Replace the photo blob for `user_id`. Rejects an empty body and
    /// any body that doesn't sniff as an image.
    pub async fn upsert(&self, user_id: &str, content: Vec<u8>) -> Result<()> {
        if content.is_empty() {
            return Err(Error::Validation("empty photo body".into()));
        }
        let Some(content_type) = sniff_content_type(&content) else {
            return Err(Error::Validation("photo body is not a recognized image format".into()));
        };
        let _ = content_type;
        self.store.put(self.space_id, user_id, content).await
    }

    pub async fn delete(&self, user_id: &str) -> Result<()> {
        self.store.delete(self.space_id, user_id).await
    }
}
