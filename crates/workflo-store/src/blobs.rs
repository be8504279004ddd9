//! Blob store: media attachments are uploaded here first and the message
//! carries the resulting URL as its body.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use workflo_shared::constants::MAX_ATTACHMENT_SIZE;

use crate::error::{Result, StoreError};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a blob and return a retrievable URL.
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String>;
}

/// In-memory blob store, addressable with `memstore://` URLs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
    fail_next_upload: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `upload` fail. Used by tests to verify that a failed
    /// upload aborts before any append.
    pub fn fail_next_upload(&self) {
        self.fail_next_upload.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String> {
        if bytes.len() > MAX_ATTACHMENT_SIZE {
            return Err(StoreError::TooLarge {
                size: bytes.len(),
                limit: MAX_ATTACHMENT_SIZE,
            });
        }
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("upload rejected".into()));
        }

        let size = bytes.len();
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), bytes);

        debug!(path = %path, size, "Blob stored");
        Ok(format!("memstore://{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_returns_url() {
        let store = MemoryBlobStore::new();
        let url = store
            .upload("media/chat_a_b/1_photo.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(url, "memstore://media/chat_a_b/1_photo.png");
        assert_eq!(store.get("media/chat_a_b/1_photo.png").unwrap(), "png");
    }

    #[tokio::test]
    async fn test_failed_upload_stores_nothing() {
        let store = MemoryBlobStore::new();
        store.fail_next_upload();
        assert!(store.upload("p", Bytes::from_static(b"x")).await.is_err());
        assert!(store.get("p").is_none());
    }
}
