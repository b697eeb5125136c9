use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{MediaKind, MediaStore, UploadItem};
use crate::storage::StorageClient;

/// `MediaStore` backed by an object storage bucket with public reads.
#[derive(Clone)]
pub struct StorageMediaStore {
    storage: Arc<dyn StorageClient>,
    public_base_url: String,
}

impl StorageMediaStore {
    pub fn new(storage: Arc<dyn StorageClient>, public_base_url: impl Into<String>) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn key_for(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl MediaStore for StorageMediaStore {
    async fn upload(&self, kind: MediaKind, item: UploadItem) -> anyhow::Result<String> {
        anyhow::ensure!(!item.body.is_empty(), "empty upload");

        let ext = ext_from_mime(&item.content_type).unwrap_or("bin");
        let key = format!("{}/{}.{}", kind.folder(), Uuid::new_v4(), ext);
        self.storage
            .put_object(&key, item.body, &item.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;

        debug!(%key, "media uploaded");
        Ok(self.url_for(&key))
    }

    async fn discard(&self, url: &str) -> anyhow::Result<()> {
        let Some(key) = self.key_for(url) else {
            anyhow::bail!("url not served by this store: {url}");
        };
        self.storage
            .delete_object(&key)
            .await
            .with_context(|| format!("delete_object {}", key))
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
