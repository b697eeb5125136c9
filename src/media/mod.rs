//! Media Store: uploads profile images and hands back their public URL.

mod services;

use async_trait::async_trait;
use bytes::Bytes;

pub use services::StorageMediaStore;

/// A file received from the client, held in memory.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Where an upload is filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Avatar,
    Cover,
}

impl MediaKind {
    pub fn folder(self) -> &'static str {
        match self {
            MediaKind::Avatar => "avatars",
            MediaKind::Cover => "covers",
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store the file and return its public URL.
    async fn upload(&self, kind: MediaKind, item: UploadItem) -> anyhow::Result<String>;

    /// Best-effort removal of a previously uploaded file.
    async fn discard(&self, url: &str) -> anyhow::Result<()>;
}
