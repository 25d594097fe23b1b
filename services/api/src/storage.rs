use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use kivendi_common::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("image of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidImage(_) | StorageError::TooLarge { .. } => {
                AppError::Validation(err.to_string())
            }
            StorageError::Io(e) => AppError::Internal(format!("object store failure: {}", e)),
        }
    }
}

/// Holds ad and chat images and hands back their public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_bytes(&self, blobs: Vec<Vec<u8>>) -> Result<Vec<String>, StorageError>;

    async fn delete_images(&self, urls: &[String]) -> Result<(), StorageError>;

    /// Accepts raw base64 or `data:image/...;base64,` URLs.
    async fn upload_base64_images(&self, images: &[String]) -> Result<Vec<String>, StorageError> {
        let blobs = images
            .iter()
            .map(|image| decode_base64_image(image))
            .collect::<Result<Vec<_>, _>>()?;
        self.upload_bytes(blobs).await
    }
}

/// Deletes `urls` on a detached task. Failures are logged.
pub fn spawn_delete(store: Arc<dyn ObjectStore>, urls: Vec<String>) {
    if urls.is_empty() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = store.delete_images(&urls).await {
            tracing::warn!(error = %e, count = urls.len(), "failed to delete images");
        }
    });
}

pub fn decode_base64_image(image: &str) -> Result<Vec<u8>, StorageError> {
    let payload = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| StorageError::InvalidImage(format!("not base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(StorageError::InvalidImage("empty image".to_string()));
    }
    Ok(bytes)
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// Writes images under a local directory that the HTTP edge serves at `/media`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
    max_image_bytes: usize,
}

impl LocalObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root_dir),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            max_image_bytes: config.max_image_bytes,
        }
    }

    async fn discard_partial(&self, urls: &[String]) {
        if let Err(e) = self.delete_images(urls).await {
            tracing::warn!(error = %e, count = urls.len(), "failed to remove partial upload");
        }
    }

    fn file_name_for(&self, url: &str) -> Option<String> {
        let name = url.strip_prefix(&self.public_base_url)?.trim_start_matches('/');
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.starts_with('.');
        valid.then(|| name.to_string())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_bytes(&self, blobs: Vec<Vec<u8>>) -> Result<Vec<String>, StorageError> {
        let mut planned = Vec::with_capacity(blobs.len());
        for bytes in blobs {
            if bytes.len() > self.max_image_bytes {
                return Err(StorageError::TooLarge {
                    size: bytes.len(),
                    max: self.max_image_bytes,
                });
            }
            let extension = sniff_extension(&bytes).ok_or_else(|| {
                StorageError::InvalidImage("unsupported image format".to_string())
            })?;
            planned.push((format!("{}.{}", Uuid::new_v4(), extension), bytes));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let mut urls = Vec::with_capacity(planned.len());
        for (name, bytes) in planned {
            if let Err(e) = tokio::fs::write(self.root.join(&name), bytes).await {
                // Partial uploads are removed before reporting the failure.
                self.discard_partial(&urls).await;
                return Err(e.into());
            }
            urls.push(format!("{}/{}", self.public_base_url, name));
        }
        Ok(urls)
    }

    async fn delete_images(&self, urls: &[String]) -> Result<(), StorageError> {
        for url in urls {
            let Some(name) = self.file_name_for(url) else {
                tracing::debug!(url = %url, "not a local media url, skipping delete");
                continue;
            };
            match tokio::fs::remove_file(self.root.join(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn store(root: &std::path::Path, max: usize) -> LocalObjectStore {
        LocalObjectStore::new(&StorageConfig {
            root_dir: root.to_string_lossy().to_string(),
            public_base_url: "http://cdn.test/media/".to_string(),
            max_image_bytes: max,
            max_body_bytes: 1024,
        })
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("kivendi-store-{}", Uuid::new_v4()))
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let encoded = STANDARD.encode(PNG_HEADER);
        let decoded = decode_base64_image(&format!("data:image/png;base64,{}", encoded)).unwrap();
        assert_eq!(decoded, PNG_HEADER);
        assert!(decode_base64_image("%%%").is_err());
        assert!(decode_base64_image("").is_err());
    }

    #[test]
    fn only_known_image_formats_are_accepted() {
        assert_eq!(sniff_extension(PNG_HEADER), Some("png"));
        assert_eq!(sniff_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_extension(b"#!/bin/sh"), None);
    }

    #[test]
    fn foreign_and_traversal_urls_do_not_map_to_files() {
        let store = store(&scratch_dir(), 1024);
        assert_eq!(
            store.file_name_for("http://cdn.test/media/abc.png").as_deref(),
            Some("abc.png")
        );
        assert!(store.file_name_for("http://other.test/media/abc.png").is_none());
        assert!(store.file_name_for("http://cdn.test/media/../etc/passwd").is_none());
    }

    #[tokio::test]
    async fn upload_then_delete_round_trip_on_disk() {
        let root = scratch_dir();
        let store = store(&root, 1024);
        let encoded = STANDARD.encode(PNG_HEADER);

        let urls = store.upload_base64_images(&[encoded]).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("http://cdn.test/media/"));
        let name = store.file_name_for(&urls[0]).unwrap();
        assert!(root.join(&name).exists());

        store.delete_images(&urls).await.unwrap();
        assert!(!root.join(&name).exists());
        // deleting twice is fine
        store.delete_images(&urls).await.unwrap();
    }

    #[tokio::test]
    async fn partial_upload_cleanup_survives_delete_errors() {
        let root = scratch_dir();
        let store = store(&root, 1024);
        let written = store.upload_bytes(vec![PNG_HEADER.to_vec()]).await.unwrap();
        let name = store.file_name_for(&written[0]).unwrap();

        store.discard_partial(&written).await;
        assert!(!root.join(&name).exists());

        // a directory in place of a file makes remove_file fail
        tokio::fs::create_dir_all(root.join("stuck.png")).await.unwrap();
        store
            .discard_partial(&["http://cdn.test/media/stuck.png".to_string()])
            .await;
        assert!(root.join("stuck.png").is_dir());
    }

    #[tokio::test]
    async fn oversized_image_is_rejected_before_writing() {
        let root = scratch_dir();
        let store = store(&root, 4);
        let err = store.upload_bytes(vec![PNG_HEADER.to_vec()]).await.unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { max: 4, .. }));
        assert!(!root.exists());
    }
}
