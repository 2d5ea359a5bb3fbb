//! Filesystem-backed storage provider (C3).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::models::object::{classify, FileListElement, GetObjectInfo};
use crate::storage::{ObjectBody, StorageError, StorageProvider, StorageResult};

const MIME_XATTR: &str = "user.mimetype";

pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, object_key: &str) -> PathBuf {
        self.root.join(object_key.trim_start_matches('/'))
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    async fn save_object(&self, body: Bytes, object_key: &str) -> StorageResult<()> {
        let path = self.resolve(object_key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileAlreadyExists);
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(&body).await?;
        file.flush().await?;

        if let Ok(mime) = detect_mime(&path).await {
            let xattr_path = path.clone();
            let _ = tokio::task::spawn_blocking(move || xattr::set(&xattr_path, MIME_XATTR, mime.as_bytes())).await;
        }
        Ok(())
    }

    async fn delete_object(&self, object_key: &str) -> StorageResult<()> {
        let path = self.resolve(object_key);
        let meta = fs::metadata(&path)
            .await
            .map_err(|_| StorageError::ResourceNotExists)?;

        if meta.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }

        if let Some(parent) = path.parent() {
            if parent != self.root {
                if let Ok(mut entries) = fs::read_dir(parent).await {
                    if entries.next_entry().await.ok().flatten().is_none() {
                        let _ = fs::remove_dir(parent).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_object(&self, object_key: &str) -> StorageResult<(ObjectBody, GetObjectInfo)> {
        let path = self.resolve(object_key);
        let meta = fs::metadata(&path)
            .await
            .map_err(|_| StorageError::ResourceNotExists)?;
        if meta.is_dir() {
            return Err(StorageError::ResourceNotExists);
        }

        let file = fs::File::open(&path)
            .await
            .map_err(|_| StorageError::ResourceNotExists)?;

        let content_type = read_mime(&path).await;
        let last_modified: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());

        let info = GetObjectInfo {
            content_type,
            content_length: meta.len() as i64,
            last_modified,
        };
        Ok((Box::new(file), info))
    }

    async fn get_file_list(&self, prefix: &str) -> StorageResult<Vec<FileListElement>> {
        let dir_path = self.resolve(prefix);
        let meta = fs::metadata(&dir_path)
            .await
            .map_err(|_| StorageError::ResourceNotExists)?;
        if !meta.is_dir() {
            return Err(StorageError::PathIsNotDir);
        }

        let mut entries = fs::read_dir(&dir_path).await?;
        let mut list = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(%err, "failed to read directory entry");
                    continue;
                }
            };

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(err) => {
                    tracing::debug!(%err, "failed to stat directory entry");
                    continue;
                }
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::debug!(%err, "failed to read entry metadata");
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = file_type.is_dir();
            let mut object_key = join_prefix(prefix, &name);
            if is_dir {
                object_key.push('/');
            }

            let (size, last_modified, kind) = if is_dir {
                (0, String::new(), classify("", true))
            } else {
                let mime = read_mime(&entry.path()).await;
                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default();
                (meta.len() as i64, last_modified, classify(&mime, false))
            };

            list.push(FileListElement {
                name,
                size,
                kind,
                last_modified,
                object_key,
            });
        }
        Ok(list)
    }
}

fn join_prefix(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

async fn read_mime(path: &Path) -> String {
    if let Ok(mime) = xattr_get(path).await {
        return mime;
    }
    detect_mime(path).await.unwrap_or_else(|_| "application/octet-stream".to_string())
}

async fn xattr_get(path: &Path) -> Result<String, ()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        xattr::get(&path, MIME_XATTR)
            .ok()
            .flatten()
            .filter(|v| !v.is_empty())
            .and_then(|v| String::from_utf8(v).ok())
    })
    .await
    .ok()
    .flatten()
    .ok_or(())
}

async fn detect_mime(path: &Path) -> Result<String, ()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if let Ok(Some(kind)) = infer::get_from_path(&path) {
            return kind.mime_type().to_string();
        }
        mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    })
    .await
    .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path());

        provider
            .save_object(Bytes::from_static(b"hi"), "hello.txt")
            .await
            .unwrap();

        let (mut body, info) = provider.get_object("hello.txt").await.unwrap();
        assert_eq!(info.content_length, 2);
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body, &mut buf).await.unwrap();
        assert_eq!(buf, b"hi");

        provider.delete_object("hello.txt").await.unwrap();
        assert!(matches!(
            provider.get_object("hello.txt").await,
            Err(StorageError::ResourceNotExists)
        ));
    }

    #[tokio::test]
    async fn save_rejects_existing() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path());
        provider
            .save_object(Bytes::from_static(b"a"), "x.txt")
            .await
            .unwrap();
        let err = provider
            .save_object(Bytes::from_static(b"b"), "x.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::FileAlreadyExists));
    }

    #[tokio::test]
    async fn list_marks_directories() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path());
        provider
            .save_object(Bytes::from_static(b"hi"), "sub/hello.txt")
            .await
            .unwrap();

        let list = provider.get_file_list("").await.unwrap();
        let sub = list.iter().find(|e| e.name == "sub").unwrap();
        assert!(sub.object_key.ends_with('/'));
        assert_eq!(sub.size, 0);
    }

    #[tokio::test]
    async fn get_missing_fails() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path());
        let err = provider.get_object("missing.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::ResourceNotExists));
    }
}
