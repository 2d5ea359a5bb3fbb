//! Storage-provider interface (C2) and the bucket registry (C6).

pub mod local;
pub mod registry;
pub mod s3;
pub mod s3_connection;

use crate::errors::AppError;
use crate::models::object::{FileListElement, GetObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

/// Byte stream returned by `GetObject`. Boxed so `Local` (a `tokio::fs::File`)
/// and `S3` (an `aws_smithy_types::byte_stream::ByteStream` adapted via
/// `into_async_read`) can share one object-safe trait method.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Errors a storage provider can surface. Deliberately narrower than
/// `AppError` — providers know nothing about HTTP codes or log levels, only
/// about the taxonomy entries that apply to storage operations (§7).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("resource not exists")]
    ResourceNotExists,
    #[error("path is not a directory")]
    PathIsNotDir,
    #[error("file already exists")]
    FileAlreadyExists,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ResourceNotExists => AppError::ResourceNotExists,
            StorageError::PathIsNotDir => AppError::PathIsNotDir,
            StorageError::FileAlreadyExists => AppError::FileAlreadyExists,
            StorageError::Io(io_err) => io_err.into(),
            StorageError::Other(err) => {
                tracing::error!(%err, "unrecognised storage error");
                AppError::ServerError
            }
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Capability set {save, delete, get, list} exposed uniformly over Local and
/// S3 back ends (§4.2). Stored in the registry as `Arc<dyn StorageProvider>`
/// — bucket code never down-casts to a concrete variant.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Persist `body` at `object_key`. Parent "directories" are created
    /// implicitly. Overwrite-vs-reject policy is provider-specific (§9).
    async fn save_object(&self, body: Bytes, object_key: &str) -> StorageResult<()>;

    /// Remove the object, or (if `object_key` ends in `/`) the whole subtree.
    async fn delete_object(&self, object_key: &str) -> StorageResult<()>;

    /// Fetch an object's bytes and metadata. Fails with `ResourceNotExists`
    /// if missing or if the key resolves to a directory.
    async fn get_object(&self, object_key: &str) -> StorageResult<(ObjectBody, GetObjectInfo)>;

    /// List the immediate children of `prefix` (one level, not recursive).
    async fn get_file_list(&self, prefix: &str) -> StorageResult<Vec<FileListElement>>;
}
