//! Upload orchestrator (C9): size check, rename policy, optional WebP
//! conversion, parallel batch uploads.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::config::OssConfig;
use crate::errors::AppError;
use crate::images::BufferPool;
use crate::path_clean;
use crate::storage::registry::BucketRegistry;

/// One file's upload outcome, suitable for the batch-upload response body.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parameters shared by every file in a batch upload request.
#[derive(Clone)]
pub struct UploadParams {
    pub bucket: String,
    pub location: String,
    pub convert_webp: bool,
    pub use_uuid: bool,
}

/// Upload a single file. Never returns `Err` — every failure is captured
/// in `UploadOutcome.error` so batch siblings are unaffected.
pub async fn upload_one(
    registry: &BucketRegistry,
    oss: &OssConfig,
    pool: &Arc<BufferPool>,
    params: &UploadParams,
    filename: String,
    mut data: Bytes,
) -> UploadOutcome {
    if data.len() as u64 > oss.size_limit_bytes() {
        return UploadOutcome {
            filename,
            object_key: None,
            error: Some(AppError::FileSizeExceed.to_string()),
        };
    }

    let (mut name, mut ext) = split_name_ext(&filename);
    if params.use_uuid {
        name = Uuid::now_v7().to_string();
    }

    if params.convert_webp {
        let source = data.clone();
        let pool = pool.clone();
        let quality = oss.quality;
        let converted =
            tokio::task::spawn_blocking(move || crate::images::convert_to_webp(&source, quality, &pool)).await;
        match converted {
            Ok(Ok(webp_bytes)) => {
                data = Bytes::from(webp_bytes);
                ext = "webp".to_string();
            }
            _ => {
                return UploadOutcome {
                    filename,
                    object_key: None,
                    error: Some(AppError::FileNotImage.to_string()),
                };
            }
        }
    }

    let file_name = if ext.is_empty() { name } else { format!("{name}.{ext}") };
    let object_key = path_clean::object_key(&params.location, &file_name);

    let provider = match registry.get_bucket(&params.bucket).await {
        Ok(provider) => provider,
        Err(_) => {
            return UploadOutcome {
                filename,
                object_key: None,
                error: Some(AppError::BucketNotFound.to_string()),
            };
        }
    };

    match provider.save_object(data, &object_key).await {
        Ok(()) => UploadOutcome {
            filename,
            object_key: Some(object_key),
            error: None,
        },
        Err(err) => UploadOutcome {
            filename,
            object_key: None,
            error: Some(AppError::from(err).to_string()),
        },
    }
}

/// Run every file in `files` concurrently, one `tokio::spawn` task each.
/// Per-file failures never abort siblings; the handler waits for all tasks.
pub async fn upload_batch(
    registry: Arc<BucketRegistry>,
    oss: Arc<OssConfig>,
    pool: Arc<BufferPool>,
    params: UploadParams,
    files: Vec<(String, Bytes)>,
) -> Vec<UploadOutcome> {
    let mut handles = Vec::with_capacity(files.len());
    for (filename, data) in files {
        let registry = registry.clone();
        let oss = oss.clone();
        let pool = pool.clone();
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            upload_one(&registry, &oss, &pool, &params, filename, data).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => results.push(outcome),
            Err(_) => results.push(UploadOutcome {
                filename: "<unknown>".to_string(),
                object_key: None,
                error: Some(AppError::UploadFile.to_string()),
            }),
        }
    }
    results
}

/// Split `"photo.tar.gz"` into `("photo.tar", "gz")`; files with no
/// extension keep an empty `ext`.
fn split_name_ext(filename: &str) -> (String, String) {
    match filename.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), ext.to_string()),
        _ => (filename.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_ext_basic() {
        assert_eq!(split_name_ext("photo.jpg"), ("photo".to_string(), "jpg".to_string()));
        assert_eq!(split_name_ext("noext"), ("noext".to_string(), String::new()));
        assert_eq!(split_name_ext(".hidden"), (".hidden".to_string(), String::new()));
    }
}
