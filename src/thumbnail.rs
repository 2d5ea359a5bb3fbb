//! Thumbnail cache with single-flight regeneration (C8).
//!
//! Cache key: `thumbnailDir/<percent-encoded bucket>-<percent-encoded
//! objectKey>.jpg` (the Open Question on cache-key collisions, resolved in
//! favour of escaping — see DESIGN.md). Lookup is a fast `stat`; on a miss,
//! exactly one concurrent requester regenerates the thumbnail while every
//! other requester waits on its completion signal and then re-reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;

use crate::errors::AppError;
use crate::images::{self, BufferPool};
use crate::storage::registry::BucketRegistry;

/// Either a reopened cache file (fast path / follower re-read) or the bytes
/// the leader just produced (streamed directly, no re-read).
pub enum ThumbnailBody {
    File(fs::File),
    Bytes(Bytes),
}

#[derive(Debug, Clone)]
pub struct ThumbnailInfo {
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct ThumbnailCache {
    dir: PathBuf,
    inflight: Mutex<HashMap<PathBuf, Arc<Notify>>>,
}

enum Claim {
    Leader(Arc<Notify>),
    Follower(Arc<Notify>),
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_path(&self, bucket: &str, object_key: &str) -> PathBuf {
        let encoded_bucket = urlencoding::encode(bucket);
        let encoded_key = urlencoding::encode(object_key);
        self.dir.join(format!("{encoded_bucket}-{encoded_key}.jpg"))
    }

    /// Atomic insert-or-get: a single critical section so followers can
    /// never race a leader between `load` and `store`.
    fn claim(&self, path: &Path) -> Claim {
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(notify) = inflight.get(path) {
            return Claim::Follower(notify.clone());
        }
        let notify = Arc::new(Notify::new());
        inflight.insert(path.to_path_buf(), notify.clone());
        Claim::Leader(notify)
    }

    async fn stat(&self, path: &Path) -> Option<(fs::File, ThumbnailInfo)> {
        let meta = fs::metadata(path).await.ok()?;
        if meta.len() == 0 {
            return None;
        }
        let file = fs::File::open(path).await.ok()?;
        let last_modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
        Some((
            file,
            ThumbnailInfo {
                content_length: meta.len(),
                last_modified,
            },
        ))
    }

    /// Fetch or regenerate the thumbnail for `(bucket, object_key)`.
    /// Surfaces `ResourceNotExists` for non-images, decode failures, or when
    /// the leader fails and this caller was a follower.
    pub async fn get(
        &self,
        registry: &BucketRegistry,
        bucket: &str,
        object_key: &str,
        max_long_edge: u32,
        quality: u8,
        pool: Arc<BufferPool>,
    ) -> Result<(ThumbnailBody, ThumbnailInfo), AppError> {
        let cache_path = self.cache_path(bucket, object_key);

        if let Some((file, info)) = self.stat(&cache_path).await {
            return Ok((ThumbnailBody::File(file), info));
        }

        match self.claim(&cache_path) {
            Claim::Leader(notify) => {
                let _guard = LeaderGuard {
                    cache: self,
                    path: cache_path.clone(),
                    notify,
                };
                self.regenerate(registry, bucket, object_key, &cache_path, max_long_edge, quality, pool)
                    .await
            }
            Claim::Follower(notify) => {
                // `Notify::notify_waiters()` only wakes waiters already
                // registered at the moment it's called; it buffers nothing
                // for a `.notified()` call made afterwards. A follower
                // preempted between `claim()` returning and its first
                // `.notified().await` could therefore miss the leader's
                // wake entirely and hang forever waiting on a signal that
                // already fired. Re-stat on a bounded timeout instead of
                // trusting a single wake: each iteration either observes
                // the file the leader wrote, or times out and checks again,
                // so a missed wake costs latency, not a permanent hang.
                let deadline = std::time::Instant::now() + Duration::from_secs(30);
                loop {
                    if let Some((file, info)) = self.stat(&cache_path).await {
                        return Ok((ThumbnailBody::File(file), info));
                    }
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        return Err(AppError::ResourceNotExists);
                    }
                    let _ = tokio::time::timeout(remaining.min(Duration::from_millis(100)), notify.notified()).await;
                }
            }
        }
    }

    async fn regenerate(
        &self,
        registry: &BucketRegistry,
        bucket: &str,
        object_key: &str,
        cache_path: &Path,
        max_long_edge: u32,
        quality: u8,
        pool: Arc<BufferPool>,
    ) -> Result<(ThumbnailBody, ThumbnailInfo), AppError> {
        let provider = registry.get_bucket(bucket).await.map_err(|_| AppError::BucketNotFound)?;
        let (mut body, _info) = provider
            .get_object(object_key)
            .await
            .map_err(|_| AppError::ResourceNotExists)?;

        let mut source = Vec::new();
        body.read_to_end(&mut source).await.map_err(|_| AppError::ResourceNotExists)?;

        let jpeg = tokio::task::spawn_blocking(move || images::make_thumbnail(&source, max_long_edge, quality, &pool))
            .await
            .map_err(|_| AppError::ServerError)?
            .map_err(|_| AppError::ResourceNotExists)?;

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await.map_err(AppError::from)?;
        }
        let tmp_path = cache_path.with_extension("jpg.tmp");
        fs::write(&tmp_path, &jpeg).await.map_err(AppError::from)?;
        fs::rename(&tmp_path, cache_path).await.map_err(AppError::from)?;

        let last_modified = fs::metadata(cache_path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        let info = ThumbnailInfo {
            content_length: jpeg.len() as u64,
            last_modified,
        };
        Ok((ThumbnailBody::Bytes(Bytes::from(jpeg)), info))
    }
}

/// Removes the inflight entry and wakes every follower on every exit path
/// (success, error, or panic-unwind), so a leader can never leak its claim.
struct LeaderGuard<'a> {
    cache: &'a ThumbnailCache,
    path: PathBuf,
    notify: Arc<Notify>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.cache.inflight.lock().unwrap().remove(&self.path);
        self.notify.notify_waiters();
    }
}

/// Compare an `If-Modified-Since` timestamp against a cached `last_modified`,
/// both truncated to whole seconds per HTTP semantics.
pub fn not_modified_since(if_modified_since: DateTime<Utc>, last_modified: DateTime<Utc>) -> bool {
    if_modified_since.timestamp() >= last_modified.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_escapes_separators() {
        let cache = ThumbnailCache::new("/tmp/thumbs");
        let path = cache.cache_path("my-bucket", "a/b.jpg");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("my-bucket-a%2Fb.jpg"), "got {name}");
    }

    #[test]
    fn not_modified_since_truncates_to_seconds() {
        let last_modified = Utc::now();
        let same_second = last_modified + chrono::Duration::milliseconds(400);
        assert!(not_modified_since(same_second, last_modified));
        let earlier = last_modified - chrono::Duration::seconds(5);
        assert!(!not_modified_since(earlier, last_modified));
    }
}
