//! Process-wide application state (C11-C14 glue): the `Arc`-backed bundle
//! of registry, config, and cache handles injected into every handler.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::images::BufferPool;
use crate::storage::registry::BucketRegistry;
use crate::storage::s3_connection::S3ConnectionManager;
use crate::thumbnail::ThumbnailCache;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<BucketRegistry>,
    pub connections: Arc<S3ConnectionManager>,
    pub thumbnails: Arc<ThumbnailCache>,
    pub buffers: Arc<BufferPool>,
}
