//! Bucket registry (C6): maps a bucket name to a concrete provider.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::{AppConfig, BucketConfig, BucketType};
use crate::storage::local::LocalProvider;
use crate::storage::s3::S3Provider;
use crate::storage::s3_connection::S3ConnectionManager;
use crate::storage::StorageProvider;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("bucket `{0}` already exists")]
    AlreadyExists(String),
    #[error("bucket `{0}` not found")]
    NotFound(String),
}

#[derive(Default)]
pub struct BucketRegistry {
    buckets: RwLock<HashMap<String, Arc<dyn StorageProvider>>>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_bucket(&self, name: &str, provider: Arc<dyn StorageProvider>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()).into());
        }
        buckets.insert(name.to_string(), provider);
        Ok(())
    }

    pub async fn get_bucket(&self, name: &str) -> Result<Arc<dyn StorageProvider>> {
        self.buckets
            .read()
            .await
            .get(name)
            .cloned()
            .with_context(|| RegistryError::NotFound(name.to_string()).to_string())
    }

    pub async fn get_bucket_list(&self) -> Vec<String> {
        self.buckets.read().await.keys().cloned().collect()
    }

    /// Build every provider listed in `config.bucket[]`, wiring S3-backed
    /// buckets through `connections` and registering all of them.
    pub async fn from_config(config: &AppConfig, connections: Arc<S3ConnectionManager>) -> Result<Self> {
        let registry = Self::new();
        for bucket in &config.bucket {
            let provider: Arc<dyn StorageProvider> = build_provider(bucket, &connections)?;
            registry.add_bucket(&bucket.name, provider).await?;
        }
        Ok(registry)
    }
}

fn build_provider(bucket: &BucketConfig, connections: &Arc<S3ConnectionManager>) -> Result<Arc<dyn StorageProvider>> {
    match bucket.kind {
        BucketType::Local => {
            let path = bucket
                .path
                .as_ref()
                .with_context(|| format!("bucket `{}` is type=local but has no `path`", bucket.name))?;
            Ok(Arc::new(LocalProvider::new(path)))
        }
        BucketType::S3 => {
            let target = bucket
                .target
                .as_ref()
                .with_context(|| format!("bucket `{}` is type=s3 but has no `target`", bucket.name))?;
            let bucket_name = bucket
                .bucket_name
                .as_ref()
                .with_context(|| format!("bucket `{}` is type=s3 but has no `bucketName`", bucket.name))?;
            Ok(Arc::new(S3Provider::new(connections.clone(), target.clone(), bucket_name.clone())))
        }
    }
}
