//! Configuration loader (C11).
//!
//! Parses `./config.yaml` into typed structs. A couple of operational knobs
//! — the config file path and the bind host — can be overridden from the
//! command line, following the same CLI-over-file merge pattern as the
//! original gateway this crate grew out of.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Object-storage gateway")]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Host to bind to (overrides the bind host derived from server.port).
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OssConfig {
    #[serde(rename = "adminKey")]
    pub admin_key: String,
    /// Per-file upload size limit, in MiB.
    pub limit: u64,
    /// WebP upload-conversion quality, 0-100.
    pub quality: u8,
    #[serde(rename = "thumbnailDir")]
    pub thumbnail_dir: PathBuf,
    #[serde(rename = "thumbnailLongEdge")]
    pub thumbnail_long_edge: u32,
    #[serde(rename = "thumbnailQuality")]
    pub thumbnail_quality: u8,
}

impl OssConfig {
    /// Per-file size limit in bytes.
    pub fn size_limit_bytes(&self) -> u64 {
        self.limit * 1024 * 1024
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ConnConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    pub region: String,
    #[serde(rename = "useSSL", default)]
    pub use_ssl: bool,
    #[serde(rename = "usePathStyle", default)]
    pub use_path_style: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    S3,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BucketType,
    /// S3 buckets: name of the `s3[]` connection to use.
    #[serde(default)]
    pub target: Option<String>,
    /// S3 buckets: bucket name on that endpoint.
    #[serde(rename = "bucketName", default)]
    pub bucket_name: Option<String>,
    /// Local buckets: filesystem root.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub oss: OssConfig,
    #[serde(default)]
    pub s3: Vec<S3ConnConfig>,
    #[serde(default)]
    pub bucket: Vec<BucketConfig>,
}

impl AppConfig {
    pub fn load(path: &PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn addr(&self, host_override: Option<&str>) -> String {
        format!("{}:{}", host_override.unwrap_or("0.0.0.0"), self.server.port)
    }
}
