//! S3 connection manager (C4).
//!
//! Maintains a name → client mapping. Registration only happens during
//! startup (from `s3[]` in `config.yaml`); lookup is the hot path, so it is
//! guarded by a reader-writer lock that is only ever write-locked once.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
use hyper_rustls::HttpsConnectorBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::S3ConnConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection `{0}` already exists")]
    AlreadyExists(String),
    #[error("connection `{0}` not found")]
    NotFound(String),
}

#[derive(Default)]
pub struct S3ConnectionManager {
    connections: RwLock<HashMap<String, Arc<aws_sdk_s3::Client>>>,
}

impl S3ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client from `cfg` and register it under `cfg.name`.
    ///
    /// The client's TLS verification is inverted from `useSSL`
    /// (`InsecureSkipVerify = !useSSL`), matching the original gateway's
    /// behaviour; see the REDESIGN FLAG note in DESIGN.md.
    pub async fn add_connection(&self, cfg: &S3ConnConfig) -> Result<()> {
        if self.connections.read().await.contains_key(&cfg.name) {
            return Err(ConnectionError::AlreadyExists(cfg.name.clone()).into());
        }

        let http_client = HyperClientBuilder::new().build(build_https_connector(cfg.use_ssl));

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .http_client(http_client)
            .endpoint_url(&cfg.endpoint)
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key_id,
                &cfg.secret_access_key,
                None,
                None,
                "config.yaml",
            ))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(cfg.use_path_style)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_config);

        let mut connections = self.connections.write().await;
        if connections.contains_key(&cfg.name) {
            return Err(ConnectionError::AlreadyExists(cfg.name.clone()).into());
        }
        connections.insert(cfg.name.clone(), Arc::new(client));
        Ok(())
    }

    pub async fn get_connection(&self, name: &str) -> Result<Arc<aws_sdk_s3::Client>> {
        self.connections
            .read()
            .await
            .get(name)
            .cloned()
            .with_context(|| ConnectionError::NotFound(name.to_string()).to_string())
    }
}

/// Build the HTTPS connector used by every S3 client. When `use_ssl` is
/// true, server certificates are checked against the standard Mozilla
/// webpki root set; when `use_ssl` is false, the connector's certificate
/// verifier is replaced with a no-op — a direct port of the original
/// transport's `InsecureSkipVerify = !useSSL`.
fn build_https_connector(
    use_ssl: bool,
) -> hyper_rustls::HttpsConnector<hyper::client::HttpConnector> {
    let tls_config = if use_ssl {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
        }));
        rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
            .with_no_client_auth()
    };

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build()
}

/// No-op certificate verifier used only when `useSSL=false`, mirroring the
/// original Go transport's `InsecureSkipVerify`.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
