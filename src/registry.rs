//! # Registry Capability
//!
//! The installer sees the registry through [`RegistryClient`], a narrow
//! three-call capability:
//!
//! | Call | Purpose |
//! |------|---------|
//! | [`list_tags`](RegistryClient::list_tags) | candidate versions of a plugin |
//! | [`get_label`](RegistryClient::get_label) | the contract label of one tag |
//! | [`extract_image_layers`](RegistryClient::extract_image_layers) | stream layers as uncompressed tar |
//!
//! [`OciRegistryClient`] implements it over `oci-distribution`. Tests
//! substitute an in-memory fake.
//!
//! ## Security Model
//!
//! - Layer count bounded by `MAX_LAYERS`, blob size by `MAX_LAYER_SIZE`
//! - Every blob is hashed and compared to its descriptor digest before the
//!   handler sees a byte of it
//! - Every call bounded by the configured timeout (`REGISTRY_TIMEOUT` by
//!   default)
//!
//! ## Layer Streams
//!
//! Gzip layers are decompressed transparently, so the handler always reads
//! a plain tar stream. Dropping the stream closes it.

use crate::config::RegistryConfig;
use crate::constants::{MAX_LAYER_SIZE, MAX_LAYERS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::{debug, info};

/// Readable, uncompressed tar stream of one layer.
pub type LayerStream = Box<dyn Read + Send>;

/// Position of a layer within its image (1-based `index`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerProgress {
    pub index: usize,
    pub total: usize,
}

/// Callback invoked once per layer, in order.
pub type LayerHandler<'a> = dyn FnMut(LayerProgress, LayerStream) -> Result<()> + Send + 'a;

/// Registry operations the installer depends on.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists all tags of the plugin's image repository.
    async fn list_tags(&self, plugin: &str) -> Result<Vec<String>>;

    /// Returns the value of `label` on the image `plugin:tag`, if present.
    async fn get_label(&self, plugin: &str, tag: &str, label: &str) -> Result<Option<String>>;

    /// Streams every layer of `plugin:tag` through `handler`.
    ///
    /// The first handler error aborts the remaining layers and is returned.
    async fn extract_image_layers(
        &self,
        plugin: &str,
        tag: &str,
        handler: &mut LayerHandler<'_>,
    ) -> Result<()>;
}

/// [`RegistryClient`] backed by `oci-distribution`.
pub struct OciRegistryClient {
    client: Client,
    auth: RegistryAuth,
    config: RegistryConfig,
}

impl OciRegistryClient {
    /// Creates a client for the configured repository.
    pub fn new(config: RegistryConfig) -> Self {
        let protocol = if config.insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => RegistryAuth::Basic(user.clone(), pass.clone()),
            _ => RegistryAuth::Anonymous,
        };

        Self {
            client: Client::new(ClientConfig {
                protocol,
                ..Default::default()
            }),
            auth,
            config,
        }
    }

    fn reference(&self, plugin: &str, tag: &str) -> Result<(String, Reference)> {
        let image_ref = self.config.image_reference(plugin, tag);
        let reference = image_ref.parse().map_err(|e| Error::Registry {
            operation: "parse reference",
            reference: image_ref.clone(),
            reason: format!("{}", e),
        })?;
        Ok((image_ref, reference))
    }

    /// Runs a registry call under the configured timeout.
    async fn bounded<T, E: std::fmt::Display>(
        &self,
        operation: &'static str,
        image_ref: &str,
        call: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        let duration: Duration = self.config.timeout;
        tokio::time::timeout(duration, call)
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("{} {}", operation, image_ref),
                duration,
            })?
            .map_err(|e| Error::Registry {
                operation,
                reference: image_ref.to_string(),
                reason: e.to_string(),
            })
    }

    async fn pull_layer(&self, reference: &Reference, layer: &OciDescriptor) -> Result<Vec<u8>> {
        if layer.size < 0 || layer.size as u64 > MAX_LAYER_SIZE as u64 {
            return Err(Error::ImageTooLarge {
                size: layer.size.max(0) as u64,
                limit: MAX_LAYER_SIZE as u64,
            });
        }

        let mut data = Vec::new();
        self.bounded(
            "pull layer",
            &layer.digest,
            self.client.pull_blob(reference, layer, &mut data),
        )
        .await?;

        verify_digest(&layer.digest, &data)?;
        Ok(data)
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn list_tags(&self, plugin: &str) -> Result<Vec<String>> {
        let (image_ref, reference) = self.reference(plugin, "latest")?;
        let response = self
            .bounded(
                "list tags",
                &image_ref,
                self.client.list_tags(&reference, &self.auth, None, None),
            )
            .await?;
        Ok(response.tags)
    }

    async fn get_label(&self, plugin: &str, tag: &str, label: &str) -> Result<Option<String>> {
        let (image_ref, reference) = self.reference(plugin, tag)?;
        let (_manifest, _digest, config) = self
            .bounded(
                "pull config",
                &image_ref,
                self.client.pull_manifest_and_config(&reference, &self.auth),
            )
            .await?;

        let config: serde_json::Value =
            serde_json::from_str(&config).map_err(|e| Error::Registry {
                operation: "decode config",
                reference: image_ref.clone(),
                reason: e.to_string(),
            })?;

        Ok(config
            .get("config")
            .and_then(|c| c.get("Labels"))
            .and_then(|labels| labels.get(label))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }

    async fn extract_image_layers(
        &self,
        plugin: &str,
        tag: &str,
        handler: &mut LayerHandler<'_>,
    ) -> Result<()> {
        let (image_ref, reference) = self.reference(plugin, tag)?;
        let (manifest, digest, _config) = self
            .bounded(
                "pull manifest",
                &image_ref,
                self.client.pull_manifest_and_config(&reference, &self.auth),
            )
            .await?;

        let total = manifest.layers.len();
        if total > MAX_LAYERS {
            return Err(Error::ImageTooLarge {
                size: total as u64,
                limit: MAX_LAYERS as u64,
            });
        }
        info!("Pulling {} ({}, {} layers)", image_ref, digest, total);

        for (i, layer) in manifest.layers.iter().enumerate() {
            let progress = LayerProgress {
                index: i + 1,
                total,
            };
            debug!(
                "Pulling layer {}/{}: {} ({} bytes)",
                progress.index, total, layer.digest, layer.size
            );

            let data = self.pull_layer(&reference, layer).await?;
            handler(progress, layer_stream(&layer.media_type, data))?;
        }

        Ok(())
    }
}

/// Wraps a layer blob in a reader yielding plain tar.
fn layer_stream(media_type: &str, data: Vec<u8>) -> LayerStream {
    if media_type.ends_with("gzip") {
        Box::new(GzDecoder::new(Cursor::new(data)))
    } else {
        Box::new(Cursor::new(data))
    }
}

/// Verifies that `data` hashes to `digest` (`sha256:<hex>`).
fn verify_digest(digest: &str, data: &[u8]) -> Result<()> {
    let (algo, expected) = digest.split_once(':').unwrap_or(("sha256", digest));
    if algo != "sha256" {
        return Err(Error::Registry {
            operation: "verify layer",
            reference: digest.to_string(),
            reason: format!("unsupported digest algorithm '{}'", algo),
        });
    }

    let computed = hex::encode(Sha256::digest(data));
    if computed != expected {
        return Err(Error::DigestMismatch {
            digest: digest.to_string(),
            computed,
        });
    }
    Ok(())
}
