//! Shared fixtures: an in-memory registry and tar layer builders.

#![allow(dead_code)]

use async_trait::async_trait;
use ociplug::registry::{LayerHandler, LayerProgress, RegistryClient};
use ociplug::{CONTRACT_LABEL, Error, Result};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Fake registry
// =============================================================================

type ImageKey = (String, String);

/// Registry serving tags, labels and layers from memory.
#[derive(Default)]
pub struct FakeRegistry {
    tags: Mutex<HashMap<String, Vec<String>>>,
    labels: Mutex<HashMap<ImageKey, HashMap<String, String>>>,
    layers: Mutex<HashMap<ImageKey, Vec<Vec<u8>>>>,
    list_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bare tag with no image behind it.
    pub fn add_tag(&self, plugin: &str, tag: &str) {
        self.tags
            .lock()
            .unwrap()
            .entry(plugin.to_string())
            .or_default()
            .push(tag.to_string());
    }

    /// Publishes `plugin` at `tag` with an optional contract label.
    pub fn push_image(&self, plugin: &str, tag: &str, contract: Option<String>, layers: Vec<Vec<u8>>) {
        self.add_tag(plugin, tag);
        let key = (plugin.to_string(), tag.to_string());
        let mut labels = HashMap::new();
        if let Some(contract) = contract {
            labels.insert(CONTRACT_LABEL.to_string(), contract);
        }
        self.labels.lock().unwrap().insert(key.clone(), labels);
        self.layers.lock().unwrap().insert(key, layers);
    }

    /// Publishes a well-formed plugin: contract label plus one layer holding
    /// the binary.
    pub fn publish(&self, plugin: &str, version: &str, requires: &[(&str, &str)]) {
        self.push_image(
            plugin,
            &format!("v{}", version),
            Some(contract_json(plugin, version, requires)),
            vec![binary_layer(plugin, &format!("{} {}", plugin, version))],
        );
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    fn missing(plugin: &str, tag: &str) -> Error {
        Error::Registry {
            operation: "pull manifest",
            reference: format!("{}:{}", plugin, tag),
            reason: "manifest unknown".to_string(),
        }
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_tags(&self, plugin: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(plugin)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_label(&self, plugin: &str, tag: &str, label: &str) -> Result<Option<String>> {
        let labels = self.labels.lock().unwrap();
        let image = labels
            .get(&(plugin.to_string(), tag.to_string()))
            .ok_or_else(|| Self::missing(plugin, tag))?;
        Ok(image.get(label).cloned())
    }

    async fn extract_image_layers(
        &self,
        plugin: &str,
        tag: &str,
        handler: &mut LayerHandler<'_>,
    ) -> Result<()> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let layers = self
            .layers
            .lock()
            .unwrap()
            .get(&(plugin.to_string(), tag.to_string()))
            .cloned()
            .ok_or_else(|| Self::missing(plugin, tag))?;

        let total = layers.len();
        for (i, layer) in layers.into_iter().enumerate() {
            handler(LayerProgress { index: i + 1, total }, Box::new(Cursor::new(layer)))?;
        }
        Ok(())
    }
}

// =============================================================================
// Contracts
// =============================================================================

/// Contract label JSON for `name@version` requiring the given plugins.
pub fn contract_json(name: &str, version: &str, requires: &[(&str, &str)]) -> String {
    let plugins: Vec<_> = requires
        .iter()
        .map(|(name, constraint)| serde_json::json!({ "name": name, "constraint": constraint }))
        .collect();

    serde_json::json!({
        "name": name,
        "version": version,
        "description": format!("{} test plugin", name),
        "env": [{ "name": "DEMO_TOKEN" }],
        "flags": [{ "name": "--verbose" }],
        "requirements": {
            "kubernetes": { "constraint": ">= 1.28" },
            "plugins": plugins,
            "modules": []
        }
    })
    .to_string()
}

// =============================================================================
// Tar layers
// =============================================================================

/// Uncompressed tar with regular files.
pub fn tar_layer(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Layer holding an executable named after the plugin.
pub fn binary_layer(plugin: &str, body: &str) -> Vec<u8> {
    tar_layer(&[(plugin, body.as_bytes(), 0o755)])
}

/// Tar with a single regular file whose name is written verbatim.
///
/// `Header::set_path` refuses `..` and absolute names, so the name bytes
/// go straight into the header.
pub fn raw_name_layer(name: &str, content: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    {
        let raw = &mut header.as_old_mut().name;
        raw.fill(0);
        raw[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, content).unwrap();
    builder.into_inner().unwrap()
}

/// Tar with a single link entry.
pub fn link_layer(kind: tar::EntryType, path: &str, target: &str) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_path(path).unwrap();
    header.set_link_name(target).unwrap();
    header.set_size(0);
    header.set_mode(0o777);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, &[] as &[u8]).unwrap();
    builder.into_inner().unwrap()
}

/// Tar with a symlink `link -> target` followed by a regular file at `file`.
pub fn symlink_then_file_layer(link: &str, target: &str, file: &str, content: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_path(link).unwrap();
    header.set_link_name(target).unwrap();
    header.set_size(0);
    header.set_mode(0o777);
    header.set_cksum();
    builder.append(&header, &[] as &[u8]).unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_path(file).unwrap();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, content).unwrap();

    builder.into_inner().unwrap()
}
