//! Archive assembly from the configuration store
//!
//! Packs the build directory, verifies declared dependencies made it into
//! the archive, embeds device nodes when requested, and writes the output
//! file with rotate-aside semantics.

use std::path::PathBuf;

use initforge_common::fs::write_file;
use initforge_config::ConfigStore;
use serde::Deserialize;
use toml::Value;

use crate::error::{ArchiveError, Result};
use crate::newc::CpioArchive;

/// One entry of the `nodes` table.
#[derive(Debug, Deserialize)]
pub struct NodeSpec {
    /// Defaults to `/dev/<table key>`.
    pub path: Option<String>,
    #[serde(default = "NodeSpec::default_mode")]
    pub mode: u32,
    pub major: u32,
    pub minor: u32,
}

impl NodeSpec {
    fn default_mode() -> u32 {
        0o600
    }

    fn parse(name: &str, node: &Value) -> Result<Self> {
        node.clone()
            .try_into()
            .map_err(|err: toml::de::Error| ArchiveError::InvalidNode {
                name: name.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Build and write the output archive, returning its path.
pub fn make_cpio(store: &ConfigStore) -> Result<PathBuf> {
    let build_dir = store
        .get_path("build_dir")
        .ok_or(ArchiveError::MissingConfig("build_dir"))?;
    let out_dir = store
        .get_path("out_dir")
        .ok_or(ArchiveError::MissingConfig("out_dir"))?;
    let out_file = store
        .get_str("out_file")
        .ok_or(ArchiveError::MissingConfig("out_file"))?;

    let mut archive = CpioArchive::new();
    archive.append_recursive(&build_dir)?;

    check_dependencies(store, &archive)?;

    if store.get_bool("mknod_cpio") == Some(true) {
        embed_nodes(store, &mut archive)?;
    }

    let out_path = out_dir.join(out_file);
    let bytes = archive.to_bytes();
    tracing::info!(
        "Packing {} entries ({} bytes) into: {}",
        archive.len(),
        bytes.len(),
        out_path.display()
    );
    write_file(&out_path, &bytes, 0o644)?;
    Ok(out_path)
}

/// Every declared dependency must be present in the packed archive.
fn check_dependencies(store: &ConfigStore, archive: &CpioArchive) -> Result<()> {
    for dependency in store.get_list("dependencies") {
        let Some(path) = dependency.as_str() else {
            continue;
        };
        if !archive.contains(path) {
            return Err(ArchiveError::MissingDependency(path.to_string()));
        }
        tracing::debug!("Dependency present in archive: {}", path);
    }
    Ok(())
}

fn embed_nodes(store: &ConfigStore, archive: &mut CpioArchive) -> Result<()> {
    let Some(nodes) = store.get_table("nodes") else {
        return Ok(());
    };
    for (name, node) in nodes {
        let spec = NodeSpec::parse(name, node)?;
        let path = spec.path.unwrap_or_else(|| format!("/dev/{name}"));
        archive.add_chardev(&path, spec.mode, spec.major, spec.minor);
    }
    Ok(())
}

/// Record a build product in the dependency list so the pack-time
/// integrity check covers it.
pub fn declare_dependency(store: &mut ConfigStore, path: &str) -> initforge_config::Result<()> {
    store.set("dependencies", Value::String(path.to_string()))
}
