//! Builds registries from `catalog.toml` manifests.
//!
//! Types:
//!
//! - `CatalogError` classifies manifest parsing, validation, missing sources
//!   and I/O failures.
//!
//! Functions:
//!
//! - `builtin_registry` returns the six effects compiled into the binary.
//! - `load_dir` reads a catalog directory from disk; each entry's `source`
//!   is resolved relative to the manifest.
//! - `registry_from_manifest` is the shared path both of them go through.
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::entry::ShaderEntry;
use crate::manifest::{CatalogManifest, EntryManifest, MANIFEST_FILE};
use crate::registry::{RegistryError, ShaderRegistry};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("manifest validation failed: {0:?}")]
    ManifestValidation(Vec<String>),

    #[error("shader source not found at {0}")]
    MissingSource(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

const BUILTIN_MANIFEST: &str = include_str!("../catalog.toml");

macro_rules! builtin_source {
    ($path:literal) => {
        ($path, include_str!(concat!("../", $path)))
    };
}

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    builtin_source!("shaders/milky-orb.glsl"),
    builtin_source!("shaders/milky-stars.glsl"),
    builtin_source!("shaders/milky-shower.glsl"),
    builtin_source!("shaders/milky-cosmic.glsl"),
    builtin_source!("shaders/milky-ring.glsl"),
    builtin_source!("shaders/milky-wave.glsl"),
];

pub fn builtin_registry() -> Result<ShaderRegistry, CatalogError> {
    let manifest = parse_manifest(BUILTIN_MANIFEST)?;
    registry_from_manifest(&manifest, |entry| {
        BUILTIN_SOURCES
            .iter()
            .find(|(path, _)| Path::new(path) == entry.source)
            .map(|(_, text)| Cow::Borrowed(*text))
            .ok_or_else(|| CatalogError::MissingSource(entry.source.clone()))
    })
}

pub fn load_dir(root: impl AsRef<Path>) -> Result<ShaderRegistry, CatalogError> {
    let root = root.as_ref();
    let manifest_path = root.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(CatalogError::ManifestMissing(manifest_path));
    }
    let manifest = parse_manifest(&fs::read_to_string(&manifest_path)?)?;
    registry_from_manifest(&manifest, |entry| {
        let path = root.join(&entry.source);
        if !path.is_file() {
            return Err(CatalogError::MissingSource(path));
        }
        Ok(Cow::Owned(fs::read_to_string(&path)?))
    })
}

fn parse_manifest(raw: &str) -> Result<CatalogManifest, CatalogError> {
    let manifest = CatalogManifest::from_toml_str(raw)?;
    let issues = manifest.validate();
    if !issues.is_empty() {
        return Err(CatalogError::ManifestValidation(issues));
    }
    Ok(manifest)
}

pub fn registry_from_manifest<F>(
    manifest: &CatalogManifest,
    mut resolve: F,
) -> Result<ShaderRegistry, CatalogError>
where
    F: FnMut(&EntryManifest) -> Result<Cow<'static, str>, CatalogError>,
{
    let mut registry = ShaderRegistry::new();
    for spec in &manifest.entries {
        let source = resolve(spec)?;
        let mut entry = ShaderEntry::new(&spec.id, &spec.name, &spec.description, source)
            .with_tags(&spec.tags)
            .with_bindings((&spec.uniforms).into());
        for (name, value) in &spec.defaults {
            if let Some(value) = value.to_value() {
                entry = entry.with_default(name, value);
            }
        }
        registry.register(entry)?;
    }
    debug!(entries = registry.len(), "catalog loaded");
    Ok(registry)
}
