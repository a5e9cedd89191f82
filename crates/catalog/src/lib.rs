//! Shader catalog: entries, the registry that owns them, search/tag queries
//! and source downloads.
//!
//! Catalogs are described by a `catalog.toml` manifest (see `CatalogManifest`).
//! The six built-in effects ship inside the crate and are available through
//! [`builtin_registry`]; [`load_dir`] reads an operator-supplied directory.

mod entry;
mod export;
mod load;
mod manifest;
mod query;
mod registry;

pub use entry::ShaderEntry;
pub use export::{download, SourceDownload, SOURCE_CONTENT_TYPE, SOURCE_EXTENSION};
pub use load::{builtin_registry, load_dir, registry_from_manifest, CatalogError};
pub use manifest::{CatalogManifest, EntryManifest, UniformDefault, UniformNames, MANIFEST_FILE};
pub use query::{all_tags, matches_search, matches_tags, query, CatalogFilter};
pub use registry::{RegistryError, ShaderRegistry};
