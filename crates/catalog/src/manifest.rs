//! Schema of `catalog.toml`, the file that lists a catalog's entries and
//! points at their fragment sources.
//!
//! ```toml
//! version = 1
//!
//! [[entry]]
//! id = "milky-shower"
//! name = "Milky Shower"
//! description = "A flowing shower of amber particles"
//! tags = ["shader", "particles"]
//! source = "shaders/milky-shower.glsl"
//! uniforms = { time = "t", resolution = "r" }
//! defaults = { colorIntensity = 1.0 }
//! ```
use std::collections::BTreeMap;
use std::path::PathBuf;

use renderer::{UniformBindings, UniformValue};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "catalog.toml";

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, rename = "entry")]
    pub entries: Vec<EntryManifest>,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EntryManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fragment source, relative to the manifest.
    pub source: PathBuf,
    #[serde(default)]
    pub uniforms: UniformNames,
    #[serde(default)]
    pub defaults: BTreeMap<String, UniformDefault>,
}

/// Names under which an entry expects time and resolution.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UniformNames {
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_time() -> String {
    "iTime".to_string()
}

fn default_resolution() -> String {
    "iResolution".to_string()
}

impl Default for UniformNames {
    fn default() -> Self {
        Self {
            time: default_time(),
            resolution: default_resolution(),
        }
    }
}

impl From<&UniformNames> for UniformBindings {
    fn from(names: &UniformNames) -> Self {
        UniformBindings {
            time: names.time.clone(),
            resolution: names.resolution.clone(),
        }
    }
}

/// A default value: a number for `float`, an array of 2 to 4 numbers for
/// vectors.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum UniformDefault {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl UniformDefault {
    pub fn to_value(&self) -> Option<UniformValue> {
        match self {
            UniformDefault::Scalar(value) => Some(UniformValue::Float(*value)),
            UniformDefault::Vector(components) => match components.as_slice() {
                [x, y] => Some(UniformValue::Vec2([*x, *y])),
                [x, y, z] => Some(UniformValue::Vec3([*x, *y, *z])),
                [x, y, z, w] => Some(UniformValue::Vec4([*x, *y, *z, *w])),
                _ => None,
            },
        }
    }
}

impl CatalogManifest {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Human-readable problems; empty when the manifest is usable. Duplicate
    /// ids are left to the registry.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.version != SUPPORTED_VERSION {
            issues.push(format!(
                "unsupported catalog version {} (expected {SUPPORTED_VERSION})",
                self.version
            ));
        }
        if self.entries.is_empty() {
            issues.push("catalog must declare at least one entry".to_string());
        }
        for entry in &self.entries {
            if entry.id.is_empty()
                || !entry
                    .id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                issues.push(format!(
                    "entry id '{}' must be non-empty lowercase ascii, digits or '-'",
                    entry.id
                ));
            }
            if entry.name.trim().is_empty() {
                issues.push(format!("entry '{}' has an empty name", entry.id));
            }
            if entry.source.as_os_str().is_empty() {
                issues.push(format!("entry '{}' has no source path", entry.id));
            }
            if entry.uniforms.time == entry.uniforms.resolution {
                issues.push(format!(
                    "entry '{}' uses '{}' for both time and resolution",
                    entry.id, entry.uniforms.time
                ));
            }
            for (name, value) in &entry.defaults {
                if value.to_value().is_none() {
                    issues.push(format!(
                        "entry '{}' default '{}' must be a number or 2-4 numbers",
                        entry.id, name
                    ));
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparse_entry_with_defaults() {
        let manifest = CatalogManifest::from_toml_str(
            r#"
            [[entry]]
            id = "milky-orb"
            name = "Milky Orb"
            source = "orb.glsl"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.version, 1);
        let entry = &manifest.entries[0];
        assert_eq!(entry.uniforms, UniformNames::default());
        assert!(entry.tags.is_empty());
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn parses_scalar_and_vector_defaults() {
        let manifest = CatalogManifest::from_toml_str(
            r#"
            [[entry]]
            id = "a"
            name = "A"
            source = "a.glsl"
            uniforms = { time = "t", resolution = "r" }
            defaults = { speed = 0.5, tint = [1.0, 0.8, 0.2] }
            "#,
        )
        .unwrap();
        let entry = &manifest.entries[0];
        assert_eq!(entry.uniforms.time, "t");
        assert_eq!(
            entry.defaults["speed"].to_value(),
            Some(UniformValue::Float(0.5))
        );
        assert_eq!(
            entry.defaults["tint"].to_value(),
            Some(UniformValue::Vec3([1.0, 0.8, 0.2]))
        );
    }

    #[test]
    fn validation_reports_every_problem() {
        let manifest = CatalogManifest::from_toml_str(
            r#"
            version = 2

            [[entry]]
            id = "Bad Id"
            name = " "
            source = "a.glsl"
            uniforms = { time = "x", resolution = "x" }
            defaults = { broken = [1.0] }
            "#,
        )
        .unwrap();
        let issues = manifest.validate();
        assert_eq!(issues.len(), 5, "{issues:?}");
    }
}
