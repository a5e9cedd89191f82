//! Plain-text downloads of catalog sources.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::registry::{RegistryError, ShaderRegistry};

pub const SOURCE_EXTENSION: &str = "glsl";
pub const SOURCE_CONTENT_TYPE: &str = "text/plain";

/// Everything a host needs to offer an entry's source as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDownload {
    pub file_name: String,
    pub content_type: &'static str,
    pub disposition: String,
    pub body: String,
}

impl SourceDownload {
    /// Writes the body to `dir/<file_name>`, replacing any existing file.
    pub fn write_into(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.body)?;
        info!(path = %path.display(), bytes = self.body.len(), "exported shader source");
        Ok(path)
    }
}

/// The verbatim source of `id`, named `<id>.glsl`.
pub fn download(registry: &ShaderRegistry, id: &str) -> Result<SourceDownload, RegistryError> {
    let entry = registry.get(id)?;
    let file_name = format!("{}.{SOURCE_EXTENSION}", entry.id());
    Ok(SourceDownload {
        disposition: format!("attachment; filename={file_name}"),
        file_name,
        content_type: SOURCE_CONTENT_TYPE,
        body: entry.source_text().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ShaderEntry;

    const SOURCE: &str = "uniform float t;\nvoid main() { gl_FragColor = vec4(t); }\n";

    fn registry() -> ShaderRegistry {
        let mut registry = ShaderRegistry::new();
        registry
            .register(ShaderEntry::new("milky-wave", "Milky Wave", "", SOURCE))
            .unwrap();
        registry
    }

    #[test]
    fn download_is_named_after_the_id() {
        let download = download(&registry(), "milky-wave").unwrap();
        assert_eq!(download.file_name, "milky-wave.glsl");
        assert_eq!(download.content_type, "text/plain");
        assert_eq!(download.disposition, "attachment; filename=milky-wave.glsl");
        assert_eq!(download.body, SOURCE);
    }

    #[test]
    fn download_of_unknown_id_fails() {
        assert_eq!(
            download(&registry(), "missing").unwrap_err(),
            RegistryError::NotFound("missing".into())
        );
    }

    #[test]
    fn write_into_copies_source_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = download(&registry(), "milky-wave")
            .unwrap()
            .write_into(dir.path())
            .unwrap();
        assert_eq!(path, dir.path().join("milky-wave.glsl"));
        assert_eq!(fs::read_to_string(path).unwrap(), SOURCE);
    }
}
