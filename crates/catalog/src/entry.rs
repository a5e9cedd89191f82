use std::borrow::Cow;

use renderer::{ProgramFactory, ProgramSource, UniformBindings, UniformValue};

/// One catalog effect: presentation metadata, the verbatim source an operator
/// can read or download, and the program description used to build it.
#[derive(Debug, Clone)]
pub struct ShaderEntry {
    id: String,
    name: String,
    description: String,
    tags: Vec<String>,
    source_text: Cow<'static, str>,
    program: ProgramSource,
}

impl ShaderEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        source_text: impl Into<Cow<'static, str>>,
    ) -> Self {
        let source_text = source_text.into();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
            program: ProgramSource::fullscreen(source_text.clone()),
            source_text,
        }
    }

    /// Adds tags, ignoring duplicates.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_bindings(mut self, bindings: UniformBindings) -> Self {
        self.program = self.program.with_bindings(bindings);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.program = self.program.with_default(name, value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Tags in declaration order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }
}

impl ProgramFactory for ShaderEntry {
    fn program_id(&self) -> &str {
        &self.id
    }

    fn program_source(&self) -> &ProgramSource {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tags_are_collapsed() {
        let entry = ShaderEntry::new("a", "A", "", "void main() {}")
            .with_tags(["fluid", "shader", "fluid"]);
        assert_eq!(entry.tags(), ["fluid", "shader"]);
        assert!(entry.has_tag("shader"));
    }

    #[test]
    fn program_fragment_is_the_verbatim_source() {
        let entry = ShaderEntry::new("a", "A", "", "uniform float t;\nvoid main() {}\n");
        assert_eq!(entry.program_source().fragment, entry.source_text());
        assert_eq!(entry.program_id(), "a");
    }
}
