//! Program Build & Cache.
//!
//! `ProgramCache::build` turns a `ProgramFactory` (a catalog entry) into a
//! `CompiledProgram` for one drawing context. Results are memoised per
//! `(program id, context id)` pair and shared read-only through `Rc`; failed
//! builds are never cached. Eviction happens only when a context is torn down.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::backend::{GraphicsContext, UniformKind, UniformValue};
use crate::compile::FULLSCREEN_VERTEX;
use crate::error::{CompileError, ShaderStage};
use crate::types::ContextId;

/// Uniforms the runtime feeds automatically when a program declares them.
pub const OPTIONAL_UNIFORMS: [&str; 4] = ["iTimeDelta", "iFrame", "iMouse", "iDate"];

/// Names under which a program expects elapsed time and viewport resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBindings {
    pub time: String,
    pub resolution: String,
}

impl Default for UniformBindings {
    fn default() -> Self {
        Self {
            time: "iTime".to_string(),
            resolution: "iResolution".to_string(),
        }
    }
}

/// Vertex + fragment source pair plus the uniform contract of one entry.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
    pub bindings: UniformBindings,
    /// Entry-specific uniforms and the values pushed when nothing overrides them.
    pub defaults: Vec<(String, UniformValue)>,
}

impl ProgramSource {
    /// Pairs a fragment program with the shared full-screen vertex stage.
    pub fn fullscreen(fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            vertex: Cow::Borrowed(FULLSCREEN_VERTEX),
            fragment: fragment.into(),
            bindings: UniformBindings::default(),
            defaults: Vec::new(),
        }
    }

    pub fn with_bindings(mut self, bindings: UniformBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.defaults.push((name.into(), value));
        self
    }

    /// Every uniform name the build step resolves a location for.
    fn uniform_names(&self) -> impl Iterator<Item = &str> {
        let bindings = &self.bindings;
        [bindings.time.as_str(), bindings.resolution.as_str()]
            .into_iter()
            .chain(OPTIONAL_UNIFORMS)
            .chain(self.defaults.iter().map(|(name, _)| name.as_str()))
    }
}

/// Anything that can describe a buildable program: the `build` capability of a
/// catalog entry.
pub trait ProgramFactory {
    fn program_id(&self) -> &str;
    fn program_source(&self) -> &ProgramSource;
}

/// Resolved location of a uniform and the type the program declared for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot<L> {
    pub location: L,
    pub kind: UniformKind,
}

/// A linked program valid for exactly one context.
pub struct CompiledProgram<C: GraphicsContext> {
    program_id: String,
    context: ContextId,
    handle: C::Program,
    uniforms: HashMap<String, UniformSlot<C::Location>>,
}

impl<C: GraphicsContext> CompiledProgram<C> {
    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn handle(&self) -> &C::Program {
        &self.handle
    }

    pub fn uniform(&self, name: &str) -> Option<UniformSlot<C::Location>> {
        self.uniforms.get(name).copied()
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }
}

impl<C: GraphicsContext> fmt::Debug for CompiledProgram<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("program_id", &self.program_id)
            .field("context", &self.context)
            .field("uniforms", &self.uniforms.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    program_id: String,
    context: ContextId,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub compiles: u64,
    pub hits: u64,
    pub failures: u64,
    pub evictions: u64,
}

pub struct ProgramCache<C: GraphicsContext> {
    programs: HashMap<ProgramKey, Rc<CompiledProgram<C>>>,
    stats: CacheStats,
}

impl<C: GraphicsContext> ProgramCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached program for `(factory, context)` or builds it.
    pub fn build<F>(
        &mut self,
        factory: &F,
        context: &mut C,
    ) -> Result<Rc<CompiledProgram<C>>, CompileError>
    where
        F: ProgramFactory + ?Sized,
    {
        let key = ProgramKey {
            program_id: factory.program_id().to_string(),
            context: context.id(),
        };
        if let Some(program) = self.programs.get(&key) {
            self.stats.hits += 1;
            debug!(program = %key.program_id, context = %key.context, "program cache hit");
            return Ok(Rc::clone(program));
        }

        self.stats.compiles += 1;
        match compile_and_link(factory, context) {
            Ok(program) => {
                let program = Rc::new(program);
                debug!(
                    program = %key.program_id,
                    context = %key.context,
                    uniforms = program.uniforms.len(),
                    "compiled program"
                );
                self.programs.insert(key, Rc::clone(&program));
                Ok(program)
            }
            Err(err) => {
                self.stats.failures += 1;
                warn!(
                    program = %key.program_id,
                    context = %key.context,
                    stage = %err.stage,
                    "program build failed"
                );
                Err(err)
            }
        }
    }

    pub fn get(&self, program_id: &str, context: ContextId) -> Option<Rc<CompiledProgram<C>>> {
        let key = ProgramKey {
            program_id: program_id.to_string(),
            context,
        };
        self.programs.get(&key).cloned()
    }

    /// Releases every program built against `context`. Returns how many were
    /// evicted; a second call for the same context is a no-op.
    pub fn release_context(&mut self, context: &mut C) -> usize {
        let id = context.id();
        let keys: Vec<ProgramKey> = self
            .programs
            .keys()
            .filter(|key| key.context == id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(program) = self.programs.remove(key) {
                if Rc::strong_count(&program) > 1 {
                    warn!(
                        program = %key.program_id,
                        context = %id,
                        "releasing program that is still referenced"
                    );
                }
                context.delete_program(&program.handle);
            }
        }
        self.stats.evictions += keys.len() as u64;
        if !keys.is_empty() {
            debug!(context = %id, evicted = keys.len(), "released context programs");
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<C: GraphicsContext> Default for ProgramCache<C> {
    fn default() -> Self {
        Self {
            programs: HashMap::new(),
            stats: CacheStats::default(),
        }
    }
}

fn compile_and_link<F, C>(factory: &F, context: &mut C) -> Result<CompiledProgram<C>, CompileError>
where
    F: ProgramFactory + ?Sized,
    C: GraphicsContext,
{
    let source = factory.program_source();
    let vertex = context
        .compile_shader(ShaderStage::Vertex, &source.vertex)
        .map_err(|log| CompileError::new(ShaderStage::Vertex, log))?;
    let fragment = match context.compile_shader(ShaderStage::Fragment, &source.fragment) {
        Ok(fragment) => fragment,
        Err(log) => {
            context.delete_shader(vertex);
            return Err(CompileError::new(ShaderStage::Fragment, log));
        }
    };
    let linked = context.link_program(&vertex, &fragment);
    context.delete_shader(vertex);
    context.delete_shader(fragment);
    let handle = linked.map_err(|log| CompileError::new(ShaderStage::Link, log))?;

    let mut uniforms = HashMap::new();
    for name in source.uniform_names() {
        if let Some((location, kind)) = context.uniform_location(&handle, name) {
            uniforms.insert(name.to_string(), UniformSlot { location, kind });
        }
    }

    Ok(CompiledProgram {
        program_id: factory.program_id().to_string(),
        context: context.id(),
        handle,
        uniforms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ContextHost;
    use crate::testing::{RecordingContainer, RecordingHost};
    use crate::types::{ContextProfile, PixelSize};

    struct Effect {
        id: &'static str,
        source: ProgramSource,
    }

    impl ProgramFactory for Effect {
        fn program_id(&self) -> &str {
            self.id
        }

        fn program_source(&self) -> &ProgramSource {
            &self.source
        }
    }

    fn effect(id: &'static str, fragment: &'static str) -> Effect {
        Effect {
            id,
            source: ProgramSource::fullscreen(fragment),
        }
    }

    const ORB: &str = "uniform float iTime;\nuniform vec3 iResolution;\nvoid main() {}\n";

    #[test]
    fn second_build_hits_cache() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let mut cache = ProgramCache::new();
        let orb = effect("orb", ORB);

        let first = cache.build(&orb, &mut context).unwrap();
        let second = cache.build(&orb, &mut context).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        let journal = host.journal();
        assert_eq!(journal.compiles, 2, "one vertex and one fragment compile");
        assert_eq!(journal.links, 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn resolves_declared_uniforms_only() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let mut cache = ProgramCache::new();
        let program = cache.build(&effect("orb", ORB), &mut context).unwrap();

        let resolution = program.uniform("iResolution").unwrap();
        assert_eq!(resolution.kind, UniformKind::Vec3);
        assert!(program.uniform("iTime").is_some());
        assert!(program.uniform("iMouse").is_none());
    }

    #[test]
    fn programs_are_keyed_by_context() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let profile = ContextProfile::full();
        let mut a = host.create_context(&container, &profile).unwrap();
        let mut b = host.create_context(&container, &profile).unwrap();
        let mut cache = ProgramCache::new();
        let orb = effect("orb", ORB);

        let on_a = cache.build(&orb, &mut a).unwrap();
        let on_b = cache.build(&orb, &mut b).unwrap();

        assert!(!Rc::ptr_eq(&on_a, &on_b));
        assert_eq!(on_a.context(), a.id());
        assert_eq!(on_b.context(), b.id());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let mut cache = ProgramCache::new();
        let broken = effect("broken", "uniform sampler2D tex;\nvoid main() {}\n");

        let err = cache.build(&broken, &mut context).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(cache.is_empty());

        let again = cache.build(&broken, &mut context).unwrap_err();
        assert_eq!(again, err);
        assert_eq!(cache.stats().failures, 2);
        let journal = host.journal();
        assert_eq!(
            journal.shaders_deleted, journal.compiles,
            "vertex stage released after failure"
        );
    }

    #[test]
    fn link_failures_report_link_stage() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let mut cache = ProgramCache::new();
        let unlinkable = effect("nolink", "// @fail-link\nvoid main() {}\n");
        let err = cache.build(&unlinkable, &mut context).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Link);
    }

    #[test]
    fn releasing_a_context_evicts_its_programs_once() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let mut context = host
            .create_context(&container, &ContextProfile::full())
            .unwrap();
        let mut cache = ProgramCache::new();
        drop(cache.build(&effect("orb", ORB), &mut context).unwrap());
        drop(cache.build(&effect("wave", ORB), &mut context).unwrap());

        assert_eq!(cache.release_context(&mut context), 2);
        assert_eq!(cache.release_context(&mut context), 0);
        assert!(cache.is_empty());
        assert_eq!(host.journal().programs_deleted.len(), 2);
    }
}
