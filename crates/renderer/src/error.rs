use std::fmt;

use crate::backend::UniformKind;
use crate::surface::SurfaceState;
use crate::types::ContextId;

/// Pipeline stage a compile diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Both stages compiled but could not be linked into one program.
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
            ShaderStage::Link => f.write_str("link"),
        }
    }
}

/// A program could not be built. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} stage failed: {log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

impl CompileError {
    pub fn new(stage: ShaderStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            log: log.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The host invalidated the context; surfaces bound to it are torn down
    /// and may be rebuilt on demand.
    #[error("GPU context {context} lost: {reason}")]
    ContextLost { context: ContextId, reason: String },
    #[error("failed to create GPU context: {0}")]
    Context(String),
    #[error("GPU context {0} has already been released")]
    Released(ContextId),
    #[error("cannot {action} a surface in state {from:?}")]
    InvalidTransition {
        from: SurfaceState,
        action: &'static str,
    },
    #[error("program built for {program} used with context {context}")]
    ContextMismatch {
        program: ContextId,
        context: ContextId,
    },
    #[error("unknown surface handle {0}")]
    UnknownSurface(u64),
    #[error("uniform '{name}' is declared as {declared}, got {given}")]
    UniformKind {
        name: String,
        declared: UniformKind,
        given: UniformKind,
    },
}

impl RenderError {
    pub fn is_context_lost(&self) -> bool {
        matches!(self, RenderError::ContextLost { .. })
    }
}
