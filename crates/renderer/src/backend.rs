//! The seam between the render runtime and a concrete GPU API.
//!
//! `GraphicsContext` models one drawing context bound to one visible surface.
//! The runtime only ever talks to it through these calls, which keeps program
//! caching, surface lifecycles and the per-frame uniform protocol testable
//! without a GPU (see `testing`) while the `gpu` module drives real hardware
//! through wgpu.

use std::fmt;

use crate::error::{RenderError, ShaderStage};
use crate::types::{ContextId, ContextProfile, PixelSize};

/// Scalar and vector uniform types a program may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// Parses a GLSL type name.
    pub fn from_glsl(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Float),
            "int" => Some(Self::Int),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            _ => None,
        }
    }

    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
        }
    }

    /// Byte size inside a std140 block.
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
        }
    }

    /// Base alignment inside a std140 block.
    pub fn alignment(self) -> u32 {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 => 16,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

/// A value written into a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
        }
    }

    /// Little-endian bytes as laid out in a uniform buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Float(value) => bytemuck::bytes_of(value),
            Self::Int(value) => bytemuck::bytes_of(value),
            Self::Vec2(value) => bytemuck::cast_slice(value),
            Self::Vec3(value) => bytemuck::cast_slice(value),
            Self::Vec4(value) => bytemuck::cast_slice(value),
        }
    }

    /// Builds a value of `kind` from up to four components, padding with zeros.
    pub fn from_components(kind: UniformKind, components: &[f32]) -> Self {
        let at = |index: usize| components.get(index).copied().unwrap_or(0.0);
        match kind {
            UniformKind::Float => Self::Float(at(0)),
            UniformKind::Int => Self::Int(at(0) as i32),
            UniformKind::Vec2 => Self::Vec2([at(0), at(1)]),
            UniformKind::Vec3 => Self::Vec3([at(0), at(1), at(2)]),
            UniformKind::Vec4 => Self::Vec4([at(0), at(1), at(2), at(3)]),
        }
    }
}

/// One GPU drawing context.
///
/// Implementations are single-owner: exactly one render surface holds a given
/// context. Shader and program handles are only valid for the context that
/// created them.
pub trait GraphicsContext {
    /// Compiled single-stage shader object.
    type Shader;
    /// Linked program object.
    type Program;
    /// Uniform location inside a linked program.
    type Location: Copy + fmt::Debug;

    fn id(&self) -> ContextId;

    /// Compiles one stage, returning the backend diagnostic log on failure.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    fn link_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, String>;

    fn delete_shader(&mut self, shader: Self::Shader);

    /// Looks up a uniform declared by the program; `None` when the program
    /// does not use it.
    fn uniform_location(
        &self,
        program: &Self::Program,
        name: &str,
    ) -> Option<(Self::Location, UniformKind)>;

    /// Writes one uniform value. Must not allocate GPU objects.
    fn set_uniform(
        &mut self,
        program: &Self::Program,
        location: Self::Location,
        value: UniformValue,
    );

    /// Draws one full-surface frame with `program`.
    fn draw(&mut self, program: &Self::Program) -> Result<(), RenderError>;

    fn delete_program(&mut self, program: &Self::Program);

    /// Current physical pixel size of the drawable, read fresh on every call.
    fn drawable_size(&self) -> PixelSize;

    /// Re-reads the container size and reconfigures the drawable.
    fn resize(&mut self) -> PixelSize;

    /// Releases the context itself. Called at most once by the owning surface.
    fn release(&mut self);
}

/// Creates drawing contexts for host containers (windows, canvases, ...).
pub trait ContextHost {
    type Container: Clone;
    type Context: GraphicsContext;

    fn create_context(
        &mut self,
        container: &Self::Container,
        profile: &ContextProfile,
    ) -> Result<Self::Context, RenderError>;
}
