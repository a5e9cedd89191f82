//! Live render runtime for the milky shader gallery.
//!
//! The crate turns catalog entries into pixels. The overall flow is:
//!
//! ```text
//!   ProgramFactory (catalog entry)
//!          │ ProgramSource
//!          ▼
//!   Runtime::create_surface ──▶ RenderSurface ──▶ ProgramCache::build ──▶ CompiledProgram
//!          │                          │
//!          └── Runtime::frame ────────┴─▶ UniformFeed::apply ─▶ GraphicsContext::draw
//! ```
//!
//! Everything above the [`backend`] seam is GPU agnostic. [`gpu`] drives real
//! hardware through wgpu/winit; `testing` (feature `test-support`) records
//! calls instead so lifecycle and caching rules can be tested headless.

pub mod backend;
pub mod clock;
pub mod compile;
pub mod error;
pub mod gpu;
pub mod program;
pub mod runtime;
pub mod surface;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;
pub mod uniforms;

pub use backend::{ContextHost, GraphicsContext, UniformKind, UniformValue};
pub use clock::{SurfaceClock, TimeSample};
pub use compile::{translate_fragment, validate_fragment, TranslatedFragment, FULLSCREEN_VERTEX};
pub use error::{CompileError, RenderError, ShaderStage};
pub use program::{
    CacheStats, CompiledProgram, ProgramCache, ProgramFactory, ProgramSource, UniformBindings,
};
pub use runtime::{FrameReport, Runtime, SurfaceHandle, SurfaceStatus};
pub use surface::{RenderSurface, SurfaceState};
pub use types::{ContextId, ContextProfile, PixelSize, PowerPreference, SchedulingPolicy};
pub use uniforms::{FrameInputs, UniformFeed};
