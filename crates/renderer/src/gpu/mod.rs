//! wgpu implementation of the backend seam.
//!
//! - `context` owns the instance/device/surface wiring for one window and
//!   implements `GraphicsContext`: shader modules are compiled inside wgpu
//!   validation error scopes so GLSL diagnostics come back as compile logs,
//!   and surface or device loss is reported as `ContextLost`.
//! - `pipeline` builds the single-bind-group render pipeline and the MSAA
//!   target used when a profile asks for antialiasing.

mod context;
mod pipeline;

pub use context::{WgpuContext, WgpuHost, WgpuProgram, WgpuShader};
