//! Handle-based surface runtime.
//!
//! `Runtime` is what a hosting view talks to: it owns the context host, the
//! single program cache and every live surface, and hands out opaque
//! [`SurfaceHandle`]s. All calls happen on the thread that drives the frame
//! callback; `frame` is that callback.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{ContextHost, UniformValue};
use crate::error::{CompileError, RenderError};
use crate::program::{CacheStats, ProgramCache, ProgramFactory};
use crate::surface::{RenderSurface, SurfaceState};
use crate::types::{ContextId, ContextProfile, PixelSize, SchedulingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Read-only view of one surface for UIs and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceStatus {
    pub program_id: String,
    pub state: SurfaceState,
    pub policy: SchedulingPolicy,
    pub resolution: PixelSize,
    pub context: ContextId,
    pub frames_drawn: u64,
    pub failure: Option<CompileError>,
    /// The context was lost; `rebuild` brings the surface back.
    pub lost: bool,
}

/// Outcome of one frame callback across all surfaces.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub drawn: usize,
    pub skipped: usize,
    /// Surfaces whose context was lost during this frame.
    pub lost: Vec<SurfaceHandle>,
    pub failed: Vec<(SurfaceHandle, RenderError)>,
}

struct Slot<H: ContextHost> {
    surface: RenderSurface<H::Context>,
    container: H::Container,
    profile: ContextProfile,
    program_id: String,
    lost: bool,
}

pub struct Runtime<H: ContextHost> {
    host: H,
    cache: ProgramCache<H::Context>,
    surfaces: BTreeMap<SurfaceHandle, Slot<H>>,
    next_handle: u64,
}

impl<H: ContextHost> Runtime<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            cache: ProgramCache::new(),
            surfaces: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Creates a context for `container`, builds the program and starts the
    /// pump under `policy`.
    ///
    /// A compile failure still yields a handle: the surface stays in
    /// `Building` and reports the diagnostic through [`Runtime::status`].
    /// Failing to create the context at all is an error.
    pub fn create_surface<F>(
        &mut self,
        factory: &F,
        container: H::Container,
        policy: SchedulingPolicy,
        profile: ContextProfile,
        now: Instant,
    ) -> Result<SurfaceHandle, RenderError>
    where
        F: ProgramFactory + ?Sized,
    {
        let context = self.host.create_context(&container, &profile)?;
        let mut surface = RenderSurface::new(context, policy, now);
        self.bring_up(&mut surface, factory)?;

        let handle = SurfaceHandle(self.next_handle);
        self.next_handle += 1;
        info!(
            %handle,
            program = factory.program_id(),
            context = %surface.context_id(),
            state = %surface.state(),
            %policy,
            "surface opened"
        );
        self.surfaces.insert(
            handle,
            Slot {
                surface,
                container,
                profile,
                program_id: factory.program_id().to_string(),
                lost: false,
            },
        );
        Ok(handle)
    }

    fn bring_up<F>(
        &mut self,
        surface: &mut RenderSurface<H::Context>,
        factory: &F,
    ) -> Result<(), RenderError>
    where
        F: ProgramFactory + ?Sized,
    {
        match surface.build(factory, &mut self.cache) {
            Ok(()) => surface.start(),
            Err(RenderError::Compile(err)) => {
                warn!(program = factory.program_id(), error = %err, "shader failed to build");
                Ok(())
            }
            Err(err) => {
                surface.destroy(&mut self.cache);
                Err(err)
            }
        }
    }

    pub fn pause(&mut self, handle: SurfaceHandle) -> Result<(), RenderError> {
        let slot = self.slot_mut(handle)?;
        match slot.surface.state() {
            SurfaceState::Rendering | SurfaceState::Paused => slot.surface.pause(),
            state => {
                debug!(%handle, %state, "pause ignored");
                Ok(())
            }
        }
    }

    pub fn resume(&mut self, handle: SurfaceHandle) -> Result<(), RenderError> {
        let slot = self.slot_mut(handle)?;
        match slot.surface.state() {
            SurfaceState::Ready | SurfaceState::Rendering | SurfaceState::Paused => {
                slot.surface.resume()
            }
            state => {
                debug!(%handle, %state, "resume ignored");
                Ok(())
            }
        }
    }

    /// Tears the surface down and forgets the handle. Unknown or already
    /// destroyed handles are a no-op returning `false`.
    pub fn destroy(&mut self, handle: SurfaceHandle) -> bool {
        match self.surfaces.remove(&handle) {
            Some(mut slot) => {
                slot.surface.destroy(&mut self.cache);
                debug!(%handle, "surface handle released");
                true
            }
            None => false,
        }
    }

    /// Re-reads the container size. Safe on every layout pass; a lost surface
    /// keeps its last known size.
    pub fn resize(&mut self, handle: SurfaceHandle) -> Result<PixelSize, RenderError> {
        let slot = self.slot_mut(handle)?;
        if slot.lost {
            return Ok(slot.surface.resolution());
        }
        slot.surface.resize()
    }

    pub fn set_policy(
        &mut self,
        handle: SurfaceHandle,
        policy: SchedulingPolicy,
    ) -> Result<(), RenderError> {
        self.slot_mut(handle)?.surface.set_policy(policy);
        Ok(())
    }

    pub fn request_redraw(&mut self, handle: SurfaceHandle) -> Result<(), RenderError> {
        self.slot_mut(handle)?.surface.request_redraw();
        Ok(())
    }

    pub fn set_uniform(
        &mut self,
        handle: SurfaceHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), RenderError> {
        self.slot_mut(handle)?.surface.set_uniform(name, value)
    }

    pub fn set_pointer(
        &mut self,
        handle: SurfaceHandle,
        pointer: [f32; 4],
    ) -> Result<(), RenderError> {
        self.slot_mut(handle)?.surface.set_pointer(pointer);
        Ok(())
    }

    /// Drives one frame callback. Uniforms for each surface are written right
    /// before its own draw; a failing surface never stops the others.
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();
        for (handle, slot) in self.surfaces.iter_mut() {
            if slot.lost {
                report.skipped += 1;
                continue;
            }
            match slot.surface.frame(now, &mut self.cache) {
                Ok(true) => report.drawn += 1,
                Ok(false) => report.skipped += 1,
                Err(err) if err.is_context_lost() => {
                    slot.lost = true;
                    report.lost.push(*handle);
                }
                Err(err) => {
                    warn!(%handle, error = %err, "frame failed");
                    report.failed.push((*handle, err));
                }
            }
        }
        report
    }

    /// Rebuilds a surface whose context was lost (or whose build failed) on a
    /// fresh context for the same container. The clock keeps running from the
    /// original creation time; a previously paused surface comes back paused.
    pub fn rebuild<F>(&mut self, handle: SurfaceHandle, factory: &F) -> Result<(), RenderError>
    where
        F: ProgramFactory + ?Sized,
    {
        let slot = self
            .surfaces
            .get_mut(&handle)
            .ok_or(RenderError::UnknownSurface(handle.0))?;
        let was_paused = slot.surface.state() == SurfaceState::Paused;
        slot.surface.destroy(&mut self.cache);

        let context = self.host.create_context(&slot.container, &slot.profile)?;
        let clock = *slot.surface.clock();
        let mut surface = RenderSurface::with_clock(context, slot.surface.policy(), clock);
        match surface.build(factory, &mut self.cache) {
            Ok(()) => {
                surface.start()?;
                if was_paused {
                    surface.pause()?;
                }
            }
            Err(RenderError::Compile(err)) => {
                warn!(
                    %handle,
                    program = factory.program_id(),
                    error = %err,
                    "rebuild failed to compile"
                );
            }
            Err(err) => {
                surface.destroy(&mut self.cache);
                return Err(err);
            }
        }
        info!(%handle, context = %surface.context_id(), "surface rebuilt");
        slot.surface = surface;
        slot.program_id = factory.program_id().to_string();
        slot.lost = false;
        Ok(())
    }

    pub fn status(&self, handle: SurfaceHandle) -> Option<SurfaceStatus> {
        self.surfaces.get(&handle).map(|slot| SurfaceStatus {
            program_id: slot.program_id.clone(),
            state: slot.surface.state(),
            policy: slot.surface.policy(),
            resolution: slot.surface.resolution(),
            context: slot.surface.context_id(),
            frames_drawn: slot.surface.frames_drawn(),
            failure: slot.surface.failure().cloned(),
            lost: slot.lost,
        })
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&RenderSurface<H::Context>> {
        self.surfaces.get(&handle).map(|slot| &slot.surface)
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.surfaces.contains_key(&handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        self.surfaces.keys().copied()
    }

    /// Surfaces currently drawing under their policy.
    pub fn rendering_count(&self) -> usize {
        self.surfaces
            .values()
            .filter(|slot| slot.surface.state() == SurfaceState::Rendering)
            .count()
    }

    pub fn live_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Whether any surface would draw on the next frame.
    pub fn wants_frame(&self) -> bool {
        self.surfaces
            .values()
            .any(|slot| !slot.lost && slot.surface.wants_frame())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_programs(&self) -> usize {
        self.cache.len()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Destroys every surface.
    pub fn clear(&mut self) -> usize {
        let handles: Vec<SurfaceHandle> = self.surfaces.keys().copied().collect();
        for handle in &handles {
            self.destroy(*handle);
        }
        handles.len()
    }

    fn slot_mut(&mut self, handle: SurfaceHandle) -> Result<&mut Slot<H>, RenderError> {
        self.surfaces
            .get_mut(&handle)
            .ok_or(RenderError::UnknownSurface(handle.0))
    }
}

impl<H: ContextHost> Drop for Runtime<H> {
    fn drop(&mut self) {
        self.clear();
    }
}
