//! Render Surface: one drawing context, at most one program, one clock.
//!
//! ```text
//!   Created ──build──▶ Building ──ok──▶ Ready ──start──▶ Rendering ⇄ Paused
//!                         │ err                                 │
//!                         └─ stays Building, failure recorded   │
//!   (any) ──destroy──▶ Destroyed ◀── context lost ──────────────┘
//! ```

use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{GraphicsContext, UniformValue};
use crate::clock::SurfaceClock;
use crate::error::{CompileError, RenderError};
use crate::program::{CompiledProgram, ProgramCache, ProgramFactory};
use crate::types::{ContextId, PixelSize, SchedulingPolicy};
use crate::uniforms::{FrameInputs, UniformFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Created,
    Building,
    Ready,
    Rendering,
    Paused,
    Destroyed,
}

impl fmt::Display for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceState::Created => "created",
            SurfaceState::Building => "building",
            SurfaceState::Ready => "ready",
            SurfaceState::Rendering => "rendering",
            SurfaceState::Paused => "paused",
            SurfaceState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

pub struct RenderSurface<C: GraphicsContext> {
    context: Option<C>,
    context_id: ContextId,
    program: Option<Rc<CompiledProgram<C>>>,
    feed: Option<UniformFeed>,
    policy: SchedulingPolicy,
    state: SurfaceState,
    clock: SurfaceClock,
    resolution: PixelSize,
    pointer: [f32; 4],
    needs_redraw: bool,
    failure: Option<CompileError>,
    frames_drawn: u64,
}

impl<C: GraphicsContext> RenderSurface<C> {
    /// Takes ownership of `context`; the clock starts at `now`.
    pub fn new(context: C, policy: SchedulingPolicy, now: Instant) -> Self {
        Self::with_clock(context, policy, SurfaceClock::new(now))
    }

    /// Like [`RenderSurface::new`] but continues an existing clock, used when
    /// a surface is rebuilt after its context was lost.
    pub fn with_clock(context: C, policy: SchedulingPolicy, clock: SurfaceClock) -> Self {
        let resolution = context.drawable_size();
        let context_id = context.id();
        debug!(context = %context_id, %resolution, %policy, "surface created");
        Self {
            context: Some(context),
            context_id,
            program: None,
            feed: None,
            policy,
            state: SurfaceState::Created,
            clock,
            resolution,
            pointer: [0.0; 4],
            needs_redraw: true,
            failure: None,
            frames_drawn: 0,
        }
    }

    /// Obtains the program for `factory` from `cache` and binds it.
    ///
    /// On a compile failure the surface stays in `Building` with the
    /// diagnostic recorded; it never draws until built successfully.
    pub fn build<F>(&mut self, factory: &F, cache: &mut ProgramCache<C>) -> Result<(), RenderError>
    where
        F: ProgramFactory + ?Sized,
    {
        if !matches!(self.state, SurfaceState::Created | SurfaceState::Building) {
            return Err(RenderError::InvalidTransition {
                from: self.state,
                action: "build",
            });
        }
        let context = self
            .context
            .as_mut()
            .ok_or(RenderError::Released(self.context_id))?;
        self.state = SurfaceState::Building;

        match cache.build(factory, context) {
            Ok(program) => {
                self.feed = Some(UniformFeed::new(factory.program_source()));
                self.program = Some(program);
                self.failure = None;
                self.needs_redraw = true;
                self.state = SurfaceState::Ready;
                debug!(context = %self.context_id, program = factory.program_id(), "surface ready");
                Ok(())
            }
            Err(err) => {
                self.failure = Some(err.clone());
                Err(RenderError::Compile(err))
            }
        }
    }

    pub fn start(&mut self) -> Result<(), RenderError> {
        match self.state {
            SurfaceState::Ready | SurfaceState::Rendering => {
                self.state = SurfaceState::Rendering;
                self.needs_redraw = true;
                Ok(())
            }
            from => Err(RenderError::InvalidTransition {
                from,
                action: "start",
            }),
        }
    }

    /// Suspends the pump; program and context are retained.
    pub fn pause(&mut self) -> Result<(), RenderError> {
        match self.state {
            SurfaceState::Rendering | SurfaceState::Paused => {
                self.state = SurfaceState::Paused;
                Ok(())
            }
            from => Err(RenderError::InvalidTransition {
                from,
                action: "pause",
            }),
        }
    }

    pub fn resume(&mut self) -> Result<(), RenderError> {
        match self.state {
            SurfaceState::Paused | SurfaceState::Rendering | SurfaceState::Ready => {
                self.state = SurfaceState::Rendering;
                self.needs_redraw = true;
                Ok(())
            }
            from => Err(RenderError::InvalidTransition {
                from,
                action: "resume",
            }),
        }
    }

    /// Re-reads the drawable size. The state is unchanged and the new
    /// resolution is visible to the very next frame.
    pub fn resize(&mut self) -> Result<PixelSize, RenderError> {
        let context = self
            .context
            .as_mut()
            .ok_or(RenderError::Released(self.context_id))?;
        let size = context.resize();
        if size != self.resolution {
            debug!(
                context = %self.context_id,
                from = %self.resolution,
                to = %size,
                "surface resized"
            );
            self.resolution = size;
            self.needs_redraw = true;
        }
        Ok(size)
    }

    pub fn set_policy(&mut self, policy: SchedulingPolicy) {
        if self.policy != policy {
            self.policy = policy;
            self.needs_redraw = true;
        }
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Overrides an entry-specific uniform for this surface only.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), RenderError> {
        if let Some(slot) = self.program.as_ref().and_then(|p| p.uniform(name)) {
            if slot.kind != value.kind() {
                return Err(RenderError::UniformKind {
                    name: name.to_string(),
                    declared: slot.kind,
                    given: value.kind(),
                });
            }
        }
        if let Some(feed) = self.feed.as_mut() {
            feed.set(name, value);
            self.needs_redraw = true;
        }
        Ok(())
    }

    pub fn set_pointer(&mut self, pointer: [f32; 4]) {
        if self.pointer != pointer {
            self.pointer = pointer;
            self.needs_redraw = true;
        }
    }

    /// Whether the next `frame` call would draw.
    pub fn wants_frame(&self) -> bool {
        self.state == SurfaceState::Rendering
            && match self.policy {
                SchedulingPolicy::Continuous => true,
                SchedulingPolicy::OnDemand => self.needs_redraw,
                SchedulingPolicy::Suspended => false,
            }
    }

    /// Feeds uniforms and draws one frame if the policy asks for it.
    ///
    /// Returns `Ok(false)` when nothing was drawn. A lost context destroys the
    /// surface before the error is returned.
    pub fn frame(
        &mut self,
        now: Instant,
        cache: &mut ProgramCache<C>,
    ) -> Result<bool, RenderError> {
        if !self.wants_frame() {
            return Ok(false);
        }
        let (Some(program), Some(feed)) = (&self.program, &self.feed) else {
            return Ok(false);
        };
        let Some(context) = self.context.as_mut() else {
            return Ok(false);
        };
        if program.context() != context.id() {
            return Err(RenderError::ContextMismatch {
                program: program.context(),
                context: context.id(),
            });
        }

        self.resolution = context.drawable_size();
        let mut inputs = FrameInputs::new(self.clock.sample(now), self.resolution);
        inputs.pointer = self.pointer;
        feed.apply(context, program, &inputs);

        match context.draw(program.handle()) {
            Ok(()) => {
                self.needs_redraw = false;
                self.frames_drawn += 1;
                Ok(true)
            }
            Err(err) if err.is_context_lost() => {
                warn!(context = %self.context_id, error = %err, "context lost; destroying surface");
                self.destroy(cache);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Releases the program reference, evicts the context's cached programs
    /// and releases the context. Valid from any state; repeated calls are
    /// no-ops and return `false`.
    pub fn destroy(&mut self, cache: &mut ProgramCache<C>) -> bool {
        if self.state == SurfaceState::Destroyed {
            return false;
        }
        self.program = None;
        self.feed = None;
        if let Some(mut context) = self.context.take() {
            cache.release_context(&mut context);
            context.release();
        }
        info!(context = %self.context_id, frames = self.frames_drawn, "surface destroyed");
        self.state = SurfaceState::Destroyed;
        true
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn resolution(&self) -> PixelSize {
        self.resolution
    }

    pub fn failure(&self) -> Option<&CompileError> {
        self.failure.as_ref()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn clock(&self) -> &SurfaceClock {
        &self.clock
    }

    pub fn elapsed(&self, now: Instant) -> f32 {
        self.clock.elapsed(now)
    }

    pub fn program(&self) -> Option<&Rc<CompiledProgram<C>>> {
        self.program.as_ref()
    }

    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }
}

impl<C: GraphicsContext> fmt::Debug for RenderSurface<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSurface")
            .field("context", &self.context_id)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("resolution", &self.resolution)
            .field("frames_drawn", &self.frames_drawn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::ContextHost;
    use crate::program::ProgramSource;
    use crate::testing::{RecordingContainer, RecordingContext, RecordingHost};
    use crate::types::ContextProfile;

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

    fn orb() -> Effect {
        Effect {
            id: "orb",
            source: ProgramSource::fullscreen(
                "uniform float iTime;\nuniform vec3 iResolution;\nvoid main() {}\n",
            ),
        }
    }

    fn surface(
        host: &mut RecordingHost,
        container: &RecordingContainer,
        policy: SchedulingPolicy,
        now: Instant,
    ) -> RenderSurface<RecordingContext> {
        let context = host
            .create_context(container, &ContextProfile::full())
            .unwrap();
        RenderSurface::new(context, policy, now)
    }

    #[test]
    fn clock_continues_across_pause() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(100, 100));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        let second = |n| start + Duration::from_secs(n);
        surface.frame(second(1), &mut cache).unwrap();
        let before = surface.context().unwrap().uniform_value("iTime");
        surface.pause().unwrap();
        assert!(!surface.frame(second(2), &mut cache).unwrap());
        surface.resume().unwrap();
        surface.frame(second(3), &mut cache).unwrap();
        let after = surface.context().unwrap().uniform_value("iTime");

        assert_eq!(before, Some(UniformValue::Float(1.0)));
        assert_eq!(after, Some(UniformValue::Float(3.0)));
        assert_eq!(surface.frames_drawn(), 2);
    }

    #[test]
    fn resize_updates_resolution_before_next_draw() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(100, 50));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        container.set_size(PixelSize::new(300, 200));
        assert_eq!(surface.resize().unwrap(), PixelSize::new(300, 200));
        assert_eq!(surface.resolution(), PixelSize::new(300, 200));
        assert_eq!(surface.state(), SurfaceState::Rendering);

        surface.frame(start, &mut cache).unwrap();
        assert_eq!(
            surface.context().unwrap().uniform_value("iResolution"),
            Some(UniformValue::Vec3([300.0, 200.0, 1.0]))
        );
    }

    #[test]
    fn resolution_is_refreshed_without_resize_event() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(100, 50));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        container.set_size(PixelSize::new(64, 64));
        surface.frame(start, &mut cache).unwrap();
        assert_eq!(
            surface.context().unwrap().uniform_value("iResolution"),
            Some(UniformValue::Vec3([64.0, 64.0, 1.0]))
        );
    }

    #[test]
    fn resize_while_paused_stays_paused() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(100, 50));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();
        surface.pause().unwrap();

        container.set_size(PixelSize::new(200, 120));
        assert_eq!(surface.resize().unwrap(), PixelSize::new(200, 120));
        assert_eq!(surface.state(), SurfaceState::Paused);
        assert_eq!(surface.resolution(), PixelSize::new(200, 120));
        assert!(!surface.frame(start, &mut cache).unwrap());
        assert_eq!(host.journal().draws, 0);

        surface.resume().unwrap();
        assert!(surface.frame(start, &mut cache).unwrap());
        assert_eq!(
            surface.context().unwrap().uniform_value("iResolution"),
            Some(UniformValue::Vec3([200.0, 120.0, 1.0]))
        );
    }

    #[test]
    fn continuous_frames_allocate_no_gpu_objects() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(64, 64));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();
        let before = host.journal();

        for frame in 1..=240 {
            let now = start + Duration::from_millis(frame * 16);
            assert!(surface.frame(now, &mut cache).unwrap());
        }

        let after = host.journal();
        assert_eq!(after.draws, before.draws + 240);
        assert_eq!(after.contexts_created, before.contexts_created);
        assert_eq!(after.compiles, before.compiles);
        assert_eq!(after.links, before.links);
        assert_eq!(after.shaders_deleted, before.shaders_deleted);
        assert!(after.programs_deleted.is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().compiles, 1);
    }

    #[test]
    fn on_demand_draws_only_after_input_changes() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::OnDemand, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        assert!(surface.frame(start, &mut cache).unwrap());
        assert!(!surface.frame(start, &mut cache).unwrap());
        surface.set_pointer([1.0, 2.0, 0.0, 0.0]);
        assert!(surface.frame(start, &mut cache).unwrap());
        assert_eq!(host.journal().draws, 2);
    }

    #[test]
    fn suspended_policy_never_draws() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Suspended, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();
        assert!(!surface.frame(start, &mut cache).unwrap());
    }

    #[test]
    fn compile_failure_stays_in_building() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        let broken = Effect {
            id: "broken",
            source: ProgramSource::fullscreen("#error broken\nvoid main() {}\n"),
        };

        let err = surface.build(&broken, &mut cache).unwrap_err();
        assert!(matches!(err, RenderError::Compile(_)));
        assert_eq!(surface.state(), SurfaceState::Building);
        assert!(surface.failure().is_some());
        assert!(surface.start().is_err());
        assert!(!surface.frame(start, &mut cache).unwrap());
        assert_eq!(host.journal().draws, 0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        assert!(surface.destroy(&mut cache));
        assert!(!surface.destroy(&mut cache));
        assert_eq!(surface.state(), SurfaceState::Destroyed);
        assert!(!surface.frame(start, &mut cache).unwrap());
        let journal = host.journal();
        assert_eq!(journal.contexts_released, 1);
        assert_eq!(journal.programs_deleted.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn context_loss_destroys_surface() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        surface.start().unwrap();

        container.lose_context();
        let err = surface.frame(start, &mut cache).unwrap_err();
        assert!(err.is_context_lost());
        assert_eq!(surface.state(), SurfaceState::Destroyed);
        assert_eq!(host.journal().contexts_released, 1);
    }

    #[test]
    fn mistyped_uniform_override_is_rejected() {
        let mut host = RecordingHost::new();
        let container = RecordingContainer::new(PixelSize::new(32, 32));
        let start = Instant::now();
        let mut cache = ProgramCache::new();
        let mut surface = surface(&mut host, &container, SchedulingPolicy::Continuous, start);
        surface.build(&orb(), &mut cache).unwrap();
        let err = surface
            .set_uniform("iTime", UniformValue::Vec2([0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, RenderError::UniformKind { .. }));
    }
}
