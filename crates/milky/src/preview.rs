//! Interactive preview window.
//!
//! One winit window hosts a `PreviewSession` backed by wgpu. Keys:
//! Space pauses/resumes, Left/Right switch to the previous/next entry,
//! Escape closes (a modal closes in two phases, other modes exit at once).
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use catalog::ShaderRegistry;
use galleryconfig::SessionConfig;
use renderer::gpu::WgpuHost;
use renderer::SurfaceHandle;
use session::{InlineKind, ModalPhase, PreviewSession, SessionError, SessionEvent, SlotId};
use tracing::{error, info, warn};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::cli::{PreviewArgs, PreviewMode};

const DEFAULT_WINDOW_SIZE: (u32, u32) = (960, 540);
/// Wake-up interval while a hover debounce or modal close is pending.
const TIMER_RESOLUTION: Duration = Duration::from_millis(16);

struct PreviewWindow {
    mode: PreviewMode,
    entry: String,
    slot: SlotId,
    window: Arc<Window>,
    session: PreviewSession<WgpuHost>,
    pointer: [f32; 4],
}

impl PreviewWindow {
    fn open(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.mode {
            PreviewMode::Modal => {
                let window = self.window.clone();
                self.session.open_modal(&self.entry, window, now)?;
            }
            PreviewMode::Inline => {
                self.session.show_inline(
                    self.slot.clone(),
                    InlineKind::Inline,
                    &self.entry,
                    self.window.clone(),
                    self.window.has_focus(),
                    now,
                )?;
            }
            PreviewMode::Hover => {}
        }
        self.refresh_title();
        Ok(())
    }

    fn current_handle(&self) -> Option<SurfaceHandle> {
        match self.mode {
            PreviewMode::Modal => self.session.modal_handle(),
            PreviewMode::Inline => self.session.slot_handle(&self.slot),
            PreviewMode::Hover => self.session.hover_handle(),
        }
    }

    fn step(&mut self, delta: isize, now: Instant) -> Result<(), SessionError> {
        let registry = self.session.registry();
        let next = registry.cycle(&self.entry, delta)?.id().to_string();
        info!(from = %self.entry, to = %next, "switching entry");
        self.entry = next;
        if self.mode == PreviewMode::Hover {
            if self.session.hover_leave(&self.slot) {
                self.session
                    .hover_enter(self.slot.clone(), &self.entry, self.window.clone(), now)?;
            }
            self.refresh_title();
            return Ok(());
        }
        self.open(now)
    }

    fn refresh_title(&self) {
        let name = self
            .session
            .registry()
            .get(&self.entry)
            .map(|entry| entry.name().to_string())
            .unwrap_or_else(|_| self.entry.clone());
        let failure = self
            .current_handle()
            .and_then(|handle| self.session.runtime().status(handle))
            .and_then(|status| status.failure);
        match failure {
            Some(err) => {
                warn!(entry = %self.entry, stage = %err.stage, "{}", err.log);
                self.window
                    .set_title(&format!("{name} (compile error: {} stage)", err.stage));
            }
            None => self.window.set_title(&format!("{name} - milky preview")),
        }
    }

    fn set_pointer(&mut self, position: PhysicalPosition<f64>) -> Result<(), SessionError> {
        let height = self.window.inner_size().height as f32;
        self.pointer[0] = position.x as f32;
        self.pointer[1] = height - position.y as f32;
        match self.mode {
            PreviewMode::Hover => self.session.hover_pointer(&self.slot, self.pointer),
            _ => match self.current_handle() {
                Some(handle) => {
                    let pointer = self.pointer;
                    Ok(self.session.runtime_mut().set_pointer(handle, pointer)?)
                }
                None => Ok(()),
            },
        }
    }

    fn toggle_pause(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = self.current_handle() {
            let paused = self.session.toggle_pause(handle)?;
            info!(%handle, paused, "toggled playback");
        }
        Ok(())
    }

    /// Returns whether the window should close now.
    fn escape(&mut self, now: Instant) -> bool {
        match self.mode {
            PreviewMode::Modal => {
                if self.session.close_modal(now) {
                    info!("closing modal");
                }
                self.session.modal_phase() == ModalPhase::Closed
            }
            _ => true,
        }
    }
}

pub fn run(
    registry: Arc<ShaderRegistry>,
    config: SessionConfig,
    args: PreviewArgs,
) -> Result<()> {
    registry.get(&args.id)?;

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = args.size.unwrap_or(DEFAULT_WINDOW_SIZE);
    let window = WindowBuilder::new()
        .with_title("milky preview")
        .with_inner_size(LogicalSize::new(width as f64, height as f64))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut state = PreviewWindow {
        mode: args.mode,
        entry: args.id.clone(),
        slot: SlotId::new("preview"),
        window: window.clone(),
        session: PreviewSession::new(registry, WgpuHost::new(), config),
        pointer: [0.0; 4],
    };
    state
        .open(Instant::now())
        .with_context(|| format!("failed to open preview for '{}'", args.id))?;
    info!(entry = %args.id, mode = ?args.mode, "preview started");

    let mut result = Ok(());
    let run_result = event_loop.run(|event, elwt| {
        let now = Instant::now();
        let outcome: Result<(), SessionError> = match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                    Ok(())
                }
                WindowEvent::KeyboardInput { event, .. }
                    if event.state == ElementState::Pressed && !event.repeat =>
                {
                    match event.logical_key {
                        Key::Named(NamedKey::Space) => state.toggle_pause(),
                        Key::Named(NamedKey::ArrowRight | NamedKey::ArrowDown) => {
                            state.step(1, now)
                        }
                        Key::Named(NamedKey::ArrowLeft | NamedKey::ArrowUp) => state.step(-1, now),
                        Key::Named(NamedKey::Escape) => {
                            if state.escape(now) {
                                elwt.exit();
                            }
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
                WindowEvent::Focused(focused) if state.mode == PreviewMode::Inline => {
                    state.session.set_visible(&state.slot, focused, now)
                }
                WindowEvent::CursorEntered { .. } if state.mode == PreviewMode::Hover => state
                    .session
                    .hover_enter(state.slot.clone(), &state.entry, window.clone(), now),
                WindowEvent::CursorLeft { .. } if state.mode == PreviewMode::Hover => {
                    state.session.hover_leave(&state.slot);
                    Ok(())
                }
                WindowEvent::CursorMoved { position, .. } => state.set_pointer(position),
                WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                    state.session.resize_all();
                    window.request_redraw();
                    Ok(())
                }
                WindowEvent::RedrawRequested => {
                    let report = state.session.frame(now);
                    for (handle, err) in &report.failed {
                        warn!(%handle, error = %err, "frame failed");
                    }
                    if !report.lost.is_empty() {
                        info!(
                            count = report.lost.len(),
                            "rebuilt surfaces after context loss"
                        );
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            Event::AboutToWait => {
                for event in state.session.tick(now) {
                    match event {
                        SessionEvent::ModalDestroyed { .. } => elwt.exit(),
                        SessionEvent::HoverOpened { .. } => state.refresh_title(),
                    }
                }
                if state.session.wants_frame() {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                } else if state.session.hover_pending()
                    || state.session.modal_phase() == ModalPhase::Closing
                {
                    elwt.set_control_flow(ControlFlow::WaitUntil(now + TIMER_RESOLUTION));
                } else {
                    elwt.set_control_flow(ControlFlow::Wait);
                }
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(err) = outcome {
            error!(error = %err, "preview failed");
            result = Err(anyhow!(err));
            elwt.exit();
        }
    });

    state.session.navigate_away();
    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    result
}
