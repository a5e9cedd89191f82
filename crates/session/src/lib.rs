//! Preview session manager: decides which catalog previews own a live
//! surface, under which scheduling policy and context profile.
//!
//! - Hover previews are debounced, limited to one catalog-wide, drawn
//!   on demand at reduced fidelity, and destroyed (never paused) when the
//!   pointer moves on.
//! - Inline previews pause off-screen and resume with their clock intact;
//!   hero previews are destroyed off-screen and recreated when visible.
//! - At most one modal exists. Closing hides it at once and tears it down
//!   when the close transition has run its course.
//!
//! All methods take the current `Instant` from the caller so the session can
//! be driven by a host frame callback or by tests.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use catalog::{RegistryError, ShaderRegistry};
use galleryconfig::{PowerSetting, ProfileSettings, SessionConfig};
use renderer::{
    ContextHost, ContextProfile, FrameReport, PowerPreference, RenderError, Runtime,
    SchedulingPolicy, SurfaceHandle, SurfaceState,
};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Identity of a place in the UI that can host a preview (a gallery tile, the
/// detail page, the hero banner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        SlotId(id.into())
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// Detail page or expanded tile: paused while off-screen.
    Inline,
    /// Landing banner: destroyed while off-screen.
    Hero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalPhase {
    Closed,
    Open,
    /// Hidden, waiting for the close transition before teardown.
    Closing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    HoverOpened {
        slot: SlotId,
        entry: String,
        handle: SurfaceHandle,
    },
    ModalDestroyed {
        handle: SurfaceHandle,
    },
}

enum HoverState<C> {
    Idle,
    Pending {
        slot: SlotId,
        entry: String,
        container: C,
        since: Instant,
    },
    Active {
        slot: SlotId,
        handle: SurfaceHandle,
    },
}

struct InlineSlot<C> {
    kind: InlineKind,
    entry: String,
    container: C,
    handle: Option<SurfaceHandle>,
    visible: bool,
}

enum ModalState {
    Closed,
    Open {
        entry: String,
        handle: SurfaceHandle,
    },
    Closing {
        handle: SurfaceHandle,
        deadline: Instant,
    },
}

pub fn context_profile(settings: ProfileSettings) -> ContextProfile {
    ContextProfile {
        min_pixel_ratio: settings.min_pixel_ratio,
        max_pixel_ratio: settings.max_pixel_ratio,
        antialias: settings.antialias,
        power: match settings.power {
            PowerSetting::Low => PowerPreference::Low,
            PowerSetting::High => PowerPreference::High,
        },
    }
}

pub struct PreviewSession<H: ContextHost> {
    registry: Arc<ShaderRegistry>,
    config: SessionConfig,
    runtime: Runtime<H>,
    hover: HoverState<H::Container>,
    slots: BTreeMap<SlotId, InlineSlot<H::Container>>,
    modal: ModalState,
}

impl<H: ContextHost> PreviewSession<H> {
    pub fn new(registry: Arc<ShaderRegistry>, host: H, config: SessionConfig) -> Self {
        Self {
            registry,
            config,
            runtime: Runtime::new(host),
            hover: HoverState::Idle,
            slots: BTreeMap::new(),
            modal: ModalState::Closed,
        }
    }

    /// The pointer entered `slot`. Any other hover preview is torn down right
    /// away; the new one is created by [`PreviewSession::tick`] once the hover
    /// has lasted for the configured delay.
    pub fn hover_enter(
        &mut self,
        slot: SlotId,
        entry: &str,
        container: H::Container,
        now: Instant,
    ) -> Result<(), SessionError> {
        self.registry.get(entry)?;
        if self.hover_slot() == Some(&slot) {
            return Ok(());
        }
        self.clear_hover();
        debug!(%slot, entry, "hover pending");
        self.hover = HoverState::Pending {
            slot,
            entry: entry.to_string(),
            container,
            since: now,
        };
        Ok(())
    }

    /// The pointer left `slot`. Returns whether a pending or live hover
    /// preview was dropped.
    pub fn hover_leave(&mut self, slot: &SlotId) -> bool {
        if self.hover_slot() != Some(slot) {
            return false;
        }
        self.clear_hover();
        true
    }

    /// Forwards pointer movement to the live hover preview, which redraws
    /// once in response.
    pub fn hover_pointer(&mut self, slot: &SlotId, pointer: [f32; 4]) -> Result<(), SessionError> {
        if let HoverState::Active { slot: current, handle } = &self.hover {
            if current == slot {
                self.runtime.set_pointer(*handle, pointer)?;
            }
        }
        Ok(())
    }

    fn hover_slot(&self) -> Option<&SlotId> {
        match &self.hover {
            HoverState::Idle => None,
            HoverState::Pending { slot, .. } | HoverState::Active { slot, .. } => Some(slot),
        }
    }

    fn clear_hover(&mut self) {
        match std::mem::replace(&mut self.hover, HoverState::Idle) {
            HoverState::Active { slot, handle } => {
                self.runtime.destroy(handle);
                debug!(%slot, %handle, "hover preview destroyed");
            }
            HoverState::Pending { slot, .. } => debug!(%slot, "hover cancelled"),
            HoverState::Idle => {}
        }
    }

    /// Mounts a preview in `slot`, replacing whatever the slot showed before.
    /// A hero mounted off-screen gets no surface until it becomes visible.
    pub fn show_inline(
        &mut self,
        slot: SlotId,
        kind: InlineKind,
        entry: &str,
        container: H::Container,
        visible: bool,
        now: Instant,
    ) -> Result<Option<SurfaceHandle>, SessionError> {
        self.registry.get(entry)?;
        self.remove_slot(&slot);

        let mut state = InlineSlot {
            kind,
            entry: entry.to_string(),
            container,
            handle: None,
            visible,
        };
        if visible || kind == InlineKind::Inline {
            let handle = self.create(kind, &state.entry, state.container.clone(), now)?;
            if !visible {
                self.runtime.pause(handle)?;
            }
            state.handle = Some(handle);
        }
        info!(%slot, entry, ?kind, visible, "inline preview mounted");
        let handle = state.handle;
        self.slots.insert(slot, state);
        Ok(handle)
    }

    fn create(
        &mut self,
        kind: InlineKind,
        entry: &str,
        container: H::Container,
        now: Instant,
    ) -> Result<SurfaceHandle, SessionError> {
        let settings = match kind {
            InlineKind::Inline => self.config.inline.profile(),
            InlineKind::Hero => self.config.hero.profile(),
        };
        let entry = self.registry.get(entry)?;
        Ok(self.runtime.create_surface(
            entry,
            container,
            SchedulingPolicy::Continuous,
            context_profile(settings),
            now,
        )?)
    }

    /// Viewport visibility changed for `slot`. Unknown slots are ignored.
    pub fn set_visible(
        &mut self,
        slot: &SlotId,
        visible: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        let Some(state) = self.slots.get(slot) else {
            return Ok(());
        };
        if state.visible == visible {
            return Ok(());
        }
        let (kind, handle) = (state.kind, state.handle);

        match (kind, visible, handle) {
            (InlineKind::Inline, false, Some(handle)) => self.runtime.pause(handle)?,
            (InlineKind::Inline, true, Some(handle)) => self.runtime.resume(handle)?,
            (InlineKind::Hero, false, Some(handle)) => {
                self.runtime.destroy(handle);
                if let Some(state) = self.slots.get_mut(slot) {
                    state.handle = None;
                }
            }
            (InlineKind::Hero, true, None) => {
                let (entry, container) = match self.slots.get(slot) {
                    Some(state) => (state.entry.clone(), state.container.clone()),
                    None => return Ok(()),
                };
                let handle = self.create(InlineKind::Hero, &entry, container, now)?;
                if let Some(state) = self.slots.get_mut(slot) {
                    state.handle = Some(handle);
                }
            }
            _ => {}
        }
        if let Some(state) = self.slots.get_mut(slot) {
            state.visible = visible;
        }
        debug!(%slot, visible, ?kind, "visibility changed");
        Ok(())
    }

    /// Unmounts `slot`, destroying its surface.
    pub fn remove_slot(&mut self, slot: &SlotId) -> bool {
        match self.slots.remove(slot) {
            Some(state) => {
                if let Some(handle) = state.handle {
                    self.runtime.destroy(handle);
                }
                true
            }
            None => false,
        }
    }

    pub fn slot_handle(&self, slot: &SlotId) -> Option<SurfaceHandle> {
        self.slots.get(slot).and_then(|state| state.handle)
    }

    /// Opens `entry` as the modal preview. Any existing modal, open or still
    /// closing, is destroyed first. An unknown id leaves the current modal
    /// alone.
    pub fn open_modal(
        &mut self,
        entry: &str,
        container: H::Container,
        now: Instant,
    ) -> Result<SurfaceHandle, SessionError> {
        let registry = Arc::clone(&self.registry);
        let shader = registry.get(entry)?;
        if let Some(previous) = self.take_modal() {
            self.runtime.destroy(previous);
            info!(handle = %previous, "previous modal destroyed");
        }
        let handle = self.runtime.create_surface(
            shader,
            container,
            SchedulingPolicy::Continuous,
            context_profile(self.config.modal.profile()),
            now,
        )?;
        info!(%handle, entry, "modal opened");
        self.modal = ModalState::Open {
            entry: entry.to_string(),
            handle,
        };
        Ok(handle)
    }

    /// Logical close: the modal is hidden immediately, its surface is
    /// destroyed by [`PreviewSession::tick`] once the close delay passed.
    pub fn close_modal(&mut self, now: Instant) -> bool {
        match self.modal {
            ModalState::Open { handle, .. } => {
                let deadline = now + self.config.modal.close_delay;
                debug!(%handle, "modal closing");
                self.modal = ModalState::Closing { handle, deadline };
                true
            }
            _ => false,
        }
    }

    /// The close transition ended early; tear the modal down now.
    pub fn finish_modal_close(&mut self) -> Option<SurfaceHandle> {
        match self.modal {
            ModalState::Closing { handle, .. } => {
                self.modal = ModalState::Closed;
                self.runtime.destroy(handle);
                Some(handle)
            }
            _ => None,
        }
    }

    fn take_modal(&mut self) -> Option<SurfaceHandle> {
        match std::mem::replace(&mut self.modal, ModalState::Closed) {
            ModalState::Open { handle, .. } | ModalState::Closing { handle, .. } => Some(handle),
            ModalState::Closed => None,
        }
    }

    pub fn modal_phase(&self) -> ModalPhase {
        match self.modal {
            ModalState::Closed => ModalPhase::Closed,
            ModalState::Open { .. } => ModalPhase::Open,
            ModalState::Closing { .. } => ModalPhase::Closing,
        }
    }

    pub fn modal_handle(&self) -> Option<SurfaceHandle> {
        match self.modal {
            ModalState::Open { handle, .. } | ModalState::Closing { handle, .. } => Some(handle),
            ModalState::Closed => None,
        }
    }

    pub fn modal_entry(&self) -> Option<&str> {
        match &self.modal {
            ModalState::Open { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// Advances timers: promotes a hover that outlasted the debounce delay
    /// and completes a modal close whose deadline passed.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        let due = matches!(
            &self.hover,
            HoverState::Pending { since, .. }
                if now.saturating_duration_since(*since) >= self.config.hover.delay
        );
        if due {
            if let HoverState::Pending {
                slot,
                entry,
                container,
                ..
            } = std::mem::replace(&mut self.hover, HoverState::Idle)
            {
                match self.open_hover(&entry, container, now) {
                    Ok(handle) => {
                        info!(%slot, %handle, entry = %entry, "hover preview opened");
                        self.hover = HoverState::Active {
                            slot: slot.clone(),
                            handle,
                        };
                        events.push(SessionEvent::HoverOpened {
                            slot,
                            entry,
                            handle,
                        });
                    }
                    Err(err) => warn!(%slot, entry = %entry, error = %err, "hover preview failed"),
                }
            }
        }

        if let ModalState::Closing { handle, deadline } = self.modal {
            if now >= deadline {
                self.modal = ModalState::Closed;
                self.runtime.destroy(handle);
                debug!(%handle, "modal destroyed after close transition");
                events.push(SessionEvent::ModalDestroyed { handle });
            }
        }

        events
    }

    fn open_hover(
        &mut self,
        entry: &str,
        container: H::Container,
        now: Instant,
    ) -> Result<SurfaceHandle, SessionError> {
        let shader = self.registry.get(entry)?;
        Ok(self.runtime.create_surface(
            shader,
            container,
            SchedulingPolicy::OnDemand,
            context_profile(self.config.hover.profile()),
            now,
        )?)
    }

    pub fn hover_handle(&self) -> Option<SurfaceHandle> {
        match self.hover {
            HoverState::Active { handle, .. } => Some(handle),
            _ => None,
        }
    }

    pub fn hover_pending(&self) -> bool {
        matches!(self.hover, HoverState::Pending { .. })
    }

    /// Pauses a rendering surface or resumes a paused one. Returns whether
    /// the surface is paused afterwards.
    pub fn toggle_pause(&mut self, handle: SurfaceHandle) -> Result<bool, SessionError> {
        let state = self
            .runtime
            .status(handle)
            .map(|status| status.state)
            .ok_or(RenderError::UnknownSurface(handle.get()))?;
        if state == SurfaceState::Paused {
            self.runtime.resume(handle)?;
            Ok(false)
        } else {
            self.runtime.pause(handle)?;
            let after = self.runtime.status(handle).map(|status| status.state);
            Ok(after == Some(SurfaceState::Paused))
        }
    }

    /// Draws one frame for every surface and rebuilds those whose context
    /// was lost while drawing.
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let report = self.runtime.frame(now);
        for handle in &report.lost {
            if let Err(err) = self.rebuild(*handle) {
                warn!(%handle, error = %err, "rebuild after context loss failed");
            }
        }
        report
    }

    /// Rebuilds `handle` on a fresh context from its catalog entry.
    pub fn rebuild(&mut self, handle: SurfaceHandle) -> Result<(), SessionError> {
        let program_id = self
            .runtime
            .status(handle)
            .map(|status| status.program_id)
            .ok_or(RenderError::UnknownSurface(handle.get()))?;
        let entry = self.registry.get(&program_id)?;
        self.runtime.rebuild(handle, entry)?;
        Ok(())
    }

    /// Re-reads every drawable size, e.g. after a layout pass.
    pub fn resize_all(&mut self) -> usize {
        let handles: Vec<SurfaceHandle> = self.runtime.handles().collect();
        let mut resized = 0;
        for handle in handles {
            match self.runtime.resize(handle) {
                Ok(_) => resized += 1,
                Err(err) => warn!(%handle, error = %err, "resize failed"),
            }
        }
        resized
    }

    /// The page is being left: every preview is unmounted.
    pub fn navigate_away(&mut self) -> usize {
        self.hover = HoverState::Idle;
        self.slots.clear();
        self.modal = ModalState::Closed;
        let released = self.runtime.clear();
        info!(released, "session cleared");
        released
    }

    pub fn wants_frame(&self) -> bool {
        self.runtime.wants_frame()
    }

    pub fn registry(&self) -> &Arc<ShaderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Runtime<H> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<H> {
        &mut self.runtime
    }
}
