//! GPU-free backend that records every call.
//!
//! Compiled for this crate's own tests and, through the `test-support`
//! feature, for downstream crates. Fragment sources go through the same
//! translation as the wgpu backend so uniform layouts match. A source
//! containing `#error` fails to compile and one containing `@fail-link`
//! compiles but fails to link.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{ContextHost, GraphicsContext, UniformKind, UniformValue};
use crate::compile::{translate_fragment, UniformBlock};
use crate::error::{RenderError, ShaderStage};
use crate::types::{scaled_size, ContextId, ContextProfile, PixelSize};

/// Counters shared by a host and every context it created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    pub contexts_created: usize,
    pub contexts_released: usize,
    pub compiles: usize,
    pub compile_failures: usize,
    pub links: usize,
    pub link_failures: usize,
    pub shaders_deleted: usize,
    /// Serial numbers of deleted programs, in deletion order.
    pub programs_deleted: Vec<u64>,
    pub uniform_writes: usize,
    pub draws: usize,
}

#[derive(Debug)]
struct ContainerState {
    logical: PixelSize,
    scale_factor: f64,
    epoch: u64,
}

/// Stand-in for a window or canvas. Clones share state, so a test can resize
/// the container or invalidate its contexts after handing it to the runtime.
#[derive(Debug, Clone)]
pub struct RecordingContainer {
    state: Rc<RefCell<ContainerState>>,
}

impl RecordingContainer {
    pub fn new(logical: PixelSize) -> Self {
        Self {
            state: Rc::new(RefCell::new(ContainerState {
                logical,
                scale_factor: 1.0,
                epoch: 0,
            })),
        }
    }

    pub fn set_size(&self, logical: PixelSize) {
        self.state.borrow_mut().logical = logical;
    }

    pub fn set_scale_factor(&self, scale_factor: f64) {
        self.state.borrow_mut().scale_factor = scale_factor;
    }

    /// Invalidates every context created for this container so far. Contexts
    /// created afterwards work normally.
    pub fn lose_context(&self) {
        self.state.borrow_mut().epoch += 1;
    }

    fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    fn drawable_size(&self, profile: &ContextProfile) -> PixelSize {
        let state = self.state.borrow();
        scaled_size(
            f64::from(state.logical.width),
            f64::from(state.logical.height),
            profile.pixel_ratio(state.scale_factor),
        )
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    journal: Rc<RefCell<Journal>>,
    refuse_contexts: bool,
    profiles: Vec<ContextProfile>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    pub fn journal(&self) -> Journal {
        self.journal.borrow().clone()
    }

    /// Makes subsequent `create_context` calls fail.
    pub fn refuse_contexts(&mut self, refuse: bool) {
        self.refuse_contexts = refuse;
    }

    /// Profiles requested so far, in creation order.
    pub fn profiles(&self) -> &[ContextProfile] {
        &self.profiles
    }
}

impl ContextHost for RecordingHost {
    type Container = RecordingContainer;
    type Context = RecordingContext;

    fn create_context(
        &mut self,
        container: &RecordingContainer,
        profile: &ContextProfile,
    ) -> Result<RecordingContext, RenderError> {
        if self.refuse_contexts {
            return Err(RenderError::Context("refused by host".to_string()));
        }
        self.journal.borrow_mut().contexts_created += 1;
        self.profiles.push(*profile);
        Ok(RecordingContext {
            id: ContextId::next(),
            container: container.clone(),
            epoch: container.epoch(),
            profile: *profile,
            journal: Rc::clone(&self.journal),
            next_serial: 1,
            written: HashMap::new(),
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct RecordingShader {
    block: Option<UniformBlock>,
    fail_link: bool,
}

#[derive(Debug)]
pub struct RecordingProgram {
    serial: u64,
    block: UniformBlock,
}

impl RecordingProgram {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Debug)]
pub struct RecordingContext {
    id: ContextId,
    container: RecordingContainer,
    epoch: u64,
    profile: ContextProfile,
    journal: Rc<RefCell<Journal>>,
    next_serial: u64,
    written: HashMap<String, UniformValue>,
    released: bool,
}

impl RecordingContext {
    /// Last value written to the named uniform, across programs.
    pub fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        self.written.get(name).copied()
    }

    pub fn profile(&self) -> &ContextProfile {
        &self.profile
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn is_lost(&self) -> bool {
        self.container.epoch() != self.epoch
    }
}

impl GraphicsContext for RecordingContext {
    type Shader = RecordingShader;
    type Program = RecordingProgram;
    type Location = u32;

    fn id(&self) -> ContextId {
        self.id
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<RecordingShader, String> {
        let mut journal = self.journal.borrow_mut();
        if source.contains("#error") {
            journal.compile_failures += 1;
            return Err("0:1: '#error' : simulated compile failure".to_string());
        }
        let block = match stage {
            ShaderStage::Fragment => match translate_fragment(source) {
                Ok(translated) => Some(translated.block),
                Err(err) => {
                    journal.compile_failures += 1;
                    return Err(err.log);
                }
            },
            ShaderStage::Vertex | ShaderStage::Link => None,
        };
        journal.compiles += 1;
        Ok(RecordingShader {
            block,
            fail_link: source.contains("@fail-link"),
        })
    }

    fn link_program(
        &mut self,
        vertex: &RecordingShader,
        fragment: &RecordingShader,
    ) -> Result<RecordingProgram, String> {
        let mut journal = self.journal.borrow_mut();
        if vertex.fail_link || fragment.fail_link {
            journal.link_failures += 1;
            return Err("simulated link failure".to_string());
        }
        journal.links += 1;
        let serial = self.next_serial;
        self.next_serial += 1;
        Ok(RecordingProgram {
            serial,
            block: fragment.block.clone().unwrap_or_default(),
        })
    }

    fn delete_shader(&mut self, _shader: RecordingShader) {
        self.journal.borrow_mut().shaders_deleted += 1;
    }

    fn uniform_location(
        &self,
        program: &RecordingProgram,
        name: &str,
    ) -> Option<(u32, UniformKind)> {
        program
            .block
            .member(name)
            .map(|member| (member.offset, member.kind))
    }

    fn set_uniform(&mut self, program: &RecordingProgram, location: u32, value: UniformValue) {
        if let Some(member) = program
            .block
            .members()
            .iter()
            .find(|member| member.offset == location)
        {
            self.written.insert(member.name.clone(), value);
            self.journal.borrow_mut().uniform_writes += 1;
        }
    }

    fn draw(&mut self, _program: &RecordingProgram) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released(self.id));
        }
        if self.is_lost() {
            return Err(RenderError::ContextLost {
                context: self.id,
                reason: "simulated context loss".to_string(),
            });
        }
        self.journal.borrow_mut().draws += 1;
        Ok(())
    }

    fn delete_program(&mut self, program: &RecordingProgram) {
        let mut journal = self.journal.borrow_mut();
        journal.programs_deleted.push(program.serial);
    }

    fn drawable_size(&self) -> PixelSize {
        self.container.drawable_size(&self.profile)
    }

    fn resize(&mut self) -> PixelSize {
        self.drawable_size()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.journal.borrow_mut().contexts_released += 1;
        }
    }
}
