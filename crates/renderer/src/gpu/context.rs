use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{ContextHost, GraphicsContext, UniformKind, UniformValue};
use crate::compile::{translate_fragment, UniformBlock, VIEWPORT_UNIFORM};
use crate::error::{RenderError, ShaderStage};
use crate::types::{scaled_size, ContextId, ContextProfile, PixelSize, PowerPreference};

use super::pipeline::{self, MultisampleTarget, PipelineTarget};

/// Creates one wgpu device + surface per window.
pub struct WgpuHost {
    instance: wgpu::Instance,
}

impl WgpuHost {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        Self { instance }
    }
}

impl Default for WgpuHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextHost for WgpuHost {
    type Container = Arc<Window>;
    type Context = WgpuContext;

    fn create_context(
        &mut self,
        container: &Arc<Window>,
        profile: &ContextProfile,
    ) -> Result<WgpuContext, RenderError> {
        WgpuContext::new(&self.instance, Arc::clone(container), profile)
    }
}

pub struct WgpuShader {
    module: wgpu::ShaderModule,
    block: Option<UniformBlock>,
}

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    block: UniformBlock,
}

pub struct WgpuContext {
    id: ContextId,
    window: Arc<Window>,
    surface: Option<wgpu::Surface<'static>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    uniform_layout: wgpu::BindGroupLayout,
    sample_count: u32,
    multisample_target: Option<MultisampleTarget>,
    profile: ContextProfile,
    lost: Arc<AtomicBool>,
}

impl WgpuContext {
    fn new(
        instance: &wgpu::Instance,
        window: Arc<Window>,
        profile: &ContextProfile,
    ) -> Result<Self, RenderError> {
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| context_error("failed to create rendering surface", err))?;

        let power_preference = match profile.power {
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| context_error("failed to find a suitable GPU adapter", err))?;
        let info = adapter.get_info();
        debug!(
            name = %info.name,
            backend = ?info.backend,
            ?power_preference,
            "selected GPU adapter"
        );

        let memory_hints = match profile.power {
            PowerPreference::Low => wgpu::MemoryHints::MemoryUsage,
            PowerPreference::High => wgpu::MemoryHints::Performance,
        };
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("milky device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| context_error("failed to create GPU device", err))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!(?reason, %message, "GPU device lost");
            flag.store(true, Ordering::Release);
        });
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            warn!(error = %err, "uncaptured GPU error");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| context_error("surface reports no supported formats", "none"))?;
        let sample_count = pipeline::sample_count(&adapter, format, profile.antialias);

        let size = drawable_size(&window, profile);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = pipeline::uniform_layout(&device);
        let mut context = Self {
            id: ContextId::next(),
            window,
            surface: Some(surface),
            device,
            queue,
            config,
            uniform_layout,
            sample_count,
            multisample_target: None,
            profile: *profile,
            lost,
        };
        context.rebuild_multisample_target();
        debug!(context = %context.id, %size, sample_count, ?format, "GPU context ready");
        Ok(context)
    }

    fn configure(&mut self, size: PixelSize) {
        let Some(surface) = self.surface.as_ref() else {
            return;
        };
        self.config.width = size.width;
        self.config.height = size.height;
        surface.configure(&self.device, &self.config);
        self.rebuild_multisample_target();
    }

    fn rebuild_multisample_target(&mut self) {
        self.multisample_target = (self.sample_count > 1).then(|| {
            MultisampleTarget::new(
                &self.device,
                self.config.format,
                PhysicalSize::new(self.config.width, self.config.height),
                self.sample_count,
            )
        });
    }

    fn lost_error(&self, reason: impl Into<String>) -> RenderError {
        RenderError::ContextLost {
            context: self.id,
            reason: reason.into(),
        }
    }

    fn with_validation<T>(
        &self,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

fn context_error(what: &str, err: impl std::fmt::Display) -> RenderError {
    RenderError::Context(format!("{what}: {err}"))
}

fn drawable_size(window: &Window, profile: &ContextProfile) -> PixelSize {
    let scale_factor = window.scale_factor();
    let logical = window.inner_size().to_logical::<f64>(scale_factor);
    let ratio = profile.pixel_ratio(scale_factor);
    scaled_size(logical.width, logical.height, ratio)
}

impl GraphicsContext for WgpuContext {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Location = u32;

    fn id(&self) -> ContextId {
        self.id
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<WgpuShader, String> {
        let (glsl, block, naga_stage) = match stage {
            ShaderStage::Vertex => (source.to_string(), None, wgpu::naga::ShaderStage::Vertex),
            ShaderStage::Fragment => {
                let translated = translate_fragment(source).map_err(|err| err.log)?;
                (
                    translated.glsl,
                    Some(translated.block),
                    wgpu::naga::ShaderStage::Fragment,
                )
            }
            ShaderStage::Link => return Err("link is not a compilable stage".to_string()),
        };
        let module = self.with_validation(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("milky shader"),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(glsl),
                    stage: naga_stage,
                    defines: &[],
                },
            })
        })?;
        Ok(WgpuShader { module, block })
    }

    fn link_program(
        &mut self,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> Result<WgpuProgram, String> {
        let block = fragment
            .block
            .clone()
            .ok_or_else(|| "fragment stage expected in fragment slot".to_string())?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("milky uniforms"),
            size: u64::from(block.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("milky uniform bind group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        let target = PipelineTarget {
            format: self.config.format,
            sample_count: self.sample_count,
        };
        let layout = &self.uniform_layout;
        let pipeline = self.with_validation(|device| {
            pipeline::create_pipeline(device, layout, &vertex.module, &fragment.module, &target)
        })?;
        Ok(WgpuProgram {
            pipeline,
            buffer,
            bind_group,
            block,
        })
    }

    fn delete_shader(&mut self, shader: WgpuShader) {
        drop(shader);
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<(u32, UniformKind)> {
        program
            .block
            .member(name)
            .map(|member| (member.offset, member.kind))
    }

    fn set_uniform(&mut self, program: &WgpuProgram, location: u32, value: UniformValue) {
        self.queue
            .write_buffer(&program.buffer, u64::from(location), value.as_bytes());
    }

    fn draw(&mut self, program: &WgpuProgram) -> Result<(), RenderError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(self.lost_error("device lost"));
        }
        if self.surface.is_none() {
            return Err(RenderError::Released(self.id));
        }

        let size = self.drawable_size();
        if size.width != self.config.width || size.height != self.config.height {
            self.configure(size);
        }
        if let Some(viewport) = program.block.member(VIEWPORT_UNIFORM) {
            let value = UniformValue::Vec2(size.as_vec2());
            let offset = u64::from(viewport.offset);
            self.queue
                .write_buffer(&program.buffer, offset, value.as_bytes());
        }

        let Some(surface) = self.surface.as_ref() else {
            return Err(RenderError::Released(self.id));
        };
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated) => {
                debug!(context = %self.id, "surface outdated; reconfiguring");
                self.configure(size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!(context = %self.id, "timed out acquiring frame");
                return Ok(());
            }
            Err(err) => return Err(self.lost_error(format!("surface error: {err}"))),
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("milky frame"),
            });
        {
            let (attachment, resolve_target) = match self.multisample_target.as_ref() {
                Some(msaa) => (&msaa.view, Some(&view)),
                None => (&view, None),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("milky pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: attachment,
                    depth_slice: None,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &program.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }

    fn delete_program(&mut self, program: &WgpuProgram) {
        program.buffer.destroy();
    }

    fn drawable_size(&self) -> PixelSize {
        drawable_size(&self.window, &self.profile)
    }

    fn resize(&mut self) -> PixelSize {
        let size = self.drawable_size();
        if size.width != self.config.width || size.height != self.config.height {
            self.configure(size);
        }
        size
    }

    fn release(&mut self) {
        if self.surface.take().is_some() {
            self.multisample_target = None;
            debug!(context = %self.id, "GPU context released");
        }
    }
}
