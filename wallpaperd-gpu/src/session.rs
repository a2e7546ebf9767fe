//! GPU Session (spec §4.D): device, swapchain, and the pass state machine
//! that Host API Shims drive. Grounded on
//! `blade-graphics/src/webgpu/platform.rs` for adapter/device acquisition
//! and on `blade-graphics/src/webgpu/surface.rs` for swapchain handling.

use std::collections::HashMap;

use wallpaperd_error::WdError;
use wgpu::util::DeviceExt;

use crate::command::{Command, CopyOp, FramePass, PassState, RenderPassRecording};
use crate::format;
use crate::objects::{self, Handle, NativeObject, ObjectManager};
use crate::pipeline::{self, PipelineAbi};
use crate::types::{BindingsInfo, ObjectKind, PipelineInfo, RenderPassInfo, SamplerInfo, TextureInfo};

const UNIFORM_FALLBACK: [u8; 16] = [0; 16];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresentMode {
    Vsync,
    Mailbox,
}

pub struct GpuConfig {
    pub prefer_dgpu: bool,
    pub present_mode: PresentMode,
    pub width: u32,
    pub height: u32,
}

/// Internal helper for mipmap generation: one render-pipeline-per-format,
/// built lazily, sampling the previous level into the next with a
/// fullscreen triangle. This is the standard wgpu mipmap-generation
/// technique (no compute shaders, no extra crate), used here because wgpu
/// has no builtin mip-chain command.
struct Blitter {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

const BLIT_WGSL: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOut {
    var out: VertexOut;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@group(0) @binding(0) var src_texture: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(src_texture, src_sampler, in.uv);
}
"#;

impl Blitter {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("wallpaperd-blit"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(BLIT_WGSL)),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wallpaperd-blit-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("wallpaperd-blit-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("wallpaperd-blit-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self { bind_group_layout, pipeline_layout, shader, sampler, pipelines: HashMap::new() }
    }

    fn pipeline_for(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        self.pipelines
            .entry(format)
            .or_insert_with(|| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("wallpaperd-blit-pipeline"),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &self.shader,
                        entry_point: Some("vs_main"),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        buffers: &[],
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &self.shader,
                        entry_point: Some("fs_main"),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    multiview: None,
                    cache: None,
                })
            })
            .clone()
    }

    fn generate_mipmaps(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        format: wgpu::TextureFormat,
        mip_levels: u32,
    ) {
        if mip_levels <= 1 {
            return;
        }
        let pipeline = self.pipeline_for(device, format);
        let mut prev_view = texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });
        for level in 1..mip_levels {
            let dest_view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("wallpaperd-blit-bind-group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&prev_view) },
                    wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                ],
            });
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("wallpaperd-mipmap-blit"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dest_view,
                        resolve_target: None,
                        ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                rpass.set_pipeline(&pipeline);
                rpass.set_bind_group(0, &bind_group, &[]);
                rpass.draw(0..3, 0..1);
            }
            prev_view = dest_view;
        }
    }
}

/// Owns the device, swapchain, and per-frame recording state (spec §4.D).
pub struct GpuSession {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_format: wgpu::TextureFormat,
    present_mode: wgpu::PresentMode,
    width: u32,
    height: u32,

    objects: ObjectManager,
    pipeline_abi: PipelineAbi,
    blitter: Blitter,
    default_texture_view: wgpu::TextureView,
    default_sampler: wgpu::Sampler,

    pending_vertex_uniforms: [Vec<u8>; pipeline::MAX_UNIFORM_SLOTS as usize],
    pending_fragment_uniforms: [Vec<u8>; pipeline::MAX_UNIFORM_SLOTS as usize],

    pass_state: PassState,
    current_frame: Vec<FramePass>,
    current_surface_texture: Option<wgpu::SurfaceTexture>,
}

impl GpuSession {
    pub fn new(
        window: &(impl raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle),
        config: GpuConfig,
    ) -> Result<Self, WdError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor { backends: wgpu::Backends::PRIMARY, ..Default::default() });

        let surface_target = unsafe { wgpu::SurfaceTargetUnsafe::from_window(window) }
            .map_err(|e| WdError::SurfaceInitFailed(format!("{e}")))?;
        let surface = unsafe { instance.create_surface_unsafe(surface_target) }
            .map_err(|e| WdError::SurfaceInitFailed(format!("{e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: if config.prefer_dgpu {
                wgpu::PowerPreference::HighPerformance
            } else {
                wgpu::PowerPreference::LowPower
            },
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| WdError::GpuCreateFailed(format!("no compatible adapter: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("wallpaperd-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| WdError::GpuCreateFailed(format!("device request failed: {e}")))?;

        device.set_device_lost_callback(|reason, message| {
            log::error!("gpu device lost: {reason:?} - {message}");
        });

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps.formats.iter().copied().find(|f| f.is_srgb()).unwrap_or(caps.formats[0]);
        let present_mode = match config.present_mode {
            PresentMode::Vsync => wgpu::PresentMode::Fifo,
            PresentMode::Mailbox if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) => wgpu::PresentMode::Mailbox,
            PresentMode::Mailbox => {
                log::warn!("mailbox present mode unavailable on this surface, falling back to fifo");
                wgpu::PresentMode::Fifo
            }
        };

        let pipeline_abi = PipelineAbi::new(&device);
        let mut blitter = Blitter::new(&device);
        // Force the fullscreen-triangle pipeline to build against the most
        // common render target format up front so first use doesn't stall.
        let _ = blitter.pipeline_for(&device, surface_format);

        let default_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("wallpaperd-default-texture"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &default_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );
        let default_texture_view = default_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let default_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("wallpaperd-default-sampler"),
            ..Default::default()
        });

        let mut session = Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_format,
            present_mode,
            width: config.width,
            height: config.height,
            objects: ObjectManager::new(),
            pipeline_abi,
            blitter,
            default_texture_view,
            default_sampler,
            pending_vertex_uniforms: Default::default(),
            pending_fragment_uniforms: Default::default(),
            pass_state: PassState::Idle,
            current_frame: Vec::new(),
            current_surface_texture: None,
        };
        session.configure_surface()?;
        Ok(session)
    }

    fn configure_surface(&mut self) -> Result<(), WdError> {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.surface_format,
            width: self.width.max(1),
            height: self.height.max(1),
            present_mode: self.present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        self.surface.configure(&self.device, &config);
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), WdError> {
        self.width = width;
        self.height = height;
        self.configure_surface()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Acquire this frame's command recording state and swapchain texture.
    /// `Ok(false)` means the texture came back null/unavailable: the caller
    /// must submit an empty buffer and skip the scene's `update` call this
    /// frame (spec §4.D, testable property 4).
    pub fn acquire_frame(&mut self) -> Result<bool, WdError> {
        self.current_frame.clear();
        self.pass_state = PassState::Idle;
        match self.surface.get_current_texture() {
            Ok(texture) => {
                self.current_surface_texture = Some(texture);
                Ok(true)
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.configure_surface()?;
                self.current_surface_texture = None;
                Ok(false)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                self.current_surface_texture = None;
                Ok(false)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(WdError::GpuSubmitFailed("surface reported out-of-memory acquiring a frame".into()))
            }
            Err(e) => Err(WdError::SurfaceConfigureFailed(format!("acquiring swapchain texture: {e}"))),
        }
    }

    /// Replay every recorded pass into one real command buffer and present.
    pub fn submit(&mut self) -> Result<(), WdError> {
        if self.pass_state != PassState::Idle {
            return Err(WdError::PassProtocolViolation("submit called with an open pass".into()));
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("wallpaperd-frame"),
        });
        for pass in self.current_frame.drain(..) {
            match pass {
                FramePass::Copy(ops) => {
                    for op in ops {
                        match op {
                            CopyOp::UploadBuffer { buffer, offset, data } => {
                                self.queue.write_buffer(&buffer, offset, &data);
                            }
                            CopyOp::UploadTexture { texture, mip_level, origin, bytes_per_row, size, data } => {
                                self.queue.write_texture(
                                    wgpu::TexelCopyTextureInfo {
                                        texture: &texture,
                                        mip_level,
                                        origin,
                                        aspect: wgpu::TextureAspect::All,
                                    },
                                    &data,
                                    wgpu::TexelCopyBufferLayout {
                                        offset: 0,
                                        bytes_per_row: Some(bytes_per_row),
                                        rows_per_image: Some(size.height),
                                    },
                                    size,
                                );
                            }
                            CopyOp::GenerateMipmaps { texture, format, base_size: _, mip_levels } => {
                                self.blitter.generate_mipmaps(&self.device, &mut encoder, &texture, format, mip_levels);
                            }
                        }
                    }
                }
                FramePass::Render(recording) => self.replay_render_pass(&mut encoder, recording),
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = self.current_surface_texture.take() {
            frame.present();
        }
        Ok(())
    }

    fn replay_render_pass(&self, encoder: &mut wgpu::CommandEncoder, recording: RenderPassRecording) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("wallpaperd-render-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &recording.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match recording.clear_color {
                        Some(c) => wgpu::LoadOp::Clear(c),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: recording.depth_view.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match recording.clear_depth {
                        Some(d) => wgpu::LoadOp::Clear(d),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        for draw in recording.draws {
            match draw {
                Command::Draw {
                    pipeline,
                    vertex_buffers,
                    uniform_bind_group,
                    texture_bind_group,
                    vertex_offset,
                    vertex_count,
                    instance_count,
                } => {
                    rpass.set_pipeline(&pipeline);
                    rpass.set_bind_group(pipeline::UNIFORM_GROUP, &uniform_bind_group, &[]);
                    rpass.set_bind_group(pipeline::TEXTURE_GROUP, &texture_bind_group, &[]);
                    for (slot, (buffer, offset)) in vertex_buffers.iter().enumerate() {
                        rpass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
                    }
                    rpass.draw(vertex_offset..vertex_offset + vertex_count, 0..instance_count);
                }
                Command::DrawIndexed {
                    pipeline,
                    vertex_buffers,
                    uniform_bind_group,
                    texture_bind_group,
                    index_buffer,
                    index_format,
                    index_offset,
                    index_count,
                    base_vertex,
                    instance_count,
                } => {
                    rpass.set_pipeline(&pipeline);
                    rpass.set_bind_group(pipeline::UNIFORM_GROUP, &uniform_bind_group, &[]);
                    rpass.set_bind_group(pipeline::TEXTURE_GROUP, &texture_bind_group, &[]);
                    for (slot, (buffer, offset)) in vertex_buffers.iter().enumerate() {
                        rpass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
                    }
                    rpass.set_index_buffer(index_buffer.slice(..), index_format);
                    rpass.draw_indexed(index_offset..index_offset + index_count, base_vertex, 0..instance_count);
                }
            }
        }
    }

    // -- Pass protocol (spec §3 invariant 2-3) --------------------------

    pub fn begin_copy_pass(&mut self) -> Result<(), WdError> {
        if self.pass_state != PassState::Idle {
            return Err(WdError::PassProtocolViolation("begin_copy_pass called while a pass is already open".into()));
        }
        self.pass_state = PassState::CopyOpen;
        self.current_frame.push(FramePass::Copy(Vec::new()));
        Ok(())
    }

    pub fn end_copy_pass(&mut self) -> Result<(), WdError> {
        if self.pass_state != PassState::CopyOpen {
            return Err(WdError::PassProtocolViolation("end_copy_pass called with no open copy pass".into()));
        }
        self.pass_state = PassState::Idle;
        Ok(())
    }

    pub fn begin_render_pass(&mut self, info: &RenderPassInfo) -> Result<(), WdError> {
        if self.pass_state != PassState::Idle {
            return Err(WdError::PassProtocolViolation("begin_render_pass called while a pass is already open".into()));
        }
        let color_view = if info.color_target == 0 {
            let frame = self
                .current_surface_texture
                .as_ref()
                .ok_or_else(|| WdError::PassProtocolViolation("no swapchain texture acquired this frame".into()))?;
            frame.texture.create_view(&wgpu::TextureViewDescriptor::default())
        } else {
            match self.objects.get_typed(Handle(info.color_target), ObjectKind::Texture)? {
                NativeObject::Texture { view, .. } => view.clone(),
                _ => unreachable!("get_typed enforces ObjectKind::Texture"),
            }
        };
        let depth_view = if info.depth_target == 0 {
            None
        } else {
            match self.objects.get_typed(Handle(info.depth_target), ObjectKind::Texture)? {
                NativeObject::Texture { view, .. } => Some(view.clone()),
                _ => unreachable!("get_typed enforces ObjectKind::Texture"),
            }
        };
        let clear_color = info.clear_color.then(|| wgpu::Color {
            r: info.clear_color_rgba[0] as f64,
            g: info.clear_color_rgba[1] as f64,
            b: info.clear_color_rgba[2] as f64,
            a: info.clear_color_rgba[3] as f64,
        });
        let clear_depth = info.clear_depth_flag.then_some(info.clear_depth);

        self.pass_state = PassState::RenderOpen;
        self.current_frame.push(FramePass::Render(RenderPassRecording {
            color_view,
            clear_color,
            depth_view,
            clear_depth,
            draws: Vec::new(),
        }));
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<(), WdError> {
        if self.pass_state != PassState::RenderOpen {
            return Err(WdError::PassProtocolViolation("end_render_pass called with no open render pass".into()));
        }
        self.pass_state = PassState::Idle;
        Ok(())
    }

    fn push_copy_op(&mut self, op: CopyOp) -> Result<(), WdError> {
        match self.current_frame.last_mut() {
            Some(FramePass::Copy(ops)) => {
                ops.push(op);
                Ok(())
            }
            _ => Err(WdError::PassProtocolViolation("copy pass state desynced from recording".into())),
        }
    }

    fn push_draw(&mut self, command: Command) -> Result<(), WdError> {
        match self.current_frame.last_mut() {
            Some(FramePass::Render(recording)) => {
                recording.draws.push(command);
                Ok(())
            }
            _ => Err(WdError::PassProtocolViolation("render pass state desynced from recording".into())),
        }
    }

    // -- Resource creation -----------------------------------------------

    pub fn create_vertex_buffer(&mut self, size: u64) -> Result<Handle, WdError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wallpaperd-vertex-buffer"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.objects.insert(ObjectKind::VertexBuffer, NativeObject::Buffer(buffer))
    }

    pub fn create_index_buffer(&mut self, size: u64, wide: bool) -> Result<Handle, WdError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wallpaperd-index-buffer"),
            size,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let kind = if wide { ObjectKind::Index32Buffer } else { ObjectKind::Index16Buffer };
        self.objects.insert(kind, NativeObject::Buffer(buffer))
    }

    pub fn update_buffer(&mut self, handle: Handle, offset: u64, data: &[u8]) -> Result<(), WdError> {
        if self.pass_state != PassState::CopyOpen {
            return Err(WdError::PassProtocolViolation("called ow_update_buffer when no copy pass is active".into()));
        }
        let buffer = match self.objects.get(handle) {
            Some((ObjectKind::VertexBuffer | ObjectKind::Index16Buffer | ObjectKind::Index32Buffer, NativeObject::Buffer(buffer))) => {
                buffer.clone()
            }
            Some(_) => return Err(WdError::WrongHandleType(format!("handle {} is not a buffer", handle.0))),
            None => return Err(WdError::InvalidHandle(format!("handle {} does not resolve to a live object", handle.0))),
        };
        self.push_copy_op(CopyOp::UploadBuffer { buffer, offset, data: data.to_vec() })
    }

    pub fn create_texture(&mut self, info: &TextureInfo) -> Result<Handle, WdError> {
        let format = format::map_texture_format(info.format)?;
        let sample_count = 1u32 << info.msaa_sample_exponent;
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
        if info.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("wallpaperd-texture"),
            size: wgpu::Extent3d { width: info.width, height: info.height, depth_or_array_layers: 1 },
            mip_level_count: info.mip_levels.max(1),
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.objects.insert(ObjectKind::Texture, NativeObject::Texture { texture, view })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_texture(
        &mut self,
        handle: Handle,
        mip_level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bytes_per_row: u32,
        data: &[u8],
    ) -> Result<(), WdError> {
        if self.pass_state != PassState::CopyOpen {
            return Err(WdError::PassProtocolViolation("update_texture called outside a copy pass".into()));
        }
        let texture = match self.objects.get(handle) {
            Some((ObjectKind::Texture, NativeObject::Texture { texture, .. })) => texture.clone(),
            Some(_) => return Err(WdError::WrongHandleType(format!("handle {} is not a texture", handle.0))),
            None => return Err(WdError::InvalidHandle(format!("handle {} does not resolve to a live object", handle.0))),
        };
        let size = texture.size();
        let mip_width = (size.width >> mip_level).max(1);
        let mip_height = (size.height >> mip_level).max(1);
        if mip_level >= texture.mip_level_count() || x.saturating_add(width) > mip_width || y.saturating_add(height) > mip_height {
            return Err(WdError::InvalidEnum(format!(
                "update_texture destination rect does not fit inside handle {} at mip {mip_level}",
                handle.0
            )));
        }
        self.push_copy_op(CopyOp::UploadTexture {
            texture,
            mip_level,
            origin: wgpu::Origin3d { x, y, z: 0 },
            bytes_per_row,
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            data: data.to_vec(),
        })
    }

    pub fn generate_mipmaps(&mut self, handle: Handle) -> Result<(), WdError> {
        if self.pass_state != PassState::CopyOpen {
            return Err(WdError::PassProtocolViolation("generate_mipmaps called outside a copy pass".into()));
        }
        let (texture, format, base_size, mip_levels) = match self.objects.get(handle) {
            Some((ObjectKind::Texture, NativeObject::Texture { texture, .. })) => {
                (texture.clone(), texture.format(), texture.size(), texture.mip_level_count())
            }
            Some(_) => return Err(WdError::WrongHandleType(format!("handle {} is not a texture", handle.0))),
            None => return Err(WdError::InvalidHandle(format!("handle {} does not resolve to a live object", handle.0))),
        };
        self.push_copy_op(CopyOp::GenerateMipmaps { texture, format, base_size, mip_levels })
    }

    pub fn create_sampler(&mut self, info: &SamplerInfo) -> Result<Handle, WdError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("wallpaperd-sampler"),
            address_mode_u: format::map_address_mode(info.wrap_x),
            address_mode_v: format::map_address_mode(info.wrap_y),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: format::map_filter_mode(info.mag),
            min_filter: format::map_filter_mode(info.min),
            mipmap_filter: format::map_filter_mode(info.mip),
            anisotropy_clamp: info.anisotropy.clamp(1, 16) as u16,
            ..Default::default()
        });
        self.objects.insert(ObjectKind::Sampler, NativeObject::Sampler(sampler))
    }

    pub fn create_vertex_shader(&mut self, bytes: &[u8]) -> Result<Handle, WdError> {
        let module = pipeline::compile_shader(&self.device, bytes, naga::ShaderStage::Vertex, "scene-vertex-shader")?;
        self.objects.insert(ObjectKind::VertexShader, NativeObject::VertexShader(module))
    }

    pub fn create_fragment_shader(&mut self, bytes: &[u8]) -> Result<Handle, WdError> {
        let module = pipeline::compile_shader(&self.device, bytes, naga::ShaderStage::Fragment, "scene-fragment-shader")?;
        self.objects.insert(ObjectKind::FragmentShader, NativeObject::FragmentShader(module))
    }

    pub fn create_pipeline(&mut self, info: &PipelineInfo) -> Result<Handle, WdError> {
        let vertex_shader = match self.objects.get_typed(Handle(info.vertex_shader), ObjectKind::VertexShader)? {
            NativeObject::VertexShader(module) => module.clone(),
            _ => unreachable!("get_typed enforces ObjectKind::VertexShader"),
        };
        let fragment_shader = match self.objects.get_typed(Handle(info.fragment_shader), ObjectKind::FragmentShader)? {
            NativeObject::FragmentShader(module) => module.clone(),
            _ => unreachable!("get_typed enforces ObjectKind::FragmentShader"),
        };
        let pipeline = pipeline::create_render_pipeline(&self.device, &self.pipeline_abi, info, &vertex_shader, &fragment_shader)?;
        self.objects.insert(ObjectKind::Pipeline, NativeObject::Pipeline(pipeline))
    }

    pub fn free_resource(&mut self, handle: Handle) -> bool {
        self.objects.free(handle)
    }

    pub fn drop_all(&mut self) {
        self.objects.drop_all();
    }

    // -- Draws and uniforms (spec §3 invariant 3) ------------------------

    fn resolve_vertex_buffers(&self, bindings: &BindingsInfo) -> Result<Vec<(wgpu::Buffer, u64)>, WdError> {
        bindings
            .vertex_buffers
            .iter()
            .map(|vb| match self.objects.get(Handle(vb.buffer)) {
                Some((ObjectKind::VertexBuffer, NativeObject::Buffer(buffer))) => Ok((buffer.clone(), vb.offset)),
                Some(_) => Err(WdError::WrongHandleType(format!("handle {} is not a vertex buffer", vb.buffer))),
                None => Err(WdError::InvalidHandle(format!("handle {} does not resolve to a live object", vb.buffer))),
            })
            .collect()
    }

    /// Build a fresh bind group from the current uniform-push state. Each
    /// draw gets its own tiny uniform buffers so interleaved
    /// `push_*_uniform_data` / `render_geometry*` calls within one render
    /// pass each see their own snapshot, rather than racing a shared buffer
    /// through the deferred command list.
    fn build_uniform_bind_group(&self) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity((pipeline::MAX_UNIFORM_SLOTS * 2) as usize);
        let mut buffers = Vec::with_capacity((pipeline::MAX_UNIFORM_SLOTS * 2) as usize);
        for data in self.pending_vertex_uniforms.iter().chain(self.pending_fragment_uniforms.iter()) {
            let bytes: &[u8] = if data.is_empty() { &UNIFORM_FALLBACK } else { data };
            buffers.push(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("wallpaperd-uniform"),
                contents: bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            }));
        }
        for (slot, buffer) in buffers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry { binding: slot as u32, resource: buffer.as_entire_binding() });
        }
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("wallpaperd-uniform-bind-group"),
            layout: &self.pipeline_abi.uniform_layout,
            entries: &entries,
        })
    }

    fn build_texture_bind_group(&self, bindings: &BindingsInfo) -> Result<wgpu::BindGroup, WdError> {
        let mut views = Vec::with_capacity(pipeline::MAX_TEXTURE_SLOTS as usize);
        let mut samplers = Vec::with_capacity(pipeline::MAX_TEXTURE_SLOTS as usize);
        for slot in 0..pipeline::MAX_TEXTURE_SLOTS as usize {
            if let Some(pair) = bindings.texture_samplers.get(slot) {
                let view = match self.objects.get_typed(Handle(pair.texture), ObjectKind::Texture)? {
                    NativeObject::Texture { view, .. } => view.clone(),
                    _ => unreachable!("get_typed enforces ObjectKind::Texture"),
                };
                let sampler = match self.objects.get_typed(Handle(pair.sampler), ObjectKind::Sampler)? {
                    NativeObject::Sampler(sampler) => sampler.clone(),
                    _ => unreachable!("get_typed enforces ObjectKind::Sampler"),
                };
                views.push(view);
                samplers.push(sampler);
            } else {
                views.push(self.default_texture_view.clone());
                samplers.push(self.default_sampler.clone());
            }
        }
        let mut entries = Vec::with_capacity((pipeline::MAX_TEXTURE_SLOTS * 2) as usize);
        for (slot, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry { binding: slot as u32, resource: wgpu::BindingResource::TextureView(view) });
        }
        for (slot, sampler) in samplers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: pipeline::MAX_TEXTURE_SLOTS + slot as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("wallpaperd-texture-bind-group"),
            layout: &self.pipeline_abi.texture_layout,
            entries: &entries,
        }))
    }

    pub fn render_geometry(
        &mut self,
        pipeline_handle: Handle,
        bindings: &BindingsInfo,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<(), WdError> {
        if self.pass_state != PassState::RenderOpen {
            return Err(WdError::PassProtocolViolation("render_geometry called outside a render pass".into()));
        }
        let pipeline = match self.objects.get_typed(pipeline_handle, ObjectKind::Pipeline)? {
            NativeObject::Pipeline(pipeline) => pipeline.clone(),
            _ => unreachable!("get_typed enforces ObjectKind::Pipeline"),
        };
        let vertex_buffers = self.resolve_vertex_buffers(bindings)?;
        let uniform_bind_group = self.build_uniform_bind_group();
        let texture_bind_group = self.build_texture_bind_group(bindings)?;
        self.push_draw(Command::Draw {
            pipeline,
            vertex_buffers,
            uniform_bind_group,
            texture_bind_group,
            vertex_offset,
            vertex_count,
            instance_count,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render_geometry_indexed(
        &mut self,
        pipeline_handle: Handle,
        bindings: &BindingsInfo,
        index_offset: u32,
        index_count: u32,
        vertex_offset: i32,
        instance_count: u32,
    ) -> Result<(), WdError> {
        if self.pass_state != PassState::RenderOpen {
            return Err(WdError::PassProtocolViolation("render_geometry_indexed called outside a render pass".into()));
        }
        let pipeline = match self.objects.get_typed(pipeline_handle, ObjectKind::Pipeline)? {
            NativeObject::Pipeline(pipeline) => pipeline.clone(),
            _ => unreachable!("get_typed enforces ObjectKind::Pipeline"),
        };
        let vertex_buffers = self.resolve_vertex_buffers(bindings)?;
        let (index_buffer, index_format) = match self.objects.get(Handle(bindings.index_buffer)) {
            Some((ObjectKind::Index16Buffer, NativeObject::Buffer(buffer))) => (buffer.clone(), wgpu::IndexFormat::Uint16),
            Some((ObjectKind::Index32Buffer, NativeObject::Buffer(buffer))) => (buffer.clone(), wgpu::IndexFormat::Uint32),
            Some(_) => return Err(WdError::WrongHandleType(format!("handle {} is not an index buffer", bindings.index_buffer))),
            None => {
                return Err(WdError::InvalidHandle(format!(
                    "handle {} does not resolve to a live object",
                    bindings.index_buffer
                )))
            }
        };
        let uniform_bind_group = self.build_uniform_bind_group();
        let texture_bind_group = self.build_texture_bind_group(bindings)?;
        self.push_draw(Command::DrawIndexed {
            pipeline,
            vertex_buffers,
            uniform_bind_group,
            texture_bind_group,
            index_buffer,
            index_format,
            index_offset,
            index_count,
            base_vertex: vertex_offset,
            instance_count,
        })
    }

    pub fn push_vertex_uniform_data(&mut self, slot: u32, data: &[u8]) -> Result<(), WdError> {
        self.push_uniform_data(slot, data, true)
    }

    pub fn push_fragment_uniform_data(&mut self, slot: u32, data: &[u8]) -> Result<(), WdError> {
        self.push_uniform_data(slot, data, false)
    }

    fn push_uniform_data(&mut self, slot: u32, data: &[u8], vertex: bool) -> Result<(), WdError> {
        if self.pass_state != PassState::RenderOpen {
            return Err(WdError::PassProtocolViolation("push_uniform_data called outside a render pass".into()));
        }
        let slot = slot as usize;
        if slot >= pipeline::MAX_UNIFORM_SLOTS as usize {
            return Err(WdError::InvalidEnum(format!("uniform slot {slot} is out of range (max {})", pipeline::MAX_UNIFORM_SLOTS)));
        }
        if vertex {
            self.pending_vertex_uniforms[slot] = data.to_vec();
        } else {
            self.pending_fragment_uniforms[slot] = data.to_vec();
        }
        Ok(())
    }
}
