//! wgpu implementation of [`GraphBackend`].
//!
//! Every pass shares one bind group layout and one pipeline layout:
//!
//! | binding | resource                                   |
//! |---------|--------------------------------------------|
//! | 0       | [`FrameUniforms`] (vertex + fragment)      |
//! | 1       | dynamic input: another pass or background 0 |
//! | 2..=4   | background images 0, 1, 2                  |
//! | 5       | linear clamp sampler                       |
//!
//! Geometry is a four-vertex triangle strip covering clip space, fed from a
//! vertex buffer so compiled fragment shaders only ever see a plain position.

use std::path::Path;

use glam::UVec2;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::GraphBackend;
use crate::config::BACKGROUND_COUNT;
use crate::error::GraphError;
use crate::gpu::GpuContext;
use crate::render_graph::PassKind;
use crate::uniforms::{FrameUniforms, Viewport};

/// Format of intermediate images when no shared layout exists yet.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// A texture plus the view used both as attachment and as sampled input.
pub struct GpuImage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    size: UVec2,
}

impl GpuImage {
    fn new(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let size = UVec2::new(texture.width(), texture.height());
        Self {
            texture,
            view,
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
}

/// Owns everything the graph shares across passes on one device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    vertex_shader: wgpu::ShaderModule,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl WgpuBackend {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = gpu.device.clone();

        let vertex_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fullscreen Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/fullscreen.wgsl").into()),
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pass Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            device,
            queue: gpu.queue.clone(),
            surface_format: gpu.config.format,
            vertex_shader,
            vertex_buffer,
            uniform_buffer,
            sampler,
            bind_group_layout,
            pipeline_layout,
        }
    }

    fn draw_quad(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..QUAD.len() as u32, 0..1);
    }
}

impl GraphBackend for WgpuBackend {
    type Image = GpuImage;
    type Layout = wgpu::TextureFormat;
    type Bindings = wgpu::BindGroup;
    type Pipeline = wgpu::RenderPipeline;
    type Encoder = wgpu::CommandEncoder;
    type ScreenPass<'a> = wgpu::RenderPass<'a>;

    fn create_target(
        &mut self,
        pass: usize,
        size: UVec2,
        layout: Option<&wgpu::TextureFormat>,
    ) -> Result<GpuImage, GraphError> {
        let label = format!("Pass {pass} Target");

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: layout.copied().unwrap_or(OFFSCREEN_FORMAT),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        let invalid = pollster::block_on(self.device.pop_error_scope());

        match out_of_memory.or(invalid) {
            Some(e) => Err(GraphError::Target {
                pass,
                reason: e.to_string(),
            }),
            None => Ok(GpuImage::new(texture)),
        }
    }

    fn image_size(&self, image: &GpuImage) -> UVec2 {
        image.size
    }

    fn target_layout(&self, image: &GpuImage) -> wgpu::TextureFormat {
        image.texture.format()
    }

    fn surface_layout(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    fn create_background(&mut self, slot: usize, image: &RgbaImage) -> GpuImage {
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("Background {slot}")),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        GpuImage::new(texture)
    }

    fn create_bindings(
        &mut self,
        pass: usize,
        input: &GpuImage,
        backgrounds: &[GpuImage; BACKGROUND_COUNT],
    ) -> wgpu::BindGroup {
        let [bg0, bg1, bg2] = backgrounds;
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Pass {pass} Bind Group")),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&bg0.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&bg1.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&bg2.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn create_pipeline(
        &mut self,
        pass: usize,
        shader: &Path,
        layout: &wgpu::TextureFormat,
        kind: PassKind,
    ) -> Result<wgpu::RenderPipeline, GraphError> {
        let source = std::fs::read_to_string(shader).map_err(|e| GraphError::ShaderRead {
            path: shader.to_path_buf(),
            source: e,
        })?;

        // Composite output lands on whatever the host already drew, so it
        // blends; intermediate passes overwrite their target.
        let blend = match kind {
            PassKind::Offscreen => wgpu::BlendState::REPLACE,
            PassKind::Screen => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        };

        let label = format!("Pass {pass} Pipeline");
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_shader,
                entry_point: Some("vs"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: None,
                targets: &[Some(wgpu::ColorTargetState {
                    format: *layout,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(GraphError::Pipeline {
                pass,
                reason: e.to_string(),
            }),
            None => Ok(pipeline),
        }
    }

    fn write_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[*uniforms]));
    }

    fn draw_offscreen(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &GpuImage,
        pipeline: &wgpu::RenderPipeline,
        bindings: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Offscreen Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(0.0, 0.0, target.size.x as f32, target.size.y as f32, 0.0, 1.0);
        self.draw_quad(&mut pass, pipeline, bindings);
    }

    fn draw_composite(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipeline: &wgpu::RenderPipeline,
        bindings: &wgpu::BindGroup,
        viewport: Viewport,
    ) {
        pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
        self.draw_quad(pass, pipeline, bindings);
    }
}
