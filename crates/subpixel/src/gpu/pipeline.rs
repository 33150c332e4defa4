use crate::compile::{compile_subpixel_shader, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::error::{ProcessorError, Result};

use super::context::{GpuContext, OUTPUT_FORMAT};
use super::frame::{Frame, SourceTexture};
use super::uniforms::{FIRST_UNIFORM_BINDING, UNIFORM_SLOT_COUNT};

struct PipelineState {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Default)]
pub struct RenderPipeline {
    state: Option<PipelineState>,
    source: Option<SourceTexture>,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.state.is_some()
    }

    /// Compiles the shader and builds the pipeline. A second call is a no-op.
    pub fn create(&mut self, gpu: &GpuContext) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let device = gpu.device()?;
        let module = compile_subpixel_shader(device)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("subpixel bind group layout"),
            entries: &bind_group_layout_entries(),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("subpixel pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("subpixel pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(VERTEX_ENTRY),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(FRAGMENT_ENTRY),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OUTPUT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        tracing::debug!(context = %gpu.id(), "subpixel pipeline created");
        self.state = Some(PipelineState {
            pipeline,
            bind_group_layout,
        });
        Ok(())
    }

    /// Uploads `frame` and draws one full-screen triangle into `target`.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        frame: &Frame<'_>,
        target: &wgpu::TextureView,
    ) -> Result<()> {
        let state = self.state.as_ref().ok_or(ProcessorError::PipelineNotCreated)?;
        let device = gpu.device()?;
        let queue = gpu.queue()?;

        let dims = frame.dimensions();
        let limit = gpu.max_texture_dimension()?;
        if dims.width() > limit || dims.height() > limit {
            return Err(ProcessorError::TextureTooLarge {
                width: dims.width(),
                height: dims.height(),
                limit,
            });
        }

        let source = SourceTexture::upload(&mut self.source, device, queue, frame);
        let bind_group = gpu.create_bind_group(&state.bind_group_layout, source.view())?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("subpixel encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("subpixel pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&state.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.state = None;
        self.source = None;
    }
}

/// Sampler, source texture, then the uniform slots; all fragment-only.
pub(crate) fn bind_group_layout_entries(
) -> [wgpu::BindGroupLayoutEntry; 2 + UNIFORM_SLOT_COUNT as usize] {
    let uniform = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        uniform(FIRST_UNIFORM_BINDING),
        uniform(FIRST_UNIFORM_BINDING + 1),
        uniform(FIRST_UNIFORM_BINDING + 2),
        uniform(FIRST_UNIFORM_BINDING + 3),
        uniform(FIRST_UNIFORM_BINDING + 4),
        uniform(FIRST_UNIFORM_BINDING + 5),
    ]
}
