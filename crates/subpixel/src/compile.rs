use std::borrow::Cow;

use crate::error::{ProcessorError, Result};

pub(crate) const VERTEX_ENTRY: &str = "vs_main";
pub(crate) const FRAGMENT_ENTRY: &str = "fs_main";

/// Compiles the full-screen triangle vertex stage and the subpixel fragment stage.
///
/// Both stages live in one WGSL module. Validation errors raised by the
/// device are captured through an error scope and returned instead of being
/// routed to the uncaptured-error handler.
pub(crate) fn compile_subpixel_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("subpixel shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SUBPIXEL_WGSL)),
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(ProcessorError::Shader(error.to_string()));
    }
    Ok(module)
}

/// WGSL source for the subpixel effect.
///
/// Bindings (group 0) must stay in sync with `RenderPipeline::bind_group_layout_entries`
/// and with `shading::shade`, which mirrors `fs_main` on the CPU.
pub const SUBPIXEL_WGSL: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var source_sampler: sampler;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var<uniform> u_output_dims: vec2<u32>;
@group(0) @binding(3) var<uniform> u_input_dims: vec2<u32>;
@group(0) @binding(4) var<uniform> u_orientation: u32;
@group(0) @binding(5) var<uniform> u_pixel_density: u32;
@group(0) @binding(6) var<uniform> u_interlaced: u32;
@group(0) @binding(7) var<uniform> u_field: u32;

// One oversized triangle covers the viewport; uv runs 0..1 top-left to bottom-right.
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    var out: VertexOutput;
    out.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel_coord = in.uv * vec2<f32>(u_output_dims);

    let block_x = u32(floor(pixel_coord.x)) % 3u;
    let block_y = u32(floor(pixel_coord.y)) % 3u;
    var block_pos = block_x;
    if (u_orientation == 1u) {
        block_pos = block_y;
    }

    let logical = floor(pixel_coord / 3.0);
    let density = f32(u_pixel_density);
    let grouped = logical * density + vec2<f32>(density * 0.5);
    let input_uv = grouped / vec2<f32>(u_input_dims);
    let sampled = textureSampleLevel(source_texture, source_sampler, input_uv, 0.0);

    if (u_interlaced == 1u) {
        // Scanlines count from 1: logical row 0 belongs to the odd field (1).
        let logical_row = u32(floor(pixel_coord.y)) / 3u;
        let row_field = (logical_row + 1u) % 2u;
        if (row_field != u_field) {
            return vec4<f32>(0.0, 0.0, 0.0, 1.0);
        }
    }

    if (block_pos == 0u) {
        return vec4<f32>(sampled.r, 0.0, 0.0, sampled.a);
    }
    if (block_pos == 1u) {
        return vec4<f32>(0.0, sampled.g, 0.0, sampled.a);
    }
    return vec4<f32>(0.0, 0.0, sampled.b, sampled.a);
}
";
