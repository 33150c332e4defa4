//! CPU reference of the subpixel fragment stage.
//!
//! [`shade`] performs the same arithmetic as `fs_main` in the WGSL module
//! (see `compile.rs`), one output fragment at a time. [`render_software`]
//! drives it over a whole canvas and backs the renderer's no-GPU path.

use image::RgbaImage;

use crate::gpu::Frame;
use crate::renderer::{SubpixelRenderer, EXPANSION};
use crate::types::{Dimensions, InterlaceField, Orientation, PixelDensity, ProcessorSettings};

/// Uniform values consumed by one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingParams {
    pub output_dims: Dimensions,
    pub input_dims: Dimensions,
    pub orientation: Orientation,
    pub pixel_density: PixelDensity,
    pub interlaced: bool,
    pub field: InterlaceField,
}

impl ShadingParams {
    /// Derives per-draw uniforms from the settings and the source size.
    pub fn for_input(input_dims: Dimensions, settings: &ProcessorSettings) -> Self {
        Self {
            output_dims: SubpixelRenderer::calculate_output_dimensions(
                input_dims,
                settings.pixel_density,
            ),
            input_dims,
            orientation: settings.orientation,
            pixel_density: settings.pixel_density,
            interlaced: settings.interlaced,
            field: settings.field,
        }
    }
}

pub const OPAQUE_BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Shades one fragment at normalized `uv`, sampling the source via `sample`.
pub fn shade<S>(uv: [f32; 2], params: &ShadingParams, sample: S) -> [f32; 4]
where
    S: Fn([f32; 2]) -> [f32; 4],
{
    let [out_w, out_h] = params.output_dims.as_array();
    let pixel_coord = [uv[0] * out_w as f32, uv[1] * out_h as f32];

    let block_x = (pixel_coord[0].floor() as u32) % EXPANSION;
    let block_y = (pixel_coord[1].floor() as u32) % EXPANSION;
    let block_pos = match params.orientation {
        Orientation::Rows => block_y,
        Orientation::Columns => block_x,
    };

    let logical = [
        (pixel_coord[0] / EXPANSION as f32).floor(),
        (pixel_coord[1] / EXPANSION as f32).floor(),
    ];
    let density = params.pixel_density.get() as f32;
    let half = density * 0.5;
    let grouped = [logical[0] * density + half, logical[1] * density + half];
    let [in_w, in_h] = params.input_dims.as_array();
    let input_uv = [grouped[0] / in_w as f32, grouped[1] / in_h as f32];
    let sampled = sample(input_uv);

    if params.interlaced {
        let logical_row = (pixel_coord[1].floor() as u32) / EXPANSION;
        // Scanlines are numbered from 1, so row 0 belongs to the odd field.
        let row_field = (logical_row + 1) % 2;
        if row_field != params.field.uniform_value() {
            return OPAQUE_BLACK;
        }
    }

    match block_pos {
        0 => [sampled[0], 0.0, 0.0, sampled[3]],
        1 => [0.0, sampled[1], 0.0, sampled[3]],
        _ => [0.0, 0.0, sampled[2], sampled[3]],
    }
}

/// Bilinear, edge-clamped lookup into a tightly packed RGBA8 frame.
pub fn sample_bilinear(frame: &Frame<'_>, uv: [f32; 2]) -> [f32; 4] {
    let width = frame.dimensions().width();
    let height = frame.dimensions().height();
    let texel = |x: i64, y: i64| -> [f32; 4] {
        let x = x.clamp(0, width as i64 - 1) as usize;
        let y = y.clamp(0, height as i64 - 1) as usize;
        let offset = (y * width as usize + x) * 4;
        let px = &frame.pixels()[offset..offset + 4];
        [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
            px[3] as f32 / 255.0,
        ]
    };

    let x = uv[0] * width as f32 - 0.5;
    let y = uv[1] * height as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top_left = texel(x0, y0);
    let top_right = texel(x0 + 1, y0);
    let bottom_left = texel(x0, y0 + 1);
    let bottom_right = texel(x0 + 1, y0 + 1);

    let mut out = [0.0; 4];
    for channel in 0..4 {
        let top = top_left[channel] * (1.0 - fx) + top_right[channel] * fx;
        let bottom = bottom_left[channel] * (1.0 - fx) + bottom_right[channel] * fx;
        out[channel] = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Renders `frame` onto a `canvas`-sized image without touching the GPU.
pub fn render_software(frame: &Frame<'_>, params: &ShadingParams, canvas: Dimensions) -> RgbaImage {
    let width = canvas.width();
    let height = canvas.height();
    RgbaImage::from_fn(width, height, |x, y| {
        let uv = [
            (x as f32 + 0.5) / width as f32,
            (y as f32 + 0.5) / height as f32,
        ];
        let color = shade(uv, params, |at| sample_bilinear(frame, at));
        image::Rgba(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    })
}
