//! Canvas handles and the offscreen surface the pipeline presents into.
//!
//! A [`Canvas`] is the caller-visible element: a backing pixel size, a display
//! aspect-ratio hint, and the GPU context that claimed it. [`CanvasManager`]
//! owns the texture behind a configured canvas and reads it back as an
//! encoded [`Blob`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::{ProcessorError, Result};
use crate::gpu::{ContextId, GpuContext};
use crate::renderer::EXPANSION;
use crate::types::{Blob, Dimensions, ExportOptions, ImageFormat};

const DEFAULT_CANVAS_WIDTH: u32 = 300;
const DEFAULT_CANVAS_HEIGHT: u32 = 150;
const BYTES_PER_PIXEL: u32 = 4;

#[derive(Debug)]
struct CanvasElement {
    width: Cell<u32>,
    height: Cell<u32>,
    aspect_ratio: Cell<Option<f64>>,
    context: Cell<Option<ContextId>>,
}

/// Cheap, cloneable handle onto one canvas element.
///
/// Clones refer to the same element; sizes set through a [`CanvasManager`]
/// are visible from every clone.
#[derive(Clone, Debug)]
pub struct Canvas {
    inner: Rc<CanvasElement>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            inner: Rc::new(CanvasElement {
                width: Cell::new(width.max(1)),
                height: Cell::new(height.max(1)),
                aspect_ratio: Cell::new(None),
                context: Cell::new(None),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width.get()
    }

    pub fn height(&self) -> u32 {
        self.inner.height.get()
    }

    pub fn size(&self) -> Dimensions {
        Dimensions::clamped(self.width() as u64, self.height() as u64)
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        self.inner.aspect_ratio.get()
    }

    pub fn context(&self) -> Option<ContextId> {
        self.inner.context.get()
    }

    pub fn same_element(&self, other: &Canvas) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_backing_size(&self, dims: Dimensions) {
        self.inner.width.set(dims.width());
        self.inner.height.set(dims.height());
    }

    fn claim_context(&self, id: ContextId) -> Result<()> {
        match self.inner.context.get() {
            Some(existing) if existing != id => Err(ProcessorError::ContextUnavailable),
            _ => {
                self.inner.context.set(Some(id));
                Ok(())
            }
        }
    }

    fn release_context(&self, id: ContextId) {
        if self.inner.context.get() == Some(id) {
            self.inner.context.set(None);
        }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

struct Surface {
    dimensions: Dimensions,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Surface {
    fn new(device: &wgpu::Device, dimensions: Dimensions, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("canvas surface"),
            size: wgpu::Extent3d {
                width: dimensions.width(),
                height: dimensions.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            dimensions,
            texture,
            view,
        }
    }
}

struct Binding {
    canvas: Canvas,
    context: ContextId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    max_texture_dimension: u32,
    surface: Surface,
}

#[derive(Default)]
pub struct CanvasManager {
    binding: Option<Binding>,
}

impl CanvasManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `canvas` to `gpu`. Re-configuring the same pair is a no-op.
    ///
    /// Fails with [`ProcessorError::ContextUnavailable`] when the canvas is
    /// already claimed by a different context.
    pub fn configure(&mut self, canvas: &Canvas, gpu: &GpuContext) -> Result<()> {
        if let Some(binding) = &self.binding {
            if binding.canvas.same_element(canvas) && binding.context == gpu.id() {
                return Ok(());
            }
        }

        let device = gpu.device()?.clone();
        let queue = gpu.queue()?.clone();
        let format = gpu.preferred_format()?;
        let max_texture_dimension = gpu.max_texture_dimension()?;

        self.unconfigure();
        canvas.claim_context(gpu.id())?;

        let dims = canvas.size();
        if let Err(err) = check_limit(dims, max_texture_dimension) {
            canvas.release_context(gpu.id());
            return Err(err);
        }
        let surface = Surface::new(&device, dims, format);
        tracing::debug!(size = %dims, context = %gpu.id(), "canvas configured");

        self.binding = Some(Binding {
            canvas: canvas.clone(),
            context: gpu.id(),
            device,
            queue,
            format,
            max_texture_dimension,
            surface,
        });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.binding.is_some()
    }

    pub fn canvas(&self) -> Option<&Canvas> {
        self.binding.as_ref().map(|binding| &binding.canvas)
    }

    fn binding(&self) -> Result<&Binding> {
        self.binding.as_ref().ok_or(ProcessorError::CanvasNotConfigured)
    }

    /// Sizes the backing surface to three times `input` on each axis.
    ///
    /// The canvas always carries the full expansion; pixel density only
    /// changes what the shader samples.
    pub fn set_size(&mut self, input: Dimensions) -> Result<Dimensions> {
        let binding = self.binding.as_mut().ok_or(ProcessorError::CanvasNotConfigured)?;
        let size = input.scale(EXPANSION as f64);
        check_limit(size, binding.max_texture_dimension)?;

        binding.canvas.set_backing_size(size);
        if binding.surface.dimensions != size {
            tracing::debug!(input = %input, canvas = %size, "resizing canvas surface");
            binding.surface = Surface::new(&binding.device, size, binding.format);
        }
        Ok(size)
    }

    pub fn set_aspect_ratio(&self, input: Dimensions) -> Result<()> {
        let binding = self.binding()?;
        binding
            .canvas
            .inner
            .aspect_ratio
            .set(Some(input.aspect_ratio()));
        Ok(())
    }

    pub fn surface_size(&self) -> Result<Dimensions> {
        Ok(self.binding()?.surface.dimensions)
    }

    pub fn current_texture_view(&self) -> Result<&wgpu::TextureView> {
        Ok(&self.binding()?.surface.view)
    }

    /// Submits a copy of the surface now; call it straight after the draw to capture.
    pub fn to_blob_sync(&self, options: ExportOptions) -> Result<BlobReadback> {
        let binding = self.binding()?;
        let dims = binding.surface.dimensions;
        let unpadded_bytes_per_row = dims.width() * BYTES_PER_PIXEL;
        let padded_bytes_per_row = padded_row_bytes(unpadded_bytes_per_row);

        let buffer = binding.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas readback buffer"),
            size: padded_bytes_per_row as u64 * dims.height() as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = binding
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("canvas readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &binding.surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(dims.height()),
                },
            },
            wgpu::Extent3d {
                width: dims.width(),
                height: dims.height(),
                depth_or_array_layers: 1,
            },
        );
        binding.queue.submit(Some(encoder.finish()));

        Ok(BlobReadback {
            device: binding.device.clone(),
            buffer,
            dimensions: dims,
            padded_bytes_per_row,
            options,
        })
    }

    pub fn to_blob(&self, options: ExportOptions) -> Result<Blob> {
        self.to_blob_sync(options)?.finish()
    }

    pub fn unconfigure(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.canvas.release_context(binding.context);
            binding.surface.texture.destroy();
            tracing::debug!(context = %binding.context, "canvas unconfigured");
        }
    }
}

impl Drop for CanvasManager {
    fn drop(&mut self) {
        self.unconfigure();
    }
}

impl fmt::Debug for CanvasManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasManager")
            .field("configured", &self.is_configured())
            .field(
                "surface",
                &self.binding.as_ref().map(|binding| binding.surface.dimensions),
            )
            .finish()
    }
}

#[must_use = "the capture is only encoded once `finish` is called"]
pub struct BlobReadback {
    device: wgpu::Device,
    buffer: wgpu::Buffer,
    dimensions: Dimensions,
    padded_bytes_per_row: u32,
    options: ExportOptions,
}

impl BlobReadback {
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn finish(self) -> Result<Blob> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::PollType::Wait)?;
        receiver
            .recv()
            .map_err(|_| ProcessorError::Readback("map callback dropped".into()))?
            .map_err(|err| ProcessorError::Readback(err.to_string()))?;

        let width = self.dimensions.width();
        let height = self.dimensions.height();
        let row_bytes = (width * BYTES_PER_PIXEL) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(self.padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        self.buffer.unmap();

        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            ProcessorError::Readback(format!("readback size mismatch for {}", self.dimensions))
        })?;
        encode_blob(&image, &self.options)
    }
}

/// Encodes RGBA pixels into the requested export format.
///
/// JPEG drops alpha and maps `quality` (0..=1) onto the encoder's 1..=100.
pub fn encode_blob(image: &RgbaImage, options: &ExportOptions) -> Result<Blob> {
    let mut bytes = Vec::new();
    match options.format {
        ImageFormat::Png => PngEncoder::new(&mut bytes)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(ProcessorError::Encode)?,
        ImageFormat::Jpeg => {
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(options.quality))
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(ProcessorError::Encode)?
        }
    }
    Ok(Blob {
        format: options.format,
        bytes,
    })
}

fn jpeg_quality(quality: f32) -> u8 {
    let quality = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        crate::types::DEFAULT_EXPORT_QUALITY
    };
    ((quality * 100.0).round() as u8).max(1)
}

fn padded_row_bytes(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn check_limit(dims: Dimensions, limit: u32) -> Result<()> {
    if dims.width() > limit || dims.height() > limit {
        return Err(ProcessorError::TextureTooLarge {
            width: dims.width(),
            height: dims.height(),
            limit,
        });
    }
    Ok(())
}
