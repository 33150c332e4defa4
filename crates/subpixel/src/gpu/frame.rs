use std::time::Duration;

use image::RgbaImage;

use crate::error::{ProcessorError, Result};
use crate::types::Dimensions;

const BYTES_PER_PIXEL: usize = 4;

/// Borrowed, tightly packed RGBA8 pixels ready to be drawn.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    dimensions: Dimensions,
    pixels: &'a [u8],
    timestamp: Duration,
}

impl<'a> Frame<'a> {
    pub fn new(dimensions: Dimensions, pixels: &'a [u8], timestamp: Duration) -> Result<Self> {
        let expected =
            dimensions.width() as usize * dimensions.height() as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(ProcessorError::FrameSize {
                width: dimensions.width(),
                height: dimensions.height(),
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            dimensions,
            pixels,
            timestamp,
        })
    }

    /// Wraps pixels whose length the caller has already checked.
    pub(crate) fn from_validated(
        dimensions: Dimensions,
        pixels: &'a [u8],
        timestamp: Duration,
    ) -> Self {
        debug_assert_eq!(
            pixels.len(),
            dimensions.width() as usize * dimensions.height() as usize * BYTES_PER_PIXEL
        );
        Self {
            dimensions,
            pixels,
            timestamp,
        }
    }

    pub fn from_image(image: &'a RgbaImage) -> Result<Self> {
        let dimensions = Dimensions::new(image.width(), image.height())?;
        Self::new(dimensions, image.as_raw(), Duration::ZERO)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Texture the current frame is uploaded into; recreated only when the size changes.
pub(crate) struct SourceTexture {
    dimensions: Dimensions,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl SourceTexture {
    fn new(device: &wgpu::Device, dimensions: Dimensions) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("subpixel source texture"),
            size: extent(dimensions),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            dimensions,
            texture,
            view,
        }
    }

    /// Uploads `frame`, reusing `slot` when its size already matches.
    pub fn upload<'s>(
        slot: &'s mut Option<SourceTexture>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &Frame<'_>,
    ) -> &'s SourceTexture {
        let dimensions = frame.dimensions();
        let reuse = slot
            .as_ref()
            .is_some_and(|source| source.dimensions == dimensions);
        if !reuse {
            tracing::debug!(size = %dimensions, "allocating source texture");
            *slot = None;
        }
        let source = slot.get_or_insert_with(|| SourceTexture::new(device, dimensions));

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(dimensions.width() * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(dimensions.height()),
            },
            extent(dimensions),
        );
        source
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub(crate) fn extent(dimensions: Dimensions) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dimensions.width(),
        height: dimensions.height(),
        depth_or_array_layers: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_pixel_buffers() {
        let dims = Dimensions::new(2, 2).unwrap();
        let short = [0u8; 15];
        let err = Frame::new(dims, &short, Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::FrameSize {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn still_images_use_zero_timestamp() {
        let image = RgbaImage::new(3, 2);
        let frame = Frame::from_image(&image).unwrap();
        assert_eq!(frame.dimensions(), Dimensions::new(3, 2).unwrap());
        assert_eq!(frame.timestamp(), Duration::ZERO);
        assert_eq!(frame.pixels().len(), 24);
    }

    #[test]
    fn empty_images_are_rejected() {
        let image = RgbaImage::new(0, 5);
        assert!(matches!(
            Frame::from_image(&image),
            Err(ProcessorError::InvalidDimensions { .. })
        ));
    }
}
