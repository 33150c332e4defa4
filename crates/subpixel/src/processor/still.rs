use crate::canvas::Canvas;
use crate::error::{ProcessorError, Result};
use crate::gpu::Frame;
use crate::types::{Blob, ExportOptions};

use super::RenderStack;

/// Renders and exports single still frames.
#[derive(Debug, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Draws `frame` into `canvas`, resizing it to the 3x expansion, and
    /// waits for the GPU before updating the display aspect ratio.
    pub fn render(&self, stack: &mut RenderStack, canvas: &Canvas, frame: &Frame<'_>) -> Result<()> {
        if !stack.is_ready() {
            return Err(ProcessorError::NotInitialized);
        }
        stack.canvas.configure(canvas, &stack.gpu)?;

        let input = frame.dimensions();
        let canvas_size = stack.canvas.set_size(input)?;
        let output = stack.write_geometry(input)?;
        let view = stack.canvas.current_texture_view()?;
        stack.pipeline.render(&stack.gpu, frame, view)?;
        stack.gpu.flush()?;
        stack.canvas.set_aspect_ratio(input)?;

        tracing::debug!(
            input = %input,
            output = %output,
            canvas = %canvas_size,
            density = %stack.settings.pixel_density(),
            "rendered still frame"
        );
        Ok(())
    }

    /// Renders `frame` into the most recently configured canvas and captures it.
    ///
    /// The capture is submitted directly after the draw and before the flush.
    /// Returns `None` with a warning when the processor or canvas is not ready.
    pub fn export(
        &self,
        stack: &mut RenderStack,
        frame: &Frame<'_>,
        options: ExportOptions,
    ) -> Result<Option<Blob>> {
        if !stack.is_ready() {
            tracing::warn!("export requested before the processor was initialized");
            return Ok(None);
        }
        if !stack.canvas.is_configured() {
            tracing::warn!("export requested with no configured canvas");
            return Ok(None);
        }

        let input = frame.dimensions();
        stack.canvas.set_size(input)?;
        stack.write_geometry(input)?;
        let view = stack.canvas.current_texture_view()?;
        stack.pipeline.render(&stack.gpu, frame, view)?;
        let readback = stack.canvas.to_blob_sync(options)?;
        stack.gpu.flush()?;
        stack.canvas.set_aspect_ratio(input)?;

        let blob = readback.finish()?;
        tracing::debug!(
            input = %input,
            format = %blob.format,
            bytes = blob.len(),
            "exported still frame"
        );
        Ok(Some(blob))
    }
}
