//! Use-case orchestration: still images, the live camera loop, and the
//! facade that wires both onto one set of GPU resources.

mod camera;
mod still;

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use image::RgbaImage;

pub use camera::CameraProcessor;
pub use still::ImageProcessor;

use crate::camera::{CameraManager, CameraOptions, MediaDevices};
use crate::canvas::{Canvas, CanvasManager};
use crate::error::Result;
use crate::gpu::{Frame, GpuContext, GpuOptions, RenderPipeline};
use crate::renderer::{SubpixelRenderer, DEFAULT_TARGET_HEIGHT};
use crate::settings::SettingsManager;
use crate::types::{
    Blob, Dimensions, ExportOptions, InterlaceField, Orientation, PixelDensity,
    ProcessorSettings, SettingsPatch,
};

pub struct RenderStack {
    pub gpu: GpuContext,
    pub pipeline: RenderPipeline,
    pub canvas: CanvasManager,
    pub settings: SettingsManager,
}

impl RenderStack {
    pub fn new(gpu: GpuOptions, settings: ProcessorSettings) -> Self {
        Self {
            gpu: GpuContext::new(gpu),
            pipeline: RenderPipeline::new(),
            canvas: CanvasManager::new(),
            settings: SettingsManager::with_settings(settings),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gpu.is_initialized() && self.pipeline.is_created()
    }

    pub(crate) fn write_geometry(&self, input: Dimensions) -> Result<Dimensions> {
        let output =
            SubpixelRenderer::calculate_output_dimensions(input, self.settings.pixel_density());
        self.gpu.write_input_dimensions(input)?;
        self.gpu.write_output_dimensions(output)?;
        Ok(output)
    }

    pub(crate) fn restore_field(&self) -> Result<()> {
        if self.gpu.is_initialized() {
            self.gpu.write_field(self.settings.field())?;
        }
        Ok(())
    }
}

impl fmt::Debug for RenderStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStack")
            .field("gpu", &self.gpu)
            .field("pipeline_created", &self.pipeline.is_created())
            .field("canvas", &self.canvas)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Outstanding camera-frame export, settled by the next tick or by `stop`.
pub(crate) struct PendingExport {
    sender: Sender<Option<Blob>>,
    options: ExportOptions,
}

impl PendingExport {
    pub(crate) fn new(options: ExportOptions) -> (Self, ExportTicket) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        (Self { sender, options }, ExportTicket { receiver })
    }

    pub(crate) fn options(&self) -> ExportOptions {
        self.options
    }

    pub(crate) fn resolve(self, blob: Option<Blob>) {
        // The caller may have dropped its ticket; nothing to deliver then.
        let _ = self.sender.send(blob);
    }
}

/// Receiving half of a camera-frame export.
///
/// Resolves to `None` when the export was cancelled, the camera stopped,
/// or the capture failed. Dropping the pending side also resolves it, so
/// [`ExportTicket::wait`] never blocks past a stop.
#[derive(Debug)]
pub struct ExportTicket {
    receiver: Receiver<Option<Blob>>,
}

impl ExportTicket {
    pub fn resolved(blob: Option<Blob>) -> Self {
        let (pending, ticket) = PendingExport::new(ExportOptions::default());
        pending.resolve(blob);
        ticket
    }

    pub fn wait(self) -> Option<Blob> {
        self.receiver.recv().ok().flatten()
    }

    /// `None` while still pending; `Some(result)` once settled.
    pub fn try_take(&self) -> Option<Option<Blob>> {
        match self.receiver.try_recv() {
            Ok(blob) => Some(blob),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(None),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Option<Blob>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(blob) => Some(blob),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(None),
        }
    }
}

/// Everything needed to render still images and camera feeds.
///
/// ```no_run
/// use subpixel::{Canvas, GpuOptions, SubpixelProcessor};
///
/// # fn main() -> subpixel::Result<()> {
/// let mut processor = SubpixelProcessor::new(GpuOptions::default());
/// processor.init()?;
/// let image = image::RgbaImage::new(64, 48);
/// let canvas = Canvas::new();
/// processor.render_image(&canvas, &image)?;
/// assert_eq!((canvas.width(), canvas.height()), (192, 144));
/// # Ok(())
/// # }
/// ```
pub struct SubpixelProcessor {
    stack: RenderStack,
    image: ImageProcessor,
    camera: CameraProcessor,
}

impl SubpixelProcessor {
    pub fn new(gpu: GpuOptions) -> Self {
        Self {
            stack: RenderStack::new(gpu, ProcessorSettings::default()),
            image: ImageProcessor::new(),
            camera: CameraProcessor::new(CameraManager::unsupported()),
        }
    }

    pub fn with_settings(mut self, settings: ProcessorSettings) -> Self {
        self.stack.settings = SettingsManager::with_settings(settings);
        self
    }

    pub fn with_media_devices(mut self, devices: Box<dyn MediaDevices>) -> Self {
        self.camera = CameraProcessor::new(CameraManager::new(devices));
        self
    }

    /// GPU context, then the settings mirror, then the pipeline.
    pub fn init(&mut self) -> Result<()> {
        self.stack.gpu.init()?;
        let writer = self.stack.gpu.uniform_writer()?;
        self.stack.settings.connect(Box::new(writer));
        self.stack.pipeline.create(&self.stack.gpu)?;
        tracing::info!(context = %self.stack.gpu.id(), "subpixel processor ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.stack.is_ready()
    }

    pub fn stack(&self) -> &RenderStack {
        &self.stack
    }

    pub fn render(&mut self, canvas: &Canvas, frame: &Frame<'_>) -> Result<()> {
        self.image.render(&mut self.stack, canvas, frame)
    }

    pub fn render_image(&mut self, canvas: &Canvas, image: &RgbaImage) -> Result<()> {
        self.render(canvas, &Frame::from_image(image)?)
    }

    pub fn export(&mut self, frame: &Frame<'_>, options: ExportOptions) -> Result<Option<Blob>> {
        self.image.export(&mut self.stack, frame, options)
    }

    pub fn export_image(
        &mut self,
        image: &RgbaImage,
        options: ExportOptions,
    ) -> Result<Option<Blob>> {
        self.export(&Frame::from_image(image)?, options)
    }

    pub fn start_camera(&mut self, canvas: &Canvas, options: &CameraOptions) -> Result<()> {
        self.camera.start(&mut self.stack, canvas, options)
    }

    pub fn stop_camera(&mut self) {
        self.camera.stop();
        if let Err(err) = self.stack.restore_field() {
            tracing::warn!(error = %err, "failed to restore the interlace field");
        }
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn camera_frame_dimensions(&self) -> Option<Dimensions> {
        self.camera.camera().frame_dimensions()
    }

    pub fn pump_camera(&mut self) -> Result<bool> {
        self.camera.pump(&mut self.stack)
    }

    pub fn export_camera_frame(&mut self, options: ExportOptions) -> ExportTicket {
        self.camera.export_frame(&self.stack.canvas, options)
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.stack.settings.settings()
    }

    pub fn orientation(&self) -> Orientation {
        self.stack.settings.orientation()
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.stack.settings.set_orientation(orientation);
    }

    pub fn pixel_density(&self) -> PixelDensity {
        self.stack.settings.pixel_density()
    }

    pub fn set_pixel_density(&mut self, density: impl Into<PixelDensity>) {
        self.stack.settings.set_pixel_density(density);
    }

    /// Picks the density whose output height lands nearest `target_height`
    /// (480 when `None`) for `input`, applies it, and returns it.
    pub fn set_pixel_density_for_target_height(
        &mut self,
        input: Dimensions,
        target_height: Option<u32>,
    ) -> PixelDensity {
        let density = SubpixelRenderer::calculate_pixel_density_for_target_height(
            input,
            target_height.unwrap_or(DEFAULT_TARGET_HEIGHT),
        );
        self.stack.settings.set_pixel_density(density);
        density
    }

    pub fn interlaced(&self) -> bool {
        self.stack.settings.interlaced()
    }

    pub fn set_interlaced(&mut self, interlaced: bool) {
        self.stack.settings.set_interlaced(interlaced);
    }

    pub fn field(&self) -> InterlaceField {
        self.stack.settings.field()
    }

    pub fn set_field(&mut self, field: InterlaceField) {
        self.stack.settings.set_field(field);
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.stack.settings.update_settings(patch);
    }

    pub fn destroy(&mut self) {
        self.camera.stop();
        self.stack.settings.disconnect();
        self.stack.pipeline.destroy();
        self.stack.canvas.unconfigure();
        self.stack.gpu.destroy();
    }
}

impl Drop for SubpixelProcessor {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for SubpixelProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubpixelProcessor")
            .field("stack", &self.stack)
            .field("camera", &self.camera)
            .finish()
    }
}
