use std::fmt;

use crate::camera::{CameraManager, CameraOptions, FrameCallbackHandle, FrameMetadata, ReadyState};
use crate::canvas::{BlobReadback, Canvas, CanvasManager};
use crate::error::{ProcessorError, Result};
use crate::types::{Dimensions, ExportOptions, InterlaceField};

use super::{ExportTicket, PendingExport, RenderStack};

#[derive(Default)]
pub(crate) struct CameraLoop {
    frame_counter: u64,
    last_frame_size: Option<Dimensions>,
    pending_export: Option<PendingExport>,
    callback: Option<FrameCallbackHandle>,
}

impl CameraLoop {
    /// Even frames draw the odd field, odd frames the even field.
    fn field_for_tick(&self) -> InterlaceField {
        if self.frame_counter % 2 == 0 {
            InterlaceField::Odd
        } else {
            InterlaceField::Even
        }
    }

    fn queue_export(&mut self, options: ExportOptions) -> ExportTicket {
        let (pending, ticket) = PendingExport::new(options);
        if let Some(previous) = self.pending_export.replace(pending) {
            tracing::debug!("superseding an unresolved camera export");
            previous.resolve(None);
        }
        ticket
    }

    fn reset(&mut self) {
        self.frame_counter = 0;
        self.last_frame_size = None;
        self.callback = None;
        if let Some(pending) = self.pending_export.take() {
            pending.resolve(None);
        }
    }
}

/// Drives the live camera loop: one tick per delivered frame callback.
pub struct CameraProcessor {
    camera: CameraManager,
    state: CameraLoop,
}

impl CameraProcessor {
    pub fn new(camera: CameraManager) -> Self {
        Self {
            camera,
            state: CameraLoop::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn frame_counter(&self) -> u64 {
        self.state.frame_counter
    }

    pub fn camera(&self) -> &CameraManager {
        &self.camera
    }

    /// Stops any previous run, binds `canvas`, starts the camera, and
    /// schedules the first tick.
    pub fn start(
        &mut self,
        stack: &mut RenderStack,
        canvas: &Canvas,
        options: &CameraOptions,
    ) -> Result<()> {
        self.stop();
        if !stack.is_ready() {
            return Err(ProcessorError::NotInitialized);
        }
        stack.canvas.configure(canvas, &stack.gpu)?;
        self.camera.start(options)?;
        self.schedule()?;
        tracing::info!("camera loop started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.state.callback.take() {
            self.camera.cancel_video_frame_callback(handle);
        }
        let was_active = self.camera.is_active();
        self.camera.stop();
        self.state.reset();
        if was_active {
            tracing::info!("camera loop stopped");
        }
    }

    /// Runs one tick if the camera has delivered the scheduled callback.
    ///
    /// Returns whether a tick ran.
    pub fn pump(&mut self, stack: &mut RenderStack) -> Result<bool> {
        let Some(callback) = self.camera.poll()? else {
            return Ok(false);
        };
        if self.state.callback != Some(callback.handle) {
            tracing::debug!("ignoring stale frame callback");
            return Ok(false);
        }
        self.state.callback = None;

        let result = self.tick(stack, callback.metadata);
        self.schedule()?;
        result.map(|()| true)
    }

    /// Queues a capture of the next rendered frame.
    ///
    /// Settles with `None` straight away when no canvas is configured or the
    /// camera is inactive. A newer request supersedes an older one.
    pub fn export_frame(&mut self, canvas: &CanvasManager, options: ExportOptions) -> ExportTicket {
        if !canvas.is_configured() || !self.camera.is_active() {
            tracing::debug!("camera export requested while inactive");
            return ExportTicket::resolved(None);
        }
        self.state.queue_export(options)
    }

    fn schedule(&mut self) -> Result<()> {
        if self.camera.is_active() {
            self.state.callback = Some(self.camera.request_video_frame_callback()?);
        }
        Ok(())
    }

    fn tick(&mut self, stack: &mut RenderStack, metadata: FrameMetadata) -> Result<()> {
        if !stack.is_ready() || !stack.canvas.is_configured() || !self.camera.is_active() {
            tracing::debug!("camera tick skipped; processor not ready");
            return Ok(());
        }
        if self.camera.ready_state() < ReadyState::HaveCurrentData {
            return Ok(());
        }
        let (Some(input), Some(frame)) = (metadata.dimensions(), self.camera.current_frame())
        else {
            return Ok(());
        };

        if self.state.last_frame_size != Some(input) {
            let canvas_size = stack.canvas.set_size(input)?;
            stack.canvas.set_aspect_ratio(input)?;
            self.state.last_frame_size = Some(input);
            tracing::info!(input = %input, canvas = %canvas_size, "camera frame size changed");
        }
        // Output dimensions are rewritten every tick so density changes apply live.
        stack.write_geometry(input)?;

        // The alternating field only reaches the uniforms; the user's field is kept.
        if stack.settings.interlaced() {
            stack.gpu.write_field(self.state.field_for_tick())?;
        }

        let view = stack.canvas.current_texture_view()?;
        stack.pipeline.render(&stack.gpu, &frame.as_frame(), view)?;
        self.state.frame_counter += 1;

        if let Some(pending) = self.state.pending_export.take() {
            let options = pending.options();
            let blob = match stack.canvas.to_blob_sync(options).and_then(BlobReadback::finish) {
                Ok(blob) => Some(blob),
                Err(err) => {
                    tracing::warn!(error = %err, "camera frame export failed");
                    None
                }
            };
            pending.resolve(blob);
        }
        Ok(())
    }
}

impl fmt::Debug for CameraProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraProcessor")
            .field("camera", &self.camera)
            .field("frame_counter", &self.state.frame_counter)
            .field("last_frame_size", &self.state.last_frame_size)
            .field("export_pending", &self.state.pending_export.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::{solid_frame, ScriptedDevices, ScriptedStream};
    use crate::gpu::GpuOptions;
    use crate::types::ProcessorSettings;

    fn scripted_processor(frames: usize) -> (CameraProcessor, ScriptedStream) {
        let stream = ScriptedStream::default();
        for _ in 0..frames {
            stream.push(solid_frame(2, 2, [255, 255, 255, 255]));
        }
        let camera = CameraManager::new(Box::new(ScriptedDevices {
            stream: stream.clone(),
            deny: false,
        }));
        (CameraProcessor::new(camera), stream)
    }

    #[test]
    fn field_alternates_with_frame_counter() {
        let mut state = CameraLoop::default();
        let fields: Vec<_> = (0..4)
            .map(|_| {
                let field = state.field_for_tick();
                state.frame_counter += 1;
                field
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                InterlaceField::Odd,
                InterlaceField::Even,
                InterlaceField::Odd,
                InterlaceField::Even,
            ]
        );
    }

    #[test]
    fn export_while_inactive_resolves_to_none() {
        let (mut processor, _stream) = scripted_processor(0);
        let canvas = CanvasManager::new();
        let ticket = processor.export_frame(&canvas, ExportOptions::default());
        assert_eq!(ticket.try_take(), Some(None));
    }

    #[test]
    fn stop_resolves_pending_export() {
        let (mut processor, _stream) = scripted_processor(0);
        let ticket = processor.state.queue_export(ExportOptions::default());
        assert_eq!(ticket.try_take(), None);

        processor.stop();
        assert_eq!(ticket.wait(), None);
    }

    #[test]
    fn newer_export_supersedes_older() {
        let mut state = CameraLoop::default();
        let first = state.queue_export(ExportOptions::default());
        let second = state.queue_export(ExportOptions::default());
        assert_eq!(first.try_take(), Some(None));
        assert_eq!(second.try_take(), None);
        state.reset();
        assert_eq!(second.try_take(), Some(None));
    }

    #[test]
    fn stop_resets_loop_state() {
        let (mut processor, _stream) = scripted_processor(0);
        processor.state.frame_counter = 7;
        processor.state.last_frame_size = Dimensions::new(4, 4).ok();
        processor.stop();
        processor.stop();
        assert_eq!(processor.frame_counter(), 0);
        assert_eq!(processor.state.last_frame_size, None);
    }

    #[test]
    fn start_requires_initialized_stack() {
        let (mut processor, stream) = scripted_processor(1);
        let mut stack = RenderStack::new(GpuOptions::default(), ProcessorSettings::default());
        assert!(matches!(
            processor.start(&mut stack, &Canvas::new(), &CameraOptions::default()),
            Err(ProcessorError::NotInitialized)
        ));
        assert!(!processor.is_active());
        assert_eq!(stream.queue.borrow().len(), 1);
    }

    #[test]
    fn unready_tick_reschedules_without_rendering() {
        let (mut processor, _stream) = scripted_processor(1);
        let mut stack = RenderStack::new(GpuOptions::default(), ProcessorSettings::default());
        processor.camera.start(&CameraOptions::default()).unwrap();
        processor.schedule().unwrap();

        assert!(processor.pump(&mut stack).unwrap());
        assert_eq!(processor.frame_counter(), 0);
        assert!(processor.state.callback.is_some());
        assert!(processor.camera.has_pending_callback());
    }
}
