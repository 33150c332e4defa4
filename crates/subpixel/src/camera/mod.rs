//! Live frame sources and per-frame callback scheduling.
//!
//! Acquisition is abstracted behind [`MediaDevices`] / [`MediaStream`] so the
//! camera loop can run over any producer of RGBA frames. [`CameraManager`]
//! owns at most one stream, tracks its readiness, and hands out one-shot
//! frame callbacks that [`CameraManager::poll`] delivers once a new frame
//! has been presented.

mod sequence;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use sequence::{ImageSequenceDevices, ImageSequenceStream, SEQUENCE_EXTENSIONS};

use crate::error::{CameraError, ProcessorError, Result};
use crate::gpu::Frame;
use crate::types::Dimensions;

pub const DEFAULT_FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        })
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode '{other}'")),
        }
    }
}

/// Acquisition hints; sources honour what they can and ignore the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraOptions {
    pub facing_mode: FacingMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    pub first_frame_timeout: Duration,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::default(),
            width: None,
            height: None,
            frame_rate: None,
            first_frame_timeout: DEFAULT_FIRST_FRAME_TIMEOUT,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    dimensions: Dimensions,
    pixels: Vec<u8>,
    timestamp: Duration,
}

impl VideoFrame {
    pub fn new(dimensions: Dimensions, pixels: Vec<u8>, timestamp: Duration) -> Result<Self> {
        Frame::new(dimensions, &pixels, timestamp)?;
        Ok(Self {
            dimensions,
            pixels,
            timestamp,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn as_frame(&self) -> Frame<'_> {
        Frame::from_validated(self.dimensions, &self.pixels, self.timestamp)
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("dimensions", &self.dimensions)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Media readiness, numbered like `HTMLMediaElement.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    pub fn value(self) -> u8 {
        self as u8
    }
}

pub trait MediaStream {
    fn label(&self) -> &str;

    /// Returns the next frame if one has been presented since the last call.
    fn poll_frame(&mut self) -> std::result::Result<Option<VideoFrame>, CameraError>;

    /// Blocks until a frame is decodable or `timeout` elapses.
    fn wait_for_frame(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<VideoFrame, CameraError>;

    fn ready_state(&self) -> ReadyState {
        ReadyState::HaveEnoughData
    }

    fn stop(&mut self);
}

/// Camera acquisition, in the shape of `navigator.mediaDevices`.
pub trait MediaDevices {
    fn get_user_media(
        &mut self,
        options: &CameraOptions,
    ) -> std::result::Result<Box<dyn MediaStream>, CameraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCallbackHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub presented_frames: u64,
    pub media_time: Duration,
}

impl FrameMetadata {
    pub fn dimensions(&self) -> Option<Dimensions> {
        Dimensions::new(self.width, self.height).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCallback {
    pub handle: FrameCallbackHandle,
    pub metadata: FrameMetadata,
}

struct VideoElement {
    stream: Box<dyn MediaStream>,
    current: Option<VideoFrame>,
    presented_frames: u64,
    fresh: bool,
}

impl VideoElement {
    fn ready_state(&self) -> ReadyState {
        if self.current.is_none() {
            return ReadyState::HaveMetadata;
        }
        self.stream.ready_state()
    }
}

/// Owns the active stream and the single outstanding frame callback.
pub struct CameraManager {
    devices: Option<Box<dyn MediaDevices>>,
    video: Option<VideoElement>,
    pending: Option<FrameCallbackHandle>,
    next_handle: u64,
}

impl CameraManager {
    pub fn new(devices: Box<dyn MediaDevices>) -> Self {
        Self {
            devices: Some(devices),
            video: None,
            pending: None,
            next_handle: 1,
        }
    }

    /// A manager on a platform with no camera API; `start` always fails.
    pub fn unsupported() -> Self {
        Self {
            devices: None,
            video: None,
            pending: None,
            next_handle: 1,
        }
    }

    /// Replaces any running stream and blocks until the first frame decodes.
    pub fn start(&mut self, options: &CameraOptions) -> Result<()> {
        self.stop();
        let devices = self
            .devices
            .as_mut()
            .ok_or(ProcessorError::CameraUnsupported)?;

        let mut stream = devices.get_user_media(options)?;
        let first = match stream.wait_for_frame(options.first_frame_timeout) {
            Ok(frame) => frame,
            Err(err) => {
                stream.stop();
                return Err(err.into());
            }
        };
        tracing::info!(
            source = stream.label(),
            facing = %options.facing_mode,
            size = %first.dimensions(),
            "camera started"
        );

        self.video = Some(VideoElement {
            stream,
            current: Some(first),
            presented_frames: 1,
            fresh: true,
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        self.pending = None;
        if let Some(mut video) = self.video.take() {
            video.stream.stop();
            tracing::info!(
                source = video.stream.label(),
                presented = video.presented_frames,
                "camera stopped"
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.video.is_some()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.video
            .as_ref()
            .map_or(ReadyState::HaveNothing, VideoElement::ready_state)
    }

    pub fn frame_dimensions(&self) -> Option<Dimensions> {
        if self.ready_state() < ReadyState::HaveCurrentData {
            return None;
        }
        self.current_frame().map(VideoFrame::dimensions)
    }

    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.video.as_ref()?.current.as_ref()
    }

    /// Registers the one-shot callback for the next presented frame.
    ///
    /// A newer request replaces an older one still pending.
    pub fn request_video_frame_callback(&mut self) -> Result<FrameCallbackHandle> {
        if !self.is_active() {
            return Err(ProcessorError::CameraNotActive);
        }
        let handle = FrameCallbackHandle(self.next_handle);
        self.next_handle += 1;
        self.pending = Some(handle);
        Ok(handle)
    }

    pub fn cancel_video_frame_callback(&mut self, handle: FrameCallbackHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }

    pub fn has_pending_callback(&self) -> bool {
        self.pending.is_some()
    }

    /// Pulls new frames from the stream and fires the pending callback if a
    /// frame it has not seen is available.
    pub fn poll(&mut self) -> Result<Option<FrameCallback>> {
        let Some(video) = self.video.as_mut() else {
            return Ok(None);
        };
        if let Some(frame) = video.stream.poll_frame()? {
            video.current = Some(frame);
            video.presented_frames += 1;
            video.fresh = true;
        }
        if !video.fresh {
            return Ok(None);
        }
        let Some(handle) = self.pending.take() else {
            return Ok(None);
        };
        video.fresh = false;

        let (width, height, media_time) = match &video.current {
            Some(frame) => (
                frame.dimensions().width(),
                frame.dimensions().height(),
                frame.timestamp(),
            ),
            None => (0, 0, Duration::ZERO),
        };
        Ok(Some(FrameCallback {
            handle,
            metadata: FrameMetadata {
                width,
                height,
                presented_frames: video.presented_frames,
                media_time,
            },
        }))
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CameraManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraManager")
            .field("supported", &self.devices.is_some())
            .field("active", &self.is_active())
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Default)]
    pub struct ScriptedStream {
        pub queue: Rc<RefCell<VecDeque<VideoFrame>>>,
        pub stopped: Rc<RefCell<u32>>,
        pub ready: Rc<RefCell<Option<ReadyState>>>,
    }

    impl ScriptedStream {
        pub fn push(&self, frame: VideoFrame) {
            self.queue.borrow_mut().push_back(frame);
        }
    }

    impl MediaStream for ScriptedStream {
        fn label(&self) -> &str {
            "scripted"
        }

        fn poll_frame(&mut self) -> std::result::Result<Option<VideoFrame>, CameraError> {
            Ok(self.queue.borrow_mut().pop_front())
        }

        fn wait_for_frame(
            &mut self,
            _timeout: Duration,
        ) -> std::result::Result<VideoFrame, CameraError> {
            self.queue
                .borrow_mut()
                .pop_front()
                .ok_or(CameraError::Timeout)
        }

        fn ready_state(&self) -> ReadyState {
            self.ready.borrow().unwrap_or(ReadyState::HaveEnoughData)
        }

        fn stop(&mut self) {
            *self.stopped.borrow_mut() += 1;
        }
    }

    pub struct ScriptedDevices {
        pub stream: ScriptedStream,
        pub deny: bool,
    }

    impl MediaDevices for ScriptedDevices {
        fn get_user_media(
            &mut self,
            _options: &CameraOptions,
        ) -> std::result::Result<Box<dyn MediaStream>, CameraError> {
            if self.deny {
                return Err(CameraError::PermissionDenied);
            }
            Ok(Box::new(self.stream.clone()))
        }
    }

    pub fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> VideoFrame {
        let dims = Dimensions::new(width, height).unwrap();
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        VideoFrame::new(dims, pixels, Duration::ZERO).unwrap()
    }
}
