use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::FilterType;

use crate::error::CameraError;
use crate::types::Dimensions;

use super::{CameraOptions, MediaDevices, MediaStream, VideoFrame};

/// File extensions picked up as frames, compared case-insensitively.
pub const SEQUENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Plays a directory of still images as a looping, paced video stream.
///
/// Files are ordered by name. A `frame_rate` hint overrides the configured
/// interval; `width` + `height` hints resize every frame.
#[derive(Debug, Clone)]
pub struct ImageSequenceDevices {
    directory: PathBuf,
    interval: Duration,
}

impl ImageSequenceDevices {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            interval: DEFAULT_FRAME_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl MediaDevices for ImageSequenceDevices {
    fn get_user_media(
        &mut self,
        options: &CameraOptions,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let files = list_frames(&self.directory)?;
        if files.is_empty() {
            return Err(CameraError::NotFound);
        }

        let interval = frame_interval(options.frame_rate, self.interval);
        let resize = match (options.width, options.height) {
            (Some(width), Some(height)) => Dimensions::new(width, height).ok(),
            _ => None,
        };
        tracing::debug!(
            directory = %self.directory.display(),
            frames = files.len(),
            interval = ?interval,
            facing = %options.facing_mode,
            "opening image sequence"
        );

        Ok(Box::new(ImageSequenceStream::new(
            self.directory.display().to_string(),
            files,
            interval,
            resize,
        )))
    }
}

fn frame_interval(frame_rate: Option<f32>, fallback: Duration) -> Duration {
    match frame_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => {
            Duration::try_from_secs_f64(1.0 / rate as f64).unwrap_or(fallback)
        }
        _ => fallback,
    }
}

fn list_frames(directory: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let entries = std::fs::read_dir(directory).map_err(map_open_error)?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SEQUENCE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            });
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn map_open_error(err: io::Error) -> CameraError {
    match err.kind() {
        io::ErrorKind::NotFound => CameraError::NotFound,
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
        _ => CameraError::Io(err),
    }
}

/// Stream half of [`ImageSequenceDevices`].
pub struct ImageSequenceStream {
    label: String,
    files: Vec<PathBuf>,
    interval: Duration,
    resize: Option<Dimensions>,
    started: Instant,
    next_due: Instant,
    index: usize,
    stopped: bool,
}

impl ImageSequenceStream {
    fn new(
        label: String,
        files: Vec<PathBuf>,
        interval: Duration,
        resize: Option<Dimensions>,
    ) -> Self {
        let now = Instant::now();
        Self {
            label,
            files,
            interval,
            resize,
            started: now,
            next_due: now,
            index: 0,
            stopped: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn decode(&self, path: &Path, timestamp: Duration) -> Result<VideoFrame, CameraError> {
        let image = image::open(path)
            .map_err(|err| CameraError::Device(format!("{}: {err}", path.display())))?;
        let mut rgba = image.to_rgba8();
        if let Some(size) = self.resize {
            if rgba.dimensions() != (size.width(), size.height()) {
                rgba = image::imageops::resize(
                    &rgba,
                    size.width(),
                    size.height(),
                    FilterType::Triangle,
                );
            }
        }
        let dims = Dimensions::new(rgba.width(), rgba.height())
            .map_err(|err| CameraError::Device(format!("{}: {err}", path.display())))?;
        VideoFrame::new(dims, rgba.into_raw(), timestamp)
            .map_err(|err| CameraError::Device(err.to_string()))
    }

    /// Advances past the due file even when it fails to decode, so one bad
    /// file costs a frame slot instead of stalling the stream.
    fn present(&mut self, now: Instant) -> Option<VideoFrame> {
        let path = self.files[self.index % self.files.len()].clone();
        self.index += 1;
        self.next_due += self.interval;
        // Skip ahead instead of bursting after a stall.
        if self.next_due < now {
            self.next_due = now + self.interval;
        }
        match self.decode(&path, now.duration_since(self.started)) {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::warn!(source = %self.label, error = %err, "skipping undecodable frame");
                None
            }
        }
    }
}

impl MediaStream for ImageSequenceStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let now = Instant::now();
        if self.stopped || now < self.next_due {
            return Ok(None);
        }
        Ok(self.present(now))
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<VideoFrame, CameraError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.poll_frame()? {
                return Ok(frame);
            }
            let now = Instant::now();
            if self.stopped || now >= deadline {
                return Err(CameraError::Timeout);
            }
            thread::sleep(self.next_due.min(deadline).saturating_duration_since(now));
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
