//! CRT subpixel renderer.
//!
//! Every logical input pixel becomes a 3x3 block of output pixels whose three
//! stripes carry only the red, green, or blue channel. Pixel density groups
//! several input pixels into one logical pixel, and interlacing blanks
//! alternating 3-row bands. The overall flow is:
//!
//! ```text
//!   SubpixelProcessor::init
//!          │ GpuContext::init ─▶ SettingsManager::connect ─▶ RenderPipeline::create
//!          ▼
//!   ImageProcessor::render / CameraProcessor::pump
//!          │ CanvasManager::set_size ─▶ write_geometry() ─▶ GPU uniforms
//!          ▼
//!   RenderPipeline::render ──▶ canvas surface ──▶ CanvasManager::to_blob_sync ─▶ Blob
//! ```
//!
//! `GpuContext` owns the device and the uniform slots, `CanvasManager` owns
//! the surface a canvas presents into, and the orchestrators in
//! [`processor`] sequence uniform writes, the draw, and captures so an
//! exported blob always holds the frame that was just drawn. The same shading
//! arithmetic is available on the CPU through [`shading`] for hosts without
//! a GPU adapter.

pub mod camera;
pub mod canvas;
mod compile;
pub mod error;
pub mod gpu;
pub mod processor;
pub mod renderer;
pub mod settings;
pub mod shading;
pub mod types;

pub use camera::{
    CameraManager, CameraOptions, FacingMode, FrameCallback, FrameCallbackHandle, FrameMetadata,
    ImageSequenceDevices, MediaDevices, MediaStream, ReadyState, VideoFrame,
};
pub use canvas::{encode_blob, BlobReadback, Canvas, CanvasManager};
pub use compile::SUBPIXEL_WGSL;
pub use error::{CameraError, ProcessorError, Result};
pub use gpu::{
    ContextId, Frame, GpuContext, GpuOptions, GpuPowerPreference, RenderPipeline, UniformWriter,
    OUTPUT_FORMAT,
};
pub use processor::{CameraProcessor, ExportTicket, ImageProcessor, RenderStack, SubpixelProcessor};
pub use renderer::{SubpixelRenderer, DEFAULT_TARGET_HEIGHT, EXPANSION};
pub use settings::{SettingsManager, UniformSink};
pub use shading::{render_software, shade, ShadingParams};
pub use types::{
    Blob, Dimensions, ExportOptions, ImageFormat, InterlaceField, Orientation, PixelDensity,
    ProcessorSettings, SettingsPatch, DEFAULT_EXPORT_QUALITY,
};
