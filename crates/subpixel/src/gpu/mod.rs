//! GPU side of the subpixel renderer.
//!
//! - `context` owns the wgpu device/queue, the shared edge-clamped sampler,
//!   and the uniform slots; every uniform write goes through it.
//! - `uniforms` defines the six 16-byte uniform slots and the cloneable
//!   [`UniformWriter`] handed to the settings mirror.
//! - `frame` wraps borrowed RGBA pixels as a drawable source and uploads them
//!   into a reusable texture.
//! - `pipeline` compiles the WGSL module once and records one full-screen
//!   draw per frame.

mod context;
mod frame;
mod pipeline;
mod uniforms;

pub use context::{ContextId, GpuContext, GpuOptions, GpuPowerPreference, OUTPUT_FORMAT};
pub use frame::Frame;
pub use pipeline::RenderPipeline;
pub use uniforms::UniformWriter;
