use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ProcessorError, Result};
use crate::settings::UniformSink;
use crate::types::{Dimensions, InterlaceField, Orientation, PixelDensity};

use super::uniforms::{UniformBuffers, UniformWriter};

/// Pixel format of every surface the subpixel pipeline draws into.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`GpuContext`]; canvases remember which context claimed them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpu#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

impl From<GpuPowerPreference> for wgpu::PowerPreference {
    fn from(value: GpuPowerPreference) -> Self {
        match value {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuOptions {
    pub power_preference: GpuPowerPreference,
    pub force_fallback_adapter: bool,
}

struct GpuResources {
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,
    buffers: UniformBuffers,
    writer: UniformWriter,
    max_texture_dimension: u32,
}

/// Owns the device, the shared sampler, and the uniform slots.
///
/// Everything except [`GpuContext::init`] and [`GpuContext::destroy`] fails
/// with [`ProcessorError::NotInitialized`] until `init` has completed.
pub struct GpuContext {
    id: ContextId,
    options: GpuOptions,
    resources: Option<GpuResources>,
    device_lost: Arc<AtomicBool>,
}

impl GpuContext {
    pub fn new(options: GpuOptions) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            options,
            resources: None,
            device_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn options(&self) -> GpuOptions {
        self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// Acquires an adapter and device, then seeds every uniform slot.
    ///
    /// Calling this again on an initialized context is a no-op.
    pub fn init(&mut self) -> Result<()> {
        if self.resources.is_some() {
            tracing::debug!(context = %self.id, "GPU context already initialized");
            return Ok(());
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: self.options.power_preference.into(),
            compatible_surface: None,
            force_fallback_adapter: self.options.force_fallback_adapter,
        }))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        tracing::info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            max_texture_dimension = limits.max_texture_dimension_2d,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("subpixel device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))?;

        self.device_lost.store(false, Ordering::Release);
        let lost = Arc::clone(&self.device_lost);
        let id = self.id;
        device.set_device_lost_callback(move |reason, message| {
            lost.store(true, Ordering::Release);
            match reason {
                wgpu::DeviceLostReason::Destroyed => {
                    tracing::debug!(context = %id, "GPU device destroyed");
                }
                _ => {
                    tracing::error!(context = %id, ?reason, %message, "GPU device lost");
                }
            }
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("subpixel sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let buffers = UniformBuffers::new(&device);
        let writer = UniformWriter::new(
            queue.clone(),
            buffers.clone(),
            Arc::clone(&self.device_lost),
        );
        writer.write_initial();

        // Wait for the initial uniform uploads before reporting readiness.
        queue.submit(std::iter::empty());
        device.poll(wgpu::PollType::Wait)?;

        self.resources = Some(GpuResources {
            _instance: instance,
            device,
            queue,
            sampler,
            buffers,
            writer,
            max_texture_dimension: limits.max_texture_dimension_2d,
        });
        tracing::debug!(context = %self.id, "GPU context initialized");
        Ok(())
    }

    fn resources(&self) -> Result<&GpuResources> {
        self.resources.as_ref().ok_or(ProcessorError::NotInitialized)
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        Ok(&self.resources()?.device)
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        Ok(&self.resources()?.queue)
    }

    pub fn sampler(&self) -> Result<&wgpu::Sampler> {
        Ok(&self.resources()?.sampler)
    }

    pub fn preferred_format(&self) -> Result<wgpu::TextureFormat> {
        self.resources()?;
        Ok(OUTPUT_FORMAT)
    }

    pub fn max_texture_dimension(&self) -> Result<u32> {
        Ok(self.resources()?.max_texture_dimension)
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    pub fn uniform_writer(&self) -> Result<UniformWriter> {
        Ok(self.resources()?.writer.clone())
    }

    pub fn write_output_dimensions(&self, dims: Dimensions) -> Result<()> {
        tracing::debug!(output = %dims, "writing output dimensions");
        self.resources()?.writer.write_output_dimensions(dims);
        Ok(())
    }

    pub fn write_input_dimensions(&self, dims: Dimensions) -> Result<()> {
        self.resources()?.writer.write_input_dimensions(dims);
        Ok(())
    }

    pub fn write_orientation(&self, orientation: Orientation) -> Result<()> {
        self.resources()?.writer.write_orientation(orientation);
        Ok(())
    }

    pub fn write_pixel_density(&self, density: impl Into<PixelDensity>) -> Result<()> {
        self.resources()?.writer.write_pixel_density(density.into());
        Ok(())
    }

    pub fn write_interlaced(&self, interlaced: bool) -> Result<()> {
        self.resources()?.writer.write_interlaced(interlaced);
        Ok(())
    }

    pub fn write_field(&self, field: InterlaceField) -> Result<()> {
        self.resources()?.writer.write_field(field);
        Ok(())
    }

    pub fn create_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        source: &wgpu::TextureView,
    ) -> Result<wgpu::BindGroup> {
        let resources = self.resources()?;
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(&resources.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(source),
            },
        ];
        entries.extend(resources.buffers.entries());
        Ok(resources
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("subpixel frame bind group"),
                layout,
                entries: &entries,
            }))
    }

    pub fn flush(&self) -> Result<()> {
        self.resources()?.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }

    pub fn destroy(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.device.destroy();
            tracing::debug!(context = %self.id, "GPU context destroyed");
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("initialized", &self.is_initialized())
            .field("device_lost", &self.is_device_lost())
            .finish()
    }
}
