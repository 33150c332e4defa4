use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::settings::UniformSink;
use crate::types::{Dimensions, InterlaceField, Orientation, PixelDensity};

/// Every slot is padded to 16 bytes so it satisfies uniform binding alignment
/// on all backends.
pub(crate) const SLOT_SIZE: u64 = 16;

/// First binding index used by the uniform slots; 0 and 1 hold the sampler and source texture.
pub(crate) const FIRST_UNIFORM_BINDING: u32 = 2;
pub(crate) const UNIFORM_SLOT_COUNT: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct UVec2Slot {
    value: [u32; 2],
    _padding: [u32; 2],
}

impl UVec2Slot {
    pub fn new(value: [u32; 2]) -> Self {
        Self {
            value,
            _padding: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct ScalarSlot {
    value: u32,
    _padding: [u32; 3],
}

impl ScalarSlot {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            _padding: [0; 3],
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct UniformBuffers {
    output_dims: wgpu::Buffer,
    input_dims: wgpu::Buffer,
    orientation: wgpu::Buffer,
    pixel_density: wgpu::Buffer,
    interlaced: wgpu::Buffer,
    field: wgpu::Buffer,
}

impl UniformBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        let slot = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: SLOT_SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        Self {
            output_dims: slot("output dims uniform"),
            input_dims: slot("input dims uniform"),
            orientation: slot("orientation uniform"),
            pixel_density: slot("pixel density uniform"),
            interlaced: slot("interlaced uniform"),
            field: slot("field uniform"),
        }
    }

    /// Bind group entries in shader binding order, starting at [`FIRST_UNIFORM_BINDING`].
    pub fn entries(&self) -> [wgpu::BindGroupEntry<'_>; UNIFORM_SLOT_COUNT as usize] {
        [
            uniform_entry(0, &self.output_dims),
            uniform_entry(1, &self.input_dims),
            uniform_entry(2, &self.orientation),
            uniform_entry(3, &self.pixel_density),
            uniform_entry(4, &self.interlaced),
            uniform_entry(5, &self.field),
        ]
    }
}

fn uniform_entry(offset: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding: FIRST_UNIFORM_BINDING + offset,
        resource: buffer.as_entire_binding(),
    }
}

#[derive(Clone, Debug)]
pub struct UniformWriter {
    queue: wgpu::Queue,
    buffers: UniformBuffers,
    device_lost: Arc<AtomicBool>,
}

impl UniformWriter {
    pub(crate) fn new(
        queue: wgpu::Queue,
        buffers: UniformBuffers,
        device_lost: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            buffers,
            device_lost,
        }
    }

    /// Writes the documented start-up values: `(1,1)` dims, columns, density 1,
    /// progressive, odd field.
    pub(crate) fn write_initial(&self) {
        let unit = Dimensions::clamped(1, 1);
        self.write_output_dimensions(unit);
        self.write_input_dimensions(unit);
        self.write_orientation(Orientation::Columns);
        self.write_pixel_density(PixelDensity::IDENTITY);
        self.write_interlaced(false);
        self.write_field(InterlaceField::Odd);
    }

    pub fn write_output_dimensions(&self, dims: Dimensions) {
        self.write_uvec2(&self.buffers.output_dims, dims.as_array());
    }

    pub fn write_input_dimensions(&self, dims: Dimensions) {
        self.write_uvec2(&self.buffers.input_dims, dims.as_array());
    }

    fn write_uvec2(&self, buffer: &wgpu::Buffer, value: [u32; 2]) {
        self.queue
            .write_buffer(buffer, 0, bytemuck::bytes_of(&UVec2Slot::new(value)));
    }

    fn write_scalar(&self, buffer: &wgpu::Buffer, value: u32) {
        self.queue
            .write_buffer(buffer, 0, bytemuck::bytes_of(&ScalarSlot::new(value)));
    }
}

impl UniformSink for UniformWriter {
    fn is_ready(&self) -> bool {
        !self.device_lost.load(Ordering::Acquire)
    }

    fn write_orientation(&self, orientation: Orientation) {
        self.write_scalar(&self.buffers.orientation, orientation.uniform_value());
    }

    fn write_pixel_density(&self, density: PixelDensity) {
        self.write_scalar(&self.buffers.pixel_density, density.get());
    }

    fn write_interlaced(&self, interlaced: bool) {
        self.write_scalar(&self.buffers.interlaced, u32::from(interlaced));
    }

    fn write_field(&self, field: InterlaceField) {
        self.write_scalar(&self.buffers.field, field.uniform_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn slots_fill_sixteen_bytes() {
        assert_eq!(size_of::<UVec2Slot>() as u64, SLOT_SIZE);
        assert_eq!(size_of::<ScalarSlot>() as u64, SLOT_SIZE);
        assert_eq!(align_of::<ScalarSlot>(), 4);
    }

    #[test]
    fn slot_value_leads_the_payload() {
        let slot = UVec2Slot::new([12, 34]);
        let bytes = bytemuck::bytes_of(&slot);
        assert_eq!(&bytes[0..4], &12u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &34u32.to_ne_bytes());
        assert!(bytes[8..].iter().all(|b| *b == 0));

        let slot = ScalarSlot::new(7);
        let bytes = bytemuck::bytes_of(&slot);
        assert_eq!(&bytes[0..4], &7u32.to_ne_bytes());
        assert!(bytes[4..].iter().all(|b| *b == 0));
    }
}
