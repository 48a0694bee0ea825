use bytemuck::{Pod, Zeroable};
use glam::Affine3A;
use glam::Mat4;

use crate::rendering::gpu::device::{BufferId, BufferUsage, GpuDevice, GpuError};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
}

impl From<&Affine3A> for InstanceData {
    fn from(value: &Affine3A) -> Self {
        Self {
            model: Mat4::from(*value).to_cols_array_2d(),
        }
    }
}

/// The per-frame instance transforms. The CPU side is a scratch vector that keeps its allocation
/// across frames; the GPU side is recreated with a power of two capacity whenever it is too small.
pub struct InstanceScratch {
    instances: Vec<InstanceData>,
    buffer: Option<(BufferId, usize)>,
}

impl Default for InstanceScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceScratch {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            buffer: None,
        }
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    /// Appends an instance and returns its index into the buffer.
    pub fn push(&mut self, transform: &Affine3A) -> u32 {
        self.instances.push(transform.into());
        (self.instances.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    /// Capacity of the GPU buffer, in instances.
    pub fn capacity(&self) -> usize {
        self.buffer.map_or(0, |(_, capacity)| capacity)
    }

    /// Writes the scratch contents to the GPU, growing the buffer if needed.
    pub fn upload<D: GpuDevice>(&mut self, device: &mut D) -> Result<BufferId, GpuError> {
        let required = self.instances.len().max(1);

        let buffer = match self.buffer {
            Some((buffer, capacity)) if capacity >= required => buffer,
            current => {
                if let Some((buffer, _)) = current {
                    device.destroy_buffer(buffer);
                    self.buffer = None;
                }

                let capacity = required.next_power_of_two();
                let zeroed = vec![InstanceData::zeroed(); capacity];
                let buffer = device.create_buffer("Instances", BufferUsage::Instance, bytemuck::cast_slice(&zeroed))?;
                self.buffer = Some((buffer, capacity));
                buffer
            }
        };

        device.write_buffer(buffer, 0, self.as_bytes())?;
        Ok(buffer)
    }

    pub fn destroy<D: GpuDevice>(&mut self, device: &mut D) {
        if let Some((buffer, _)) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::gpu::headless::HeadlessDevice;
    use glam::Vec3;

    #[test]
    fn grows_to_the_next_power_of_two() {
        let mut device = HeadlessDevice::new();
        let mut scratch = InstanceScratch::new();

        for i in 0..5 {
            assert_eq!(scratch.push(&Affine3A::from_translation(Vec3::X * i as f32)), i);
        }
        let first = scratch.upload(&mut device).unwrap();
        assert_eq!(scratch.capacity(), 8);
        assert_eq!(scratch.as_bytes().len(), 5 * 64);

        // fits, so the buffer stays
        scratch.clear();
        scratch.push(&Affine3A::IDENTITY);
        assert_eq!(scratch.upload(&mut device).unwrap(), first);

        for _ in 0..8 {
            scratch.push(&Affine3A::IDENTITY);
        }
        assert_ne!(scratch.upload(&mut device).unwrap(), first);
        assert_eq!(scratch.capacity(), 16);
        assert_eq!(device.live_buffers_of(BufferUsage::Instance), 1);

        scratch.destroy(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn stores_column_major_translation() {
        let data = InstanceData::from(&Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(data.model[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
