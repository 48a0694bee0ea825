use std::collections::HashMap;

use log::trace;

use cellstream_files::surface::types::TextureFormat;

use crate::rendering::gpu::device::{BufferId, BufferUsage, DrawCall, GpuDevice, GpuError, TextureId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub bytes_uploaded: u64,
    pub draw_calls: u64,
    pub instances_drawn: u64,
}

struct BufferInfo {
    usage: BufferUsage,
    size: u64,
}

/// A device without a graphics API behind it. It keeps track of every allocation and draw, which
/// makes it the device of the headless driver and the recording double of the tests.
pub struct HeadlessDevice {
    next_id: u64,
    buffers: HashMap<BufferId, BufferInfo>,
    textures: HashMap<TextureId, u64>,
    memory_budget: Option<u64>,
    used_bytes: u64,
    stats: DeviceStats,
    frame_draws: Vec<DrawCall>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            memory_budget: None,
            used_bytes: 0,
            stats: DeviceStats::default(),
            frame_draws: Vec::new(),
        }
    }

    /// Allocations fail with [`GpuError::OutOfMemory`] once `bytes` are in use.
    pub fn with_memory_budget(bytes: u64) -> Self {
        Self {
            memory_budget: Some(bytes),
            ..Self::new()
        }
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_buffers_of(&self, usage: BufferUsage) -> usize {
        self.buffers
            .values()
            .filter(|info| info.usage == usage)
            .count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Draw calls issued since the last [`HeadlessDevice::begin_frame`].
    pub fn frame_draws(&self) -> &[DrawCall] {
        &self.frame_draws
    }

    pub fn begin_frame(&mut self) {
        self.frame_draws.clear();
    }

    fn allocate(&mut self, requested: u64) -> Result<u64, GpuError> {
        if let Some(budget) = self.memory_budget {
            let available = budget.saturating_sub(self.used_bytes);
            if requested > available {
                return Err(GpuError::OutOfMemory { requested, available });
            }
        }

        self.used_bytes += requested;
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, label: &str, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, GpuError> {
        let size = contents.len() as u64;
        let id = BufferId(self.allocate(size)?);
        trace!("Created {:?} buffer {} ({} bytes) as {:?}", usage, label, size, id);

        self.buffers.insert(id, BufferInfo { usage, size });
        self.stats.buffers_created += 1;
        self.stats.bytes_uploaded += size;
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let info = self
            .buffers
            .get(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;

        let len = data.len() as u64;
        if offset + len > info.size {
            return Err(GpuError::OutOfBounds {
                offset,
                len,
                size: info.size,
            });
        }

        self.stats.bytes_uploaded += len;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(info) = self.buffers.remove(&buffer) {
            self.used_bytes -= info.size;
            self.stats.buffers_destroyed += 1;
        }
    }

    fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        let size = width as u64 * height as u64 * format.bytes_per_pixel() as u64;
        let id = TextureId(self.allocate(size)?);
        trace!("Created texture {} ({}x{}, {:?}) as {:?}", label, width, height, format, id);

        self.textures.insert(id, size);
        self.stats.textures_created += 1;
        self.stats.bytes_uploaded += data.len() as u64;
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(size) = self.textures.remove(&texture) {
            self.used_bytes -= size;
            self.stats.textures_destroyed += 1;
        }
    }

    fn draw(&mut self, call: &DrawCall) {
        self.stats.draw_calls += 1;
        self.stats.instances_drawn += call.instance_count as u64;
        self.frame_draws.push(*call);
    }
}
