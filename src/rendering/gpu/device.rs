use thiserror::Error;

use cellstream_files::surface::types::TextureFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Instance,
}

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Out of GPU memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Buffer {0:?} does not exist")]
    UnknownBuffer(BufferId),

    #[error("Write of {len} bytes at offset {offset} exceeds the buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Stale handle into the GPU resource cache")]
    StaleHandle,
}

/// One instanced, indexed draw call. Instances `first_instance..first_instance + instance_count`
/// of `instance_buffer` are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub texture: Option<TextureId>,
    pub instance_buffer: BufferId,
    pub first_instance: u32,
    pub instance_count: u32,
    pub translucent: bool,
}

/// The primitives of the graphics API that the streaming needs. Implementations are bound to the
/// render thread: nothing in here is required to be [`Send`], and the types holding a device only
/// ever borrow it from the render loop.
pub trait GpuDevice {
    fn create_buffer(&mut self, label: &str, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, GpuError>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: &[u8],
    ) -> Result<TextureId, GpuError>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn draw(&mut self, call: &DrawCall);
}
