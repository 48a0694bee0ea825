//! Everything that owns GPU memory. None of these types may leave the render thread.
pub mod device;
pub mod headless;
pub mod instance_buffer;
pub mod resource_cache;
