use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use glam::Vec4;
use log::{debug, trace};

use crate::rendering::common::bounds::Aabb;
use crate::rendering::common::types::{GeometrySignature, PreparedCellGeometry};
use crate::rendering::gpu::device::{BufferId, BufferUsage, GpuDevice, GpuError, TextureId};

/// Generational index into the [`GpuResourceCache`]. A handle of a freed entry never resolves
/// again, even when its slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandle {
    index: u32,
    generation: u32,
}

impl GpuHandle {
    /// A handle that never resolves to an entry.
    pub const INVALID: GpuHandle = GpuHandle {
        index: u32::MAX,
        generation: u32::MAX,
    };
}

#[derive(Debug, Clone)]
pub struct GpuBatch {
    pub surface_id: u32,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub texture: Option<TextureId>,
    pub color: Vec4,
    pub translucent: bool,
}

/// GPU-resident geometry of one signature. Never mutated after the upload.
#[derive(Debug)]
pub struct GpuCacheEntry {
    pub signature: GeometrySignature,
    pub vertex_buffer: BufferId,
    pub vertex_count: u32,
    pub batches: Vec<GpuBatch>,
    pub textures: Vec<TextureId>,
    pub local_bounds: Aabb,
}

impl GpuCacheEntry {
    fn destroy<D: GpuDevice>(self, device: &mut D) {
        device.destroy_buffer(self.vertex_buffer);
        for batch in self.batches {
            device.destroy_buffer(batch.index_buffer);
        }
        for texture in self.textures {
            device.destroy_texture(texture);
        }
    }
}

struct Slot {
    generation: u32,
    entry: Option<GpuCacheEntry>,
}

/// Owns all GPU geometry, keyed by [`GeometrySignature`]. Lives on the render thread: it is neither
/// [`Send`] nor [`Sync`], so it can only be used where it has been created.
pub struct GpuResourceCache {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    by_signature: HashMap<GeometrySignature, GpuHandle>,
    uploads: u64,
    frees: u64,
    _render_thread: PhantomData<*const ()>,
}

impl Default for GpuResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuResourceCache {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            by_signature: HashMap::new(),
            uploads: 0,
            frees: 0,
            _render_thread: PhantomData,
        }
    }

    /// Returns the entry of the geometry's signature, uploading the geometry only if the signature
    /// is not present yet.
    pub fn get_or_create<D: GpuDevice>(
        &mut self,
        device: &mut D,
        geometry: &PreparedCellGeometry,
    ) -> Result<GpuHandle, GpuError> {
        if let Some(handle) = self.by_signature.get(&geometry.signature) {
            return Ok(*handle);
        }

        let entry = Self::upload(device, geometry)?;
        self.uploads += 1;

        let handle = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                GpuHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                GpuHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        trace!("Uploaded {} as {:?}", geometry.signature, handle);
        self.by_signature
            .insert(geometry.signature.clone(), handle);
        Ok(handle)
    }

    fn upload<D: GpuDevice>(device: &mut D, geometry: &PreparedCellGeometry) -> Result<GpuCacheEntry, GpuError> {
        profiling::scope!("GpuResourceCache::upload");
        let label = geometry.signature.to_string();

        let vertex_buffer = device.create_buffer(
            &label,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&geometry.vertices),
        )?;

        // From here on, everything that has been created needs to be released again on failure.
        let mut entry = GpuCacheEntry {
            signature: geometry.signature.clone(),
            vertex_buffer,
            vertex_count: geometry.vertices.len() as u32,
            batches: Vec::with_capacity(geometry.batches.len()),
            textures: Vec::with_capacity(geometry.textures.len()),
            local_bounds: geometry.local_bounds,
        };

        let mut texture_ids = HashMap::new();
        for texture in &geometry.textures {
            match device.create_texture(
                &format!("{:08X}", texture.id),
                texture.width,
                texture.height,
                texture.format,
                &texture.data,
            ) {
                Ok(id) => {
                    texture_ids.insert(texture.id, id);
                    entry.textures.push(id);
                }
                Err(err) => {
                    entry.destroy(device);
                    return Err(err);
                }
            }
        }

        for batch in &geometry.batches {
            let index_buffer = match device.create_buffer(&label, BufferUsage::Index, bytemuck::cast_slice(&batch.indices)) {
                Ok(buffer) => buffer,
                Err(err) => {
                    entry.destroy(device);
                    return Err(err);
                }
            };

            entry.batches.push(GpuBatch {
                surface_id: batch.surface_id,
                index_buffer,
                index_count: batch.indices.len() as u32,
                texture: batch
                    .texture_id
                    .and_then(|id| texture_ids.get(&id).copied()),
                color: batch.color,
                translucent: batch.translucent,
            });
        }

        Ok(entry)
    }

    pub fn get(&self, handle: GpuHandle) -> Option<&GpuCacheEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn try_get(&self, handle: GpuHandle) -> Result<&GpuCacheEntry, GpuError> {
        self.get(handle).ok_or(GpuError::StaleHandle)
    }

    pub fn handle_of(&self, signature: &GeometrySignature) -> Option<GpuHandle> {
        self.by_signature.get(signature).copied()
    }

    pub fn contains(&self, signature: &GeometrySignature) -> bool {
        self.by_signature.contains_key(signature)
    }

    /// Frees every entry whose signature is not in `referenced`. The caller computes `referenced`
    /// from the instances that survive, so shared geometry stays alive as long as any instance uses it.
    pub fn sweep<D: GpuDevice>(&mut self, device: &mut D, referenced: &HashSet<&GeometrySignature>) -> usize {
        let stale = self
            .by_signature
            .iter()
            .filter(|(signature, _)| !referenced.contains(signature))
            .map(|(_, handle)| *handle)
            .collect::<Vec<_>>();

        for handle in &stale {
            self.free(device, *handle);
        }

        if !stale.is_empty() {
            debug!("Freed {} GPU cache entries, {} remaining", stale.len(), self.len());
        }
        stale.len()
    }

    fn free<D: GpuDevice>(&mut self, device: &mut D, handle: GpuHandle) {
        let Some(slot) = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
        else {
            return;
        };

        if let Some(entry) = slot.entry.take() {
            self.by_signature.remove(&entry.signature);
            entry.destroy(device);
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(handle.index);
            self.frees += 1;
        }
    }

    /// Frees everything, the cache is empty but usable afterward.
    pub fn clear<D: GpuDevice>(&mut self, device: &mut D) -> usize {
        self.sweep(device, &HashSet::new())
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }

    /// Total number of uploads over the lifetime of the cache.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn frees(&self) -> u64 {
        self.frees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::common::types::{CellVertex, SurfaceBatch};
    use crate::rendering::gpu::headless::HeadlessDevice;
    use glam::Vec3;

    fn geometry(environment: u32) -> PreparedCellGeometry {
        PreparedCellGeometry {
            signature: GeometrySignature {
                environment_id: environment,
                structure_index: 0,
                surfaces: vec![1],
            },
            vertices: vec![CellVertex::default(); 3],
            batches: vec![SurfaceBatch {
                surface_id: 1,
                texture_id: None,
                color: Vec4::ONE,
                translucent: false,
                indices: vec![0, 1, 2],
            }],
            textures: vec![],
            local_bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
        }
    }

    #[test]
    fn uploads_once_per_signature() {
        let mut device = HeadlessDevice::new();
        let mut cache = GpuResourceCache::new();

        let first = cache.get_or_create(&mut device, &geometry(1)).unwrap();
        for _ in 0..5 {
            assert_eq!(cache.get_or_create(&mut device, &geometry(1)).unwrap(), first);
        }

        assert_eq!(cache.uploads(), 1);
        assert_eq!(device.stats().buffers_created, 2);
        assert_eq!(cache.get(first).unwrap().batches[0].index_count, 3);
    }

    #[test]
    fn freed_handles_go_stale() {
        let mut device = HeadlessDevice::new();
        let mut cache = GpuResourceCache::new();

        let first = cache.get_or_create(&mut device, &geometry(1)).unwrap();
        let kept = cache.get_or_create(&mut device, &geometry(2)).unwrap();
        let sig_2 = geometry(2).signature;
        assert_eq!(cache.sweep(&mut device, &HashSet::from([&sig_2])), 1);

        assert!(cache.get(first).is_none());
        assert!(matches!(cache.try_get(first), Err(GpuError::StaleHandle)));
        assert!(cache.get(kept).is_some());

        // the slot is reused, but the old handle stays stale
        let reused = cache.get_or_create(&mut device, &geometry(3)).unwrap();
        assert_ne!(reused, first);
        assert!(cache.get(first).is_none());
        assert_eq!(cache.get(reused).unwrap().signature.environment_id, 3);

        assert_eq!(cache.clear(&mut device), 2);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(cache.frees(), 3);
    }

    #[test]
    fn failed_upload_releases_partial_allocations() {
        // enough for the vertex buffer (3 * 32 bytes), not for the index buffer
        let mut device = HeadlessDevice::with_memory_budget(100);
        let mut cache = GpuResourceCache::new();

        assert!(matches!(
            cache.get_or_create(&mut device, &geometry(1)),
            Err(GpuError::OutOfMemory { .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.used_bytes(), 0);
    }
}
