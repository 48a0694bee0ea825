use std::collections::{HashMap, HashSet};

use glam::{Affine3A, Vec3};
use itertools::Itertools;
use log::{debug, trace, warn};

use cellstream_files::ids::landblock_of;

use crate::game::placement::StaticPlacement;
use crate::game::portal_visibility::{PortalVisibility, VisibilityConfig, VisibilityResult};
use crate::game::streaming::Population;
use crate::game::streaming::worker::PreparedBatch;
use crate::rendering::common::bounds::{Aabb, Frustum, Ray};
use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::common::types::{CellClass, CellPortal, GeometrySignature, PreparedCell};
use crate::rendering::gpu::device::GpuDevice;
use crate::rendering::gpu::resource_cache::{GpuHandle, GpuResourceCache};

/// A cell that is resident on the GPU, placed into the world.
#[derive(Debug, Clone)]
pub struct LoadedCellInstance {
    pub cell_id: u32,
    pub landblock: SpatialCellKey,
    pub population: Population,
    pub class: CellClass,
    pub signature: GeometrySignature,
    pub gpu: GpuHandle,
    pub world_transform: Affine3A,
    pub inverse_transform: Affine3A,
    /// World space position of the cell origin.
    pub position: Vec3,
    pub local_bounds: Aabb,
    pub portals: Vec<CellPortal>,
}

impl LoadedCellInstance {
    pub fn new(cell: PreparedCell, population: Population, gpu: GpuHandle) -> Self {
        Self {
            cell_id: cell.cell_id,
            landblock: SpatialCellKey(landblock_of(cell.cell_id)),
            population,
            class: cell.class,
            signature: cell.signature,
            gpu,
            inverse_transform: cell.world_transform.inverse(),
            position: cell.world_transform.translation.into(),
            world_transform: cell.world_transform,
            local_bounds: cell.local_bounds,
            portals: cell.portals,
        }
    }

    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds.transformed(&self.world_transform)
    }

    pub fn contains_point(&self, world_position: Vec3, epsilon: f32) -> bool {
        self.local_bounds
            .contains_point_eps(self.inverse_transform.transform_point3(world_position), epsilon)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub added: usize,
    /// Cells that had been finalized before.
    pub existing: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub cell_id: u32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellManagerStats {
    pub loaded_cells: usize,
    pub loaded_statics: usize,
    pub gpu_entries: usize,
    pub uploads: u64,
    pub frees: u64,
    pub finalized_cells: u64,
    pub released_cells: u64,
    pub failed_cells: u64,
}

/// The render thread side of the cell streaming: owns the GPU resource cache, the table of loaded
/// instances and the portal visibility state. Nothing in here is shared with other threads.
pub struct CellManager {
    gpu_cache: GpuResourceCache,
    instances: HashMap<u32, LoadedCellInstance>,
    statics: HashMap<(SpatialCellKey, Population), Vec<StaticPlacement>>,
    focus: Option<SpatialCellKey>,
    visibility: PortalVisibility,
    finalized_cells: u64,
    released_cells: u64,
    failed_cells: u64,
}

impl Default for CellManager {
    fn default() -> Self {
        Self::new(VisibilityConfig::default())
    }
}

impl CellManager {
    pub fn new(visibility: VisibilityConfig) -> Self {
        Self {
            gpu_cache: GpuResourceCache::new(),
            instances: HashMap::new(),
            statics: HashMap::new(),
            focus: None,
            visibility: PortalVisibility::new(visibility),
            finalized_cells: 0,
            released_cells: 0,
            failed_cells: 0,
        }
    }

    /// Uploads the geometry of a prepared batch and instantiates its cells. Cells that are loaded
    /// already are skipped and geometry is only uploaded for unknown signatures, so finalizing the
    /// same batch twice changes nothing.
    pub fn finalize<D: GpuDevice>(&mut self, device: &mut D, batch: PreparedBatch) -> FinalizeReport {
        profiling::scope!("CellManager::finalize");
        let PreparedBatch {
            key,
            population,
            geometries,
            cells,
            statics,
            ..
        } = batch;

        let mut report = FinalizeReport::default();
        for cell in cells {
            if self.instances.contains_key(&cell.cell_id) {
                report.existing += 1;
                continue;
            }

            let handle = match self.gpu_cache.handle_of(&cell.signature) {
                Some(handle) => handle,
                None => {
                    let Some(geometry) = geometries.get(&cell.signature) else {
                        warn!("Batch {} has no geometry for cell {:08X}", key, cell.cell_id);
                        report.failed += 1;
                        continue;
                    };

                    match self.gpu_cache.get_or_create(device, geometry) {
                        Ok(handle) => handle,
                        Err(err) => {
                            warn!("Skipping cell {:08X}: {}", cell.cell_id, err);
                            report.failed += 1;
                            continue;
                        }
                    }
                }
            };

            trace!("Finalized cell {:08X} ({})", cell.cell_id, cell.signature);
            self.instances
                .insert(cell.cell_id, LoadedCellInstance::new(cell, population, handle));
            report.added += 1;
        }

        self.statics.insert((key, population), statics);

        self.finalized_cells += report.added as u64;
        self.failed_cells += report.failed as u64;
        debug!(
            "Finalized {} {}: {} added, {} existing, {} failed",
            key, population, report.added, report.existing, report.failed
        );
        report
    }

    /// Removes every instance of the landblock's population and frees the geometry that no
    /// remaining instance refers to. Returns the number of removed instances.
    pub fn release<D: GpuDevice>(&mut self, device: &mut D, key: SpatialCellKey, population: Population) -> usize {
        profiling::scope!("CellManager::release");
        let before = self.instances.len();
        self.instances
            .retain(|_, instance| instance.landblock != key || instance.population != population);
        self.statics.remove(&(key, population));
        let released = before - self.instances.len();

        // Mark and sweep: a signature stays as long as any survivor still uses it, no matter how many
        // instances of the released landblock shared it.
        let referenced = self
            .instances
            .values()
            .map(|instance| &instance.signature)
            .collect::<HashSet<_>>();
        let freed = self.gpu_cache.sweep(device, &referenced);

        self.released_cells += released as u64;
        debug!("Released {} {}: {} cells, {} GPU entries freed", key, population, released, freed);
        released
    }

    /// Restricts rendering, counts and picking to a single landblock.
    pub fn set_focus(&mut self, focus: Option<SpatialCellKey>) {
        self.focus = focus;
    }

    pub fn focus(&self) -> Option<SpatialCellKey> {
        self.focus
    }

    fn in_focus(&self, landblock: SpatialCellKey) -> bool {
        self.focus.is_none_or(|focus| focus == landblock)
    }

    /// Loaded instances, honoring the focus.
    pub fn instances(&self) -> impl Iterator<Item = &LoadedCellInstance> {
        self.instances
            .values()
            .filter(|instance| self.in_focus(instance.landblock))
    }

    pub fn instance(&self, cell_id: u32) -> Option<&LoadedCellInstance> {
        self.instances.get(&cell_id)
    }

    /// Loaded static placements, honoring the focus.
    pub fn statics(&self) -> impl Iterator<Item = &StaticPlacement> {
        self.statics
            .iter()
            .filter(|((landblock, _), _)| self.in_focus(*landblock))
            .flat_map(|(_, placements)| placements.iter())
    }

    pub fn loaded_cell_count(&self) -> usize {
        self.instances().count()
    }

    pub fn loaded_static_count(&self) -> usize {
        self.statics().count()
    }

    pub fn cell_count_in(&self, landblock: SpatialCellKey) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.landblock == landblock)
            .count()
    }

    /// Landblocks with at least one loaded instance, sorted.
    pub fn loaded_landblocks(&self) -> Vec<SpatialCellKey> {
        self.instances
            .values()
            .map(|instance| instance.landblock)
            .unique()
            .sorted()
            .collect()
    }

    pub fn gpu_cache(&self) -> &GpuResourceCache {
        &self.gpu_cache
    }

    /// The closest loaded cell whose world bounds are hit by the ray.
    pub fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        profiling::scope!("CellManager::raycast");
        self.instances()
            .filter_map(|instance| {
                ray.intersects_aabb(&instance.world_bounds())
                    .map(|distance| RayHit {
                        cell_id: instance.cell_id,
                        distance,
                    })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    pub fn compute_visibility(&mut self, camera_position: Vec3, frustum: &Frustum) -> Option<VisibilityResult> {
        self.visibility
            .compute(&self.instances, camera_position, frustum)
    }

    pub fn stats(&self) -> CellManagerStats {
        CellManagerStats {
            loaded_cells: self.instances.len(),
            loaded_statics: self.statics.values().map(Vec::len).sum(),
            gpu_entries: self.gpu_cache.len(),
            uploads: self.gpu_cache.uploads(),
            frees: self.gpu_cache.frees(),
            finalized_cells: self.finalized_cells,
            released_cells: self.released_cells,
            failed_cells: self.failed_cells,
        }
    }

    /// Drops everything. Has to be called before the device goes away.
    pub fn teardown<D: GpuDevice>(&mut self, device: &mut D) {
        self.instances.clear();
        self.statics.clear();
        self.visibility.reset();
        let freed = self.gpu_cache.clear(device);
        debug!("Teardown freed {} GPU entries", freed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::placement::PlacementCategory;
    use crate::rendering::common::types::{CellVertex, PreparedCellGeometry, SurfaceBatch};
    use crate::rendering::gpu::headless::HeadlessDevice;
    use glam::Vec4;

    fn signature(environment_id: u32) -> GeometrySignature {
        GeometrySignature {
            environment_id,
            structure_index: 0,
            surfaces: vec![0x0800_0001],
        }
    }

    fn geometry(environment_id: u32) -> PreparedCellGeometry {
        PreparedCellGeometry {
            signature: signature(environment_id),
            vertices: vec![CellVertex::default(); 4],
            batches: vec![SurfaceBatch {
                surface_id: 0x0800_0001,
                texture_id: None,
                color: Vec4::ONE,
                translucent: false,
                indices: vec![0, 1, 2, 0, 2, 3],
            }],
            textures: vec![],
            local_bounds: Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0)),
        }
    }

    fn cell(cell_id: u32, environment_id: u32, offset: f32) -> PreparedCell {
        PreparedCell {
            cell_id,
            signature: signature(environment_id),
            class: CellClass::DungeonOnly,
            world_transform: Affine3A::from_translation(
                SpatialCellKey(landblock_of(cell_id)).origin() + Vec3::new(50.0 + offset, 50.0, 0.0),
            ),
            local_bounds: Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0)),
            portals: vec![],
        }
    }

    /// Every cell of the landblock shares the environment `1`.
    fn batch(landblock: u16, cells: u16) -> PreparedBatch {
        PreparedBatch {
            key: SpatialCellKey(landblock),
            population: Population::Dungeons,
            geometries: HashMap::from([(signature(1), geometry(1))]),
            cells: (0..cells)
                .map(|i| cell(((landblock as u32) << 16) | (0x100 + i as u32), 1, i as f32 * 10.0))
                .collect(),
            statics: vec![StaticPlacement {
                model_id: 7,
                owner_cell: ((landblock as u32) << 16) | 0x100,
                category: PlacementCategory::Underground,
                transform: Affine3A::IDENTITY,
            }],
            skipped_cells: 0,
        }
    }

    #[test]
    fn shared_geometry_is_uploaded_once() {
        let mut device = HeadlessDevice::new();
        let mut manager = CellManager::default();

        let report = manager.finalize(&mut device, batch(0x0101, 10));
        assert_eq!(report.added, 10);
        assert_eq!(manager.gpu_cache().uploads(), 1);

        let handles = manager.instances().map(|i| i.gpu).unique().count();
        assert_eq!(handles, 1);
    }

    #[test]
    fn finalizing_twice_is_a_no_op() {
        let mut device = HeadlessDevice::new();
        let mut manager = CellManager::default();

        manager.finalize(&mut device, batch(0x0101, 3));
        let stats = manager.stats();
        let report = manager.finalize(&mut device, batch(0x0101, 3));

        assert_eq!(report, FinalizeReport {
            added: 0,
            existing: 3,
            failed: 0
        });
        assert_eq!(manager.stats(), stats);
        assert_eq!(device.stats().buffers_created, 2);
    }

    #[test]
    fn release_keeps_geometry_of_survivors() {
        let mut device = HeadlessDevice::new();
        let mut manager = CellManager::default();
        manager.finalize(&mut device, batch(0x0101, 2));
        manager.finalize(&mut device, batch(0x0102, 2));

        assert_eq!(manager.release(&mut device, SpatialCellKey(0x0101), Population::Dungeons), 2);
        assert_eq!(manager.gpu_cache().len(), 1);
        assert!(manager.instances().all(|i| manager.gpu_cache().get(i.gpu).is_some()));

        // wrong population, nothing happens
        assert_eq!(manager.release(&mut device, SpatialCellKey(0x0102), Population::Objects), 0);
        assert_eq!(manager.loaded_cell_count(), 2);

        manager.release(&mut device, SpatialCellKey(0x0102), Population::Dungeons);
        assert!(manager.gpu_cache().is_empty());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(manager.loaded_static_count(), 0);
    }

    #[test]
    fn gpu_failures_skip_the_cell() {
        let mut device = HeadlessDevice::with_memory_budget(0);
        let mut manager = CellManager::default();

        let report = manager.finalize(&mut device, batch(0x0101, 2));
        assert_eq!(report.failed, 2);
        assert_eq!(manager.loaded_cell_count(), 0);
        assert_eq!(manager.stats().failed_cells, 2);
    }

    #[test]
    fn focus_restricts_queries() {
        let mut device = HeadlessDevice::new();
        let mut manager = CellManager::default();
        manager.finalize(&mut device, batch(0x0101, 2));
        manager.finalize(&mut device, batch(0x0102, 3));
        assert_eq!(manager.loaded_cell_count(), 5);
        assert_eq!(manager.loaded_landblocks(), vec![SpatialCellKey(0x0101), SpatialCellKey(0x0102)]);

        manager.set_focus(Some(SpatialCellKey(0x0102)));
        assert_eq!(manager.loaded_cell_count(), 3);
        assert_eq!(manager.loaded_static_count(), 1);

        // a ray through landblock 0x0101 hits nothing while the focus is elsewhere
        let origin = SpatialCellKey(0x0101).origin() + Vec3::new(0.0, 50.0, 0.0);
        let ray = Ray::new(origin, Vec3::X);
        assert!(manager.raycast(&ray).is_none());

        manager.set_focus(None);
        let hit = manager.raycast(&ray).unwrap();
        assert_eq!(hit.cell_id, 0x0101_0100);
        assert_eq!(hit.distance, 45.0);

        manager.teardown(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}
