use std::collections::HashMap;

use glam::Vec3;
use log::{trace, warn};

use cellstream_files::ids::landblock_of;

use crate::game::cell_manager::{CellManager, LoadedCellInstance};
use crate::game::portal_visibility::VisibilityResult;
use crate::rendering::common::bounds::Frustum;
use crate::rendering::common::camera::Camera;
use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::gpu::device::{DrawCall, GpuDevice, GpuError};
use crate::rendering::gpu::instance_buffer::InstanceScratch;
use crate::rendering::gpu::resource_cache::GpuHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub draw_calls: usize,
    pub instances: usize,
    pub visible_cells: usize,
    pub visible_statics: usize,
    /// Loaded cells that have been rejected by the portals or the frustum.
    pub culled: usize,
}

struct TranslucentDraw {
    distance: f32,
    handle: GpuHandle,
    batch: usize,
    instance: u32,
}

/// Turns the loaded cells into draw calls. Opaque batches are drawn instanced, one call per
/// geometry and batch, translucent batches follow per instance from back to front.
#[derive(Default)]
pub struct CellRenderer {
    scratch: InstanceScratch,
}

/// Portal filtering only applies inside of the camera's landblock, all other cells are frustum culled.
fn is_cell_visible(instance: &LoadedCellInstance, frustum: &Frustum, visibility: Option<&VisibilityResult>) -> bool {
    match visibility {
        Some(visibility) if visibility.camera_landblock == instance.landblock => {
            visibility.is_visible(instance.cell_id)
        }
        _ => frustum.intersects_aabb(&instance.world_bounds()),
    }
}

fn is_static_visible(owner_cell: u32, position: Vec3, frustum: &Frustum, visibility: Option<&VisibilityResult>) -> bool {
    match visibility {
        Some(visibility) if visibility.camera_landblock == SpatialCellKey(landblock_of(owner_cell)) => {
            visibility.is_visible(owner_cell)
        }
        _ => frustum.contains_point(position),
    }
}

impl CellRenderer {
    pub fn new() -> Self {
        Self {
            scratch: InstanceScratch::new(),
        }
    }

    pub fn render<D: GpuDevice>(
        &mut self,
        device: &mut D,
        cells: &CellManager,
        camera: &Camera,
        visibility: Option<&VisibilityResult>,
    ) -> Result<FrameReport, GpuError> {
        profiling::scope!("CellRenderer::render");
        let frustum = camera.frustum();
        let mut report = FrameReport::default();

        let mut by_geometry: HashMap<GpuHandle, Vec<&LoadedCellInstance>> = HashMap::new();
        for instance in cells.instances() {
            if is_cell_visible(instance, &frustum, visibility) {
                by_geometry
                    .entry(instance.gpu)
                    .or_default()
                    .push(instance);
                report.visible_cells += 1;
            } else {
                report.culled += 1;
            }
        }

        report.visible_statics = cells
            .statics()
            .filter(|placement| is_static_visible(placement.owner_cell, placement.position(), &frustum, visibility))
            .count();

        self.scratch.clear();
        let mut opaque = Vec::new();
        let mut translucent = Vec::new();

        for (handle, instances) in by_geometry.iter_mut() {
            instances.sort_by_key(|instance| instance.cell_id);
            let Some(entry) = cells.gpu_cache().get(*handle) else {
                warn!("Visible cells reference a freed GPU entry, skipping {} instances", instances.len());
                continue;
            };

            let first_instance = self.scratch.len() as u32;
            for instance in instances.iter() {
                let index = self.scratch.push(&instance.world_transform);
                for (batch_index, batch) in entry.batches.iter().enumerate() {
                    if batch.translucent {
                        translucent.push(TranslucentDraw {
                            distance: instance.position.distance_squared(camera.position),
                            handle: *handle,
                            batch: batch_index,
                            instance: index,
                        });
                    }
                }
            }

            opaque.push((*handle, first_instance, instances.len() as u32));
        }

        if self.scratch.is_empty() {
            return Ok(report);
        }

        let instance_buffer = self.scratch.upload(device)?;
        report.instances = self.scratch.len();

        for (handle, first_instance, instance_count) in opaque {
            let Some(entry) = cells.gpu_cache().get(handle) else {
                continue;
            };

            for batch in entry.batches.iter().filter(|batch| !batch.translucent) {
                device.draw(&DrawCall {
                    vertex_buffer: entry.vertex_buffer,
                    index_buffer: batch.index_buffer,
                    index_count: batch.index_count,
                    texture: batch.texture,
                    instance_buffer,
                    first_instance,
                    instance_count,
                    translucent: false,
                });
                report.draw_calls += 1;
            }
        }

        translucent.sort_by(|a, b| b.distance.total_cmp(&a.distance));
        for draw in translucent {
            let Some(entry) = cells.gpu_cache().get(draw.handle) else {
                continue;
            };

            let batch = &entry.batches[draw.batch];
            device.draw(&DrawCall {
                vertex_buffer: entry.vertex_buffer,
                index_buffer: batch.index_buffer,
                index_count: batch.index_count,
                texture: batch.texture,
                instance_buffer,
                first_instance: draw.instance,
                instance_count: 1,
                translucent: true,
            });
            report.draw_calls += 1;
        }

        trace!(
            "Rendered {} cells in {} draw calls, {} culled",
            report.visible_cells, report.draw_calls, report.culled
        );
        Ok(report)
    }

    /// Frees the instance buffer. Has to be called before the device goes away.
    pub fn destroy<D: GpuDevice>(&mut self, device: &mut D) {
        self.scratch.destroy(device);
    }
}
