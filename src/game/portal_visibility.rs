use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec3;
use log::trace;

use crate::game::cell_manager::LoadedCellInstance;
use crate::rendering::common::bounds::{Aabb, Frustum};
use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::common::types::PortalTarget;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityConfig {
    /// Frames in which the last known camera cell is kept although no cell contains the camera.
    pub grace_frames: u32,
    pub containment_epsilon: f32,
    /// Half extent of the box around a neighbor cell position that is tested against the frustum.
    pub cell_bounds_radius: f32,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            grace_frames: 3,
            containment_epsilon: 0.1,
            cell_bounds_radius: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityResult {
    pub camera_cell: u32,
    pub camera_landblock: SpatialCellKey,
    /// Contains the camera cell and every cell reached through the portals.
    pub visible_cells: HashSet<u32>,
    /// An exit to the outdoors has been seen, so the terrain needs rendering as well.
    pub exit_portal_visible: bool,
}

impl VisibilityResult {
    pub fn is_visible(&self, cell_id: u32) -> bool {
        self.visible_cells.contains(&cell_id)
    }
}

/// Determines the cells that can be seen from the camera, by walking the portal graph from the cell
/// that contains the camera. Keeps the last camera cell between frames.
#[derive(Debug, Default)]
pub struct PortalVisibility {
    config: VisibilityConfig,
    last_cell: Option<u32>,
    frames_outside: u32,
}

impl PortalVisibility {
    pub fn new(config: VisibilityConfig) -> Self {
        Self {
            config,
            last_cell: None,
            frames_outside: 0,
        }
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// [`None`] means that the camera is outdoors (or in a cell that is not loaded) and the caller
    /// has to fall back to frustum culling.
    pub fn compute(
        &mut self,
        cells: &HashMap<u32, LoadedCellInstance>,
        camera_position: Vec3,
        frustum: &Frustum,
    ) -> Option<VisibilityResult> {
        profiling::scope!("PortalVisibility::compute");
        let camera_cell = self.find_camera_cell(cells, camera_position)?;
        let camera_landblock = cells.get(&camera_cell)?.landblock;

        let mut visible_cells = HashSet::from([camera_cell]);
        let mut exit_portal_visible = false;
        let mut queue = VecDeque::from([camera_cell]);

        while let Some(current_id) = queue.pop_front() {
            let Some(current) = cells.get(&current_id) else {
                continue;
            };

            let local_camera = current.inverse_transform.transform_point3(camera_position);

            for portal in &current.portals {
                if !portal
                    .clip_plane
                    .is_none_or(|clip| clip.is_inside(local_camera))
                {
                    continue;
                }

                let neighbor_id = match portal.target {
                    PortalTarget::Outdoors => {
                        exit_portal_visible = true;
                        continue;
                    }
                    PortalTarget::Cell(id) => id,
                };

                if visible_cells.contains(&neighbor_id) {
                    continue;
                }

                let Some(neighbor) = cells.get(&neighbor_id) else {
                    trace!("Portal of {:08X} leads to {:08X}, which is not loaded", current_id, neighbor_id);
                    continue;
                };

                let bounds = Aabb::from_center_radius(neighbor.position, self.config.cell_bounds_radius);
                if !frustum.intersects_aabb(&bounds) {
                    continue;
                }

                visible_cells.insert(neighbor_id);
                queue.push_back(neighbor_id);
            }
        }

        Some(VisibilityResult {
            camera_cell,
            camera_landblock,
            visible_cells,
            exit_portal_visible,
        })
    }

    /// The loaded cell whose bounds contain `position`. Tries the previous cell and its neighbors
    /// before testing every cell.
    pub fn find_camera_cell(&mut self, cells: &HashMap<u32, LoadedCellInstance>, position: Vec3) -> Option<u32> {
        let epsilon = self.config.containment_epsilon;
        let last = self.last_cell.and_then(|id| cells.get(&id));

        let found = last
            .filter(|cell| cell.contains_point(position, epsilon))
            .map(|cell| cell.cell_id)
            .or_else(|| {
                last.into_iter()
                    .flat_map(|cell| cell.portals.iter())
                    .filter_map(|portal| match portal.target {
                        PortalTarget::Cell(id) => cells.get(&id),
                        PortalTarget::Outdoors => None,
                    })
                    .find(|cell| cell.contains_point(position, epsilon))
                    .map(|cell| cell.cell_id)
            })
            .or_else(|| {
                // overlapping bounds are possible, the lowest ID keeps this deterministic
                cells
                    .values()
                    .filter(|cell| cell.contains_point(position, epsilon))
                    .map(|cell| cell.cell_id)
                    .min()
            });

        if let Some(cell) = found {
            if self.last_cell != Some(cell) {
                trace!("Camera entered cell {:08X}", cell);
            }
            self.last_cell = Some(cell);
            self.frames_outside = 0;
            return Some(cell);
        }

        // the last cell has been unloaded, there is nothing to be graceful about
        let last = last.map(|cell| cell.cell_id)?;
        self.frames_outside += 1;
        if self.frames_outside <= self.config.grace_frames {
            return Some(last);
        }

        trace!("Camera left cell {:08X}", last);
        self.reset();
        None
    }

    pub fn reset(&mut self) {
        self.last_cell = None;
        self.frames_outside = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::streaming::Population;
    use crate::rendering::common::bounds::Plane;
    use crate::rendering::common::camera::Camera;
    use crate::rendering::common::types::{CellClass, CellPortal, ClipPlane, GeometrySignature, PreparedCell};
    use crate::rendering::gpu::resource_cache::GpuHandle;
    use glam::Affine3A;

    const A: u32 = 0x0000_0100;
    const B: u32 = 0x0000_0101;

    fn portal(target: PortalTarget, normal: Vec3, distance: f32, inside_positive: bool) -> CellPortal {
        CellPortal {
            target,
            polygon_id: 0,
            clip_plane: Some(ClipPlane {
                plane: Plane::new(normal, distance),
                inside_positive,
            }),
        }
    }

    fn cell(cell_id: u32, position: Vec3, portals: Vec<CellPortal>) -> LoadedCellInstance {
        LoadedCellInstance::new(
            PreparedCell {
                cell_id,
                signature: GeometrySignature {
                    environment_id: 1,
                    structure_index: 0,
                    surfaces: vec![],
                },
                class: CellClass::DungeonOnly,
                world_transform: Affine3A::from_translation(position),
                local_bounds: Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0)),
                portals,
            },
            Population::Dungeons,
            GpuHandle::INVALID,
        )
    }

    /// A at (100, 100, 0) with a doorway at its local +X wall into B, which sits 10 units further.
    fn two_rooms(inside_positive: bool) -> HashMap<u32, LoadedCellInstance> {
        let doorway = portal(PortalTarget::Cell(B), Vec3::NEG_X, 5.0, inside_positive);
        [
            cell(A, Vec3::new(100.0, 100.0, 0.0), vec![doorway]),
            cell(B, Vec3::new(110.0, 100.0, 0.0), vec![]),
        ]
        .into_iter()
        .map(|cell| (cell.cell_id, cell))
        .collect()
    }

    fn visibility() -> PortalVisibility {
        PortalVisibility::new(VisibilityConfig {
            cell_bounds_radius: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn sees_through_the_doorway_into_the_frustum() {
        let cells = two_rooms(true);
        let position = Vec3::new(100.0, 100.0, 0.0);
        let mut visibility = visibility();

        let towards_b = Camera::looking_at(position, Vec3::new(200.0, 100.0, 0.0)).frustum();
        let result = visibility.compute(&cells, position, &towards_b).unwrap();
        assert_eq!(result.camera_cell, A);
        assert_eq!(result.visible_cells, HashSet::from([A, B]));
        assert!(!result.exit_portal_visible);

        let away_from_b = Camera::looking_at(position, Vec3::new(0.0, 100.0, 0.0)).frustum();
        let result = visibility.compute(&cells, position, &away_from_b).unwrap();
        assert_eq!(result.visible_cells, HashSet::from([A]));
    }

    #[test]
    fn wrong_side_of_the_portal_hides_the_neighbor() {
        let cells = two_rooms(false);
        let position = Vec3::new(100.0, 100.0, 0.0);
        let frustum = Camera::looking_at(position, Vec3::new(200.0, 100.0, 0.0)).frustum();

        let result = visibility().compute(&cells, position, &frustum).unwrap();
        assert_eq!(result.visible_cells, HashSet::from([A]));
    }

    #[test]
    fn exit_portals_raise_the_flag() {
        let exit = CellPortal {
            target: PortalTarget::Outdoors,
            polygon_id: 3,
            clip_plane: None,
        };
        let cells = HashMap::from([(A, cell(A, Vec3::new(100.0, 100.0, 0.0), vec![exit]))]);
        let position = Vec3::new(100.0, 100.0, 0.0);
        let frustum = Camera::looking_at(position, Vec3::new(200.0, 100.0, 0.0)).frustum();

        let result = visibility().compute(&cells, position, &frustum).unwrap();
        assert!(result.exit_portal_visible);
        assert_eq!(result.visible_cells, HashSet::from([A]));
    }

    #[test]
    fn dangling_portals_end_the_traversal() {
        let mut cells = two_rooms(true);
        cells.remove(&B);
        let position = Vec3::new(100.0, 100.0, 0.0);
        let frustum = Camera::looking_at(position, Vec3::new(200.0, 100.0, 0.0)).frustum();

        let result = visibility().compute(&cells, position, &frustum).unwrap();
        assert_eq!(result.visible_cells, HashSet::from([A]));
    }

    #[test]
    fn keeps_the_last_cell_for_the_grace_frames() {
        let cells = two_rooms(true);
        let mut visibility = visibility();
        assert_eq!(visibility.find_camera_cell(&cells, Vec3::new(100.0, 100.0, 0.0)), Some(A));

        // walking through the doorway finds the neighbor
        assert_eq!(visibility.find_camera_cell(&cells, Vec3::new(110.0, 100.0, 0.0)), Some(B));

        let far_away = Vec3::new(1110.0, 100.0, 0.0);
        for _ in 0..3 {
            assert_eq!(visibility.find_camera_cell(&cells, far_away), Some(B));
        }
        assert_eq!(visibility.find_camera_cell(&cells, far_away), None);
        assert_eq!(visibility.find_camera_cell(&cells, far_away), None);
    }

    #[test]
    fn no_grace_without_a_previous_cell() {
        let cells = two_rooms(true);
        let frustum = Camera::default().frustum();
        assert!(
            visibility()
                .compute(&cells, Vec3::new(1100.0, 1100.0, 0.0), &frustum)
                .is_none()
        );
    }
}
