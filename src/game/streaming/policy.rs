use std::time::Duration;

use glam::Vec2;
use thiserror::Error;

use crate::rendering::common::camera::Camera;
use crate::rendering::common::coordinate_systems::{LANDBLOCK_GRID, LANDBLOCK_SIZE, SpatialCellKey, world_to_grid};

#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    #[error("The unload boundary ({unload}) has to be larger than the load boundary ({load})")]
    UnloadInsideLoad { load: f32, unload: f32 },

    #[error("The batch cap must not be zero")]
    ZeroBatchCap,
}

/// Which landblocks are wanted. The unload boundary is larger than the load boundary, landblocks
/// in between keep whatever state they have.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadRegion {
    /// World units, measured in 2D from the camera to the landblock center.
    Radius { load: f32, unload: f32 },
    /// Tiles around the landblocks covered by the camera viewport (top down cameras).
    Viewport { load_margin: u32, unload_margin: u32 },
}

impl LoadRegion {
    pub fn radius(load: f32, unload_factor: f32) -> Self {
        LoadRegion::Radius {
            load,
            unload: load * unload_factor,
        }
    }

    fn validate(&self) -> Result<(), PolicyError> {
        let (load, unload) = match *self {
            LoadRegion::Radius { load, unload } => (load, unload),
            LoadRegion::Viewport {
                load_margin,
                unload_margin,
            } => (load_margin as f32, unload_margin as f32),
        };

        if unload > load {
            Ok(())
        } else {
            Err(PolicyError::UnloadInsideLoad { load, unload })
        }
    }
}

/// Shrinks a radius when the camera is high above the ground: from up there, underground rooms
/// are barely visible and not worth streaming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeScaling {
    /// Up to this altitude, the radius is not scaled.
    pub reference_altitude: f32,
    pub min_factor: f32,
}

impl AltitudeScaling {
    pub fn factor(&self, altitude: f32) -> f32 {
        if altitude <= self.reference_altitude {
            1.0
        } else {
            (self.reference_altitude / altitude).max(self.min_factor)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingPolicy {
    pub region: LoadRegion,
    /// Maximum landblocks per background batch.
    pub batch_cap: usize,
    /// Consecutive updates a landblock has to be outside of the unload boundary before it is unloaded.
    pub unload_grace_frames: u32,
    pub altitude_scaling: Option<AltitudeScaling>,
}

impl Default for StreamingPolicy {
    fn default() -> Self {
        Self::objects()
    }
}

impl StreamingPolicy {
    pub fn new(region: LoadRegion, batch_cap: usize) -> Result<Self, PolicyError> {
        region.validate()?;
        if batch_cap == 0 {
            return Err(PolicyError::ZeroBatchCap);
        }

        Ok(Self {
            region,
            batch_cap,
            unload_grace_frames: 0,
            altitude_scaling: None,
        })
    }

    /// Placed objects and building interiors.
    pub fn objects() -> Self {
        Self {
            region: LoadRegion::radius(3.0 * LANDBLOCK_SIZE, 1.5),
            batch_cap: 8,
            unload_grace_frames: 2,
            altitude_scaling: None,
        }
    }

    /// Dungeon cells: a tighter radius, that shrinks further when zooming out.
    pub fn dungeons() -> Self {
        Self {
            region: LoadRegion::radius(LANDBLOCK_SIZE, 1.5),
            batch_cap: 4,
            unload_grace_frames: 2,
            altitude_scaling: Some(AltitudeScaling {
                reference_altitude: 100.0,
                min_factor: 0.25,
            }),
        }
    }

    pub fn with_region(self, region: LoadRegion) -> Result<Self, PolicyError> {
        region.validate()?;
        Ok(Self { region, ..self })
    }

    pub fn with_unload_grace_frames(self, unload_grace_frames: u32) -> Self {
        Self {
            unload_grace_frames,
            ..self
        }
    }

    fn altitude_factor(&self, camera: &Camera) -> f32 {
        self.altitude_scaling
            .map_or(1.0, |scaling| scaling.factor(camera.altitude))
    }

    /// The tile rectangle (inclusive) that is covered by the camera.
    fn viewport_tiles(camera: &Camera) -> ((i32, i32), (i32, i32)) {
        match camera.viewport {
            Some((min, max)) => (world_to_grid(min), world_to_grid(max)),
            None => {
                let tile = world_to_grid(camera.position.truncate());
                (tile, tile)
            }
        }
    }

    fn within(&self, camera: &Camera, key: SpatialCellKey, unload_boundary: bool) -> bool {
        match self.region {
            LoadRegion::Radius { load, unload } => {
                let radius = if unload_boundary { unload } else { load };
                key.distance_to(camera.position.truncate()) <= radius * self.altitude_factor(camera)
            }
            LoadRegion::Viewport {
                load_margin,
                unload_margin,
            } => {
                let margin = if unload_boundary { unload_margin } else { load_margin };
                let (min, max) = Self::viewport_tiles(camera);
                let (min, max) = grid_rect(min, max, margin);
                let (x, y) = (key.x() as i32, key.y() as i32);
                x >= min.0 && x <= max.0 && y >= min.1 && y <= max.1
            }
        }
    }

    /// Inside of the load boundary.
    pub fn should_load(&self, camera: &Camera, key: SpatialCellKey) -> bool {
        self.within(camera, key, false)
    }

    /// Outside of the unload boundary.
    pub fn should_unload(&self, camera: &Camera, key: SpatialCellKey) -> bool {
        !self.within(camera, key, true)
    }

    /// All landblocks inside of the load boundary, nearest first.
    pub fn load_candidates(&self, camera: &Camera) -> Vec<SpatialCellKey> {
        let ((min_x, min_y), (max_x, max_y)) = match self.region {
            LoadRegion::Radius { load, .. } => {
                let tiles = (load * self.altitude_factor(camera) / LANDBLOCK_SIZE)
                    .ceil()
                    .min(LANDBLOCK_GRID as f32) as u32
                    + 1;
                let tile = world_to_grid(camera.position.truncate());
                grid_rect(tile, tile, tiles)
            }
            LoadRegion::Viewport { load_margin, .. } => {
                let (min, max) = Self::viewport_tiles(camera);
                grid_rect(min, max, load_margin)
            }
        };

        let position = camera.position.truncate();
        let mut keys = (min_x..=max_x)
            .flat_map(|x| (min_y..=max_y).filter_map(move |y| SpatialCellKey::from_grid(x, y)))
            .filter(|key| self.should_load(camera, *key))
            .collect::<Vec<_>>();
        sort_nearest_first(&mut keys, position);
        keys
    }
}

/// The inclusive tile rectangle grown by `margin`, clipped to the landblock grid.
fn grid_rect(min: (i32, i32), max: (i32, i32), margin: u32) -> ((i32, i32), (i32, i32)) {
    let margin = margin.min(LANDBLOCK_GRID as u32) as i32;
    let clip = |v: i32| v.clamp(0, LANDBLOCK_GRID - 1);
    (
        (clip(min.0.saturating_sub(margin)), clip(min.1.saturating_sub(margin))),
        (clip(max.0.saturating_add(margin)), clip(max.1.saturating_add(margin))),
    )
}

pub fn sort_nearest_first(keys: &mut [SpatialCellKey], position: Vec2) {
    keys.sort_by(|a, b| {
        a.distance_to(position)
            .total_cmp(&b.distance_to(position))
            .then(a.cmp(b))
    });
}

/// Work the render thread may spend on streaming per frame. Whatever exceeds it is deferred.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBudget {
    pub max_uploads: usize,
    pub max_unloads: usize,
    pub upload_time: Duration,
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self {
            max_uploads: 4,
            max_unloads: 8,
            upload_time: Duration::from_millis(4),
        }
    }
}

impl FrameBudget {
    pub fn with_upload_time_ms(self, millis: u64) -> Self {
        Self {
            upload_time: Duration::from_millis(millis),
            ..self
        }
    }
}
