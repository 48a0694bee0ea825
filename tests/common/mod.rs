#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;

use cellstream::demos::SyntheticWorld;
use cellstream::game::streaming::context::StreamingContext;
use cellstream::game::streaming::policy::{LoadRegion, StreamingPolicy};
use cellstream::game::streaming::streamer::{CellStreamer, StreamingConfig};
use cellstream::rendering::common::camera::Camera;
use cellstream::rendering::common::coordinate_systems::SpatialCellKey;
use cellstream::rendering::gpu::headless::HeadlessDevice;

const MAX_FRAMES: u64 = 5000;

pub fn world(seed: u64, landblocks: usize) -> SyntheticWorld {
    SyntheticWorld::builder()
        .seed(seed)
        .landblocks(landblocks)
        .build()
        .expect("The synthetic world serializes")
}

/// Both populations use the same radius and unload without grace frames.
pub fn config(load_radius: f32) -> StreamingConfig {
    let policy = StreamingPolicy::new(LoadRegion::radius(load_radius, 1.5), 4).expect("valid policy");
    StreamingConfig {
        objects: policy,
        dungeons: policy,
        ..StreamingConfig::new()
    }
}

pub fn streamer(world: &SyntheticWorld, config: StreamingConfig) -> CellStreamer {
    let context = StreamingContext::new(Arc::new(world.archive()));
    world.populate(&context.placements);
    CellStreamer::new(context, config)
}

/// A camera hovering over the center of the landblock, looking along +X.
pub fn camera_over(key: SpatialCellKey) -> Camera {
    let position = key.center().extend(10.0);
    Camera::looking_at(position, position + Vec3::X)
}

/// Runs frames until nothing is on its way in or out anymore, returns the number of frames.
pub fn settle(streamer: &mut CellStreamer, device: &mut HeadlessDevice, camera: &Camera) -> u64 {
    for frame in 1..=MAX_FRAMES {
        streamer.update(device, camera);
        if streamer.is_idle() {
            return frame;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    panic!("Streaming did not settle within {} frames", MAX_FRAMES);
}
