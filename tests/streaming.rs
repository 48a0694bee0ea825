mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::Vec3;
use itertools::Itertools;

use cellstream::game::cell_manager::{CellManager, FinalizeReport};
use cellstream::game::streaming::Population;
use cellstream::game::streaming::context::StreamingContext;
use cellstream::game::streaming::scheduler::LandblockState;
use cellstream::game::streaming::worker::prepare_landblock;
use cellstream::rendering::common::camera::Camera;
use cellstream::rendering::common::coordinate_systems::LANDBLOCK_SIZE;
use cellstream::rendering::gpu::headless::HeadlessDevice;

#[test_log::test]
fn shared_signatures_are_uploaded_once() {
    // 8 landblocks have more rooms than there are distinct signatures
    let world = common::world(11, 8);
    let mut device = HeadlessDevice::new();
    let mut streamer = common::streamer(&world, common::config(1000.0));

    common::settle(&mut streamer, &mut device, &common::camera_over(world.landblocks()[3]));

    let expected: usize = world.landblocks().iter().map(|key| world.cells_in(*key)).sum();
    let cells = streamer.cells();
    assert_eq!(cells.loaded_cell_count(), expected);

    let signatures = cells.instances().map(|instance| &instance.signature).unique().count();
    let stats = cells.stats();
    assert_eq!(stats.gpu_entries, signatures);
    assert_eq!(stats.uploads, signatures as u64);
    assert!(stats.gpu_entries < stats.loaded_cells);

    let mut handles = HashMap::new();
    for instance in cells.instances() {
        let handle = handles.entry(&instance.signature).or_insert(instance.gpu);
        assert_eq!(*handle, instance.gpu);
    }

    let published = streamer.context().stats();
    assert_eq!(published.skipped_cells, 0);
    assert_eq!(published.cells.loaded_cells, expected);

    streamer.teardown(&mut device);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_textures(), 0);
}

#[test_log::test]
fn unloading_keeps_geometry_of_survivors() {
    let world = common::world(5, 8);
    let landblocks = world.landblocks().to_vec();
    let mut device = HeadlessDevice::new();
    let mut streamer = common::streamer(&world, common::config(200.0));

    common::settle(&mut streamer, &mut device, &common::camera_over(landblocks[0]));
    assert_eq!(streamer.cells().cell_count_in(landblocks[0]), world.cells_in(landblocks[0]));
    assert_eq!(streamer.cells().cell_count_in(landblocks[1]), world.cells_in(landblocks[1]));

    common::settle(&mut streamer, &mut device, &common::camera_over(landblocks[7]));
    let cells = streamer.cells();
    assert_eq!(cells.cell_count_in(landblocks[0]), 0);
    assert_eq!(cells.cell_count_in(landblocks[1]), 0);
    assert_eq!(
        cells.loaded_cell_count(),
        world.cells_in(landblocks[6]) + world.cells_in(landblocks[7])
    );

    // nothing that is still referenced has been freed, nothing unreferenced is left behind
    assert!(cells.instances().all(|instance| cells.gpu_cache().get(instance.gpu).is_some()));
    let survivors: HashSet<_> = cells.instances().map(|instance| &instance.signature).collect();
    assert_eq!(cells.gpu_cache().len(), survivors.len());
    assert!(survivors.iter().all(|signature| cells.gpu_cache().contains(signature)));

    // statics went away with their landblocks
    assert!(
        cells
            .statics()
            .all(|placement| placement.owner_cell >> 16 != landblocks[0].0 as u32)
    );

    streamer.teardown(&mut device);
    assert_eq!(device.live_buffers(), 0);
}

#[test_log::test]
fn landblocks_between_the_boundaries_stay_put() {
    let world = common::world(3, 2);
    let key = world.landblocks()[0];
    let mut device = HeadlessDevice::new();
    let mut streamer = common::streamer(&world, common::config(LANDBLOCK_SIZE));

    common::settle(&mut streamer, &mut device, &common::camera_over(key));
    let loaded = streamer.cells().cell_count_in(key);
    assert!(loaded > 0);

    // 1.2 times the load radius away: neither loadable nor unloadable
    let position = key.center().extend(10.0) - Vec3::X * (1.2 * LANDBLOCK_SIZE);
    let camera = Camera::looking_at(position, position + Vec3::X);

    for _ in 0..20 {
        streamer.update(&mut device, &camera);
        for population in Population::ALL {
            let scheduler = streamer.scheduler(population);
            assert_eq!(scheduler.state(key), Some(LandblockState::Loaded));
            assert!(!scheduler.load_eligible(&camera).contains(&key));
            assert!(!scheduler.unload_eligible(&camera).contains(&key));
            assert!(
                scheduler
                    .load_eligible(&camera)
                    .is_disjoint(&scheduler.unload_eligible(&camera))
            );
        }
        assert_eq!(streamer.cells().cell_count_in(key), loaded);
    }

    streamer.teardown(&mut device);
}

#[test_log::test]
fn finalizing_the_same_landblock_twice_changes_nothing() {
    let world = common::world(9, 1);
    let key = world.landblocks()[0];
    let context = StreamingContext::new(Arc::new(world.archive()));
    let mut device = HeadlessDevice::new();
    let mut cells = CellManager::default();

    let first = cells.finalize(&mut device, prepare_landblock(&context, key, Population::Dungeons));
    assert!(first.added > 0);
    let stats = cells.stats();
    let buffers = device.live_buffers();

    let second = cells.finalize(&mut device, prepare_landblock(&context, key, Population::Dungeons));
    assert_eq!(second, FinalizeReport {
        added: 0,
        existing: first.added,
        failed: 0,
    });
    assert_eq!(cells.stats(), stats);
    assert_eq!(device.live_buffers(), buffers);

    cells.teardown(&mut device);
}

#[test_log::test]
fn a_tight_budget_defers_but_never_drops() {
    let world = common::world(4, 4);
    let mut device = HeadlessDevice::new();
    let mut config = common::config(1000.0);
    config.budget.max_uploads = 1;
    let mut streamer = common::streamer(&world, config);

    let frames = common::settle(&mut streamer, &mut device, &common::camera_over(world.landblocks()[1]));
    let expected: usize = world.landblocks().iter().map(|key| world.cells_in(*key)).sum();
    assert_eq!(streamer.cells().loaded_cell_count(), expected);

    // one landblock per population and frame at most
    let prepared = streamer.context().stats().prepared_landblocks;
    assert!(frames >= prepared);

    streamer.teardown(&mut device);
}
