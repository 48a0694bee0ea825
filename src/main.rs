use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use glam::Vec3;
use log::{info, warn};

use cellstream::demos::SyntheticWorld;
use cellstream::game::placement::PlacementStore;
use cellstream::game::streaming::context::StreamingContext;
use cellstream::game::streaming::policy::{LoadRegion, StreamingPolicy};
use cellstream::game::streaming::streamer::{CellStreamer, StreamingConfig};
use cellstream::io::archive::loader::DirectoryLoader;
use cellstream::io::common::loader::RawAssetLoader;
use cellstream::rendering::cell_renderer::CellRenderer;
use cellstream::rendering::common::camera::Camera;
use cellstream::rendering::gpu::headless::HeadlessDevice;
use cellstream::settings::{AssetSource, CliArgs};

const FLY_SPEED: f32 = 4.0;
const STATS_INTERVAL: u64 = 60;

/// Straight segments between waypoints, walked at a fixed speed.
struct FlyPath {
    waypoints: Vec<Vec3>,
}

impl FlyPath {
    fn camera_at(&self, frame: u64) -> Camera {
        let mut travelled = frame as f32 * FLY_SPEED;
        for segment in self.waypoints.windows(2) {
            let (from, to) = (segment[0], segment[1]);
            let length = from.distance(to);
            if travelled <= length && length > 0.0 {
                let position = from.lerp(to, travelled / length);
                return Camera::looking_at(position, to);
            }
            travelled -= length;
        }

        let last = self.waypoints.last().copied().unwrap_or(Vec3::ZERO);
        Camera::looking_at(last, last + Vec3::X)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    #[cfg(feature = "tracy")]
    tracy_client::Client::start();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let placements = Arc::new(PlacementStore::new());
    let (loader, mut waypoints): (Arc<dyn RawAssetLoader>, Vec<Vec3>) = match &args.source {
        AssetSource::Synthetic {
            seed,
            landblocks,
            export,
        } => {
            let world = SyntheticWorld::builder()
                .seed(*seed)
                .landblocks(*landblocks)
                .build()
                .context("Generating the synthetic world")?;
            world.populate(&placements);

            let archive = world.archive();
            if let Some(folder) = export {
                let written = archive
                    .export_to(folder)
                    .with_context(|| format!("Exporting the synthetic world to {}", folder))?;
                info!("Exported {} assets to {}", written, folder);
            }

            let mut waypoints = vec![world.spawn_point()];
            waypoints.extend(world.rooms().iter().map(|(_, center)| *center));
            (Arc::new(archive), waypoints)
        }
        AssetSource::Directory { path } => {
            let folder = path.as_deref().unwrap_or(&args.data_dir);
            let loader = DirectoryLoader::new(folder).with_context(|| format!("Opening the data folder {}", folder))?;
            info!("Found {} assets in {}", loader.len(), folder);
            (Arc::new(loader), vec![Vec3::ZERO, Vec3::new(1000.0, 0.0, 0.0)])
        }
    };

    if let Some(start) = args.start {
        waypoints.insert(0, start.into());
    }
    let path = FlyPath { waypoints };

    let mut config = StreamingConfig::new();
    config.budget.upload_time = Duration::from_secs_f32(args.budget_ms.max(0.0) / 1000.0);
    if let Some(radius) = args.load_radius {
        config.objects = StreamingPolicy::objects()
            .with_region(LoadRegion::radius(radius, 1.5))
            .context("Invalid load radius")?;
    }

    let context = StreamingContext::new(loader).with_placements(placements);
    let mut device = HeadlessDevice::new();
    let mut streamer = CellStreamer::new(context, config);
    let mut renderer = CellRenderer::new();

    for frame in 0..args.frames {
        profiling::scope!("frame");
        let camera = path.camera_at(frame);
        device.begin_frame();

        streamer.update(&mut device, &camera);
        let visibility = streamer
            .cells_mut()
            .compute_visibility(camera.position, &camera.frustum());
        let report = match renderer.render(&mut device, streamer.cells(), &camera, visibility.as_ref()) {
            Ok(report) => report,
            Err(err) => {
                warn!("Frame {} could not be rendered: {}", frame, err);
                continue;
            }
        };

        if frame % STATS_INTERVAL == 0 {
            let stats = streamer.context().stats();
            info!(
                "Frame {}: camera {:.1} in cell {}, {} cells loaded ({} visible, {} culled), {} GPU entries, {} draws, {} queued",
                frame,
                camera.position,
                visibility
                    .as_ref()
                    .map_or("outdoors".to_string(), |v| format!("{:08X}", v.camera_cell)),
                stats.cells.loaded_cells,
                report.visible_cells,
                report.culled,
                stats.cells.gpu_entries,
                report.draw_calls,
                stats.queued_uploads,
            );
        }

        profiling::finish_frame!();
    }

    let stats = streamer.context().stats();
    info!(
        "Done after {} frames: {} landblocks prepared, {} cells skipped, {} asset failures, {} uploads, {} frees",
        streamer.frame(),
        stats.prepared_landblocks,
        stats.skipped_cells,
        stats.asset_failures,
        stats.cells.uploads,
        stats.cells.frees,
    );

    renderer.destroy(&mut device);
    streamer.teardown(&mut device);
    info!("{} buffers left on the device after teardown", device.live_buffers());
    Ok(())
}
