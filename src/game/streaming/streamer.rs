use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{error, trace};

use crate::game::cell_manager::CellManager;
use crate::game::portal_visibility::VisibilityConfig;
use crate::game::streaming::Population;
use crate::game::streaming::context::{StreamingContext, StreamingStats};
use crate::game::streaming::policy::{FrameBudget, StreamingPolicy};
use crate::game::streaming::scheduler::StreamingScheduler;
use crate::game::streaming::worker::{LoadRequest, PreparedBatch, StreamingWorker, WorkerResult};
use crate::rendering::common::camera::Camera;
use crate::rendering::gpu::device::GpuDevice;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingConfig {
    pub objects: StreamingPolicy,
    pub dungeons: StreamingPolicy,
    pub budget: FrameBudget,
    pub visibility: VisibilityConfig,
}

impl StreamingConfig {
    pub fn new() -> Self {
        Self {
            objects: StreamingPolicy::objects(),
            dungeons: StreamingPolicy::dungeons(),
            budget: FrameBudget::default(),
            visibility: VisibilityConfig::default(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Ties the streaming together, called once per frame on the render thread: plans loads and
/// unloads, dispatches batches to the worker, finalizes prepared landblocks and releases the ones
/// that went out of range, all within the frame budget.
pub struct CellStreamer {
    context: StreamingContext,
    worker: StreamingWorker,
    objects: StreamingScheduler,
    dungeons: StreamingScheduler,
    ready: VecDeque<PreparedBatch>,
    cells: CellManager,
    budget: FrameBudget,
    frame: u64,
    prepared_landblocks: u64,
    skipped_cells: u64,
    upload_time: Duration,
}

impl CellStreamer {
    pub fn new(context: StreamingContext, config: StreamingConfig) -> Self {
        Self {
            worker: StreamingWorker::spawn(context.clone()),
            context,
            objects: StreamingScheduler::new(Population::Objects, config.objects),
            dungeons: StreamingScheduler::new(Population::Dungeons, config.dungeons),
            ready: VecDeque::new(),
            cells: CellManager::new(config.visibility),
            budget: config.budget,
            frame: 0,
            prepared_landblocks: 0,
            skipped_cells: 0,
            upload_time: Duration::ZERO,
        }
    }

    fn scheduler_mut(&mut self, population: Population) -> &mut StreamingScheduler {
        match population {
            Population::Objects => &mut self.objects,
            Population::Dungeons => &mut self.dungeons,
        }
    }

    pub fn scheduler(&self, population: Population) -> &StreamingScheduler {
        match population {
            Population::Objects => &self.objects,
            Population::Dungeons => &self.dungeons,
        }
    }

    pub fn update<D: GpuDevice>(&mut self, device: &mut D, camera: &Camera) {
        profiling::scope!("CellStreamer::update");
        self.frame += 1;

        for population in Population::ALL {
            let scheduler = self.scheduler_mut(population);
            scheduler.update(camera);
            if let Some(keys) = scheduler.take_dispatch()
                && !self.worker.dispatch(LoadRequest { population, keys })
            {
                error!("The Cell Streaming thread is gone, {} can not be loaded anymore", population);
            }
        }

        self.drain_worker();
        self.finalize_ready(device);
        self.unload(device);
        self.publish();
    }

    fn drain_worker(&mut self) {
        while let Some(result) = self.worker.try_recv() {
            match result {
                WorkerResult::Landblock(batch) => {
                    if !self
                        .scheduler_mut(batch.population)
                        .mark_prepared(batch.key)
                    {
                        trace!("Dropping stale batch {} {}", batch.key, batch.population);
                        continue;
                    }

                    self.prepared_landblocks += 1;
                    self.skipped_cells += batch.skipped_cells as u64;
                    self.ready.push_back(batch);
                }
                WorkerResult::BatchFinished { population } => {
                    self.scheduler_mut(population).batch_finished();
                }
            }
        }
    }

    /// At least one batch per frame, so that a tight budget still makes progress.
    fn finalize_ready<D: GpuDevice>(&mut self, device: &mut D) {
        let start = Instant::now();
        let mut uploads = 0;

        while uploads < self.budget.max_uploads && (uploads == 0 || start.elapsed() < self.budget.upload_time) {
            let Some(batch) = self.ready.pop_front() else {
                break;
            };

            let (key, population) = (batch.key, batch.population);
            self.cells.finalize(device, batch);
            self.scheduler_mut(population).mark_loaded(key);
            uploads += 1;
        }

        if !self.ready.is_empty() {
            trace!("Deferring {} prepared landblocks to the next frame", self.ready.len());
        }
        self.upload_time = start.elapsed();
    }

    fn unload<D: GpuDevice>(&mut self, device: &mut D) {
        let mut remaining = self.budget.max_unloads;
        for population in Population::ALL {
            let keys = self.scheduler_mut(population).take_unloads(remaining);
            remaining -= keys.len();
            for key in keys {
                self.cells.release(device, key, population);
            }
        }
    }

    fn publish(&self) {
        self.context.publish(StreamingStats {
            frame: self.frame,
            objects: self.objects.counts(),
            dungeons: self.dungeons.counts(),
            cells: self.cells.stats(),
            prepared_landblocks: self.prepared_landblocks,
            skipped_cells: self.skipped_cells,
            asset_failures: self.context.assets.failure_count(),
            cached_texture_bytes: self.context.assets.cached_texture_bytes(),
            upload_time: self.upload_time,
            queued_uploads: self.ready.len(),
        });
    }

    /// Nothing is on its way in or out.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty()
            && [&self.objects, &self.dungeons].iter().all(|scheduler| {
                let counts = scheduler.counts();
                !scheduler.is_batch_in_flight()
                    && counts.pending_load == 0
                    && counts.loading == 0
                    && counts.pending_upload == 0
                    && counts.pending_unload == 0
            })
    }

    pub fn cells(&self) -> &CellManager {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut CellManager {
        &mut self.cells
    }

    pub fn context(&self) -> &StreamingContext {
        &self.context
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Releases everything that has been loaded. Prepared batches that are still queued are dropped
    /// without ever reaching the GPU.
    pub fn teardown<D: GpuDevice>(&mut self, device: &mut D) {
        self.ready.clear();
        self.objects.drain();
        self.dungeons.drain();
        self.cells.teardown(device);
        self.publish();
    }
}
