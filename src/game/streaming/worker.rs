use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, error, trace, warn};

use cellstream_files::ids::{FIRST_INTERIOR_CELL, LANDBLOCK_INFO_INDEX, cell_id};

use crate::game::placement::StaticPlacement;
use crate::game::streaming::Population;
use crate::game::streaming::context::StreamingContext;
use crate::rendering::common::coordinate_systems::SpatialCellKey;
use crate::rendering::common::types::{GeometrySignature, PreparedCell, PreparedCellGeometry};
use crate::rendering::importer::envcell_importer::{EnvCellImporter, PlacementContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub population: Population,
    /// Nearest first, results come back in this order.
    pub keys: Vec<SpatialCellKey>,
}

/// Everything the render thread needs to finalize one landblock of one population.
#[derive(Debug)]
pub struct PreparedBatch {
    pub key: SpatialCellKey,
    pub population: Population,
    /// One geometry per distinct signature in this landblock.
    pub geometries: HashMap<GeometrySignature, PreparedCellGeometry>,
    pub cells: Vec<PreparedCell>,
    pub statics: Vec<StaticPlacement>,
    /// Cells that have been dropped during the preparation.
    pub skipped_cells: usize,
}

impl PreparedBatch {
    pub fn empty(key: SpatialCellKey, population: Population) -> Self {
        Self {
            key,
            population,
            geometries: HashMap::new(),
            cells: Vec::new(),
            statics: Vec::new(),
            skipped_cells: 0,
        }
    }
}

#[derive(Debug)]
pub enum WorkerResult {
    Landblock(PreparedBatch),
    BatchFinished { population: Population },
}

/// Prepares one landblock of a population. Never fails as a whole: unresolvable cells are skipped,
/// and a landblock without interiors yields an empty batch.
pub fn prepare_landblock(context: &StreamingContext, key: SpatialCellKey, population: Population) -> PreparedBatch {
    profiling::scope!("prepare_landblock");
    let mut batch = PreparedBatch::empty(key, population);

    if population == Population::Objects {
        batch.statics.extend(context.placements.placements_of(key));
    }

    let info = match context.assets.landblock_info(key) {
        Ok(Some(info)) => info,
        Ok(None) => return batch,
        Err(err) => {
            warn!("Landblock {} has broken interiors: {}", key, err);
            return batch;
        }
    };

    let indices = (0..info.cell_count).map_while(|i| {
        u16::try_from(i)
            .ok()
            .and_then(|i| FIRST_INTERIOR_CELL.checked_add(i))
            .filter(|index| *index < LANDBLOCK_INFO_INDEX)
    });

    for index in indices {
        let id = cell_id(key.0, index);
        let raw = match context.assets.env_cell(id) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Skipping cell {:08X}: {}", id, err);
                batch.skipped_cells += 1;
                continue;
            }
        };

        // statics belong to the placed objects, whatever population their owner cell is in
        if population == Population::Objects {
            batch.statics.extend(
                raw.static_objects
                    .iter()
                    .map(|object| StaticPlacement::embedded(&raw, object)),
            );
        }

        let wanted = match population {
            Population::Objects => raw.is_seen_outside(),
            Population::Dungeons => !raw.is_seen_outside(),
        };
        if !wanted {
            continue;
        }

        let placement = PlacementContext::for_cell(&raw);
        let signature = GeometrySignature::of(&raw);
        let prepared = if batch.geometries.contains_key(&signature) {
            EnvCellImporter::prepare_instance(&context.assets, &raw, &placement)
        } else {
            EnvCellImporter::prepare(&context.assets, &raw, &placement).map(|(cell, geometry)| {
                batch.geometries.insert(signature, geometry);
                cell
            })
        };

        match prepared {
            Ok(cell) => batch.cells.push(cell),
            Err(err) => {
                warn!("Skipping cell {:08X}: {}", id, err);
                batch.skipped_cells += 1;
            }
        }
    }

    batch
}

fn run(context: StreamingContext, requests: Receiver<LoadRequest>, results: Sender<WorkerResult>) {
    // Ends when the render thread hangs up.
    while let Ok(request) = requests.recv() {
        let now = Instant::now();
        for key in &request.keys {
            let batch = prepare_landblock(&context, *key, request.population);
            trace!(
                "Prepared {} {}: {} cells, {} signatures",
                key,
                request.population,
                batch.cells.len(),
                batch.geometries.len()
            );

            if results.send(WorkerResult::Landblock(batch)).is_err() {
                return;
            }
        }

        debug!(
            "Prepared {} {} landblocks in {}ms",
            request.keys.len(),
            request.population,
            now.elapsed().as_millis()
        );

        let finished = WorkerResult::BatchFinished {
            population: request.population,
        };
        if results.send(finished).is_err() {
            return;
        }
    }

    debug!("Cell Streaming thread shutting down");
}

/// The background thread that resolves assets and prepares geometry. It never touches the GPU:
/// requests go in, prepared batches come out, both through channels.
pub struct StreamingWorker {
    requests: Option<Sender<LoadRequest>>,
    results: Receiver<WorkerResult>,
    thread: Option<JoinHandle<()>>,
}

impl StreamingWorker {
    pub fn spawn(context: StreamingContext) -> Self {
        let (request_sender, request_receiver) = channel();
        let (result_sender, result_receiver) = channel();

        let thread = std::thread::Builder::new()
            .name("Cell Streaming".into())
            .spawn(move || run(context, request_receiver, result_sender))
            .expect("Spawning the Cell Streaming Thread succeeds");

        Self {
            requests: Some(request_sender),
            results: result_receiver,
            thread: Some(thread),
        }
    }

    /// Returns false when the worker is gone.
    pub fn dispatch(&self, request: LoadRequest) -> bool {
        self.requests
            .as_ref()
            .is_some_and(|sender| sender.send(request).is_ok())
    }

    /// Never blocks.
    pub fn try_recv(&self) -> Option<WorkerResult> {
        match self.results.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("Cell Streaming: Broken Pipe");
                None
            }
        }
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("The Cell Streaming thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demos::SyntheticWorld;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn prepares_populations_separately() {
        let world = SyntheticWorld::builder().seed(7).landblocks(1).build().unwrap();
        let context = StreamingContext::new(Arc::new(world.archive()));
        let key = world.landblocks()[0];

        let dungeons = prepare_landblock(&context, key, Population::Dungeons);
        let objects = prepare_landblock(&context, key, Population::Objects);

        assert_eq!(dungeons.cells.len() + objects.cells.len(), world.cells_in(key));
        assert_eq!(dungeons.skipped_cells, 0);
        assert!(!dungeons.cells.is_empty());
        assert!(dungeons.geometries.len() <= dungeons.cells.len());
        assert!(
            dungeons
                .cells
                .iter()
                .all(|cell| dungeons.geometries.contains_key(&cell.signature))
        );
    }

    #[test]
    fn statics_travel_with_the_objects() {
        let world = SyntheticWorld::builder().seed(11).landblocks(3).build().unwrap();
        let context = StreamingContext::new(Arc::new(world.archive()));
        world.populate(&context.placements);

        for key in world.landblocks() {
            let embedded: usize = (0..world.cells_in(*key) as u16)
                .map(|i| {
                    let raw = context.assets.env_cell(cell_id(key.0, FIRST_INTERIOR_CELL + i)).unwrap();
                    raw.static_objects.len()
                })
                .sum();

            let dungeons = prepare_landblock(&context, *key, Population::Dungeons);
            let objects = prepare_landblock(&context, *key, Population::Objects);
            assert!(dungeons.statics.is_empty());
            assert_eq!(
                objects.statics.len(),
                embedded + context.placements.placements_of(*key).len()
            );
        }
    }

    #[test]
    fn unknown_landblocks_are_empty() {
        let world = SyntheticWorld::builder().seed(7).landblocks(1).build().unwrap();
        let context = StreamingContext::new(Arc::new(world.archive()));

        let batch = prepare_landblock(&context, SpatialCellKey::new(200, 200), Population::Dungeons);
        assert!(batch.cells.is_empty());
        assert_eq!(batch.skipped_cells, 0);
    }

    #[test]
    fn answers_in_dispatch_order() {
        let world = SyntheticWorld::builder().seed(3).landblocks(3).build().unwrap();
        let worker = StreamingWorker::spawn(StreamingContext::new(Arc::new(world.archive())));
        let keys = world.landblocks().to_vec();

        assert!(worker.dispatch(LoadRequest {
            population: Population::Dungeons,
            keys: keys.clone(),
        }));

        let mut received = Vec::new();
        loop {
            match worker.try_recv() {
                Some(WorkerResult::Landblock(batch)) => received.push(batch.key),
                Some(WorkerResult::BatchFinished { population }) => {
                    assert_eq!(population, Population::Dungeons);
                    break;
                }
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        assert_eq!(received, keys);
    }
}
