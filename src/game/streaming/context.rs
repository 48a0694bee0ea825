use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::game::cell_manager::CellManagerStats;
use crate::game::placement::PlacementStore;
use crate::game::streaming::scheduler::SchedulerCounts;
use crate::io::common::loader::RawAssetLoader;
use crate::rendering::asset_graph::asset_resolver::AssetResolver;

/// A snapshot of the streaming, published once per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingStats {
    pub frame: u64,
    pub objects: SchedulerCounts,
    pub dungeons: SchedulerCounts,
    pub cells: CellManagerStats,
    pub prepared_landblocks: u64,
    pub skipped_cells: u64,
    pub asset_failures: usize,
    pub cached_texture_bytes: u64,
    /// Time spent on finalizing in the last frame.
    pub upload_time: Duration,
    /// Prepared landblocks waiting for the render thread.
    pub queued_uploads: usize,
}

/// The state that is shared between the render thread and the streaming worker. Everything in here
/// is thread safe; the GPU state is not part of it and stays with the render thread.
#[derive(Clone)]
pub struct StreamingContext {
    pub assets: Arc<AssetResolver>,
    pub placements: Arc<PlacementStore>,
    stats: Arc<ArcSwap<StreamingStats>>,
}

impl StreamingContext {
    pub fn new(loader: Arc<dyn RawAssetLoader>) -> Self {
        Self::with_assets(Arc::new(AssetResolver::new(loader)))
    }

    pub fn with_assets(assets: Arc<AssetResolver>) -> Self {
        Self {
            assets,
            placements: Arc::new(PlacementStore::new()),
            stats: Arc::new(ArcSwap::from_pointee(StreamingStats::default())),
        }
    }

    /// Shares an existing placement store instead of the empty one.
    pub fn with_placements(self, placements: Arc<PlacementStore>) -> Self {
        Self { placements, ..self }
    }

    /// The latest published snapshot. Lock free, so this can be polled from any thread.
    pub fn stats(&self) -> Arc<StreamingStats> {
        self.stats.load_full()
    }

    pub fn publish(&self, stats: StreamingStats) {
        self.stats.store(Arc::new(stats));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::archive::loader::MemoryArchive;

    #[test]
    fn stats_are_visible_to_clones() {
        let context = StreamingContext::new(Arc::new(MemoryArchive::new()));
        let ui_side = context.clone();

        context.publish(StreamingStats {
            frame: 42,
            ..Default::default()
        });

        let handle = std::thread::spawn(move || ui_side.stats().frame);
        assert_eq!(handle.join().unwrap(), 42);
    }
}
