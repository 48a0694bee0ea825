use std::collections::{HashMap, HashSet};

use glam::Vec2;
use itertools::Itertools;
use log::{debug, trace};

use crate::game::streaming::Population;
use crate::game::streaming::policy::{StreamingPolicy, sort_nearest_first};
use crate::rendering::common::camera::Camera;
use crate::rendering::common::coordinate_systems::SpatialCellKey;

/// The state of a landblock that is tracked by the scheduler. Untracked landblocks are unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandblockState {
    PendingLoad,
    /// Dispatched to the worker.
    Loading,
    /// Prepared, waiting for the render thread to upload it.
    PendingUpload,
    Loaded,
    PendingUnload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerCounts {
    pub pending_load: usize,
    pub loading: usize,
    pub pending_upload: usize,
    pub loaded: usize,
    pub pending_unload: usize,
}

/// Drives the load/unload state machine of one population. Lives on the render thread, the worker
/// only ever sees the keys that have been dispatched to it.
pub struct StreamingScheduler {
    population: Population,
    policy: StreamingPolicy,
    states: HashMap<SpatialCellKey, LandblockState>,
    frames_outside: HashMap<SpatialCellKey, u32>,
    batch_in_flight: bool,
    camera_position: Vec2,
}

impl StreamingScheduler {
    pub fn new(population: Population, policy: StreamingPolicy) -> Self {
        Self {
            population,
            policy,
            states: HashMap::new(),
            frames_outside: HashMap::new(),
            batch_in_flight: false,
            camera_position: Vec2::ZERO,
        }
    }

    pub fn population(&self) -> Population {
        self.population
    }

    pub fn policy(&self) -> &StreamingPolicy {
        &self.policy
    }

    pub fn state(&self, key: SpatialCellKey) -> Option<LandblockState> {
        self.states.get(&key).copied()
    }

    fn transition(&mut self, key: SpatialCellKey, state: LandblockState) {
        trace!("{} {}: {:?} -> {:?}", self.population, key, self.state(key), state);
        self.states.insert(key, state);
    }

    /// Moves landblocks across the load and unload boundaries of the policy.
    pub fn update(&mut self, camera: &Camera) {
        profiling::scope!("StreamingScheduler::update");
        self.camera_position = camera.position.truncate();

        for key in self.policy.load_candidates(camera) {
            match self.state(key) {
                None => self.transition(key, LandblockState::PendingLoad),
                // came back before the unload happened
                Some(LandblockState::PendingUnload) => self.transition(key, LandblockState::Loaded),
                Some(_) => {}
            }
        }

        let tracked = self
            .states
            .iter()
            .map(|(key, state)| (*key, *state))
            .collect_vec();

        for (key, state) in tracked {
            let outside = self.policy.should_unload(camera, key);
            if !outside {
                self.frames_outside.remove(&key);
                continue;
            }

            match state {
                LandblockState::PendingLoad => {
                    trace!("{} {}: dropped before dispatch", self.population, key);
                    self.states.remove(&key);
                }
                LandblockState::Loaded => {
                    let frames = self.frames_outside.entry(key).or_insert(0);
                    *frames += 1;
                    if *frames > self.policy.unload_grace_frames {
                        self.frames_outside.remove(&key);
                        self.transition(key, LandblockState::PendingUnload);
                    }
                }
                // No cancellation: these finish and get unloaded afterward.
                LandblockState::Loading | LandblockState::PendingUpload | LandblockState::PendingUnload => {}
            }
        }
    }

    /// The next batch for the worker, nearest first and at most `batch_cap` landblocks. There is only
    /// one batch in flight at a time.
    pub fn take_dispatch(&mut self) -> Option<Vec<SpatialCellKey>> {
        if self.batch_in_flight {
            return None;
        }

        let mut pending = self
            .states
            .iter()
            .filter(|(_, state)| **state == LandblockState::PendingLoad)
            .map(|(key, _)| *key)
            .collect_vec();

        if pending.is_empty() {
            return None;
        }

        sort_nearest_first(&mut pending, self.camera_position);
        pending.truncate(self.policy.batch_cap);

        for key in &pending {
            self.transition(*key, LandblockState::Loading);
        }

        debug!("Dispatching {} {} landblocks", pending.len(), self.population);
        self.batch_in_flight = true;
        Some(pending)
    }

    /// A landblock of the batch has been prepared by the worker. Returns false when the landblock
    /// has not been dispatched (anymore), the result is stale then.
    pub fn mark_prepared(&mut self, key: SpatialCellKey) -> bool {
        if self.state(key) != Some(LandblockState::Loading) {
            return false;
        }

        self.transition(key, LandblockState::PendingUpload);
        true
    }

    /// The render thread finalized the landblock.
    pub fn mark_loaded(&mut self, key: SpatialCellKey) {
        if matches!(
            self.state(key),
            Some(LandblockState::Loading | LandblockState::PendingUpload)
        ) {
            self.transition(key, LandblockState::Loaded);
        }
    }

    /// The worker is done with the batch in flight.
    pub fn batch_finished(&mut self) {
        self.batch_in_flight = false;
    }

    pub fn is_batch_in_flight(&self) -> bool {
        self.batch_in_flight
    }

    /// Up to `max` landblocks to release, farthest first. They are untracked (unloaded) from here on,
    /// so the caller has to release them.
    pub fn take_unloads(&mut self, max: usize) -> Vec<SpatialCellKey> {
        let mut unloads = self
            .states
            .iter()
            .filter(|(_, state)| **state == LandblockState::PendingUnload)
            .map(|(key, _)| *key)
            .collect_vec();

        sort_nearest_first(&mut unloads, self.camera_position);
        unloads.reverse();
        unloads.truncate(max);

        for key in &unloads {
            trace!("{} {}: PendingUnload -> unloaded", self.population, key);
            self.states.remove(key);
        }
        unloads
    }

    /// Landblocks inside of the load boundary.
    pub fn load_eligible(&self, camera: &Camera) -> HashSet<SpatialCellKey> {
        self.policy.load_candidates(camera).into_iter().collect()
    }

    /// Tracked landblocks outside of the unload boundary.
    pub fn unload_eligible(&self, camera: &Camera) -> HashSet<SpatialCellKey> {
        self.states
            .keys()
            .filter(|key| self.policy.should_unload(camera, **key))
            .copied()
            .collect()
    }

    pub fn counts(&self) -> SchedulerCounts {
        let mut counts = SchedulerCounts::default();
        for state in self.states.values() {
            match state {
                LandblockState::PendingLoad => counts.pending_load += 1,
                LandblockState::Loading => counts.loading += 1,
                LandblockState::PendingUpload => counts.pending_upload += 1,
                LandblockState::Loaded => counts.loaded += 1,
                LandblockState::PendingUnload => counts.pending_unload += 1,
            }
        }
        counts
    }

    /// Everything that is not unloaded yet, for the teardown.
    pub fn drain(&mut self) -> Vec<SpatialCellKey> {
        self.frames_outside.clear();
        self.batch_in_flight = false;
        self.states.drain().map(|(key, _)| key).sorted().collect()
    }
}
