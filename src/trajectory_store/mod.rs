//! TrajectoryStore - Per-Vehicle Position History
//!
//! ## Responsibilities
//!
//! - Keep a bounded history of center-of-gravity points per tracked vehicle
//! - Debounced eviction: an object missing from the current frame is only
//!   dropped once it is absent from every frame in the FrameCache
//! - Hand out snapshots to the risk engine so analysis runs without the lock

use crate::frame_cache::FrameCache;
use crate::models::{Detection, ObjectKind, Point};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default history length per vehicle
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Position history of one tracked object
#[derive(Debug, Clone, Default)]
pub struct ObjectState {
    history: VecDeque<Point>,
}

impl ObjectState {
    pub fn history(&self) -> &VecDeque<Point> {
        &self.history
    }

    fn record(&mut self, point: Point, capacity: usize) {
        self.history.push_back(point);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

/// Immutable copy of one vehicle's trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTrack {
    pub vehicle_id: i64,
    /// Oldest first
    pub history: Vec<Point>,
}

impl VehicleTrack {
    pub fn oldest(&self) -> Option<Point> {
        self.history.first().copied()
    }

    pub fn newest(&self) -> Option<Point> {
        self.history.last().copied()
    }
}

/// Vehicle trajectories keyed by analytics object id
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    objects: HashMap<i64, ObjectState>,
    history_size: usize,
}

/// Outcome of one update call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    pub evicted: Vec<i64>,
}

impl TrajectoryStore {
    /// Create new TrajectoryStore keeping `history_size` points per vehicle
    pub fn new(history_size: usize) -> Self {
        Self {
            objects: HashMap::new(),
            history_size: history_size.max(1),
        }
    }

    /// Apply one frame's detections, then prune objects absent from the cache
    ///
    /// `frame_cache` must already contain the current frame.
    pub fn update(&mut self, detections: &[Detection], frame_cache: &FrameCache) -> UpdateSummary {
        let mut seen = HashSet::new();
        let mut summary = UpdateSummary::default();

        for detection in detections.iter().filter(|d| d.kind == ObjectKind::Vehicle) {
            tracing::debug!(
                vehicle_id = detection.object_id,
                x = detection.cog.x,
                y = detection.cog.y,
                "Tracking vehicle"
            );
            self.objects
                .entry(detection.object_id)
                .or_default()
                .record(detection.cog, self.history_size);
            seen.insert(detection.object_id);
            summary.updated += 1;
        }

        self.objects.retain(|id, _| {
            if seen.contains(id) || frame_cache.contains_object(*id) {
                return true;
            }
            tracing::debug!(vehicle_id = id, "Vehicle disappeared from all cached frames, erasing");
            summary.evicted.push(*id);
            false
        });

        summary
    }

    pub fn get(&self, object_id: i64) -> Option<&ObjectState> {
        self.objects.get(&object_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Copy of every trajectory, ordered by vehicle id
    pub fn snapshot(&self) -> Vec<VehicleTrack> {
        let mut tracks: Vec<VehicleTrack> = self
            .objects
            .iter()
            .map(|(id, state)| VehicleTrack {
                vehicle_id: *id,
                history: state.history.iter().copied().collect(),
            })
            .collect();
        tracks.sort_by_key(|t| t.vehicle_id);
        tracks
    }
}

impl Default for TrajectoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
