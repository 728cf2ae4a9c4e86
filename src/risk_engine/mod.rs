//! RiskEngine - Vehicle-to-Pedestrian Convergence Analysis
//!
//! ## Responsibilities
//!
//! - Decide, per tracked vehicle, whether a confirmed pedestrian line crossing
//!   warrants an alert
//! - Select the board to command (partner of the vehicle's nearest anchor)
//! - Drive the alert response (board ON, dwell, board OFF, evidence capture)
//!
//! ## Decision
//!
//! For every vehicle with at least two recorded points:
//! 1. nearest anchor point to the oldest position; its pair partner is the board
//! 2. approach: `|newest - center| <= |oldest - center| - approach_threshold`
//! 3. parallelism: `|cos(center - nearest_anchor, rule_line)| >= parallelism_threshold`

mod responder;

pub use responder::{AlertResponder, BoardAlertResponder};

use crate::calibration::Calibration;
use crate::models::{AnchorPair, Point};
use crate::trajectory_store::VehicleTrack;
use std::sync::Arc;

/// Default approach threshold (working-resolution pixels)
pub const DEFAULT_APPROACH_THRESHOLD: f64 = 10.0;

/// Default parallelism threshold (cosine similarity)
pub const DEFAULT_PARALLELISM_THRESHOLD: f64 = 0.75;

/// Risk thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskConfig {
    /// Minimum decrease of distance to the reference center
    pub approach_threshold: f64,
    /// Minimum absolute cosine similarity with the rule line
    pub parallelism_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            approach_threshold: DEFAULT_APPROACH_THRESHOLD,
            parallelism_threshold: DEFAULT_PARALLELISM_THRESHOLD,
        }
    }
}

/// Nearest anchor point and the board on the other side of its pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorMatch {
    pub matched_id: i64,
    pub matched_point: Point,
    pub board_id: i64,
}

/// Positive decision for one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub vehicle_id: i64,
    pub human_id: i64,
    pub rule_name: String,
    pub board_id: i64,
    pub matched_id: i64,
    pub similarity: f64,
    pub dist_old: f64,
    pub dist_new: f64,
}

/// Per-vehicle outcome
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleVerdict {
    InsufficientHistory,
    NoAnchor,
    NotApproaching { dist_old: f64, dist_new: f64 },
    NotParallel { similarity: f64 },
    Alert(AlertDecision),
}

/// Cosine similarity, 0 when either vector has zero length
pub fn cosine_similarity(a: Point, b: Point) -> f64 {
    let mag_a = a.magnitude();
    let mag_b = b.magnitude();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (mag_a * mag_b)
}

/// Inclusive approach test
pub fn is_approaching(dist_old: f64, dist_new: f64, threshold: f64) -> bool {
    dist_new <= dist_old - threshold
}

/// Inclusive parallelism test on the absolute similarity
pub fn is_parallel(similarity: f64, threshold: f64) -> bool {
    similarity.abs() >= threshold
}

/// Globally nearest anchor point; ties keep the first found
pub fn nearest_anchor(anchors: &[AnchorPair], position: Point) -> Option<AnchorMatch> {
    let mut best: Option<(f64, AnchorMatch)> = None;

    for pair in anchors {
        let candidates = [
            (pair.point_a, pair.id_a, pair.id_b),
            (pair.point_b, pair.id_b, pair.id_a),
        ];
        for (point, matched_id, board_id) in candidates {
            let d = position.distance_sq(&point);
            if best.map_or(true, |(min, _)| d < min) {
                best = Some((
                    d,
                    AnchorMatch {
                        matched_id,
                        matched_point: point,
                        board_id,
                    },
                ));
            }
        }
    }

    best.map(|(_, m)| m)
}

/// RiskEngine instance
pub struct RiskEngine {
    calibration: Arc<Calibration>,
    config: RiskConfig,
}

impl RiskEngine {
    /// Create new RiskEngine over loaded calibration geometry
    pub fn new(calibration: Arc<Calibration>, config: RiskConfig) -> Self {
        Self {
            calibration,
            config,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Analyze a confirmed pedestrian crossing against the tracked vehicles
    ///
    /// `human_id` is carried for logging only. Returns one decision per
    /// qualifying vehicle; an unknown rule line yields none.
    pub fn analyze(&self, human_id: i64, rule_name: &str, tracks: &[VehicleTrack]) -> Vec<AlertDecision> {
        tracing::debug!(human_id, rule_name = %rule_name, "Analyzing risk");

        let Some(rule_line) = self.calibration.rule_line(rule_name) else {
            tracing::debug!(rule_name = %rule_name, "RuleName not found in predefined lines");
            return Vec::new();
        };
        let line_vector = rule_line.vector();

        if tracks.is_empty() {
            tracing::debug!("No vehicles tracked, nothing to analyze");
            return Vec::new();
        }

        let decisions: Vec<AlertDecision> = tracks
            .iter()
            .filter_map(|track| match self.assess_vehicle(human_id, rule_name, line_vector, track) {
                VehicleVerdict::Alert(decision) => Some(decision),
                _ => None,
            })
            .collect();

        if decisions.is_empty() {
            tracing::debug!(
                human_id,
                vehicles = tracks.len(),
                "No vehicle satisfies approach and parallelism"
            );
        }

        decisions
    }

    /// Run the approach and parallelism tests for one vehicle
    pub fn assess_vehicle(
        &self,
        human_id: i64,
        rule_name: &str,
        line_vector: Point,
        track: &VehicleTrack,
    ) -> VehicleVerdict {
        let vehicle_id = track.vehicle_id;
        let (Some(oldest), Some(newest)) = (track.oldest(), track.newest()) else {
            return VehicleVerdict::InsufficientHistory;
        };
        if track.history.len() < 2 {
            tracing::debug!(vehicle_id, "Insufficient history, skipping");
            return VehicleVerdict::InsufficientHistory;
        }

        let Some(anchor) = nearest_anchor(self.calibration.anchors(), oldest) else {
            return VehicleVerdict::NoAnchor;
        };

        let center = self.calibration.center();
        let dist_old = oldest.distance_to(&center);
        let dist_new = newest.distance_to(&center);

        tracing::debug!(
            vehicle_id,
            matched_id = anchor.matched_id,
            board_id = anchor.board_id,
            dist_old,
            dist_new,
            "Vehicle distance to reference center"
        );

        if !is_approaching(dist_old, dist_new, self.config.approach_threshold) {
            tracing::debug!(
                vehicle_id,
                threshold = self.config.approach_threshold,
                "Not approaching reference center enough"
            );
            return VehicleVerdict::NotApproaching { dist_old, dist_new };
        }

        let vehicle_vector = center - anchor.matched_point;
        let similarity = cosine_similarity(vehicle_vector, line_vector);

        if !is_parallel(similarity, self.config.parallelism_threshold) {
            tracing::debug!(
                vehicle_id,
                similarity,
                threshold = self.config.parallelism_threshold,
                "Cosine similarity not high enough"
            );
            return VehicleVerdict::NotParallel { similarity };
        }

        tracing::info!(
            vehicle_id,
            human_id,
            board_id = anchor.board_id,
            similarity,
            "Vehicle approaching crossing pedestrian from the side"
        );

        VehicleVerdict::Alert(AlertDecision {
            vehicle_id,
            human_id,
            rule_name: rule_name.to_string(),
            board_id: anchor.board_id,
            matched_id: anchor.matched_id,
            similarity,
            dist_old,
            dist_new,
        })
    }
}
