//! Calibration - Anchor Geometry and Rule Lines
//!
//! ## Responsibilities
//!
//! - Load anchor pairs and rule lines from the persistence store, once, at startup
//! - Scale stored analytics-resolution coordinates to working resolution
//! - Derive the reference center from the first two anchor pairs
//! - Enforce the startup precondition (both sets non-empty)
//!
//! The loaded geometry is immutable and shared without locking.

mod repository;

pub use repository::{AnchorPairRow, CalibrationRepository, RuleLineRow, MAX_RULE_LINES};

use crate::error::{Error, Result};
use crate::models::{AnchorPair, Point, RuleLine, ScaleFactor};
use std::collections::HashMap;

/// Determinant magnitude below which two lines are treated as parallel
const PARALLEL_EPSILON: f64 = 1e-5;

/// Immutable calibration geometry
#[derive(Debug, Clone)]
pub struct Calibration {
    anchors: Vec<AnchorPair>,
    center: Point,
    rule_lines: HashMap<String, RuleLine>,
}

impl Calibration {
    /// Build geometry from already-scaled anchors and rule lines
    pub fn new(anchors: Vec<AnchorPair>, rule_lines: Vec<RuleLine>) -> Self {
        let center = reference_center(&anchors);
        let rule_lines = rule_lines
            .into_iter()
            .map(|line| (line.name.clone(), line))
            .collect();

        Self {
            anchors,
            center,
            rule_lines,
        }
    }

    /// Build geometry from stored rows, applying the resolution scale
    pub fn from_rows(
        anchor_rows: &[AnchorPairRow],
        line_rows: &[RuleLineRow],
        scale: ScaleFactor,
    ) -> Self {
        let anchors: Vec<AnchorPair> = anchor_rows
            .iter()
            .map(|row| {
                let pair = AnchorPair {
                    id_a: row.id_a,
                    point_a: Point::new(row.x_a as f64, row.y_a as f64).scaled(&scale),
                    id_b: row.id_b,
                    point_b: Point::new(row.x_b as f64, row.y_b as f64).scaled(&scale),
                };
                tracing::debug!(
                    id_a = pair.id_a,
                    id_b = pair.id_b,
                    a_x = pair.point_a.x,
                    a_y = pair.point_a.y,
                    b_x = pair.point_b.x,
                    b_y = pair.point_b.y,
                    "Loaded anchor pair"
                );
                pair
            })
            .collect();

        let rule_lines: Vec<RuleLine> = line_rows
            .iter()
            .map(|row| {
                let line = RuleLine {
                    name: row.name.clone(),
                    start: Point::new(row.x1 as f64, row.y1 as f64).scaled(&scale),
                    end: Point::new(row.x2 as f64, row.y2 as f64).scaled(&scale),
                    mode: row.mode.clone().unwrap_or_default(),
                };
                tracing::debug!(
                    name = %line.name,
                    start_x = line.start.x,
                    start_y = line.start.y,
                    end_x = line.end.x,
                    end_y = line.end.y,
                    mode = %line.mode,
                    "Loaded rule line (scaled)"
                );
                line
            })
            .collect();

        Self::new(anchors, rule_lines)
    }

    /// Load from the store and check the startup precondition
    pub async fn load(repo: &CalibrationRepository, scale: ScaleFactor) -> Result<Self> {
        tracing::info!(scale_x = scale.x, scale_y = scale.y, "Loading calibration geometry");

        repo.ensure_tables().await?;
        let anchor_rows = repo.get_anchor_pairs().await?;
        let line_rows = repo.get_rule_lines().await?;

        let calibration = Self::from_rows(&anchor_rows, &line_rows, scale).validate()?;

        tracing::info!(
            anchor_pairs = calibration.anchors.len(),
            rule_lines = calibration.rule_lines.len(),
            center_x = calibration.center.x,
            center_y = calibration.center.y,
            "Calibration loaded"
        );

        Ok(calibration)
    }

    /// Fail if either anchor pairs or rule lines are missing
    pub fn validate(self) -> Result<Self> {
        if self.anchors.is_empty() {
            return Err(Error::Calibration(
                "no anchor pairs found in 'baseLines'".to_string(),
            ));
        }
        if self.rule_lines.is_empty() {
            return Err(Error::Calibration("no rule lines found in 'lines'".to_string()));
        }
        Ok(self)
    }

    pub fn anchors(&self) -> &[AnchorPair] {
        &self.anchors
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn rule_line(&self, name: &str) -> Option<&RuleLine> {
        self.rule_lines.get(name)
    }

}

/// Intersection of line a1-a2 with line b1-b2, `None` when parallel
pub fn line_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let a_1 = a2.y - a1.y;
    let b_1 = a1.x - a2.x;
    let c_1 = a_1 * a1.x + b_1 * a1.y;

    let a_2 = b2.y - b1.y;
    let b_2 = b1.x - b2.x;
    let c_2 = a_2 * b1.x + b_2 * b1.y;

    let det = a_1 * b_2 - a_2 * b_1;
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }

    Some(Point::new(
        (b_2 * c_1 - b_1 * c_2) / det,
        (a_1 * c_2 - a_2 * c_1) / det,
    ))
}

/// Reference center derived from anchor geometry
///
/// Two or more pairs: intersection of the lines through pair 0 and pair 1,
/// falling back to pair 0's midpoint when they are parallel. One pair: its
/// midpoint. None: the origin.
pub fn reference_center(anchors: &[AnchorPair]) -> Point {
    match anchors {
        [first, second, ..] => line_intersection(
            first.point_a,
            first.point_b,
            second.point_a,
            second.point_b,
        )
        .unwrap_or_else(|| {
            tracing::debug!("First two anchor lines are parallel, using midpoint of pair 0");
            first.point_a.midpoint(&first.point_b)
        }),
        [only] => only.point_a.midpoint(&only.point_b),
        [] => {
            tracing::warn!("No anchor pairs found, reference center = (0, 0)");
            Point::ORIGIN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn pair(id_a: i64, a: (f64, f64), id_b: i64, b: (f64, f64)) -> AnchorPair {
        AnchorPair {
            id_a,
            point_a: Point::new(a.0, a.1),
            id_b,
            point_b: Point::new(b.0, b.1),
        }
    }

    fn line(name: &str, x1: i64, y1: i64, x2: i64, y2: i64) -> RuleLineRow {
        RuleLineRow {
            x1,
            y1,
            x2,
            y2,
            name: name.to_string(),
            mode: Some("BothDirections".to_string()),
        }
    }

    async fn memory_repo() -> CalibrationRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = CalibrationRepository::new(pool);
        repo.ensure_tables().await.unwrap();
        repo
    }

    #[test]
    fn test_crossing_pairs_intersect() {
        let anchors = vec![
            pair(1, (0.0, 0.0), 2, (10.0, 10.0)),
            pair(3, (0.0, 10.0), 4, (10.0, 0.0)),
        ];
        assert_eq!(reference_center(&anchors), Point::new(5.0, 5.0));
    }

    #[test]
    fn test_parallel_pairs_fall_back_to_first_midpoint() {
        // Both lines horizontal (y = 0 and y = 10): determinant is zero
        let anchors = vec![
            pair(1, (0.0, 0.0), 2, (10.0, 0.0)),
            pair(3, (0.0, 10.0), 4, (10.0, 10.0)),
        ];
        assert!(line_intersection(
            anchors[0].point_a,
            anchors[0].point_b,
            anchors[1].point_a,
            anchors[1].point_b
        )
        .is_none());
        assert_eq!(reference_center(&anchors), Point::new(5.0, 0.0));
    }

    #[test]
    fn test_single_and_empty_anchor_sets() {
        let single = vec![pair(1, (2.0, 4.0), 2, (6.0, 8.0))];
        assert_eq!(reference_center(&single), Point::new(4.0, 6.0));
        assert_eq!(reference_center(&[]), Point::ORIGIN);
    }

    #[test]
    fn test_rows_are_scaled_on_load() {
        let rows = vec![AnchorPairRow {
            id_a: 1,
            x_a: 10,
            y_a: 20,
            id_b: 2,
            x_b: 30,
            y_b: 40,
        }];
        let lines = vec![line("L1", 0, 0, 100, 50)];

        let calibration = Calibration::from_rows(&rows, &lines, ScaleFactor::WORKING_TO_ANALYTICS);
        let anchor = calibration.anchors()[0];
        assert_eq!(anchor.point_a, Point::new(40.0, 80.0));
        assert_eq!(anchor.point_b, Point::new(120.0, 160.0));
        assert_eq!(calibration.center(), Point::new(80.0, 120.0));

        let rule = calibration.rule_line("L1").unwrap();
        assert_eq!(rule.end, Point::new(400.0, 200.0));
        assert_eq!(rule.mode, "BothDirections");
    }

    #[test]
    fn test_unaddressable_board_ids_keep_their_geometry() {
        // Board 9 has no destination bit, but pair 0 still defines the center
        let rows = vec![
            AnchorPairRow { id_a: 9, x_a: 0, y_a: 0, id_b: 2, x_b: 10, y_b: 10 },
            AnchorPairRow { id_a: 3, x_a: 0, y_a: 10, id_b: 4, x_b: 10, y_b: 0 },
            AnchorPairRow { id_a: 5, x_a: 0, y_a: 20, id_b: 6, x_b: 10, y_b: 20 },
        ];
        let calibration = Calibration::from_rows(&rows, &[], ScaleFactor::IDENTITY);
        assert_eq!(calibration.anchors().len(), 3);
        assert_eq!(calibration.anchors()[0].id_a, 9);
        assert_eq!(calibration.center(), Point::new(5.0, 5.0));
    }

    #[test]
    fn test_validate_requires_both_sets() {
        let no_lines = Calibration::new(vec![pair(1, (0.0, 0.0), 2, (1.0, 1.0))], vec![]);
        assert!(matches!(no_lines.validate(), Err(Error::Calibration(_))));

        let no_anchors = Calibration::from_rows(&[], &[line("L1", 0, 0, 1, 1)], ScaleFactor::IDENTITY);
        assert!(matches!(no_anchors.validate(), Err(Error::Calibration(_))));
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let repo = memory_repo().await;
        repo.insert_anchor_pair(&AnchorPairRow {
            id_a: 1,
            x_a: 0,
            y_a: 0,
            id_b: 2,
            x_b: 10,
            y_b: 10,
        })
        .await
        .unwrap();
        repo.insert_anchor_pair(&AnchorPairRow {
            id_a: 3,
            x_a: 0,
            y_a: 10,
            id_b: 4,
            x_b: 10,
            y_b: 0,
        })
        .await
        .unwrap();
        repo.insert_rule_line(1, &line("Crosswalk", 0, 0, 10, 0)).await.unwrap();

        let calibration = Calibration::load(&repo, ScaleFactor::IDENTITY).await.unwrap();
        assert_eq!(calibration.anchors().len(), 2);
        assert_eq!(calibration.center(), Point::new(5.0, 5.0));
        assert!(calibration.rule_line("Crosswalk").is_some());
    }

    #[tokio::test]
    async fn test_empty_store_is_fatal() {
        let repo = memory_repo().await;
        let result = Calibration::load(&repo, ScaleFactor::IDENTITY).await;
        assert!(matches!(result, Err(Error::Calibration(_))));
    }

    #[tokio::test]
    async fn test_rule_lines_are_limited() {
        let repo = memory_repo().await;
        for i in 0..(MAX_RULE_LINES + 2) {
            repo.insert_rule_line(i, &line(&format!("L{}", i), 0, 0, 1, 1))
                .await
                .unwrap();
        }
        assert_eq!(repo.get_rule_lines().await.unwrap().len() as i64, MAX_RULE_LINES);
    }
}
