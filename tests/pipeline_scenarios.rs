//! End-to-end pipeline scenarios over synthetic ONVIF metadata

use crosswatch::calibration::{AnchorPairRow, Calibration, CalibrationRepository, RuleLineRow};
use crosswatch::ingestion::{EventOutcome, MonitorPipeline, MonitorState, RunSummary};
use crosswatch::models::ScaleFactor;
use crosswatch::risk_engine::{AlertDecision, AlertResponder, RiskConfig, RiskEngine};
use crosswatch::Error;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingResponder {
    alerts: Mutex<Vec<(AlertDecision, String)>>,
}

impl RecordingResponder {
    fn boards(&self) -> Vec<i64> {
        self.alerts.lock().unwrap().iter().map(|(d, _)| d.board_id).collect()
    }
}

impl AlertResponder for RecordingResponder {
    async fn respond(&self, decision: &AlertDecision, timestamp: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((decision.clone(), timestamp.to_string()));
    }
}

fn object(id: i64, label: &str, x: f64, y: f64) -> String {
    format!(
        r#"<tt:Object ObjectId="{id}">
<tt:Appearance><tt:Shape>
<tt:CenterOfGravity x="{x}" y="{y}"/>
</tt:Shape>
<tt:Class><tt:Type Likelihood="0.80">{label}</tt:Type></tt:Class>
</tt:Appearance>
</tt:Object>
"#
    )
}

fn frame(utc: &str, objects: &[String]) -> String {
    format!(
        r#"<tt:MetadataStream xmlns:tt="http://www.onvif.org/ver10/schema">
<tt:VideoAnalytics>
<tt:Frame UtcTime="{utc}">
{}</tt:Frame>
</tt:VideoAnalytics>
</tt:MetadataStream>
"#,
        objects.concat()
    )
}

fn line_crossing(object_id: i64, rule: &str, state: bool) -> String {
    format!(
        r#"<tt:MetadataStream xmlns:tt="http://www.onvif.org/ver10/schema">
<tt:Event><wsnt:NotificationMessage>
<wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">tns1:RuleEngine/LineDetector/LineCrossing</wsnt:Topic>
<wsnt:Message><tt:Message UtcTime="2025-06-01T03:00:09.000Z">
<tt:Source><tt:SimpleItem Name="RuleName" Value="{rule}"/></tt:Source>
<tt:Data>
<tt:SimpleItem Name="ObjectId" Value="{object_id}"/>
<tt:SimpleItem Name="State" Value="{state}"/>
</tt:Data>
</tt:Message></wsnt:Message>
</wsnt:NotificationMessage></tt:Event>
</tt:MetadataStream>
"#
    )
}

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Cross-shaped anchors stored at analytics resolution
///
/// After the x4 scale: pair (0,4)-(40,4) and pair (20,0)-(20,40), center (20,4),
/// rule line "Crosswalk" along y = 4.
async fn seeded_calibration(pool: &SqlitePool) -> Calibration {
    let repo = CalibrationRepository::new(pool.clone());
    repo.ensure_tables().await.unwrap();
    repo.insert_anchor_pair(&AnchorPairRow {
        id_a: 1,
        x_a: 0,
        y_a: 1,
        id_b: 2,
        x_b: 10,
        y_b: 1,
    })
    .await
    .unwrap();
    repo.insert_anchor_pair(&AnchorPairRow {
        id_a: 3,
        x_a: 5,
        y_a: 0,
        id_b: 4,
        x_b: 5,
        y_b: 10,
    })
    .await
    .unwrap();
    repo.insert_rule_line(
        0,
        &RuleLineRow {
            x1: 0,
            y1: 1,
            x2: 10,
            y2: 1,
            name: "Crosswalk".to_string(),
            mode: Some("BothDirection".to_string()),
        },
    )
    .await
    .unwrap();

    Calibration::load(&repo, ScaleFactor::WORKING_TO_ANALYTICS)
        .await
        .unwrap()
}

async fn pipeline(frame_cache_size: usize) -> MonitorPipeline<RecordingResponder> {
    let pool = memory_pool().await;
    let calibration = seeded_calibration(&pool).await;
    let engine = Arc::new(RiskEngine::new(Arc::new(calibration), RiskConfig::default()));
    MonitorPipeline::new(
        MonitorState::new(frame_cache_size, 10),
        engine,
        RecordingResponder::default(),
    )
}

#[tokio::test]
async fn test_side_approach_raises_alert_on_partner_board() {
    let pipeline = pipeline(15).await;

    let mut stream = String::new();
    for (i, x) in [-100.0, -60.0, -20.0].iter().enumerate() {
        stream.push_str(&frame(
            &format!("2025-06-01T03:00:0{}.000Z", i),
            &[object(11, "Vehical", *x, 4.0), object(30, "Human", 20.0, 10.0)],
        ));
    }
    stream.push_str(&line_crossing(30, "Crosswalk", true));

    let summary = pipeline.run(stream.as_bytes()).await;
    assert_eq!(summary, RunSummary { blocks: 4, alerts: 1 });

    let alerts = pipeline.responder().alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    let (decision, timestamp) = &alerts[0];
    assert_eq!(decision.vehicle_id, 11);
    assert_eq!(decision.human_id, 30);
    assert_eq!(decision.matched_id, 1);
    assert_eq!(decision.board_id, 2);
    assert_eq!(decision.dist_old, 120.0);
    assert_eq!(decision.dist_new, 40.0);
    // Timestamp comes from the newest frame listing the human
    assert_eq!(timestamp, "2025-06-01T03:00:02.000Z");
}

#[tokio::test]
async fn test_head_on_approach_is_not_parallel() {
    let pipeline = pipeline(15).await;

    pipeline
        .process_block(&frame(
            "2025-06-01T03:00:00.000Z",
            &[object(12, "Car", 20.0, 200.0), object(30, "Human", 20.0, 10.0)],
        ))
        .await;
    pipeline
        .process_block(&frame(
            "2025-06-01T03:00:01.000Z",
            &[object(12, "Car", 20.0, 100.0), object(30, "Human", 20.0, 10.0)],
        ))
        .await;

    let outcome = pipeline.process_block(&line_crossing(30, "Crosswalk", true)).await;
    assert_eq!(outcome.event, Some(EventOutcome::Analyzed { alerts: 0 }));
    assert!(pipeline.responder().boards().is_empty());
}

#[tokio::test]
async fn test_vehicle_crossing_event_is_not_a_pedestrian() {
    let pipeline = pipeline(15).await;

    for (i, x) in [-100.0, -20.0].iter().enumerate() {
        pipeline
            .process_block(&frame(
                &format!("2025-06-01T03:00:0{}.000Z", i),
                &[object(11, "Vehicle", *x, 4.0)],
            ))
            .await;
    }

    let outcome = pipeline.process_block(&line_crossing(11, "Crosswalk", true)).await;
    assert_eq!(outcome.event, Some(EventOutcome::NotHuman { object_id: 11 }));
    assert!(pipeline.responder().boards().is_empty());
}

#[tokio::test]
async fn test_unknown_rule_line_raises_nothing() {
    let pipeline = pipeline(15).await;

    for (i, x) in [-100.0, -20.0].iter().enumerate() {
        pipeline
            .process_block(&frame(
                &format!("2025-06-01T03:00:0{}.000Z", i),
                &[object(11, "Vehicle", *x, 4.0), object(30, "Human", 20.0, 10.0)],
            ))
            .await;
    }

    let outcome = pipeline.process_block(&line_crossing(30, "Sidewalk", true)).await;
    assert_eq!(outcome.event, Some(EventOutcome::Analyzed { alerts: 0 }));
}

#[tokio::test]
async fn test_dropout_is_debounced_by_frame_cache() {
    let pipeline = pipeline(3).await;

    pipeline
        .process_block(&frame("2025-06-01T03:00:00.000Z", &[object(11, "Vehicle", -100.0, 4.0)]))
        .await;

    // Two empty frames: vehicle 11 is still in the cached window
    for i in 1..3 {
        pipeline
            .process_block(&frame(&format!("2025-06-01T03:00:0{}.000Z", i), &[]))
            .await;
        assert_eq!(pipeline.tracks().len(), 1);
    }

    // Third empty frame pushes the last sighting out of the cache
    let outcome = pipeline
        .process_block(&frame("2025-06-01T03:00:03.000Z", &[]))
        .await;
    assert_eq!(outcome.frame.map(|s| s.evicted), Some(vec![11]));
    assert!(pipeline.tracks().is_empty());
}

#[tokio::test]
async fn test_empty_calibration_is_fatal() {
    let pool = memory_pool().await;
    let repo = CalibrationRepository::new(pool);

    let result = Calibration::load(&repo, ScaleFactor::WORKING_TO_ANALYTICS).await;
    assert!(matches!(result, Err(Error::Calibration(_))));
}
