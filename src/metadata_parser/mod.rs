//! MetadataParser - ONVIF analytics metadata block extraction
//!
//! ## Responsibilities
//!
//! - Classify a completed `<tt:MetadataStream>` block (frame / event / both)
//! - Extract object detections (id, class, center of gravity)
//! - Extract line-crossing events (ObjectId, RuleName, State)
//! - Lookups used by the frame cache (object mention, object class, frame time)
//!
//! Parsing never fails: a block without matching records yields an empty result.

use crate::models::{Detection, LineCrossingEvent, ObjectKind, Point};
use regex::Regex;
use std::sync::LazyLock;

/// End-of-block marker in the metadata stream
pub const BLOCK_TERMINATOR: &str = "</tt:MetadataStream>";

/// Topic marker of line-crossing events
const LINE_CROSSING_TOPIC: &str = "LineCrossing";

static OBJECT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:Object ObjectId="(\d+)"[^>]*>([\s\S]*?)</tt:Object>"#)
        .expect("valid object block regex")
});

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<tt:Type[^>]*>([^<]*)</tt:Type>").expect("valid type regex")
});

static COG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:CenterOfGravity[^>]*?x="(-?[\d.]+)"\s+y="(-?[\d.]+)""#)
        .expect("valid center of gravity regex")
});

static TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<wsnt:Topic[^>]*>([^<]*)</wsnt:Topic>").expect("valid topic regex")
});

static EVENT_OBJECT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:SimpleItem Name="ObjectId" Value="(\d+)"\s*/>"#)
        .expect("valid ObjectId regex")
});

static RULE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:SimpleItem Name="RuleName" Value="([^"]+)"\s*/>"#)
        .expect("valid RuleName regex")
});

static STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:SimpleItem Name="State" Value="(true|false)""#).expect("valid State regex")
});

static FRAME_UTC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tt:Frame[^>]*UtcTime="([^"]+)"[^>]*>"#).expect("valid frame time regex")
});

/// Everything extracted from one block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBlock {
    /// Block carries an analytics frame
    pub is_frame: bool,
    /// Detections (only populated for frame blocks)
    pub detections: Vec<Detection>,
    /// Line-crossing event, if the block is a complete one
    pub event: Option<LineCrossingEvent>,
}

/// Run both extraction passes over a completed block
pub fn parse_block(block: &str) -> ParsedBlock {
    let is_frame = is_frame_block(block);
    let detections = if is_frame {
        extract_detections(block)
    } else {
        Vec::new()
    };

    ParsedBlock {
        is_frame,
        detections,
        event: extract_line_crossing(block),
    }
}

/// Check whether the block carries a VideoAnalytics frame
pub fn is_frame_block(block: &str) -> bool {
    block.contains("<tt:VideoAnalytics>") && block.contains("<tt:Frame")
}

/// Extract all object detections with a class label and center of gravity
pub fn extract_detections(block: &str) -> Vec<Detection> {
    let mut detections = Vec::new();

    for caps in OBJECT_BLOCK_RE.captures_iter(block) {
        let Ok(object_id) = caps[1].parse::<i64>() else {
            continue;
        };
        let content = &caps[2];

        let Some(type_caps) = TYPE_RE.captures(content) else {
            tracing::trace!(object_id, "Object without type label");
            continue;
        };
        let kind = ObjectKind::from_label(&type_caps[1]);

        let Some(cog) = COG_RE.captures(content).and_then(|c| {
            let x = c[1].parse::<f64>().ok()?;
            let y = c[2].parse::<f64>().ok()?;
            Some(Point::new(x, y))
        }) else {
            tracing::trace!(object_id, "Object without center of gravity");
            continue;
        };

        detections.push(Detection {
            object_id,
            kind,
            cog,
        });
    }

    if detections.is_empty() {
        tracing::debug!("No object records in block");
    }

    detections
}

/// Extract a line-crossing event
///
/// Requires a LineCrossing topic and all of ObjectId, RuleName and State;
/// a partial event is reported as `None`.
pub fn extract_line_crossing(block: &str) -> Option<LineCrossingEvent> {
    let topic = TOPIC_RE.captures(block)?;
    if !topic[1].contains(LINE_CROSSING_TOPIC) {
        return None;
    }

    let object_id = EVENT_OBJECT_ID_RE
        .captures(block)
        .and_then(|c| c[1].parse::<i64>().ok());
    let rule_name = RULE_NAME_RE.captures(block).map(|c| c[1].to_string());
    let state = STATE_RE.captures(block).map(|c| &c[1] == "true");

    match (object_id, rule_name, state) {
        (Some(object_id), Some(rule_name), Some(state)) => {
            tracing::debug!(object_id, rule_name = %rule_name, state, "LineCrossing event");
            Some(LineCrossingEvent {
                object_id,
                rule_name,
                state,
            })
        }
        (object_id, rule_name, state) => {
            tracing::debug!(
                has_object_id = object_id.is_some(),
                has_rule_name = rule_name.is_some(),
                has_state = state.is_some(),
                "Incomplete LineCrossing event ignored"
            );
            None
        }
    }
}

/// Class of the given object in this block, if it is listed with a type
pub fn object_kind(block: &str, object_id: i64) -> Option<ObjectKind> {
    OBJECT_BLOCK_RE
        .captures_iter(block)
        .filter(|caps| caps[1].parse::<i64>().ok() == Some(object_id))
        .find_map(|caps| {
            TYPE_RE
                .captures(&caps[2])
                .map(|t| ObjectKind::from_label(&t[1]))
        })
}

/// Whether an object record with this id appears anywhere in the block
pub fn mentions_object(block: &str, object_id: i64) -> bool {
    block.contains(&format!("<tt:Object ObjectId=\"{}\"", object_id))
}

/// UtcTime attribute of the block's analytics frame
pub fn frame_utc_time(block: &str) -> Option<String> {
    FRAME_UTC_RE.captures(block).map(|c| c[1].to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_frame_block_detections() {
        let block = frame(
            "2025-06-01T03:00:00.000Z",
            &[
                object(3, "Vehicle", 100.5, 200.0),
                object(4, "Human", 10.0, 20.0),
                object(5, "car", 1.0, 2.0),
            ],
        );

        let parsed = parse_block(&block);
        assert!(parsed.is_frame);
        assert!(parsed.event.is_none());
        assert_eq!(parsed.detections.len(), 3);
        assert_eq!(parsed.detections[0].object_id, 3);
        assert_eq!(parsed.detections[0].kind, ObjectKind::Vehicle);
        assert_eq!(parsed.detections[0].cog, Point::new(100.5, 200.0));
        assert_eq!(parsed.detections[1].kind, ObjectKind::Human);
        assert_eq!(parsed.detections[2].kind, ObjectKind::Vehicle);
    }

    #[test]
    fn test_object_without_cog_is_skipped() {
        let block = frame(
            "2025-06-01T03:00:00.000Z",
            &[r#"<tt:Object ObjectId="9"><tt:Type>Vehicle</tt:Type></tt:Object>"#.to_string()],
        );
        assert!(extract_detections(&block).is_empty());
    }

    #[test]
    fn test_non_frame_block_yields_nothing() {
        let parsed = parse_block("<tt:MetadataStream></tt:MetadataStream>");
        assert_eq!(parsed, ParsedBlock::default());
    }

    #[test]
    fn test_line_crossing_event() {
        let block = line_crossing(7, "Crosswalk-North", true);
        let parsed = parse_block(&block);
        assert!(!parsed.is_frame);
        assert_eq!(
            parsed.event,
            Some(LineCrossingEvent {
                object_id: 7,
                rule_name: "Crosswalk-North".to_string(),
                state: true,
            })
        );

        let released = extract_line_crossing(&line_crossing(7, "Crosswalk-North", false));
        assert_eq!(released.map(|e| e.state), Some(false));
    }

    #[test]
    fn test_partial_event_is_rejected() {
        let block = line_crossing(7, "L1", true).replace("Name=\"RuleName\"", "Name=\"Other\"");
        assert!(extract_line_crossing(&block).is_none());

        let other_topic = line_crossing(7, "L1", true).replace("LineCrossing", "Motion");
        assert!(extract_line_crossing(&other_topic).is_none());
    }

    #[test]
    fn test_object_lookups() {
        let block = frame(
            "2025-06-01T03:00:01.500Z",
            &[object(12, "Human", 1.0, 1.0), object(120, "Vehicle", 2.0, 2.0)],
        );

        assert_eq!(object_kind(&block, 12), Some(ObjectKind::Human));
        assert_eq!(object_kind(&block, 120), Some(ObjectKind::Vehicle));
        assert_eq!(object_kind(&block, 1), None);
        assert!(mentions_object(&block, 12));
        assert!(!mentions_object(&block, 1));
        assert_eq!(
            frame_utc_time(&block).as_deref(),
            Some("2025-06-01T03:00:01.500Z")
        );
    }
}
