//! FrameCache - Recent Analytics Frames for Dropout Debounce
//!
//! ## Responsibilities
//!
//! - Keep the most recent raw frame blocks (capped FIFO, oldest evicted first)
//! - Answer "was this object seen in any recent frame" for trajectory eviction
//! - Confirm an event subject as human, most-recent frame first

use crate::metadata_parser;
use crate::models::ObjectKind;
use std::collections::VecDeque;

/// Default number of frames held
pub const DEFAULT_FRAME_CACHE_SIZE: usize = 15;

/// Ring buffer of raw frame blocks
#[derive(Debug, Clone)]
pub struct FrameCache {
    frames: VecDeque<String>,
    capacity: usize,
}

/// Frame in which an object was confirmed human
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanSighting {
    /// UtcTime of the confirming frame (empty if the frame had none)
    pub utc_time: String,
}

impl FrameCache {
    /// Create new FrameCache holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame block, evicting the oldest when full
    pub fn push(&mut self, block: String) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(block);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether any cached frame mentions the object
    pub fn contains_object(&self, object_id: i64) -> bool {
        self.frames
            .iter()
            .any(|frame| metadata_parser::mentions_object(frame, object_id))
    }

    /// Scan newest to oldest for a frame listing the object as Human
    pub fn find_human(&self, object_id: i64) -> Option<HumanSighting> {
        self.frames
            .iter()
            .rev()
            .find(|frame| metadata_parser::object_kind(frame, object_id) == Some(ObjectKind::Human))
            .map(|frame| HumanSighting {
                utc_time: metadata_parser::frame_utc_time(frame).unwrap_or_default(),
            })
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CACHE_SIZE)
    }
}
