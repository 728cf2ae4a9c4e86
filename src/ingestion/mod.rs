//! Ingestion - Metadata Stream to Alert Pipeline
//!
//! ## Responsibilities
//!
//! - Spawn the ffmpeg metadata transport (`-map 0:1 -f data -`)
//! - Accumulate lines into blocks ending at `</tt:MetadataStream>`
//! - Per block: frame cache + trajectory update under the state lock,
//!   then human confirmation and risk analysis on a snapshot
//! - Await each alert response before reading the next block
//!
//! ## Locking
//!
//! `MonitorState` sits behind a plain mutex that is held only while the
//! cache and store are mutated; analysis and actuation run unlocked.

use crate::error::{Error, Result};
use crate::frame_cache::{FrameCache, HumanSighting};
use crate::metadata_parser::{self, BLOCK_TERMINATOR};
use crate::models::LineCrossingEvent;
use crate::risk_engine::{AlertResponder, RiskEngine};
use crate::trajectory_store::{TrajectoryStore, UpdateSummary, VehicleTrack};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// Joins transport lines into complete metadata blocks
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    buffer: String,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; returns the block once the terminator has arrived
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        if self.buffer.contains(BLOCK_TERMINATOR) {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Bytes held for the block in progress
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// ffmpeg process streaming the camera's metadata track
pub struct MetadataSource {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl MetadataSource {
    /// Spawn ffmpeg against the RTSP stream
    pub fn spawn(rtsp_url: &str) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-i", rtsp_url, "-map", "0:1", "-f", "data", "-loglevel", "error", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;

        tracing::info!(pid = ?child.id(), "Metadata stream started");

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
        })
    }

    pub fn reader(&mut self) -> &mut BufReader<ChildStdout> {
        &mut self.reader
    }

    /// Stop ffmpeg
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
    }
}

/// Mutable engine state guarded by the pipeline lock
#[derive(Debug)]
pub struct MonitorState {
    pub frame_cache: FrameCache,
    pub store: TrajectoryStore,
}

impl MonitorState {
    pub fn new(frame_cache_size: usize, history_size: usize) -> Self {
        Self {
            frame_cache: FrameCache::new(frame_cache_size),
            store: TrajectoryStore::new(history_size),
        }
    }
}

/// What happened to the line-crossing event of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// `State="false"`
    Inactive,
    /// Subject not listed as Human in any cached frame
    NotHuman { object_id: i64 },
    /// Risk analysis ran; number of alerts raised
    Analyzed { alerts: usize },
}

/// Result of processing one block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockOutcome {
    pub frame: Option<UpdateSummary>,
    pub event: Option<EventOutcome>,
}

/// Totals for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: usize,
    pub alerts: usize,
}

/// Work left for after the lock is released
struct ConfirmedCrossing {
    event: LineCrossingEvent,
    sighting: HumanSighting,
    tracks: Vec<VehicleTrack>,
}

/// MonitorPipeline instance
pub struct MonitorPipeline<R: AlertResponder> {
    state: Mutex<MonitorState>,
    engine: Arc<RiskEngine>,
    responder: R,
}

impl<R: AlertResponder> MonitorPipeline<R> {
    /// Create new MonitorPipeline
    pub fn new(state: MonitorState, engine: Arc<RiskEngine>, responder: R) -> Self {
        Self {
            state: Mutex::new(state),
            engine,
            responder,
        }
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    /// Copy of the tracked trajectories
    pub fn tracks(&self) -> Vec<VehicleTrack> {
        self.lock_state().store.snapshot()
    }

    pub fn cached_frames(&self) -> usize {
        self.lock_state().frame_cache.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process one complete metadata block
    pub async fn process_block(&self, block: &str) -> BlockOutcome {
        let parsed = metadata_parser::parse_block(block);
        let mut outcome = BlockOutcome::default();

        let confirmed = {
            let mut guard = self.lock_state();
            let state = &mut *guard;

            if parsed.is_frame {
                state.frame_cache.push(block.to_string());
                outcome.frame = Some(state.store.update(&parsed.detections, &state.frame_cache));
            }

            match parsed.event {
                Some(event) if event.state => match state.frame_cache.find_human(event.object_id) {
                    Some(sighting) => Some(ConfirmedCrossing {
                        event,
                        sighting,
                        tracks: state.store.snapshot(),
                    }),
                    None => {
                        tracing::debug!(
                            object_id = event.object_id,
                            "Line crossed, but object not identified as human in recent frames"
                        );
                        outcome.event = Some(EventOutcome::NotHuman {
                            object_id: event.object_id,
                        });
                        None
                    }
                },
                Some(_) => {
                    outcome.event = Some(EventOutcome::Inactive);
                    None
                }
                None => None,
            }
        };

        if let Some(crossing) = confirmed {
            let ConfirmedCrossing {
                event,
                sighting,
                tracks,
            } = crossing;

            tracing::info!(
                human_id = event.object_id,
                rule_name = %event.rule_name,
                utc_time = %sighting.utc_time,
                vehicles = tracks.len(),
                "Human crossed rule line, analyzing risk"
            );

            let decisions = self.engine.analyze(event.object_id, &event.rule_name, &tracks);
            for decision in &decisions {
                self.responder.respond(decision, &sighting.utc_time).await;
            }
            outcome.event = Some(EventOutcome::Analyzed {
                alerts: decisions.len(),
            });
        }

        outcome
    }

    /// Consume the transport until it closes or fails
    pub async fn run<S: AsyncBufRead + Unpin>(&self, mut reader: S) -> RunSummary {
        let mut accumulator = BlockAccumulator::new();
        let mut line = Vec::new();
        let mut summary = RunSummary::default();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    tracing::info!(
                        blocks = summary.blocks,
                        alerts = summary.alerts,
                        discarded = accumulator.pending(),
                        "Metadata stream closed"
                    );
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Metadata stream read failed, stopping");
                    break;
                }
            }

            let chunk = String::from_utf8_lossy(&line);
            let Some(block) = accumulator.push(&chunk) else {
                continue;
            };

            summary.blocks += 1;
            if let Some(EventOutcome::Analyzed { alerts }) = self.process_block(&block).await.event {
                summary.alerts += alerts;
            }
        }

        summary
    }
}
