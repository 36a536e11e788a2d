//! The per-session capture loop
//!
//! Runs on the blocking pool and is the only writer of the engine state and
//! the latest frame. Cancellation is checked between frames.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use alerting::{AlertManager, AlertSink};
use bytes::Bytes;
use camera_capture::{FrameSource, JpegEncoder};
use focus_engine::{AdapterError, FocusEngine, FrameAnalysis, SignalAdapter};
use metrics::{counter, gauge};
use storage::Snapshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::worker::Shared;

pub(crate) struct CaptureLoop {
    pub session_id: Uuid,
    pub generation: u64,
    pub config: SessionConfig,
    pub source: Box<dyn FrameSource>,
    pub adapter: Box<dyn SignalAdapter>,
    pub engine: FocusEngine,
    pub encoder: JpegEncoder,
    pub alerts: Option<(AlertManager, Arc<dyn AlertSink>)>,
    pub shared: Arc<Shared>,
    pub cancel: CancellationToken,
}

impl CaptureLoop {
    pub fn run(mut self) {
        info!(session = %self.session_id, "Capture loop started");

        let publish_every = self.config.publish_interval();
        let mut last_publish: Option<Instant> = None;
        let mut counted = 0u64;

        while !self.cancel.is_cancelled() && self.shared.is_current(self.generation) {
            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(e) if e.is_transient() => {
                    counter!("focus_capture_failures_total").increment(1);
                    debug!("Frame read failed, retrying: {}", e);
                    thread::sleep(self.config.read_backoff());
                    continue;
                }
                Err(e) => {
                    error!(session = %self.session_id, "Capture device lost: {}", e);
                    break;
                }
            };

            let adapter = &mut self.adapter;
            let analyzed = panic::catch_unwind(AssertUnwindSafe(|| adapter.analyze(&frame)))
                .unwrap_or_else(|payload| Err(AdapterError::Inference(panic_message(payload))));
            let signals = match analyzed {
                Ok(signals) => signals,
                Err(e) => {
                    counter!("focus_adapter_failures_total").increment(1);
                    warn!("Detection failed on frame {}: {}", frame.sequence, e);
                    thread::sleep(self.config.adapter_backoff());
                    continue;
                }
            };

            let now = Instant::now();
            let analysis = self.engine.process(&signals, now);
            counter!("focus_frames_processed_total").increment(1);
            gauge!("focus_score").set(analysis.focus_score);

            if analysis.distractions > counted {
                counter!("focus_distractions_total").increment(analysis.distractions - counted);
                counted = analysis.distractions;
            }
            self.raise_alerts(&analysis, now);

            let due = last_publish
                .map(|at| now.saturating_duration_since(at) >= publish_every)
                .unwrap_or(true);
            if !self.shared.is_current(self.generation) {
                break;
            }
            if due {
                self.shared.publish(Snapshot::now(
                    analysis.focus_score,
                    analysis.distractions,
                    true,
                ));
                last_publish = Some(now);
            }

            match self.encoder.encode(&frame) {
                Ok(jpeg) => self.shared.set_frame(Bytes::from(jpeg)),
                Err(e) => debug!("Skipping stream frame: {}", e),
            }

            thread::sleep(self.config.frame_interval());
        }

        drop(self.source);

        let state = self.engine.focus_state();
        if self.shared.is_current(self.generation) {
            self.shared.finish(Snapshot::now(
                state.smoothed_score,
                state.distraction_count,
                false,
            ));
        }
        info!(
            session = %self.session_id,
            "Capture loop exited (score {:.1}, distractions {})",
            state.smoothed_score, state.distraction_count
        );
    }

    fn raise_alerts(&mut self, analysis: &FrameAnalysis, now: Instant) {
        let Some((manager, sink)) = self.alerts.as_mut() else {
            return;
        };
        for cause in &analysis.events {
            manager.dispatch(*cause, now, sink.as_ref());
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("adapter panicked: {}", detail)
}
