//! Session lifecycle

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alerting::{AlertConfig, AlertManager, AlertSink};
use bytes::Bytes;
use camera_capture::{CameraError, FrameSourceFactory, JpegEncoder};
use focus_engine::{EngineConfig, FocusEngine, SignalAdapter};
use metrics::gauge;
use serde::Serialize;
use storage::{Snapshot, SnapshotFile};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capture::CaptureLoop;
use crate::config::SessionConfig;
use crate::error::SessionError;

/// Builds a fresh set of detectors for each session
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn SignalAdapter> + Send + Sync>;

/// Returned by a successful `start`
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub session_id: Uuid,
    pub source: String,
}

/// State shared between the worker handle and the capture loop
pub(crate) struct Shared {
    snapshot_tx: watch::Sender<Snapshot>,
    frame_tx: watch::Sender<Option<Bytes>>,
    published: AtomicBool,
    active: AtomicBool,
    /// Bumped whenever a capture loop is started or abandoned
    generation: AtomicU64,
    file: SnapshotFile,
}

impl Shared {
    /// Whether a loop started as `generation` still owns the outputs
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Replace the in-memory snapshot and mirror it to disk
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.snapshot_tx.send_replace(snapshot);
        self.published.store(true, Ordering::Release);
        if let Err(e) = self.file.write(&snapshot) {
            warn!("Failed to mirror snapshot: {}", e);
        }
    }

    pub(crate) fn set_frame(&self, frame: Bytes) {
        self.frame_tx.send_replace(Some(frame));
    }

    /// Mark the session over: inactive snapshot, no frame
    pub(crate) fn finish(&self, final_snapshot: Snapshot) {
        self.active.store(false, Ordering::Release);
        self.publish(final_snapshot);
        self.frame_tx.send_replace(None);
        gauge!("focus_session_active").set(0.0);
    }

    /// Detach a loop that failed or would not stop, and close out its session
    fn abandon(&self) {
        self.next_generation();
        let last = *self.snapshot_tx.borrow();
        self.finish(last.deactivated());
    }
}

struct RunningSession {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Process-wide focus session worker
///
/// At most one capture loop runs at a time. `start` and `stop` serialize on
/// an async mutex; readers never take it.
pub struct SessionWorker {
    config: SessionConfig,
    engine_config: EngineConfig,
    camera: Arc<dyn FrameSourceFactory>,
    adapters: AdapterFactory,
    encoder: JpegEncoder,
    alerts: Option<(AlertConfig, Arc<dyn AlertSink>)>,
    shared: Arc<Shared>,
    running: Mutex<Option<RunningSession>>,
}

impl SessionWorker {
    pub fn new(
        config: SessionConfig,
        engine_config: EngineConfig,
        camera: Arc<dyn FrameSourceFactory>,
        adapters: AdapterFactory,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        let (frame_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            snapshot_tx,
            frame_tx,
            published: AtomicBool::new(false),
            active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            file: SnapshotFile::new(config.snapshot_path.clone()),
        });

        Self {
            config,
            engine_config,
            camera,
            adapters,
            encoder: JpegEncoder::default(),
            alerts: None,
            shared,
            running: Mutex::new(None),
        }
    }

    /// Deliver distraction alerts through `sink`
    pub fn with_alerts(mut self, config: AlertConfig, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some((config, sink));
        self
    }

    pub fn with_encoder(mut self, encoder: JpegEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Open the capture device and start a fresh session
    pub async fn start(&self) -> Result<StartReport, SessionError> {
        let mut running = self.running.lock().await;
        self.reap_finished(&mut running).await;

        if let Some(session) = running.as_ref() {
            warn!(session = %session.id, "Start rejected: session already running");
            return Err(SessionError::AlreadyRunning);
        }

        let camera = Arc::clone(&self.camera);
        let source = match tokio::task::spawn_blocking(move || camera.open()).await {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                error!("Failed to open capture device: {}", e);
                return Err(SessionError::DeviceUnavailable(e));
            }
            Err(e) => {
                error!("Capture device open task failed: {}", e);
                return Err(SessionError::DeviceUnavailable(CameraError::Open(e.to_string())));
            }
        };

        let id = Uuid::new_v4();
        let description = source.describe();
        let cancel = CancellationToken::new();

        let capture = CaptureLoop {
            session_id: id,
            generation: self.shared.next_generation(),
            config: self.config.clone(),
            source,
            adapter: (self.adapters)(),
            engine: FocusEngine::new(self.engine_config.clone()),
            encoder: self.encoder,
            alerts: self
                .alerts
                .as_ref()
                .map(|(config, sink)| (AlertManager::new(config.clone()), Arc::clone(sink))),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };

        // The new session overwrites whatever the previous one left behind
        self.shared.frame_tx.send_replace(None);
        self.shared.publish(Snapshot::now(focus_engine::score::INITIAL_SCORE, 0, true));
        self.shared.active.store(true, Ordering::Release);
        gauge!("focus_session_active").set(1.0);

        let handle = tokio::task::spawn_blocking(move || capture.run());
        *running = Some(RunningSession { id, cancel, handle });

        info!(session = %id, "Focus session started on {}", description);
        Ok(StartReport {
            session_id: id,
            source: description,
        })
    }

    /// Signal the capture loop to exit and wait for it, bounded by the stop timeout
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut running = self.running.lock().await;
        self.reap_finished(&mut running).await;

        let session = running.take().ok_or(SessionError::NotRunning)?;
        session.cancel.cancel();

        match tokio::time::timeout(self.config.stop_timeout(), session.handle).await {
            Ok(Ok(())) => info!(session = %session.id, "Focus session stopped"),
            Ok(Err(e)) => {
                error!(session = %session.id, "Capture loop failed: {}", e);
                self.shared.abandon();
            }
            Err(_) => {
                // The loop releases the device once its current frame completes
                warn!(
                    session = %session.id,
                    "Capture loop did not exit within {:?}",
                    self.config.stop_timeout()
                );
                self.shared.abandon();
            }
        }
        Ok(())
    }

    /// Most recent snapshot, or the zeroed default if none was ever published
    pub fn latest_snapshot(&self) -> Snapshot {
        *self.shared.snapshot_tx.borrow()
    }

    /// Most recent encoded frame of the running session
    pub fn latest_frame(&self) -> Option<Bytes> {
        self.shared.frame_tx.borrow().clone()
    }

    /// Subscribe to frame replacements, for streaming
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Bytes>> {
        self.shared.frame_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether any snapshot was published in this process
    pub fn has_published(&self) -> bool {
        self.shared.published.load(Ordering::Acquire)
    }

    pub fn snapshot_file(&self) -> &SnapshotFile {
        &self.shared.file
    }

    async fn reap_finished(&self, running: &mut Option<RunningSession>) {
        let finished = running
            .as_ref()
            .map(|session| session.handle.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(session) = running.take() {
            match session.handle.await {
                Ok(()) => info!(session = %session.id, "Reaped capture loop that ended on its own"),
                Err(e) => {
                    error!(session = %session.id, "Capture loop failed: {}", e);
                    self.shared.abandon();
                }
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        if let Some(session) = self.running.get_mut() {
            session.cancel.cancel();
        }
    }
}
