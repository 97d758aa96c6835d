//! Recording session controller.
//!
//! Owns the capture target and the single active-session slot. Front ends
//! call the synchronous API (`start_session`, `stop_session`, `phase`, the
//! target setters); none of these block. All waiting (start delay, encoder
//! run, GIF conversion) happens in one background task per session, which
//! reports every phase change on the event channel handed out by
//! [`SessionController::new`].
//!
//! Lifecycle of the slot:
//!   start_session  → slot holds a session in Starting
//!   worker         → Recording → (Stopping) → (PostProcessing) → Done|Failed
//!   acknowledge    → worker joined (encoder reaped), slot cleared, Idle

use super::encoder::{self, ExitClass, SignalDelivery};
use super::error::SessionError;
use super::output::{self, OutputFormat, OutputPaths, OutputSpec};
use super::phase::Phase;
use super::postprocess;
use crate::capture::{self, CaptureTarget, Display, Region, SelectError, Selection, TargetSelection};
use crate::config::RecorderConfig;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::Child;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Posted on every phase change, in transition order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session: SessionId,
    pub phase: Phase,
    /// Human-readable status line for the UI.
    pub status: String,
}

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed {
        artifact: PathBuf,
        format: OutputFormat,
        optimized: bool,
    },
    /// Stopped during the start delay; nothing was launched.
    Cancelled,
    Failed(SessionError),
}

impl Outcome {
    pub fn status(&self) -> String {
        match self {
            Outcome::Completed {
                artifact, format, ..
            } => format!("Saved {}: {}", format.label(), artifact.display()),
            Outcome::Cancelled => "Recording cancelled before it started".to_string(),
            Outcome::Failed(err) => format!("Failed: {}", err),
        }
    }

    fn phase(&self) -> Phase {
        match self {
            Outcome::Failed(_) => Phase::Failed,
            _ => Phase::Done,
        }
    }
}

/// Returned by [`SessionController::acknowledge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session: SessionId,
    pub phase: Phase,
    pub target: CaptureTarget,
    pub paths: OutputPaths,
    pub outcome: Outcome,
}

/// Result of a successful stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopAck {
    /// Stopped during the start delay; the encoder will not be launched.
    LaunchCancelled,
    /// The encoder was signalled; the session finishes once it exits.
    Signalled { delivery: SignalDelivery },
}

struct ActiveSession {
    id: SessionId,
    target: CaptureTarget,
    spec: OutputSpec,
    paths: OutputPaths,
    phase: Phase,
    /// Encoder pid while the process is alive and unreaped.
    pid: Option<u32>,
    stop_requested: bool,
    stop_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    outcome: Option<Outcome>,
}

type Slot = Arc<Mutex<Option<ActiveSession>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ActiveSession>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies a transition and posts the event. Caller holds the slot lock,
/// so events leave in the same order the phases change.
fn transition(
    session: &mut ActiveSession,
    events: &mpsc::UnboundedSender<SessionEvent>,
    phase: Phase,
    status: String,
) {
    if !session.phase.can_transition_to(phase) {
        log::warn!(
            "[SESSION] {} unexpected transition {} → {}",
            session.id,
            session.phase,
            phase
        );
    }
    log::info!("[SESSION] {} {} → {}: {}", session.id, session.phase, phase, status);
    session.phase = phase;
    let _ = events.send(SessionEvent {
        session: session.id,
        phase,
        status,
    });
}

pub struct SessionController {
    config: Arc<RecorderConfig>,
    runtime: Handle,
    target: Mutex<TargetSelection>,
    slot: Slot,
    events: mpsc::UnboundedSender<SessionEvent>,
    next_id: AtomicU64,
}

impl SessionController {
    /// Creates a controller bound to the current tokio runtime.
    ///
    /// Panics if called outside a runtime; use [`SessionController::with_runtime`]
    /// from non-async code.
    pub fn new(config: RecorderConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_runtime(config, Handle::current())
    }

    pub fn with_runtime(
        config: RecorderConfig,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            config: Arc::new(config),
            runtime,
            target: Mutex::new(TargetSelection::new()),
            slot: Arc::new(Mutex::new(None)),
            events,
            next_id: AtomicU64::new(1),
        };
        (controller, rx)
    }

    fn target_lock(&self) -> MutexGuard<'_, TargetSelection> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Capture target ─────────────────────────────────────────────

    pub fn set_area(&self, region: Region) {
        log::info!("[SESSION] Target: area {}", region);
        self.target_lock().set_area(region);
    }

    pub fn set_display(&self, display: Display) {
        log::info!("[SESSION] Target: display {}", display.id);
        self.target_lock().set_display(display);
    }

    pub fn clear_target(&self) {
        self.target_lock().clear();
    }

    pub fn capture_target(&self) -> Option<CaptureTarget> {
        self.target_lock().current().cloned()
    }

    /// Runs the area selector; a picked rectangle becomes the target.
    /// On cancel the previous target is kept.
    pub async fn select_area(&self) -> Result<Selection, SelectError> {
        let selection = capture::select_area(&self.config.tools.selector).await?;
        if let Selection::Picked(region) = &selection {
            self.set_area(*region);
        }
        Ok(selection)
    }

    pub async fn list_displays(&self) -> Vec<Display> {
        capture::list_displays(&self.config.tools.display_lister, self.config.fallback_resolution)
            .await
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Current phase; `Idle` when no session occupies the slot.
    pub fn phase(&self) -> Phase {
        lock(&self.slot).as_ref().map_or(Phase::Idle, |s| s.phase)
    }

    /// Output paths of the active session, if any.
    pub fn active_paths(&self) -> Option<OutputPaths> {
        lock(&self.slot).as_ref().map(|s| s.paths.clone())
    }

    /// Starts recording the current capture target.
    ///
    /// Admission checks and path allocation happen under the slot lock, so
    /// two racing calls can never both get a session.
    pub fn start_session(&self, spec: OutputSpec) -> Result<SessionId, SessionError> {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(SessionError::AlreadyRecording);
        }

        let target = self.capture_target().ok_or_else(|| {
            SessionError::Validation("Please select an area or display first".to_string())
        })?;
        let region = target
            .region()
            .map_err(|e| SessionError::Validation(e.to_string()))?;
        spec.validate()?;

        let paths = output::allocate(&self.config.output_dir, &spec.base_name, spec.format)?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = Worker {
            id,
            config: Arc::clone(&self.config),
            slot: Arc::clone(&self.slot),
            events: self.events.clone(),
            region,
            spec: spec.clone(),
            paths: paths.clone(),
            stop_rx,
        };

        let mut session = ActiveSession {
            id,
            target,
            spec,
            paths,
            phase: Phase::Idle,
            pid: None,
            stop_requested: false,
            stop_tx,
            worker: None,
            outcome: None,
        };
        let status = match session.spec.start_delay_secs {
            0 => "Starting...".to_string(),
            n => format!("Starting in {}s...", n),
        };
        transition(&mut session, &self.events, Phase::Starting, status);

        // The worker's first lock attempt waits until we release the slot.
        session.worker = Some(self.runtime.spawn(worker.run()));
        *slot = Some(session);

        Ok(id)
    }

    /// Requests a graceful stop.
    ///
    /// During the start delay this cancels the launch. While recording it
    /// sends SIGINT to the encoder's process group; the session finishes
    /// when the encoder exits. In every other phase: `NotRecording`.
    pub fn stop_session(&self) -> Result<StopAck, SessionError> {
        let mut slot = lock(&self.slot);
        let session = slot.as_mut().ok_or(SessionError::NotRecording)?;

        if !session.phase.is_stoppable() {
            return Err(SessionError::NotRecording);
        }

        let ack = match session.pid {
            _ if session.phase == Phase::Starting => StopAck::LaunchCancelled,
            Some(pid) => StopAck::Signalled {
                delivery: encoder::interrupt_group(pid),
            },
            // The encoder already exited; the worker is finishing up.
            None => return Err(SessionError::NotRecording),
        };

        session.stop_requested = true;
        let _ = session.stop_tx.send(true);
        transition(session, &self.events, Phase::Stopping, "Stopping...".to_string());

        if let StopAck::Signalled {
            delivery: SignalDelivery::Undelivered { error },
        } = &ack
        {
            log::warn!("[SESSION] {} stop signal not delivered: {}", session.id, error);
        }

        Ok(ack)
    }

    /// Clears a Done/Failed session and returns how it ended.
    ///
    /// Joins the worker first, so by the time the slot is free the encoder
    /// has been reaped.
    pub async fn acknowledge(&self) -> Result<SessionReport, SessionError> {
        let worker = {
            let mut slot = lock(&self.slot);
            let session = slot.as_mut().ok_or(SessionError::NotRecording)?;
            if !session.phase.is_terminal() {
                return Err(SessionError::StillActive(session.phase));
            }
            session.worker.take()
        };

        self.join_and_clear(worker)
            .await
            .ok_or(SessionError::NotRecording)
    }

    /// Tears down whatever is active: stops it, waits for the encoder to
    /// exit and for post-processing to finish, then clears the slot.
    pub async fn shutdown(&self) -> Option<SessionReport> {
        match self.stop_session() {
            Ok(_) | Err(SessionError::NotRecording) => {}
            Err(e) => log::warn!("[SESSION] Stop during shutdown failed: {}", e),
        }

        let worker = lock(&self.slot).as_mut()?.worker.take();
        self.join_and_clear(worker).await
    }

    async fn join_and_clear(&self, worker: Option<JoinHandle<()>>) -> Option<SessionReport> {
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                log::error!("[SESSION] Worker task failed: {}", e);
            }
        }

        let mut slot = lock(&self.slot);
        let mut session = slot.take()?;

        let outcome = session.outcome.take().unwrap_or_else(|| {
            Outcome::Failed(SessionError::Encode {
                tool: "session worker".to_string(),
                status: "ended without reporting a result".to_string(),
            })
        });
        let final_phase = if session.phase.is_terminal() {
            session.phase
        } else {
            outcome.phase()
        };

        session.phase = final_phase;
        transition(&mut session, &self.events, Phase::Idle, "Ready".to_string());

        Some(SessionReport {
            session: session.id,
            phase: final_phase,
            target: session.target,
            paths: session.paths,
            outcome,
        })
    }
}

/// Everything the background task needs; owns nothing the caller reads
/// directly; all shared state goes through the slot.
struct Worker {
    id: SessionId,
    config: Arc<RecorderConfig>,
    slot: Slot,
    events: mpsc::UnboundedSender<SessionEvent>,
    region: Region,
    spec: OutputSpec,
    paths: OutputPaths,
    stop_rx: watch::Receiver<bool>,
}

enum Launch {
    Started(Child),
    Cancelled,
    Failed(SessionError),
}

impl Worker {
    async fn run(mut self) {
        let delay = Duration::from_secs(self.spec.start_delay_secs);
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_requested(&mut self.stop_rx) => {}
            }
        }

        let mut child = match self.launch() {
            Launch::Started(child) => child,
            Launch::Cancelled => return self.finish(Outcome::Cancelled),
            Launch::Failed(err) => return self.finish(Outcome::Failed(err)),
        };

        let (status, forced) = self.supervise(&mut child).await;
        let was_stopped = self.with_session(|s| {
            s.pid = None;
            s.stop_requested
        });

        let tool = self.config.tools.encoder.display().to_string();
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return self.finish(Outcome::Failed(SessionError::Encode {
                    tool,
                    status: format!("could not wait for process: {}", e),
                }))
            }
        };

        if forced {
            return self.finish(Outcome::Failed(SessionError::Encode {
                tool,
                status: "did not exit after stop; killed".to_string(),
            }));
        }

        match self.config.exit_policy.classify(status, was_stopped) {
            ExitClass::Clean | ExitClass::Interrupted => {}
            ExitClass::Abnormal(status) => {
                return self.finish(Outcome::Failed(SessionError::Encode { tool, status }))
            }
        }

        if self.spec.format == OutputFormat::Mp4 {
            return self.finish(Outcome::Completed {
                artifact: self.paths.primary.clone(),
                format: OutputFormat::Mp4,
                optimized: false,
            });
        }

        self.with_session(|s| {
            transition(s, &self.events, Phase::PostProcessing, "Converting to GIF...".to_string())
        });

        let outcome = match postprocess::run(&self.config, self.spec.fps, &self.paths).await {
            Ok(report) => Outcome::Completed {
                artifact: report.artifact,
                format: OutputFormat::Gif,
                optimized: report.optimized,
            },
            Err(err) => Outcome::Failed(err),
        };
        self.finish(outcome);
    }

    /// Spawns the encoder unless a stop arrived during the delay.
    ///
    /// Runs under the slot lock so a concurrent stop either sees Starting
    /// (and cancels) or sees Recording with a pid (and signals).
    fn launch(&self) -> Launch {
        let mut slot = lock(&self.slot);
        let Some(session) = slot.as_mut() else {
            return Launch::Cancelled;
        };

        if session.stop_requested {
            return Launch::Cancelled;
        }

        let args = encoder::encoder_args(
            &self.config,
            &self.region,
            &self.spec,
            self.paths.recording_path(),
        );
        match encoder::spawn_encoder(&self.config.tools.encoder, &args) {
            Ok(child) => {
                session.pid = child.id();
                transition(
                    session,
                    &self.events,
                    Phase::Recording,
                    format!("Recording {}...", self.region),
                );
                Launch::Started(child)
            }
            Err(e) => {
                log::error!("[SESSION] {} failed to launch encoder: {}", self.id, e);
                Launch::Failed(SessionError::Launch {
                    tool: self.config.tools.encoder.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Waits for the encoder to exit. After a stop request, arms the grace
    /// timer; if it expires the encoder's group is killed and still reaped.
    async fn supervise(&mut self, child: &mut Child) -> (std::io::Result<std::process::ExitStatus>, bool) {
        tokio::select! {
            status = child.wait() => return (status, false),
            _ = stop_requested(&mut self.stop_rx) => {}
        }

        let Some(grace) = self.config.stop_grace else {
            return (child.wait().await, false);
        };

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => (status, false),
            Err(_) => {
                log::warn!(
                    "[SESSION] {} encoder still running {}s after stop, killing it",
                    self.id,
                    grace.as_secs()
                );
                let group_killed = child.id().is_some_and(encoder::kill_group);
                if !group_killed {
                    if let Err(e) = child.start_kill() {
                        log::error!("[SESSION] {} kill failed: {}", self.id, e);
                    }
                }
                (child.wait().await, true)
            }
        }
    }

    fn with_session<T: Default>(&self, f: impl FnOnce(&mut ActiveSession) -> T) -> T {
        lock(&self.slot).as_mut().map(f).unwrap_or_default()
    }

    fn finish(&self, outcome: Outcome) {
        let phase = outcome.phase();
        let status = outcome.status();
        match &outcome {
            Outcome::Failed(err) => log::error!("[SESSION] {} failed: {}", self.id, err),
            _ => log::info!("[SESSION] {} finished: {}", self.id, status),
        }
        self.with_session(|s| {
            s.outcome = Some(outcome);
            transition(s, &self.events, phase, status);
        });
    }
}

/// Resolves once a stop has been requested. Never resolves if the sender
/// is gone without requesting one.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
