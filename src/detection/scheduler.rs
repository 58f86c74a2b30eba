use super::payload::DrawingPayload;
use super::pipeline::{
    DetectionPipeline, MemoryProbe, OverlayRenderer, PipelineLease, PipelineOptions, SharedPipeline,
    VideoSource,
};
use super::window::PerformanceWindow;
use crate::budget::{DegradeHint, ResourceBudget};
use crate::config::DetectionConfig;
use crate::error::{AdaptcamError, PipelineError, Result};
use crate::events::{EventBus, RuntimeEvent};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a detection loop. `Stopped` is terminal for the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Initializing,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Initializing => "initializing",
            LoopState::Running => "running",
            LoopState::Paused => "paused",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters for one detection loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detection_errors: u64,
    pub results_discarded: u64,
    pub degrade_reports: u64,
}

#[derive(Debug, Default)]
struct LoopCounters {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    detection_errors: AtomicU64,
    results_discarded: AtomicU64,
    degrade_reports: AtomicU64,
}

impl LoopCounters {
    fn snapshot(&self) -> DetectionStats {
        DetectionStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
            degrade_reports: self.degrade_reports.load(Ordering::Relaxed),
        }
    }
}

struct LoopShared {
    state: Mutex<LoopState>,
    /// Bumped on pause and stop; a run only renders while its generation is current
    generation: AtomicU64,
    counters: LoopCounters,
    degrade_reported: AtomicBool,
    degrade_hint: Mutex<Option<DegradeHint>>,
    face_present: Mutex<Option<bool>>,
}

/// Everything a spawned run needs
#[derive(Clone)]
struct RunContext {
    shared: Arc<LoopShared>,
    pipeline: Arc<dyn DetectionPipeline>,
    video: Arc<dyn VideoSource>,
    renderer: Arc<dyn OverlayRenderer>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
    event_bus: Arc<EventBus>,
    window: Arc<PerformanceWindow>,
    config: DetectionConfig,
    interval: Duration,
    memory_ceiling_mb: u32,
}

/// Drives face detection against a live video source on a single task
pub struct DetectionLoop {
    pipeline: SharedPipeline,
    video: Arc<dyn VideoSource>,
    renderer: Arc<dyn OverlayRenderer>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
    event_bus: Arc<EventBus>,
    window: Arc<PerformanceWindow>,
    config: DetectionConfig,
    budget: ResourceBudget,
    shared: Arc<LoopShared>,
    lease: Mutex<Option<PipelineLease>>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionLoop {
    pub fn builder() -> DetectionLoopBuilder {
        DetectionLoopBuilder::new()
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state.lock()
    }

    pub fn stats(&self) -> DetectionStats {
        self.shared.counters.snapshot()
    }

    pub fn budget(&self) -> &ResourceBudget {
        &self.budget
    }

    pub fn window(&self) -> &PerformanceWindow {
        &self.window
    }

    /// The degrade report of the current run, if one fired
    pub fn degrade_hint(&self) -> Option<DegradeHint> {
        self.shared.degrade_hint.lock().clone()
    }

    fn transition(&self, state: &mut LoopState, to: LoopState) {
        let from = std::mem::replace(state, to);
        debug!("Detection loop {} -> {}", from, to);
        self.event_bus
            .notify(RuntimeEvent::DetectionStateChanged { from, to });
    }

    /// Acquire the pipeline and begin detecting. Starting a paused loop resumes it.
    pub async fn start(&self) -> Result<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            let current = *state;
            match current {
                LoopState::Running | LoopState::Initializing => {
                    warn!("Detection loop is already running");
                    return Ok(());
                }
                LoopState::Paused => {
                    drop(state);
                    return self.resume();
                }
                LoopState::Stopped => {
                    return Err(PipelineError::InvalidState {
                        state: LoopState::Stopped.to_string(),
                    }
                    .into());
                }
                LoopState::Idle => {}
            }

            if !self.budget.detection_enabled {
                info!("Face detection disabled for this budget");
                self.transition(&mut state, LoopState::Stopped);
                return Ok(());
            }

            self.transition(&mut state, LoopState::Initializing);
            self.shared.degrade_reported.store(false, Ordering::Release);
            self.shared.generation.load(Ordering::Acquire)
        };

        let lease = match self.pipeline.acquire(PipelineOptions::from(&self.budget)).await {
            Ok(lease) => lease,
            Err(e) => {
                let mut state = self.shared.state.lock();
                if *state == LoopState::Initializing {
                    self.transition(&mut state, LoopState::Stopped);
                }
                drop(state);
                self.event_bus.notify(RuntimeEvent::PipelineInitFailed {
                    details: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let mut state = self.shared.state.lock();
        if *state != LoopState::Initializing
            || self.shared.generation.load(Ordering::Acquire) != generation
        {
            drop(state);
            info!("Detection loop stopped during initialization");
            let _ = lease.release();
            return Ok(());
        }

        let pipeline = lease.pipeline();
        *self.lease.lock() = Some(lease);
        self.transition(&mut state, LoopState::Running);
        drop(state);

        info!(
            interval_ms = self.budget.detection_interval_ms,
            backend = ?self.budget.detection_backend,
            "Detection loop started"
        );
        self.spawn_run(pipeline, generation);
        Ok(())
    }

    /// Stop scheduling frames, keeping the pipeline loaded
    pub fn pause(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state != LoopState::Running {
                warn!("Cannot pause detection loop in state {}", *state);
                return;
            }
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            self.transition(&mut state, LoopState::Paused);
        }

        self.cancel.lock().cancel();
        self.renderer.clear();
        info!("Detection loop paused");
    }

    pub fn resume(&self) -> Result<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            let current = *state;
            match current {
                LoopState::Paused => {}
                LoopState::Running => {
                    warn!("Detection loop is already running");
                    return Ok(());
                }
                other => {
                    return Err(PipelineError::InvalidState {
                        state: other.to_string(),
                    }
                    .into());
                }
            }
            self.transition(&mut state, LoopState::Running);
            self.shared.generation.load(Ordering::Acquire)
        };

        let pipeline = match self.lease.lock().as_ref() {
            Some(lease) => lease.pipeline(),
            None => return Err(PipelineError::Released.into()),
        };

        info!("Detection loop resumed");
        self.spawn_run(pipeline, generation);
        Ok(())
    }

    /// Cancel the next iteration, clear the overlay and release the pipeline.
    /// Results still in flight are discarded.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == LoopState::Stopped {
                debug!("Detection loop already stopped");
                return;
            }
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            self.transition(&mut state, LoopState::Stopped);
        }

        self.cancel.lock().cancel();
        self.renderer.clear();

        if let Some(lease) = self.lease.lock().take() {
            let _ = lease.release();
        }

        info!(stats = ?self.stats(), "Detection loop stopped");
    }

    /// Wait for the current run task to finish
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Detection task ended abnormally: {}", e);
            }
        }
    }

    fn spawn_run(&self, pipeline: Arc<dyn DetectionPipeline>, generation: u64) {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        let ctx = RunContext {
            shared: Arc::clone(&self.shared),
            pipeline,
            video: Arc::clone(&self.video),
            renderer: Arc::clone(&self.renderer),
            memory_probe: self.memory_probe.clone(),
            event_bus: Arc::clone(&self.event_bus),
            window: Arc::clone(&self.window),
            config: self.config.clone(),
            interval: Duration::from_millis(self.budget.detection_interval_ms),
            memory_ceiling_mb: self.budget.memory_ceiling_mb,
        };

        let task = tokio::spawn(run(ctx, generation, token));
        *self.task.lock() = Some(task);
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.cancel.get_mut().cancel();
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause_for(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run(ctx: RunContext, generation: u64, token: CancellationToken) {
    debug!(generation, "Detection run started");

    let counters = &ctx.shared.counters;
    let frame_timeout = Duration::from_millis(ctx.config.frame_timeout_ms);
    let not_ready_delay = Duration::from_millis(ctx.config.not_ready_retry_ms);
    let evaluation_interval = u64::from(ctx.config.evaluation_interval_frames);
    let sustained_checks = ctx.config.sustained_checks.max(1);

    let mut run_frames = 0u64;
    let mut bad_checks = 0u32;
    let mut last_suggestion: Option<String> = None;

    loop {
        if token.is_cancelled() {
            break;
        }

        let frame = if ctx.video.is_usable() {
            ctx.video.current_frame()
        } else {
            None
        };
        let Some(frame) = frame else {
            counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
            if !pause_for(&token, not_ready_delay).await {
                break;
            }
            continue;
        };

        let estimate = tokio::select! {
            _ = token.cancelled() => {
                counters.results_discarded.fetch_add(1, Ordering::Relaxed);
                break;
            }
            result = tokio::time::timeout(frame_timeout, ctx.pipeline.estimate_faces(&frame)) => result,
        };

        let faces = match estimate {
            Ok(Ok(faces)) => faces,
            Ok(Err(e)) => {
                warn!("Face estimation failed on frame {}: {}", frame.sequence, e);
                counters.detection_errors.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
            Err(_) => {
                warn!("Face estimation timeout, skipping frame {}", frame.sequence);
                counters.detection_errors.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        };

        let payload = DrawingPayload::from_faces(&faces);
        let present = payload.face_present();

        {
            // Rendering under the state lock orders it before any pause or stop clear
            let state = ctx.shared.state.lock();
            if *state != LoopState::Running
                || ctx.shared.generation.load(Ordering::Acquire) != generation
            {
                counters.results_discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding result for frame {}", frame.sequence);
                break;
            }
            ctx.renderer.render(&payload);
            ctx.renderer.face_presence(present);
        }

        let changed = ctx.shared.face_present.lock().replace(present) != Some(present);
        if changed {
            ctx.event_bus
                .notify(RuntimeEvent::FacePresenceChanged { present });
        }

        ctx.window.record_frame(tokio::time::Instant::now());
        counters.frames_processed.fetch_add(1, Ordering::Relaxed);
        run_frames += 1;

        if evaluation_interval > 0 && run_frames % evaluation_interval == 0 {
            if let Some(used_mb) = ctx.memory_probe.as_ref().and_then(|probe| probe.used_mb()) {
                ctx.window.record_memory(used_mb);
            }

            match ctx.window.evaluate(ctx.config.min_fps, ctx.memory_ceiling_mb) {
                Some(reason) => {
                    bad_checks += 1;
                    debug!(?reason, bad_checks, "Performance check failed");
                    if bad_checks >= sustained_checks
                        && !ctx.shared.degrade_reported.swap(true, Ordering::AcqRel)
                    {
                        let hint = DegradeHint {
                            reason,
                            observed_fps: ctx.window.fps().unwrap_or(0.0),
                            mean_memory_mb: ctx.window.mean_memory_mb(),
                        };
                        *ctx.shared.degrade_hint.lock() = Some(hint.clone());
                        counters.degrade_reports.fetch_add(1, Ordering::Relaxed);
                        ctx.event_bus.notify(RuntimeEvent::DegradeDetected {
                            hint,
                            timestamp: SystemTime::now(),
                        });
                    }
                }
                None => bad_checks = 0,
            }

            let suggestion = ctx.window.suggestion(
                ctx.config.min_fps,
                ctx.config.target_fps,
                ctx.memory_ceiling_mb,
            );
            if suggestion != last_suggestion {
                if let Some(message) = &suggestion {
                    ctx.event_bus.notify(RuntimeEvent::PerformanceSuggestion {
                        message: message.clone(),
                    });
                }
                last_suggestion = suggestion;
            }
        }

        if !pause_for(&token, ctx.interval).await {
            break;
        }
    }

    debug!(generation, frames = run_frames, "Detection run ended");
}

/// Builder for [`DetectionLoop`]
#[derive(Default)]
pub struct DetectionLoopBuilder {
    pipeline: Option<SharedPipeline>,
    video: Option<Arc<dyn VideoSource>>,
    renderer: Option<Arc<dyn OverlayRenderer>>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
    event_bus: Option<Arc<EventBus>>,
    config: Option<DetectionConfig>,
    budget: Option<ResourceBudget>,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(mut self, pipeline: SharedPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn video(mut self, video: Arc<dyn VideoSource>) -> Self {
        self.video = Some(video);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OverlayRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(mut self, config: DetectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn build(self) -> Result<DetectionLoop> {
        let missing =
            |what: &str| AdaptcamError::component("detection".to_string(), format!("{} is required", what));

        let pipeline = self.pipeline.ok_or_else(|| missing("Detection pipeline"))?;
        let video = self.video.ok_or_else(|| missing("Video source"))?;
        let renderer = self.renderer.ok_or_else(|| missing("Overlay renderer"))?;
        let budget = self.budget.ok_or_else(|| missing("Resource budget"))?;
        let config = self.config.unwrap_or_default();
        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(EventBus::new(100)));

        let window = PerformanceWindow::builder()
            .frame_capacity(config.window_frames)
            .memory_capacity(config.memory_samples)
            .build()?;

        Ok(DetectionLoop {
            pipeline,
            video,
            renderer,
            memory_probe: self.memory_probe,
            event_bus,
            window: Arc::new(window),
            config,
            budget,
            shared: Arc::new(LoopShared {
                state: Mutex::new(LoopState::Idle),
                generation: AtomicU64::new(0),
                counters: LoopCounters::default(),
                degrade_reported: AtomicBool::new(false),
                degrade_hint: Mutex::new(None),
                face_present: Mutex::new(None),
            }),
            lease: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        })
    }
}
