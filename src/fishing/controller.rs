//! Fishing controller: the state machine and its concurrency coordinator
//!
//! One control thread walks the phase protocol, polling perception
//! through the detector facade and driving the actuator. Every phase
//! mutation happens under one status lock and is published as a snapshot;
//! perception polls run strictly outside it. The thread checks the stop
//! token at every suspension point, so a stop request unwinds to STOPPED
//! within one blocking interval (the rod cast, which is atomic, is the
//! longest).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::phase::{Phase, Status};
use super::status_channel::{StatusCallback, StatusChannel, SubscriptionHandle};
use super::ControlError;
use crate::config::AutofishConfig;
use crate::detector::{DetectorFacade, Label, Observation};
use crate::input::Actuator;

/// The SUCCESS phase gives up and casts anyway after this many polls
const SUCCESS_MAX_ATTEMPTS: u32 = 20;

/// Cooperative stop signal with an interruptible sleep
struct StopToken {
    flag: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl StopToken {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a stop arrives first.
    /// Returns true when the sleep was cut short by a stop request.
    fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        while !self.flag.load(Ordering::SeqCst) {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.flag.load(Ordering::SeqCst)
    }
}

struct Inner {
    config: AutofishConfig,
    detector: DetectorFacade,
    actuator: Arc<dyn Actuator>,
    channel: StatusChannel,
    /// Source of truth; held only for mutation + snapshot publish
    status: Mutex<Status>,
    stop: StopToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// The one routine that mutates the status. Enforces the publication
    /// rule: action phases never carry a detected label. The lock is held
    /// through the publish so snapshots leave in mutation order.
    fn update_status(&self, mutate: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock();
        mutate(&mut status);
        if !status.phase.shows_detected_label() {
            status.last_detected_label = None;
            status.last_confidence = None;
        }
        status.updated_at = Instant::now();
        self.channel.publish(status.clone());
    }

    fn set_phase(&self, phase: Phase) {
        tracing::info!("[CONTROL] Phase -> {} ({})", phase, phase.description());
        self.update_status(|s| s.phase = phase);
    }

    fn note_observation(&self, obs: &Observation) {
        tracing::debug!(
            "[CONTROL] Accepted {} conf={:.2} from {:?}",
            obs.label,
            obs.confidence,
            obs.source
        );
        self.update_status(|s| {
            s.last_detected_label = Some(obs.label);
            s.last_confidence = Some(obs.confidence);
        });
    }

    fn current_phase(&self) -> Phase {
        self.status.lock().phase
    }

    /// Gap between detection polls, also used as the facade deadline
    fn poll_gap(&self) -> Duration {
        Duration::from_secs_f64(self.config.model.detection_interval)
    }

    fn hold_direction(&self, key: &str) -> Result<(), ControlError> {
        tracing::debug!("[CONTROL] Direction overlay, holding '{}'", key);
        self.actuator
            .hold_key(key, self.config.timing.key_press())
            .map_err(|e| ControlError::ActuatorFault(format!("failed to hold '{}': {}", key, e)))
    }

    fn press_confirm(&self) -> Result<(), ControlError> {
        let key = &self.config.keys.confirm_key;
        self.actuator
            .press_key(key)
            .map_err(|e| ControlError::ActuatorFault(format!("failed to press '{}': {}", key, e)))
    }
}

/// The fishing controller. Cheap to clone; all clones drive the same
/// state machine.
#[derive(Clone)]
pub struct FishingController {
    inner: Arc<Inner>,
}

impl FishingController {
    pub fn new(
        config: AutofishConfig,
        detector: DetectorFacade,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                detector,
                actuator,
                channel: StatusChannel::new(Status::new()),
                status: Mutex::new(Status::new()),
                stop: StopToken::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Launch the control thread. A no-op when already running.
    pub fn start(&self) -> Result<(), ControlError> {
        let mut worker = self.inner.worker.lock();

        if worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            tracing::warn!("[CONTROL] start() ignored, already running");
            return Ok(());
        }
        *worker = None;

        self.inner.stop.reset();
        self.inner.update_status(|s| {
            s.phase = Phase::WaitingInitial;
            s.last_error = None;
        });

        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("fishing-control".to_string())
            .spawn(move || control_loop(inner))
            .map_err(|e| ControlError::InitFault(format!("failed to spawn control thread: {}", e)))?;

        *worker = Some(handle);
        tracing::info!("[CONTROL] Started");
        Ok(())
    }

    /// Request cooperative termination and wait for the control thread
    /// to unwind. Bounded by the longest atomic action (the rod cast).
    pub fn stop(&self) {
        self.inner.stop.request();

        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        // Covers a stop issued from ERROR, where no control thread runs
        if self.inner.current_phase() != Phase::Stopped {
            self.inner.set_phase(Phase::Stopped);
        }
    }

    /// Like [`stop`](Self::stop), but forces all inputs open immediately
    /// instead of waiting for the control thread to notice.
    pub fn emergency_stop(&self) {
        tracing::warn!("[CONTROL] EMERGENCY STOP");
        self.inner.stop.request();
        self.inner.actuator.stop_fast_click();
        self.inner.actuator.release_all();

        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        if self.inner.current_phase() != Phase::Stopped {
            self.inner.set_phase(Phase::Stopped);
        }
    }

    /// Register a status observer; runs on the delivery thread
    pub fn subscribe_status(&self, callback: StatusCallback) -> SubscriptionHandle {
        self.inner.channel.subscribe(callback)
    }

    pub fn unsubscribe_status(&self, handle: SubscriptionHandle) {
        self.inner.channel.unsubscribe(handle);
    }

    /// Latest published status snapshot
    pub fn snapshot_status(&self) -> Status {
        self.inner.channel.snapshot()
    }

    /// Observations dropped by the allowed-label guard so far
    pub fn refused_observations(&self) -> u64 {
        self.inner.detector.refused_count()
    }
}

// ---------------------------------------------------------------------------
// Control thread

fn control_loop(inner: Arc<Inner>) {
    tracing::info!("[CONTROL] Control loop entered");
    let result = run_rounds(&inner);

    // Actuators are torn down on every exit path
    inner.actuator.stop_fast_click();
    inner.actuator.release_all();

    match result {
        Ok(()) => {
            inner.set_phase(Phase::Stopped);
            tracing::info!("[CONTROL] Control loop stopped");
        }
        Err(e) => {
            tracing::error!("[CONTROL] {}", e);
            inner.update_status(|s| {
                s.phase = Phase::Error;
                s.last_error = Some(e.to_string());
            });
        }
    }
}

fn run_rounds(inner: &Arc<Inner>) -> Result<(), ControlError> {
    loop {
        if inner.stop.is_requested() {
            return Ok(());
        }

        if !wait_for_initial(inner)? {
            return Ok(());
        }

        match pull_phase(inner)? {
            PullOutcome::Stopped => return Ok(()),
            PullOutcome::Retry => {
                // A retry is not a completed round
                if !retry_cast(inner)? {
                    return Ok(());
                }
                continue;
            }
            PullOutcome::Success => {}
        }

        if !success_phase(inner)? {
            return Ok(());
        }
        if !casting_phase(inner)? {
            return Ok(());
        }
    }
}

/// WAITING_INITIAL and WAITING_HOOK. Returns Ok(true) once the hook
/// label is observed, Ok(false) on a stop request. The timeout clock
/// starts here and keeps running through WAITING_HOOK.
fn wait_for_initial(inner: &Inner) -> Result<bool, ControlError> {
    inner.set_phase(Phase::WaitingInitial);

    let started = Instant::now();
    let timeout = inner.config.timing.initial_timeout();
    let poll_gap = inner.poll_gap();

    loop {
        if inner.stop.is_requested() {
            return Ok(false);
        }
        if started.elapsed() > timeout {
            return Err(ControlError::PerceptionTimeout);
        }

        let phase = inner.current_phase();
        if let Some(obs) = inner.detector.detect_any(phase.allowed_labels(), poll_gap) {
            inner.note_observation(&obs);
            match obs.label {
                Label::Waiting => {
                    if phase == Phase::WaitingInitial {
                        inner.set_phase(Phase::WaitingHook);
                    }
                }
                // FISH_HOOKED is published by the pull phase, after the
                // fast-click loop is already running
                Label::Hooked => return Ok(true),
                _ => {}
            }
        }

        if inner.stop.sleep(poll_gap) {
            return Ok(false);
        }
    }
}

enum PullOutcome {
    Stopped,
    /// FISH_HOOKED went silent; a remedial recast is needed
    Retry,
    Success,
}

/// FISH_HOOKED, PULLING_NORMAL and PULLING_HALFWAY.
///
/// Fast clicking starts on entry and runs through FISH_HOOKED and
/// PULLING_NORMAL; it is paused, not torn down, for PULLING_HALFWAY.
/// Direction overlays trigger a key hold and never change the phase.
fn pull_phase(inner: &Inner) -> Result<PullOutcome, ControlError> {
    inner
        .actuator
        .start_fast_click()
        .map_err(|e| ControlError::ActuatorFault(format!("failed to start fast-click: {}", e)))?;
    inner.set_phase(Phase::FishHooked);

    let poll_gap = inner.poll_gap();
    let hook_deadline = inner.config.timing.state1_timeout();
    let mut last_accept = Instant::now();

    loop {
        if inner.stop.is_requested() {
            return Ok(PullOutcome::Stopped);
        }

        let phase = inner.current_phase();

        if phase == Phase::FishHooked && last_accept.elapsed() > hook_deadline {
            tracing::warn!(
                "[CONTROL] No reeling state within {:?}, recasting",
                hook_deadline
            );
            return Ok(PullOutcome::Retry);
        }

        if let Some(obs) = inner.detector.detect_any(phase.allowed_labels(), poll_gap) {
            last_accept = Instant::now();
            inner.note_observation(&obs);

            match obs.label {
                // The catch banner always wins
                Label::Success => {
                    inner.actuator.stop_fast_click();
                    inner.set_phase(Phase::Success);
                    return Ok(PullOutcome::Success);
                }
                // Direction overlays are acted on before any phase change
                // and leave the phase untouched
                Label::PullRight => inner.hold_direction(&inner.config.keys.pull_right_key)?,
                Label::PullLeft => inner.hold_direction(&inner.config.keys.pull_left_key)?,
                Label::PullingNormal => {
                    if phase != Phase::PullingNormal {
                        inner.actuator.resume_fast_click();
                        inner.set_phase(Phase::PullingNormal);
                    }
                }
                Label::PullingHalfway => {
                    if phase != Phase::PullingHalfway {
                        inner.actuator.pause_fast_click();
                        inner.set_phase(Phase::PullingHalfway);
                        if inner.stop.sleep(inner.config.timing.state3_pause()) {
                            return Ok(PullOutcome::Stopped);
                        }
                    }
                }
                // Still hooked / stale waiting label: no transition
                Label::Hooked | Label::Waiting => {}
            }
        }

        if inner.stop.sleep(poll_gap) {
            return Ok(PullOutcome::Stopped);
        }
    }
}

/// SUCCESS: confirm the catch until the banner disappears, bounded at
/// [`SUCCESS_MAX_ATTEMPTS`] polls. Returns Ok(false) on a stop request.
fn success_phase(inner: &Inner) -> Result<bool, ControlError> {
    if inner.stop.sleep(inner.config.timing.success_wait()) {
        return Ok(false);
    }
    inner.press_confirm()?;

    let poll_gap = inner.poll_gap();

    for attempt in 1..=SUCCESS_MAX_ATTEMPTS {
        if inner.stop.is_requested() {
            return Ok(false);
        }

        match inner.detector.detect_specific(Label::Success, poll_gap) {
            None => {
                tracing::debug!("[CONTROL] Success banner gone after {} polls", attempt);
                return Ok(true);
            }
            Some(obs) => {
                inner.note_observation(&obs);
                if inner.stop.sleep(inner.config.timing.success_wait()) {
                    return Ok(false);
                }
                inner.press_confirm()?;
            }
        }
    }

    tracing::warn!(
        "[CONTROL] Success banner persisted for {} polls, casting anyway",
        SUCCESS_MAX_ATTEMPTS
    );
    Ok(true)
}

/// CASTING: one atomic rod cast, then the round is counted. Perception
/// is ignored for the whole phase. Returns Ok(false) on a stop request.
fn casting_phase(inner: &Inner) -> Result<bool, ControlError> {
    inner.set_phase(Phase::Casting);

    inner
        .actuator
        .cast_rod()
        .map_err(|e| ControlError::ActuatorFault(format!("cast failed: {}", e)))?;

    inner.update_status(|s| s.round_count += 1);
    tracing::info!(
        "[CONTROL] Round {} complete",
        inner.status.lock().round_count
    );

    // Let the cast animation finish before detection resumes
    if inner.stop.sleep(inner.config.timing.cast_settle()) {
        return Ok(false);
    }
    Ok(true)
}

/// The RETRY branch: FISH_HOOKED went silent, so recover with a remedial
/// cast. Leaves the round count untouched. Returns Ok(false) on a stop
/// request.
fn retry_cast(inner: &Inner) -> Result<bool, ControlError> {
    inner.actuator.stop_fast_click();
    inner.actuator.release_all();

    if inner.stop.sleep(inner.config.timing.retry_settle_before()) {
        return Ok(false);
    }

    inner
        .actuator
        .cast_rod()
        .map_err(|_| ControlError::ActuatorFault("retry cast failed".to_string()))?;

    if inner.stop.sleep(inner.config.timing.retry_settle_after()) {
        return Ok(false);
    }

    Ok(true)
}
