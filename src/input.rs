//! Input simulation: mouse, keyboard, and the fast-click loop
//!
//! The controller drives input only through the [`Actuator`] trait so the
//! state machine can be exercised against a recording fake in tests. The
//! production implementation simulates input with enigo.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::{Condvar, Mutex};
use rand::Rng;

#[cfg(windows)]
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
#[cfg(windows)]
use once_cell::sync::Lazy;

use crate::config::AutofishConfig;

/// Operations the fishing controller needs from the input layer.
///
/// `start_fast_click` / `stop_fast_click` are serialized against each
/// other by the implementation. `hold_key` and `cast_rod` block the
/// caller; a cast is atomic and is never torn down mid-hold.
pub trait Actuator: Send + Sync {
    /// Spawn (or resume) the fast-click loop. Idempotent.
    fn start_fast_click(&self) -> Result<()>;
    /// Suspend clicking without tearing the loop thread down
    fn pause_fast_click(&self);
    /// Resume a paused loop; takes effect within one click interval
    fn resume_fast_click(&self);
    /// Terminate the loop thread; returns only after it has exited
    fn stop_fast_click(&self);
    /// Press `key`, sleep `duration`, release
    fn hold_key(&self, key: &str, duration: Duration) -> Result<()>;
    /// Tap `key` once
    fn press_key(&self, key: &str) -> Result<()>;
    /// Press-and-hold the primary mouse button for the cast duration
    fn cast_rod(&self) -> Result<()>;
    /// Best-effort release of every held key and the mouse button
    fn release_all(&self);
}

// ---------------------------------------------------------------------------
// enigo primitives

#[cfg(windows)]
/// Global mouse controller
static MOUSE: Lazy<Mutex<Enigo>> = Lazy::new(|| {
    Mutex::new(Enigo::new(&Settings::default()).expect("Failed to create Enigo for mouse"))
});

#[cfg(windows)]
/// Global keyboard controller
static KEYBOARD: Lazy<Mutex<Enigo>> = Lazy::new(|| {
    Mutex::new(Enigo::new(&Settings::default()).expect("Failed to create Enigo for keyboard"))
});

/// Press the primary mouse button down
#[cfg(windows)]
pub fn mouse_press() -> Result<()> {
    tracing::trace!("[INPUT] mouse_press()");
    let mut mouse = MOUSE.lock();
    mouse
        .button(Button::Left, Direction::Press)
        .map_err(|e| anyhow!("mouse press failed: {:?}", e))
}

#[cfg(not(windows))]
pub fn mouse_press() -> Result<()> {
    tracing::warn!("mouse_press not implemented on this platform");
    Ok(())
}

/// Release the primary mouse button
#[cfg(windows)]
pub fn mouse_release() -> Result<()> {
    tracing::trace!("[INPUT] mouse_release()");
    let mut mouse = MOUSE.lock();
    mouse
        .button(Button::Left, Direction::Release)
        .map_err(|e| anyhow!("mouse release failed: {:?}", e))
}

#[cfg(not(windows))]
pub fn mouse_release() -> Result<()> {
    tracing::warn!("mouse_release not implemented on this platform");
    Ok(())
}

/// Hold a key down
#[cfg(windows)]
pub fn key_down(key: &str) -> Result<()> {
    tracing::trace!("[INPUT] key_down('{}')", key);
    let mut keyboard = KEYBOARD.lock();
    let enigo_key =
        string_to_enigo_key(key).ok_or_else(|| anyhow!("unknown key '{}'", key))?;
    keyboard
        .key(enigo_key, Direction::Press)
        .map_err(|e| anyhow!("key down '{}' failed: {:?}", key, e))
}

#[cfg(not(windows))]
pub fn key_down(key: &str) -> Result<()> {
    tracing::warn!("key_down('{}') not implemented on this platform", key);
    Ok(())
}

/// Release a held key
#[cfg(windows)]
pub fn key_up(key: &str) -> Result<()> {
    tracing::trace!("[INPUT] key_up('{}')", key);
    let mut keyboard = KEYBOARD.lock();
    let enigo_key =
        string_to_enigo_key(key).ok_or_else(|| anyhow!("unknown key '{}'", key))?;
    keyboard
        .key(enigo_key, Direction::Release)
        .map_err(|e| anyhow!("key up '{}' failed: {:?}", key, e))
}

#[cfg(not(windows))]
pub fn key_up(key: &str) -> Result<()> {
    tracing::warn!("key_up('{}') not implemented on this platform", key);
    Ok(())
}

/// Press and release a key
#[cfg(windows)]
pub fn key_tap(key: &str) -> Result<()> {
    tracing::debug!("[INPUT] key_tap('{}')", key);
    let mut keyboard = KEYBOARD.lock();
    let enigo_key =
        string_to_enigo_key(key).ok_or_else(|| anyhow!("unknown key '{}'", key))?;
    keyboard
        .key(enigo_key, Direction::Click)
        .map_err(|e| anyhow!("key tap '{}' failed: {:?}", key, e))
}

#[cfg(not(windows))]
pub fn key_tap(key: &str) -> Result<()> {
    tracing::warn!("key_tap('{}') not implemented on this platform", key);
    Ok(())
}

#[cfg(windows)]
const FUNCTION_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

/// Convert string key name to enigo Key
#[cfg(windows)]
fn string_to_enigo_key(key: &str) -> Option<Key> {
    // Single characters go through Unicode to avoid layout mapping issues
    if key.len() == 1 {
        let c = key.chars().next()?.to_ascii_lowercase();
        return Some(Key::Unicode(c));
    }

    let name = key.to_uppercase();

    if let Some(n) = name.strip_prefix('F').and_then(|s| s.parse::<usize>().ok()) {
        return FUNCTION_KEYS.get(n.checked_sub(1)?).copied();
    }

    match name.as_str() {
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "ENTER" | "RETURN" => Some(Key::Return),
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "SHIFT" => Some(Key::Shift),
        "CTRL" | "CONTROL" => Some(Key::Control),
        "ALT" => Some(Key::Alt),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Fast-click loop

struct ClickerShared {
    /// Tears the worker down for good
    exit: AtomicBool,
    /// Suspends clicking; reversible, so kept separate from `exit`
    paused: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl ClickerShared {
    fn new() -> Self {
        Self {
            exit: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }
}

/// Dedicated thread issuing primary clicks with randomized sub-interval
/// delay. Pausing keeps the thread alive; stopping joins it.
pub struct FastClicker {
    delay_min: Duration,
    delay_max: Duration,
    // One mutex serializes start against stop
    worker: Mutex<Option<(Arc<ClickerShared>, JoinHandle<()>)>>,
}

impl FastClicker {
    pub fn new(delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            delay_min,
            delay_max,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the loop, or resume it when already alive
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();

        if let Some((shared, handle)) = worker.as_ref() {
            if !handle.is_finished() {
                shared.paused.store(false, Ordering::SeqCst);
                shared.wake.notify_all();
                tracing::debug!("[CLICK] Fast-click already running, resumed");
                return Ok(());
            }
            // Stale handle from a worker that bailed on an input error
            *worker = None;
        }

        let shared = Arc::new(ClickerShared::new());
        let worker_shared = shared.clone();
        let (delay_min, delay_max) = (self.delay_min, self.delay_max);

        let handle = thread::Builder::new()
            .name("fast-click".to_string())
            .spawn(move || click_worker(worker_shared, delay_min, delay_max))
            .map_err(|e| anyhow!("failed to spawn fast-click thread: {}", e))?;

        *worker = Some((shared, handle));
        tracing::debug!("[CLICK] Fast-click thread started");
        Ok(())
    }

    pub fn pause(&self) {
        if let Some((shared, _)) = self.worker.lock().as_ref() {
            shared.paused.store(true, Ordering::SeqCst);
            tracing::debug!("[CLICK] Fast-click paused");
        }
    }

    pub fn resume(&self) {
        if let Some((shared, _)) = self.worker.lock().as_ref() {
            shared.paused.store(false, Ordering::SeqCst);
            shared.wake.notify_all();
            tracing::debug!("[CLICK] Fast-click resumed");
        }
    }

    /// Stop the loop and join the worker. The lock is held across the
    /// join, which serializes stop against a concurrent start.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        if let Some((shared, handle)) = worker.take() {
            shared.exit.store(true, Ordering::SeqCst);
            shared.wake.notify_all();
            if let Err(e) = handle.join() {
                tracing::error!("[CLICK] Fast-click thread panicked: {:?}", e);
            }
            tracing::debug!("[CLICK] Fast-click thread stopped");
        }
    }

    /// Whether the loop thread is alive and not paused
    pub fn is_clicking(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|(shared, handle)| {
                !handle.is_finished() && !shared.paused.load(Ordering::SeqCst)
            })
            .unwrap_or(false)
    }
}

impl Drop for FastClicker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn click_worker(shared: Arc<ClickerShared>, delay_min: Duration, delay_max: Duration) {
    tracing::debug!("[CLICK] Worker loop entered");
    let mut rng = rand::thread_rng();

    while !shared.exit.load(Ordering::SeqCst) {
        if shared.paused.load(Ordering::SeqCst) {
            // Park until resumed or stopped; bounded so a missed notify
            // cannot wedge the loop
            let mut guard = shared.wake_lock.lock();
            shared
                .wake
                .wait_for(&mut guard, Duration::from_millis(50));
            continue;
        }

        if let Err(e) = mouse_press() {
            tracing::error!("[CLICK] {}", e);
            break;
        }
        thread::sleep(rng.gen_range(delay_min..=delay_max));

        if let Err(e) = mouse_release() {
            tracing::error!("[CLICK] {}", e);
            break;
        }

        if shared.exit.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(rng.gen_range(delay_min..=delay_max));
    }

    // Never leave the button down behind us
    let _ = mouse_release();
    tracing::debug!("[CLICK] Worker loop exited");
}

// ---------------------------------------------------------------------------
// Production actuator

/// enigo-backed implementation of [`Actuator`]
pub struct EnigoActuator {
    clicker: FastClicker,
    cast_hold: Duration,
    held_keys: Mutex<Vec<String>>,
}

impl EnigoActuator {
    pub fn new(config: &AutofishConfig) -> Self {
        Self {
            clicker: FastClicker::new(
                Duration::from_secs_f64(config.timing.click_delay_min),
                Duration::from_secs_f64(config.timing.click_delay_max),
            ),
            cast_hold: config.timing.cast_hold(),
            held_keys: Mutex::new(Vec::new()),
        }
    }
}

impl Actuator for EnigoActuator {
    fn start_fast_click(&self) -> Result<()> {
        self.clicker.start()
    }

    fn pause_fast_click(&self) {
        self.clicker.pause();
    }

    fn resume_fast_click(&self) {
        self.clicker.resume();
    }

    fn stop_fast_click(&self) {
        self.clicker.stop();
    }

    fn hold_key(&self, key: &str, duration: Duration) -> Result<()> {
        key_down(key)?;
        self.held_keys.lock().push(key.to_string());

        thread::sleep(duration);

        let result = key_up(key);
        self.held_keys.lock().retain(|k| k != key);
        result
    }

    fn press_key(&self, key: &str) -> Result<()> {
        key_tap(key)
    }

    fn cast_rod(&self) -> Result<()> {
        tracing::debug!("[INPUT] Casting rod ({:?} hold)", self.cast_hold);
        mouse_press()?;
        // The cast is atomic: releasing mid-hold leaves the game in an
        // ambiguous state, so the hold is never interrupted
        thread::sleep(self.cast_hold);
        mouse_release()
    }

    fn release_all(&self) {
        let held: Vec<String> = self.held_keys.lock().drain(..).collect();
        for key in held {
            if let Err(e) = key_up(&key) {
                tracing::warn!("[INPUT] Failed to release '{}': {}", key, e);
            }
        }
        if let Err(e) = mouse_release() {
            tracing::warn!("[INPUT] Failed to release mouse: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(windows)]
    fn test_string_to_enigo_key() {
        assert!(string_to_enigo_key("A").is_some());
        assert!(string_to_enigo_key("F9").is_some());
        assert!(string_to_enigo_key("ESC").is_some());
        assert!(string_to_enigo_key("NO_SUCH_KEY").is_none());
    }

    #[test]
    fn test_clicker_lifecycle_idempotent() {
        let clicker = FastClicker::new(Duration::from_millis(1), Duration::from_millis(2));
        clicker.start().unwrap();
        clicker.start().unwrap();
        assert!(clicker.is_clicking());

        clicker.pause();
        assert!(!clicker.is_clicking());
        clicker.resume();
        assert!(clicker.is_clicking());

        clicker.stop();
        assert!(!clicker.is_clicking());
        // Stop twice is fine
        clicker.stop();
    }

    #[test]
    fn test_clicker_restart_after_stop() {
        let clicker = FastClicker::new(Duration::from_millis(1), Duration::from_millis(2));
        clicker.start().unwrap();
        clicker.stop();
        clicker.start().unwrap();
        assert!(clicker.is_clicking());
        clicker.stop();
    }
}
