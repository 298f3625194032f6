//! Global hotkeys: start, stop, and emergency stop
//!
//! Chords are configured as strings like `"ctrl+alt+s"`, registered
//! through the system-wide hotkey manager, and dispatched to the
//! controller commands from a dedicated listener thread.

use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};

use crate::config::HotkeyConfig;
use crate::fishing::FishingController;

/// Registered hotkeys routed to controller commands.
/// Keep this alive for as long as the chords should stay registered.
pub struct HotkeyDispatcher {
    // Dropping the manager unregisters the chords
    _manager: GlobalHotKeyManager,
    start_id: u32,
    stop_id: u32,
    emergency_id: u32,
}

impl HotkeyDispatcher {
    /// Register the three configured chords
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let manager =
            GlobalHotKeyManager::new().map_err(|e| anyhow!("hotkey manager: {}", e))?;

        let start = parse_chord(&config.start_fishing)
            .ok_or_else(|| anyhow!("invalid start chord '{}'", config.start_fishing))?;
        let stop = parse_chord(&config.stop_fishing)
            .ok_or_else(|| anyhow!("invalid stop chord '{}'", config.stop_fishing))?;
        let emergency = parse_chord(&config.emergency_stop)
            .ok_or_else(|| anyhow!("invalid emergency chord '{}'", config.emergency_stop))?;

        for (name, hotkey) in [
            (&config.start_fishing, &start),
            (&config.stop_fishing, &stop),
            (&config.emergency_stop, &emergency),
        ] {
            manager
                .register(*hotkey)
                .map_err(|e| anyhow!("failed to register '{}': {}", name, e))?;
        }

        tracing::info!(
            "[HOTKEY] Registered start={} stop={} emergency={}",
            config.start_fishing,
            config.stop_fishing,
            config.emergency_stop
        );

        Ok(Self {
            _manager: manager,
            start_id: start.id(),
            stop_id: stop.id(),
            emergency_id: emergency.id(),
        })
    }

    /// Spawn the listener thread. The dispatcher must outlive it, or the
    /// chords are unregistered.
    pub fn spawn_listener(&self, controller: FishingController) -> JoinHandle<()> {
        let (start_id, stop_id, emergency_id) =
            (self.start_id, self.stop_id, self.emergency_id);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                let receiver = GlobalHotKeyEvent::receiver();

                loop {
                    let Ok(event) = receiver.recv() else {
                        tracing::warn!("[HOTKEY] Event channel closed");
                        return;
                    };

                    if event.state() != HotKeyState::Pressed {
                        continue;
                    }

                    let id = event.id();
                    if id == start_id {
                        tracing::info!("[HOTKEY] Start");
                        if let Err(e) = controller.start() {
                            tracing::error!("[HOTKEY] Start failed: {}", e);
                        }
                    } else if id == stop_id {
                        tracing::info!("[HOTKEY] Stop");
                        controller.stop();
                    } else if id == emergency_id {
                        tracing::warn!("[HOTKEY] Emergency stop");
                        controller.emergency_stop();
                    }
                }
            })
            .expect("failed to spawn hotkey listener")
    }
}

/// Parse a chord like `"ctrl+alt+s"` into a hotkey. The last segment is
/// the key, everything before it a modifier.
pub fn parse_chord(chord: &str) -> Option<HotKey> {
    let segments: Vec<&str> = chord.split('+').map(str::trim).collect();
    let (key, mod_segments) = segments.split_last()?;

    let code = key_code(key)?;

    let mut modifiers = Modifiers::empty();
    for segment in mod_segments {
        match segment.to_uppercase().as_str() {
            "CTRL" | "CONTROL" => modifiers |= Modifiers::CONTROL,
            "ALT" => modifiers |= Modifiers::ALT,
            "SHIFT" => modifiers |= Modifiers::SHIFT,
            "WIN" | "SUPER" | "META" => modifiers |= Modifiers::SUPER,
            _ => return None,
        }
    }

    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Some(HotKey::new(modifiers, code))
}

const LETTER_CODES: [Code; 26] = [
    Code::KeyA,
    Code::KeyB,
    Code::KeyC,
    Code::KeyD,
    Code::KeyE,
    Code::KeyF,
    Code::KeyG,
    Code::KeyH,
    Code::KeyI,
    Code::KeyJ,
    Code::KeyK,
    Code::KeyL,
    Code::KeyM,
    Code::KeyN,
    Code::KeyO,
    Code::KeyP,
    Code::KeyQ,
    Code::KeyR,
    Code::KeyS,
    Code::KeyT,
    Code::KeyU,
    Code::KeyV,
    Code::KeyW,
    Code::KeyX,
    Code::KeyY,
    Code::KeyZ,
];

const DIGIT_CODES: [Code; 10] = [
    Code::Digit0,
    Code::Digit1,
    Code::Digit2,
    Code::Digit3,
    Code::Digit4,
    Code::Digit5,
    Code::Digit6,
    Code::Digit7,
    Code::Digit8,
    Code::Digit9,
];

const FUNCTION_CODES: [Code; 12] = [
    Code::F1,
    Code::F2,
    Code::F3,
    Code::F4,
    Code::F5,
    Code::F6,
    Code::F7,
    Code::F8,
    Code::F9,
    Code::F10,
    Code::F11,
    Code::F12,
];

/// Resolve a key name to its hotkey code. Letters, digits and F1-F12
/// are computed from their position; the handful of named keys a chord
/// realistically binds are spelled out.
fn key_code(key: &str) -> Option<Code> {
    let name = key.trim().to_uppercase();

    if name.len() == 1 {
        let c = name.as_bytes()[0];
        if c.is_ascii_uppercase() {
            return Some(LETTER_CODES[(c - b'A') as usize]);
        }
        if c.is_ascii_digit() {
            return Some(DIGIT_CODES[(c - b'0') as usize]);
        }
        return None;
    }

    if let Some(n) = name.strip_prefix('F').and_then(|s| s.parse::<usize>().ok()) {
        if (1..=FUNCTION_CODES.len()).contains(&n) {
            return Some(FUNCTION_CODES[n - 1]);
        }
        return None;
    }

    match name.as_str() {
        "ESC" | "ESCAPE" => Some(Code::Escape),
        "ENTER" | "RETURN" => Some(Code::Enter),
        "SPACE" => Some(Code::Space),
        "TAB" => Some(Code::Tab),
        "BACKSPACE" => Some(Code::Backspace),
        "UP" => Some(Code::ArrowUp),
        "DOWN" => Some(Code::ArrowDown),
        "LEFT" => Some(Code::ArrowLeft),
        "RIGHT" => Some(Code::ArrowRight),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chord_with_modifiers() {
        let hotkey = parse_chord("ctrl+alt+s").unwrap();
        let expected = HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::KeyS);
        assert_eq!(hotkey.id(), expected.id());
    }

    #[test]
    fn test_parse_chord_bare_key() {
        let hotkey = parse_chord("F9").unwrap();
        let expected = HotKey::new(None, Code::F9);
        assert_eq!(hotkey.id(), expected.id());
    }

    #[test]
    fn test_parse_chord_invalid() {
        assert!(parse_chord("ctrl+alt+").is_none());
        assert!(parse_chord("bogus+s").is_none());
        assert!(parse_chord("ctrl+nosuchkey").is_none());
    }

    #[test]
    fn test_key_code() {
        assert_eq!(key_code("s"), Some(Code::KeyS));
        assert_eq!(key_code("7"), Some(Code::Digit7));
        assert_eq!(key_code("F10"), Some(Code::F10));
        assert_eq!(key_code("esc"), Some(Code::Escape));
        assert_eq!(key_code("F13"), None);
        assert_eq!(key_code("??"), None);
    }
}
