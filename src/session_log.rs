//! Session and round logging
//!
//! One JSON line per event, appended to `logs/fishing_log.jsonl` in the
//! data dir: session started, round completed, session ended (with the
//! rounds that session produced and why it ended). Nothing at runtime
//! reads these back; they are the operator's audit trail for long
//! unattended runs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::utils::path::get_data_dir;

/// Why a session ended
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Stopped,
    Error,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogRecord<'a> {
    SessionStarted {
        at: String,
    },
    RoundCompleted {
        at: String,
        round: u64,
    },
    SessionEnded {
        at: String,
        started_at: String,
        rounds: u64,
        outcome: SessionOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a str>,
    },
}

struct OpenSession {
    started_at: DateTime<Utc>,
    rounds_at_start: u64,
    rounds_now: u64,
}

/// Appends fishing audit records. Tracks the open session so the
/// session-ended record can carry its own round tally.
pub struct SessionLogger {
    log_path: PathBuf,
    open_session: Mutex<Option<OpenSession>>,
}

impl SessionLogger {
    pub fn new() -> Self {
        Self::with_path(get_data_dir().join("logs").join("fishing_log.jsonl"))
    }

    fn with_path(log_path: PathBuf) -> Self {
        Self {
            log_path,
            open_session: Mutex::new(None),
        }
    }

    /// A session began. `rounds_so_far` is the controller's lifetime
    /// round count at this moment; per-session rounds are counted
    /// relative to it.
    pub fn session_started(&self, rounds_so_far: u64) {
        let now = Utc::now();
        *self.open_session.lock() = Some(OpenSession {
            started_at: now,
            rounds_at_start: rounds_so_far,
            rounds_now: rounds_so_far,
        });
        self.append(&LogRecord::SessionStarted {
            at: now.to_rfc3339(),
        });
    }

    /// A round finished; `round` is the controller's lifetime count
    pub fn round_completed(&self, round: u64) {
        if let Some(session) = self.open_session.lock().as_mut() {
            session.rounds_now = round;
        }
        self.append(&LogRecord::RoundCompleted {
            at: Utc::now().to_rfc3339(),
            round,
        });
    }

    /// The session is over; writes its tally. A second call without an
    /// intervening start is ignored.
    pub fn session_ended(&self, outcome: SessionOutcome, error: Option<&str>) {
        let Some(session) = self.open_session.lock().take() else {
            return;
        };
        self.append(&LogRecord::SessionEnded {
            at: Utc::now().to_rfc3339(),
            started_at: session.started_at.to_rfc3339(),
            rounds: session.rounds_now - session.rounds_at_start,
            outcome,
            error,
        });
    }

    fn append(&self, record: &LogRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("[LOG] Unserializable audit record: {}", e);
                return;
            }
        };

        if let Some(parent) = self.log_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!("[LOG] Cannot create {:?}: {}", parent, e);
                return;
            }
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = result {
            tracing::warn!("[LOG] Failed to append to {:?}: {}", self.log_path, e);
        }
    }
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new()
    }
}
