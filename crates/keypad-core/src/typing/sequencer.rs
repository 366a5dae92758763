use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::signal::{abort_pair, AbortHandle, AbortSignal};
use crate::error::ClipboardError;

/// Wait before the first character is typed.
pub const FIRST_DELAY_MS: u64 = 10_000;

/// Wait between subsequent characters.
pub const INTER_DELAY_MS: u64 = 500;

/// Source of the text to replay, typically the system clipboard.
#[async_trait]
pub trait ClipboardSource: Send + Sync {
    async fn read_text(&self) -> Result<String, ClipboardError>;
}

/// The visible keypad the sequencer types into.
pub trait KeypadSurface: Send + Sync {
    /// Append a character to the visible digit buffer.
    fn append(&self, ch: char);

    /// Briefly highlight the key for `ch`.
    fn pulse_key(&self, ch: char);

    /// Show or hide the "typing in progress" indicator.
    fn set_typing_active(&self, _active: bool) {}

    /// Visual hint that there was nothing to type.
    fn nudge(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingConfig {
    pub first_delay: Duration,
    pub inter_delay: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_millis(FIRST_DELAY_MS),
            inter_delay: Duration::from_millis(INTER_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypingPhase {
    #[default]
    Idle,
    /// Claimed the session, waiting on the clipboard.
    Reading,
    Waiting,
    Emitting {
        index: usize,
    },
    Aborting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Every queued character was typed.
    Completed { emitted: usize },
    /// The session stopped early; `emitted` characters stay in the buffer.
    Aborted { emitted: usize },
    /// A session was already running; it has been asked to stop.
    AbortRequested,
    ClipboardUnavailable,
    /// The clipboard held nothing dialable.
    NothingToType,
}

/// Keep only characters that can be dialled from the clipboard: digits and `+`.
pub fn sanitize(raw: &str) -> Vec<char> {
    raw.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect()
}

#[derive(Debug, Default)]
struct Session {
    phase: TypingPhase,
    abort: Option<AbortHandle>,
    queue: Vec<char>,
    cursor: usize,
}

/// Replays clipboard digits onto the keypad with fixed timing.
///
/// At most one session runs at a time. Triggering while a session runs asks
/// it to stop instead of starting another.
pub struct TypingSequencer {
    clipboard: Arc<dyn ClipboardSource>,
    surface: Arc<dyn KeypadSurface>,
    config: TypingConfig,
    session: Mutex<Session>,
}

/// Returns the sequencer to idle however the session ends, including when
/// the trigger future is dropped.
struct SessionGuard<'a> {
    sequencer: &'a TypingSequencer,
    shown_active: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.sequencer.lock_session() = Session::default();
        if self.shown_active {
            self.sequencer.surface.set_typing_active(false);
        }
    }
}

impl TypingSequencer {
    pub fn new(
        clipboard: Arc<dyn ClipboardSource>,
        surface: Arc<dyn KeypadSurface>,
        config: TypingConfig,
    ) -> Self {
        Self {
            clipboard,
            surface,
            config,
            session: Mutex::new(Session::default()),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        // Session state is plain data; a panic mid-update cannot leave it unusable.
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> TypingPhase {
        self.lock_session().phase
    }

    pub fn is_active(&self) -> bool {
        self.phase() != TypingPhase::Idle
    }

    /// The sanitized characters of the running session and the next index to type.
    pub fn progress(&self) -> (Vec<char>, usize) {
        let session = self.lock_session();
        (session.queue.clone(), session.cursor)
    }

    /// Ask the running session to stop. Returns false when idle.
    pub fn cancel(&self) -> bool {
        let mut session = self.lock_session();
        match session.abort.as_ref() {
            Some(handle) if session.phase != TypingPhase::Idle => {
                handle.abort();
                session.phase = TypingPhase::Aborting;
                true
            }
            _ => false,
        }
    }

    /// The paste key was pressed.
    pub async fn trigger(&self) -> TriggerOutcome {
        let signal = {
            let mut session = self.lock_session();
            if session.phase != TypingPhase::Idle {
                if let Some(handle) = session.abort.as_ref() {
                    handle.abort();
                }
                session.phase = TypingPhase::Aborting;
                info!("Typing trigger while busy, aborting current session");
                return TriggerOutcome::AbortRequested;
            }
            let (handle, signal) = abort_pair();
            session.phase = TypingPhase::Reading;
            session.abort = Some(handle);
            signal
        };

        let mut guard = SessionGuard {
            sequencer: self,
            shown_active: false,
        };
        self.run(signal, &mut guard).await
    }

    async fn run(&self, mut signal: AbortSignal, guard: &mut SessionGuard<'_>) -> TriggerOutcome {
        let raw = match self.clipboard.read_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Clipboard read failed, not typing");
                return TriggerOutcome::ClipboardUnavailable;
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.surface.nudge();
            return TriggerOutcome::NothingToType;
        }

        let queue = sanitize(trimmed);
        if queue.is_empty() {
            debug!("Clipboard has no digits, not typing");
            return TriggerOutcome::NothingToType;
        }
        if signal.is_aborted() {
            return TriggerOutcome::Aborted { emitted: 0 };
        }

        {
            let mut session = self.lock_session();
            session.queue = queue.clone();
            session.cursor = 0;
            session.phase = TypingPhase::Waiting;
        }
        self.surface.set_typing_active(true);
        guard.shown_active = true;
        info!(chars = queue.len(), "Typing session started");

        if !signal.sleep(self.config.first_delay).await {
            info!("Typing aborted before first character");
            return TriggerOutcome::Aborted { emitted: 0 };
        }

        for (i, &ch) in queue.iter().enumerate() {
            if signal.is_aborted() {
                return TriggerOutcome::Aborted { emitted: i };
            }
            {
                let mut session = self.lock_session();
                session.phase = TypingPhase::Emitting { index: i };
                session.cursor = i + 1;
            }
            self.surface.pulse_key(ch);
            self.surface.append(ch);

            if i + 1 < queue.len() && !signal.sleep(self.config.inter_delay).await {
                info!(emitted = i + 1, "Typing aborted");
                return TriggerOutcome::Aborted { emitted: i + 1 };
            }
        }

        info!(emitted = queue.len(), "Typing session finished");
        TriggerOutcome::Completed {
            emitted: queue.len(),
        }
    }
}
