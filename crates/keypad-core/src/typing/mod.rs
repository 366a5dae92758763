//! Clipboard auto-typing.
//!
//! Pressing the hidden paste key reads the clipboard, keeps only digits and
//! `+`, waits ten seconds and then "types" the number one key every half
//! second. Pressing it again while a session runs stops the session.

pub mod sequencer;
pub mod signal;

pub use sequencer::{
    sanitize, ClipboardSource, KeypadSurface, TriggerOutcome, TypingConfig, TypingPhase,
    TypingSequencer, FIRST_DELAY_MS, INTER_DELAY_MS,
};
pub use signal::{abort_pair, AbortHandle, AbortSignal};
