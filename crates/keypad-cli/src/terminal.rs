//! Terminal stand-ins for the page's keypad and clipboard.

use std::io::{Read, Write};

use async_trait::async_trait;
use keypad_core::{ClipboardError, ClipboardSource, Keypad, KeypadSurface};

/// Echoes typed characters to stdout as they arrive.
#[derive(Default)]
pub struct TerminalKeypad {
    keypad: Keypad,
}

impl TerminalKeypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }
}

impl KeypadSurface for TerminalKeypad {
    fn append(&self, ch: char) {
        self.keypad.append(ch);
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", ch);
        let _ = stdout.flush();
    }

    fn pulse_key(&self, ch: char) {
        self.keypad.pulse_key(ch);
    }

    fn set_typing_active(&self, active: bool) {
        self.keypad.set_typing_active(active);
        if active {
            eprintln!("Typing starts shortly. Press Ctrl-C to stop.");
        }
    }

    fn nudge(&self) {
        eprintln!("Clipboard is empty.");
    }
}

/// Clipboard text given on the command line, or read from stdin.
pub struct TerminalClipboard {
    text: Option<String>,
}

impl TerminalClipboard {
    pub fn new(text: Option<String>) -> Self {
        Self { text }
    }
}

#[async_trait]
impl ClipboardSource for TerminalClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        tokio::task::spawn_blocking(|| {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map(|_| text)
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))
        })
        .await
        .map_err(|e| ClipboardError::Unavailable(e.to_string()))?
    }
}
