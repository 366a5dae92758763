//! The dialled number and the `tel:` link built from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::typing::KeypadSurface;

/// Longest number the display accepts.
pub const MAX_DIGITS: usize = 200;

/// Characters a user can enter from the keypad or keyboard.
pub fn is_keypad_char(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '+' | '*' | '#')
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigitBuffer {
    digits: String,
}

impl DigitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a character. Returns false once the buffer is full.
    pub fn push(&mut self, ch: char) -> bool {
        if self.digits.chars().count() >= MAX_DIGITS {
            return false;
        }
        self.digits.push(ch);
        true
    }

    pub fn backspace(&mut self) -> Option<char> {
        self.digits.pop()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digits.chars().count()
    }

    /// `tel:` URI for the current number, or `None` when nothing was dialled.
    pub fn tel_uri(&self) -> Option<String> {
        tel_uri(&self.digits)
    }
}

/// Build a `tel:` URI keeping only digits, `+`, `#` and `*`.
pub fn tel_uri(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let dialable: String = text.chars().filter(|c| is_keypad_char(*c)).collect();
    Some(format!("tel:{}", dialable))
}

/// Shared keypad state: the digit buffer plus the typing indicator.
#[derive(Debug, Default)]
pub struct Keypad {
    buffer: Mutex<DigitBuffer>,
    typing_active: AtomicBool,
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&mut DigitBuffer) -> R) -> R {
        let mut guard = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Handle a key press from the keyboard. Unsupported keys are ignored.
    pub fn press(&self, ch: char) -> bool {
        is_keypad_char(ch) && self.with_buffer(|b| b.push(ch))
    }

    pub fn backspace(&self) -> Option<char> {
        self.with_buffer(DigitBuffer::backspace)
    }

    pub fn clear(&self) {
        self.with_buffer(DigitBuffer::clear)
    }

    pub fn digits(&self) -> String {
        self.with_buffer(|b| b.as_str().to_string())
    }

    pub fn tel_uri(&self) -> Option<String> {
        self.with_buffer(|b| b.tel_uri())
    }

    pub fn is_typing(&self) -> bool {
        self.typing_active.load(Ordering::SeqCst)
    }
}

impl KeypadSurface for Keypad {
    fn append(&self, ch: char) {
        self.with_buffer(|b| b.push(ch));
    }

    fn pulse_key(&self, ch: char) {
        debug!(key = %ch, "Key pulse");
    }

    fn set_typing_active(&self, active: bool) {
        self.typing_active.store(active, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tel_uri_strips_formatting() {
        assert_eq!(
            tel_uri("+1 (555) 123-4567 ext#9*").as_deref(),
            Some("tel:+15551234567#9*")
        );
    }

    #[test]
    fn test_tel_uri_empty_buffer() {
        assert_eq!(DigitBuffer::new().tel_uri(), None);
    }

    #[test]
    fn test_buffer_caps_length() {
        let mut buffer = DigitBuffer::new();
        for _ in 0..MAX_DIGITS {
            assert!(buffer.push('1'));
        }
        assert!(!buffer.push('2'));
        assert_eq!(buffer.len(), MAX_DIGITS);
    }

    #[test]
    fn test_backspace_and_clear() {
        let mut buffer = DigitBuffer::new();
        buffer.push('1');
        buffer.push('2');
        assert_eq!(buffer.backspace(), Some('2'));
        assert_eq!(buffer.as_str(), "1");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.backspace(), None);
    }

    #[test]
    fn test_keypad_press_ignores_other_keys() {
        let keypad = Keypad::new();
        assert!(keypad.press('5'));
        assert!(keypad.press('#'));
        assert!(!keypad.press('a'));
        assert!(!keypad.press(' '));
        assert_eq!(keypad.digits(), "5#");
    }

    #[test]
    fn test_keypad_as_surface() {
        let keypad = Keypad::new();
        keypad.set_typing_active(true);
        keypad.append('+');
        keypad.append('1');
        assert!(keypad.is_typing());
        assert_eq!(keypad.tel_uri().as_deref(), Some("tel:+1"));
    }
}
