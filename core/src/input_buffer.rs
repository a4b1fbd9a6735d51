//! Composer seam and a simple in-memory composer.
//!
//! The conversion session only ever reads the composition: its text, its
//! length and where the cursor sits. `Composer` is that read-only contract;
//! `InputBuffer` is a plain implementation holding already-composed phonetic
//! text (e.g. "きょうと"), useful for hosts without a romaji layer and for tests.

/// Read-only view of the composition buffer.
///
/// Lengths and positions are counted in chars.
pub trait Composer {
    /// The composed phonetic text (the conversion key).
    fn current_text(&self) -> String;

    /// Cursor position in chars, `0..=length()`.
    fn cursor_position(&self) -> usize;

    /// Composition length in chars.
    fn length(&self) -> usize;

    /// Whether nothing is composed.
    fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

/// Composition buffer with a char cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputBuffer {
    text: String,
    cursor: usize, // char offset
}

impl InputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `text` with the cursor at the end.
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    /// Get the current buffer content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get the cursor position in chars.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Length of the buffer in chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Clear the buffer and reset the cursor.
    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_pos)
            .map_or(self.text.len(), |(pos, _)| pos)
    }

    /// Insert a char at the cursor and advance past it.
    pub fn insert_char(&mut self, ch: char) {
        let at = self.byte_offset(self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    /// Insert a string at the cursor and advance past it.
    pub fn insert_str(&mut self, s: &str) {
        let at = self.byte_offset(self.cursor);
        self.text.insert_str(at, s);
        self.cursor += s.chars().count();
    }

    /// Delete the char before the cursor. Returns true if one was deleted.
    pub fn delete_before(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let at = self.byte_offset(self.cursor - 1);
        self.text.remove(at);
        self.cursor -= 1;
        true
    }

    /// Delete the char under the cursor. Returns true if one was deleted.
    pub fn delete_after(&mut self) -> bool {
        if self.cursor >= self.len() {
            return false;
        }
        let at = self.byte_offset(self.cursor);
        self.text.remove(at);
        true
    }

    /// Drop the first `count` chars, e.g. after a partial commit consumed them.
    pub fn remove_prefix(&mut self, count: usize) {
        let count = count.min(self.len());
        let at = self.byte_offset(count);
        self.text.drain(..at);
        self.cursor = self.cursor.saturating_sub(count);
    }

    /// Move the cursor one char left. Returns false at the start.
    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Move the cursor one char right. Returns false at the end.
    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Move the cursor to the start of the buffer.
    pub fn move_to_start(&mut self) {
        self.cursor = 0;
    }

    /// Move the cursor to the end of the buffer.
    pub fn move_to_end(&mut self) {
        self.cursor = self.len();
    }

    /// Set the cursor position. Returns false if `pos` is past the end.
    pub fn set_cursor(&mut self, pos: usize) -> bool {
        if pos <= self.len() {
            self.cursor = pos;
            true
        } else {
            false
        }
    }
}

impl Composer for InputBuffer {
    fn current_text(&self) -> String {
        self.text.clone()
    }

    fn cursor_position(&self) -> usize {
        self.cursor
    }

    fn length(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_puts_cursor_at_end() {
        let buf = InputBuffer::from_text("きょうと");
        assert_eq!(buf.cursor_position(), 4);
        assert_eq!(buf.length(), 4);
        assert_eq!(buf.current_text(), "きょうと");
    }

    #[test]
    fn test_insert_and_delete_multibyte() {
        let mut buf = InputBuffer::new();
        buf.insert_str("きと");
        buf.move_left();
        buf.insert_str("ょう");
        assert_eq!(buf.text(), "きょうと");
        assert_eq!(buf.cursor(), 3);

        assert!(buf.delete_before());
        assert_eq!(buf.text(), "きょと");
        assert!(buf.delete_after());
        assert_eq!(buf.text(), "きょ");
        assert!(!buf.delete_after());
    }

    #[test]
    fn test_cursor_bounds() {
        let mut buf = InputBuffer::from_text("あい");
        assert!(!buf.move_right());
        buf.move_to_start();
        assert!(!buf.move_left());
        assert!(buf.set_cursor(1));
        assert!(!buf.set_cursor(3));
        assert_eq!(buf.cursor(), 1);
    }

    #[test]
    fn test_remove_prefix() {
        let mut buf = InputBuffer::from_text("わたしのなまえ");
        buf.remove_prefix(4);
        assert_eq!(buf.text(), "なまえ");
        assert_eq!(buf.cursor(), 3);
        buf.remove_prefix(10);
        assert!(buf.is_empty());
    }
}
