//! Bounded text buffers backing the form fields.
//!
//! The cursor is a char index, so multi-byte input never splits a code point.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// An editable text value with a cursor and a maximum character count.
#[derive(Debug, Clone)]
pub struct TextInput {
    chars: Vec<char>,
    cursor: usize,
    limit: usize,
    multiline: bool,
}

impl TextInput {
    /// A buffer that accepts newlines.
    pub fn multi_line(limit: usize) -> Self {
        Self {
            chars: Vec::new(),
            cursor: 0,
            limit,
            multiline: true,
        }
    }

    /// A buffer restricted to one line; Enter is not accepted.
    pub fn single_line(limit: usize) -> Self {
        Self {
            multiline: false,
            ..Self::multi_line(limit)
        }
    }

    pub fn value(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
    }

    /// Replace the value, truncating to the limit, and park the cursor at the end.
    #[cfg(test)]
    pub fn set_value(&mut self, value: &str) {
        self.chars = value
            .chars()
            .filter(|c| self.multiline || *c != '\n')
            .take(self.limit)
            .collect();
        self.cursor = self.chars.len();
    }

    /// Insert a character at the cursor. Returns false when the buffer is full
    /// or the character is not accepted by this buffer.
    pub fn insert_char(&mut self, c: char) -> bool {
        if self.chars.len() >= self.limit {
            return false;
        }
        if c == '\n' {
            if !self.multiline {
                return false;
            }
        } else if c.is_control() {
            return false;
        }
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
        true
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char_before(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        true
    }

    /// Delete the character at the cursor (delete key).
    pub fn delete_char_at(&mut self) -> bool {
        if self.cursor >= self.chars.len() {
            return false;
        }
        self.chars.remove(self.cursor);
        true
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        if self.cursor < self.chars.len() {
            self.cursor += 1;
        }
    }

    /// Move to the start of the current line.
    pub fn cursor_home(&mut self) {
        self.cursor = self.line_start(self.cursor);
    }

    /// Move to the end of the current line.
    pub fn cursor_end(&mut self) {
        self.cursor = self.line_end(self.cursor);
    }

    pub fn cursor_up(&mut self) {
        let start = self.line_start(self.cursor);
        if start == 0 {
            return;
        }
        let column = self.cursor - start;
        let prev_start = self.line_start(start - 1);
        let prev_len = (start - 1) - prev_start;
        self.cursor = prev_start + column.min(prev_len);
    }

    pub fn cursor_down(&mut self) {
        let end = self.line_end(self.cursor);
        if end >= self.chars.len() {
            return;
        }
        let column = self.cursor - self.line_start(self.cursor);
        let next_start = end + 1;
        let next_len = self.line_end(next_start) - next_start;
        self.cursor = next_start + column.min(next_len);
    }

    /// Cursor as (line, column), both zero-based and counted in chars.
    pub fn cursor_position(&self) -> (usize, usize) {
        let line = self.chars[..self.cursor]
            .iter()
            .filter(|c| **c == '\n')
            .count();
        (line, self.cursor - self.line_start(self.cursor))
    }

    /// The value split into lines; always at least one (possibly empty) line.
    pub fn lines(&self) -> Vec<String> {
        self.value().split('\n').map(String::from).collect()
    }

    /// Apply an editing key. Returns true when the key was recognized as an
    /// edit or cursor movement.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
        match key.code {
            KeyCode::Char(c) if plain => {
                self.insert_char(c);
                true
            }
            KeyCode::Enter if self.multiline => {
                self.insert_char('\n');
                true
            }
            KeyCode::Backspace => {
                self.delete_char_before();
                true
            }
            KeyCode::Delete => {
                self.delete_char_at();
                true
            }
            KeyCode::Left => {
                self.cursor_left();
                true
            }
            KeyCode::Right => {
                self.cursor_right();
                true
            }
            KeyCode::Up if self.multiline => {
                self.cursor_up();
                true
            }
            KeyCode::Down if self.multiline => {
                self.cursor_down();
                true
            }
            KeyCode::Home => {
                self.cursor_home();
                true
            }
            KeyCode::End => {
                self.cursor_end();
                true
            }
            _ => false,
        }
    }

    fn line_start(&self, pos: usize) -> usize {
        self.chars[..pos]
            .iter()
            .rposition(|c| *c == '\n')
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    fn line_end(&self, pos: usize) -> usize {
        self.chars[pos..]
            .iter()
            .position(|c| *c == '\n')
            .map(|i| pos + i)
            .unwrap_or(self.chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn typed(input: &mut TextInput, text: &str) {
        for c in text.chars() {
            input.insert_char(c);
        }
    }

    #[test]
    fn test_insert_respects_limit() {
        let mut input = TextInput::single_line(3);
        typed(&mut input, "abcdef");
        assert_eq!(input.value(), "abc");
        assert!(!input.insert_char('z'));
    }

    #[test]
    fn test_single_line_rejects_newline() {
        let mut input = TextInput::single_line(10);
        typed(&mut input, "a\nb");
        assert_eq!(input.value(), "ab");
        assert!(!input.handle_key(key(KeyCode::Enter)));
    }

    #[test]
    fn test_multi_line_accepts_enter() {
        let mut input = TextInput::multi_line(10);
        typed(&mut input, "ab");
        assert!(input.handle_key(key(KeyCode::Enter)));
        typed(&mut input, "c");
        assert_eq!(input.lines(), vec!["ab".to_string(), "c".to_string()]);
        assert_eq!(input.cursor_position(), (1, 1));
    }

    #[test]
    fn test_insert_in_middle() {
        let mut input = TextInput::single_line(10);
        typed(&mut input, "ac");
        input.cursor_left();
        input.insert_char('b');
        assert_eq!(input.value(), "abc");
        assert_eq!(input.cursor(), 2);
    }

    #[test]
    fn test_backspace_and_delete() {
        let mut input = TextInput::single_line(10);
        typed(&mut input, "abc");
        assert!(input.delete_char_before());
        assert_eq!(input.value(), "ab");
        input.cursor_home();
        assert!(!input.delete_char_before());
        assert!(input.delete_char_at());
        assert_eq!(input.value(), "b");
        input.cursor_end();
        assert!(!input.delete_char_at());
    }

    #[test]
    fn test_multibyte_chars() {
        let mut input = TextInput::single_line(10);
        typed(&mut input, "héllo");
        input.cursor_left();
        input.delete_char_before();
        assert_eq!(input.value(), "hélo");
        assert_eq!(input.len(), 4);
    }

    #[test]
    fn test_cursor_up_down_clamps_column() {
        let mut input = TextInput::multi_line(100);
        typed(&mut input, "long line\nab\nlonger line");
        // cursor at end of third line (col 11)
        input.cursor_up();
        assert_eq!(input.cursor_position(), (1, 2));
        input.cursor_up();
        assert_eq!(input.cursor_position(), (0, 2));
        input.cursor_up();
        assert_eq!(input.cursor_position(), (0, 2));
        input.cursor_down();
        input.cursor_down();
        assert_eq!(input.cursor_position(), (2, 2));
        input.cursor_down();
        assert_eq!(input.cursor_position(), (2, 2));
    }

    #[test]
    fn test_home_end_are_line_relative() {
        let mut input = TextInput::multi_line(100);
        typed(&mut input, "abc\ndef");
        input.cursor_home();
        assert_eq!(input.cursor(), 4);
        input.cursor_up();
        input.cursor_end();
        assert_eq!(input.cursor(), 3);
    }

    #[test]
    fn test_control_chars_not_inserted() {
        let mut input = TextInput::single_line(10);
        let ctrl_x = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL);
        assert!(!input.handle_key(ctrl_x));
        assert!(!input.insert_char('\u{7}'));
        assert_eq!(input.value(), "");
    }

    #[test]
    fn test_set_value_truncates_and_clear_resets() {
        let mut input = TextInput::single_line(4);
        input.set_value("ab\ncdef");
        assert_eq!(input.value(), "abcd");
        assert_eq!(input.cursor(), 4);
        input.clear();
        assert_eq!(input.value(), "");
        assert_eq!(input.cursor(), 0);
    }
}
