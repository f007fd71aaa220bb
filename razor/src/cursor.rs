use crate::error::Position;

/// A character cursor over template source.
///
/// Tracks the current line (number and consumed text) so errors can be reported
/// with 1-based line/column positions and so the scanner can step back within
/// the current line.
#[derive(Debug, Clone)]
pub struct Cursor {
    chars: Vec<char>,
    /// Byte offset of every char, plus one trailing entry for end of input.
    offsets: Vec<usize>,
    pos: usize,
    /// Text consumed so far on the current line.
    line: String,
    line_chars: usize,
    /// 0-based line number.
    line_num: usize,
}

impl Cursor {
    pub fn new(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for c in &chars {
            offsets.push(offset);
            offset += c.len_utf8();
        }
        offsets.push(offset);

        Cursor {
            chars,
            offsets,
            pos: 0,
            line: String::new(),
            line_chars: 0,
            line_num: 0,
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    /// Consume one character. A newline starts a new line.
    pub fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line.clear();
            self.line_chars = 0;
            self.line_num += 1;
        } else {
            self.line.push(ch);
            self.line_chars += 1;
        }
        Some(ch)
    }

    /// Rewind `count` characters. Only characters consumed on the current line
    /// can be stepped back over; returns false (and does nothing) otherwise.
    #[must_use]
    pub fn step_back(&mut self, count: usize) -> bool {
        if count > self.line_chars {
            return false;
        }
        for _ in 0..count {
            self.line.pop();
        }
        self.line_chars -= count;
        self.pos -= count;
        true
    }

    /// Consume characters while `predicate` holds; returns the first character
    /// that does not satisfy it (not consumed).
    pub fn skip_while(&mut self, predicate: impl Fn(char) -> bool) -> Option<char> {
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                return Some(ch);
            }
            self.advance();
        }
        None
    }

    /// Position of the next (not yet consumed) character.
    pub fn position(&self) -> Position {
        Position {
            offset: self.offsets[self.pos],
            line: self.line_num + 1,
            column: self.line_chars + 1,
        }
    }

    /// Position `back` characters before the next character on the current line.
    pub fn position_back(&self, back: usize) -> Position {
        let back = back.min(self.line_chars);
        Position {
            offset: self.offsets[self.pos - back],
            line: self.line_num + 1,
            column: self.line_chars - back + 1,
        }
    }

    /// Text consumed so far on the current line.
    pub fn line_text(&self) -> &str {
        &self.line
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
}
