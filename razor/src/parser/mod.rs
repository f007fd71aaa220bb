mod code;
mod markup;
mod section;

use crate::block::{Block, BlockKind};
use crate::cursor::Cursor;
use crate::error::{ErrorKind, Position, RazorError};
use crate::sections::ParsedSectionRegistry;

/// Reserved keyword that starts a section declaration (`@section Name { ... }`).
pub const SECTION_KEYWORD: &str = "section";

/// File path used when the caller does not name the template.
pub const DEFAULT_FILE_PATH: &str = "default";

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Template scanner.
///
/// Holds the cursor and the scanning state shared by the scan modes (markup,
/// markup inside a statement, expression, statement block and section), which
/// call one another recursively and append blocks to the sequence they are given.
pub struct Parser<'r> {
    cursor: Cursor,
    file_path: String,
    /// Leading whitespace of the current line, not yet attributed to a block.
    padding: String,
    in_section: bool,
    sections: &'r mut ParsedSectionRegistry,
}

impl<'r> Parser<'r> {
    pub fn new(
        source: &str,
        file_path: impl Into<String>,
        sections: &'r mut ParsedSectionRegistry,
    ) -> Self {
        let file_path = file_path.into();
        Parser {
            cursor: Cursor::new(source),
            file_path: if file_path.is_empty() {
                DEFAULT_FILE_PATH.to_string()
            } else {
                file_path
            },
            padding: String::new(),
            in_section: false,
            sections,
        }
    }

    /// Scan the whole source into a block tree.
    pub fn parse(mut self) -> Result<Vec<Block>, RazorError> {
        log::debug!("parsing '{}'", self.file_path);
        let mut blocks = Vec::new();
        self.scan_markup(&mut blocks, None)?;
        Ok(prune(blocks))
    }

    fn error(&self, kind: ErrorKind) -> RazorError {
        RazorError::at(kind, self.file_path.as_str(), self.cursor.position())
    }

    fn error_at(&self, kind: ErrorKind, position: Position) -> RazorError {
        RazorError::at(kind, self.file_path.as_str(), position)
    }

    /// Move pending padding into the last block.
    fn flush_padding(&mut self, blocks: &mut [Block]) {
        if self.padding.is_empty() {
            return;
        }
        let padding = std::mem::take(&mut self.padding);
        if let Some(block) = blocks.last_mut() {
            block.text.push_str(&padding);
        }
    }

    /// Step the cursor back `count` characters and remove them from the last
    /// block. An empty (or blank statement) last block is dropped.
    fn step_back(&mut self, blocks: &mut Vec<Block>, count: usize) -> Result<(), RazorError> {
        let fits = blocks
            .last()
            .is_none_or(|block| block.text.chars().count() >= count);
        if !fits || !self.cursor.step_back(count) {
            return Err(self.error(ErrorKind::Internal {
                message: format!("cannot step back {} characters", count),
            }));
        }

        let Some(block) = blocks.last_mut() else {
            return Ok(());
        };
        if block.text.is_empty() || (block.kind == BlockKind::Statement && block.is_blank()) {
            blocks.pop();
        } else if count > 0 {
            block.truncate_chars(count);
            if block.text.is_empty() {
                blocks.pop();
            }
        }
        Ok(())
    }
}

fn push_block(blocks: &mut Vec<Block>, kind: BlockKind) {
    blocks.push(Block::new(kind));
}

fn append(blocks: &mut [Block], ch: char) {
    if let Some(block) = blocks.last_mut() {
        block.append(ch);
    }
}

/// Drop empty literal and blank statement blocks left behind by scanning.
fn prune(blocks: Vec<Block>) -> Vec<Block> {
    blocks
        .into_iter()
        .filter_map(|mut block| match block.kind {
            BlockKind::Literal if block.text.is_empty() => None,
            BlockKind::Statement if block.is_blank() => None,
            BlockKind::Section => {
                block.children = prune(std::mem::take(&mut block.children));
                Some(block)
            }
            _ => Some(block),
        })
        .collect()
}

fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

fn can_expression_start_with(ch: char) -> bool {
    ch == '_' || ch == '$' || ch == '(' || ch == '[' || ch.is_alphabetic()
}

fn can_expression_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphanumeric()
}

fn can_section_start_with(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn can_section_contain(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// Whether `ch` opens a string (or regex) literal in embedded code.
/// A `/` only does so where an operand is expected, and never right after `<`.
fn opens_text(ch: char, last_significant: Option<char>) -> bool {
    match ch {
        '\'' | '"' | '`' => true,
        '/' => match last_significant {
            None => true,
            Some('<') => false,
            Some(prev) => "(,=:[!&|?{};+-*%~^".contains(prev),
        },
        _ => false,
    }
}

/// Advance `position` over `prefix`, which must lie on the same line.
fn shift(position: Position, prefix: &str) -> Position {
    Position {
        offset: position.offset + prefix.len(),
        line: position.line,
        column: position.column + prefix.chars().count(),
    }
}
