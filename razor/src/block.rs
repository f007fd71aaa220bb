/// The kind of a scanned block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Raw markup, written to the output as is.
    Literal,
    /// Embedded expression whose value is encoded and written.
    Expression,
    /// Embedded statement code, run for its effects.
    Statement,
    /// A named output region holding its own child blocks.
    Section,
}

/// A node of the intermediate tree built by the scanner.
/// Sections never nest, so the tree is at most two levels deep.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Accumulated source text (empty for sections).
    pub text: String,
    /// Section name (sections only).
    pub name: Option<String>,
    /// Child blocks (sections only).
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Block {
            kind,
            text: String::new(),
            name: None,
            children: Vec::new(),
        }
    }

    pub fn section(name: impl Into<String>, children: Vec<Block>) -> Self {
        Block {
            kind: BlockKind::Section,
            text: String::new(),
            name: Some(name.into()),
            children,
        }
    }

    pub fn append(&mut self, ch: char) {
        self.text.push(ch);
    }

    pub fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    /// Remove the last `count` characters of the text.
    pub(crate) fn truncate_chars(&mut self, count: usize) {
        for _ in 0..count {
            if self.text.pop().is_none() {
                break;
            }
        }
    }
}
