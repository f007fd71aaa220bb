use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// A location in template source.
/// `line` and `column` are 1-based; `offset` is the byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every distinct failure the scanner, parser and execution environment can raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Markup
    #[error("'{tag}' tag has no matching start tag")]
    MissingMatchingStartTag { tag: String },
    #[error("'{tag}' tag has no matching end tag")]
    MissingMatchingEndTag { tag: String },
    #[error("unexpected '{ch}' character")]
    UnexpectedCharacter { ch: char },
    #[error("tag name expected")]
    TagNameExpected,
    #[error("invalid HTML tag '{tag}'")]
    InvalidHtmlTag { tag: String },

    // Embedded code
    #[error("invalid '{ch}' character in expression")]
    InvalidExpressionCharacter { ch: char },
    #[error("'{expression}' is missing a closing '{expected}' character")]
    ExpressionMissingEnd { expression: String, expected: char },
    #[error("the code block starting with '{line}' is missing a closing '}}' character")]
    CodeBlockMissingClosingChar { line: String },
    #[error("unexpected '@' character inside a code block")]
    UnexpectedAtCharacter,
    #[error("end of file was found after the '@' character")]
    EndOfFileFoundAfterAtSign,
    #[error("'{ch}' is not valid at the start of a code block")]
    NotValidStartOfCodeBlock { ch: char },
    #[error("'{expected}' character is expected")]
    CharacterExpected { expected: char },

    // Sections
    #[error("section blocks cannot be nested")]
    SectionsCannotBeNested,
    #[error("a whitespace character is expected after '{keyword}'")]
    WhiteSpaceExpectedAfter { keyword: String },
    #[error("a section name is expected after '{keyword}'")]
    SectionNameExpectedAfterKeyword { keyword: String },
    #[error("a section name cannot start with '{ch}', it must start with a letter or '_'")]
    SectionNameCannotStartWith { ch: char },
    #[error("a section name cannot include '{ch}', only letters, digits and '_' are allowed")]
    SectionNameCannotInclude { ch: char },
    #[error("section '{name}' is already defined")]
    SectionIsAlreadyDefined { name: String },
    #[error("unexpected '{ch}' after the section name, '{{' is expected")]
    UnexpectedLiteralFollowingSection { ch: char },
    #[error("section '{name}' requested by '{requested_by}' is not found")]
    SectionIsNotFound { name: String, requested_by: String },
    #[error(
        "section '{name}' has already been rendered by '{rendered_by}' \
         and cannot be rendered again by '{requested_by}'"
    )]
    SectionHasBeenRendered {
        name: String,
        rendered_by: String,
        requested_by: String,
    },
    #[error("section '{name}' cannot start while section '{active}' is being captured")]
    UnexpectedSectionName { name: String, active: String },

    // Composition
    #[error("partial view '{name}' is not found (searched: {})", .searched.join(", "))]
    PartialNotFound { name: String, searched: Vec<String> },
    #[error("partial views are nested deeper than {depth} levels")]
    TemplateNestingTooDeep { depth: usize },
    #[error("cannot read '{path}': {message}")]
    Io { path: String, message: String },

    // Embedded evaluator
    #[error("{message}")]
    Evaluation { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// A structured, position-carrying template error.
#[derive(Debug)]
pub struct RazorError {
    pub kind: ErrorKind,
    pub file_path: String,
    pub position: Option<Position>,
    pub notes: Vec<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RazorError {
    pub fn new(kind: ErrorKind, file_path: impl Into<String>) -> Self {
        RazorError {
            kind,
            file_path: file_path.into(),
            position: None,
            notes: Vec::new(),
            cause: None,
        }
    }

    pub fn at(kind: ErrorKind, file_path: impl Into<String>, position: Position) -> Self {
        RazorError {
            position: Some(position),
            ..RazorError::new(kind, file_path)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.position.map(|p| p.line)
    }

    pub fn column(&self) -> Option<usize> {
        self.position.map(|p| p.column)
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::error().with_message(self.kind.to_string());
        if let Some(position) = self.position {
            diagnostic = diagnostic
                .with_labels(vec![Label::primary(file_id, position.offset..position.offset)]);
        }
        let mut notes = self.notes.clone();
        if let Some(cause) = &self.cause {
            notes.push(format!("caused by: {}", cause));
        }
        diagnostic.with_notes(notes)
    }
}

impl fmt::Display for RazorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} ({}:{})", self.kind, self.file_path, position),
            None => write!(f, "{} ({})", self.kind, self.file_path),
        }
    }
}

impl std::error::Error for RazorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}
