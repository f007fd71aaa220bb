use razor::RazorError;
use thiserror::Error;

/// Errors raised while running embedded statements and expressions.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },
    #[error("{0} is not defined")]
    UndefinedVariable(String),
    #[error("cannot read properties of {target} (reading '{property}')")]
    UndefinedProperty { target: String, property: String },
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("{receiver}.{method} is not a function")]
    UnknownMethod { receiver: String, method: String },
    #[error("invalid assignment target")]
    InvalidAssignment,
    #[error("syntax error: {message}")]
    Syntax { message: String },
    #[error("array index {index} is out of range (arrays hold at most {limit} items)")]
    IndexOutOfRange { index: String, limit: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("'{0}' used outside of a loop")]
    StrayJump(&'static str),
    #[error("stack overflow")]
    StackOverflow,
    /// A template error raised by the host (sections, partials), passed through unchanged.
    #[error(transparent)]
    Template(#[from] RazorError),
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn syntax(message: impl Into<String>) -> Self {
        RuntimeError::Syntax {
            message: message.into(),
        }
    }
}
