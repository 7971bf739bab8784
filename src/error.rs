use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DebuggerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Syntax error in the script text.
    Parse,
    /// Unknown opcode, constant or macro.
    Semantic,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::Parse => write!(f, "parse error"),
            CompileErrorKind::Semantic => write!(f, "semantic error"),
        }
    }
}

/// Error reported by an SSBS or EXPS compiler, with the position in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl CompileError {
    pub fn parse(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind: CompileErrorKind::Parse,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn semantic(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind: CompileErrorKind::Semantic,
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}: {}",
            self.kind, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("file not found in ROM: {0}")]
    NotFound(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("the EXPS source of {filename} does not match the compiled script")]
    StaleMapping { filename: String },

    #[error("invalid script runtime data: {0}")]
    Probe(String),

    #[error("could not hook address 0x{address:08x}: {reason}")]
    HookRegistration { address: u32, reason: String },

    #[error("could not persist debugger state: {0}")]
    Persistence(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DebuggerError {
    pub fn is_compile_error(&self) -> bool {
        matches!(self, DebuggerError::Compile(_))
    }
}
