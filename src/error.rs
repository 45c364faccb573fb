use thiserror::Error;

/// Main error type for the MCJava compiler.
///
/// Every category except `Io` is fatal at first occurrence: the driver
/// prints the message to stderr and exits non-zero. Messages carry the
/// stage prefix so a user can tell which pipeline stage rejected the input.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Lexer error: {message} at line {line}, column {col}")]
    Lex {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("Parser error: {message} at line {line}, column {col}")]
    Parse {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("Analyzer error: {0}")]
    Semantic(String),

    #[error("Generation error: {0}")]
    Codegen(String),
}

impl CompileError {
    pub fn lex(message: impl Into<String>, line: usize, col: usize) -> Self {
        CompileError::Lex {
            message: message.into(),
            line,
            col,
        }
    }

    pub fn parse(message: impl Into<String>, line: usize, col: usize) -> Self {
        CompileError::Parse {
            message: message.into(),
            line,
            col,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
