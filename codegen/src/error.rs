//! Error types for the kernel front end and evaluator.

use snafu::Snafu;

use crate::lexer::Pos;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// File name used in front-end diagnostics.
pub const SOURCE_NAME: &str = "kernel.cpp";

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Front-end diagnostic, formatted the way a C++ compiler reports it.
    #[snafu(display("{SOURCE_NAME}:{line}:{col}: error: {message}"))]
    Diagnostic { line: u32, col: u32, message: String },

    /// The entry point does not name a function of the translation unit.
    #[snafu(display("{SOURCE_NAME}: error: no function named '{entry}' (found: {})", available.join(", ")))]
    EntryNotFound { entry: String, available: Vec<String> },

    #[snafu(display("index {index} out of bounds for axis {axis} of '{name}' (extent {extent})"))]
    IndexOutOfBounds { name: String, axis: usize, index: i64, extent: usize },

    #[snafu(display("pop from empty tape '{name}'"))]
    TapeUnderflow { name: String },

    #[snafu(display("integer division by zero"))]
    DivisionByZero,

    /// Buffers handed to the evaluator do not match the function signature.
    #[snafu(display("slot mismatch: {reason}"))]
    SlotMismatch { reason: String },
}

impl Error {
    pub fn at(pos: Pos, message: impl Into<String>) -> Self {
        Self::Diagnostic { line: pos.line, col: pos.col, message: message.into() }
    }

    /// Whether this error was raised while translating source (as opposed to running it).
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Diagnostic { .. } | Self::EntryNotFound { .. })
    }
}
