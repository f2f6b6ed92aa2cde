//! Error types for the stack runtime
//!
//! Script-facing failures use [`ScriptError`], whose variants fall into the three
//! user-visible categories (syntax, semantic, permission). The threaded facade
//! wraps them in [`RuntimeError`] together with worker and configuration failures.

use std::fmt;
use std::io;
use thiserror::Error;

/// Broad category a [`ScriptError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed script text.
    Syntax,
    /// Invalid operation given well-formed input.
    Semantic,
    /// Write attempted on a read-only or getter-only property.
    Permission,
}

/// Where in a script an error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Display form of the part whose script was running.
    pub part: String,
    /// Handler or function name.
    pub handler: String,
    /// 1-based source line of the failing statement.
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}, line {}", self.handler, self.part, self.line)
    }
}

/// Errors raised while evaluating scripts or operating on parts, properties and chunks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Script text could not be compiled.
    #[error("syntax error: {message}")]
    Syntax {
        /// Description of the problem.
        message: String,
        /// Line the problem was found on, when known.
        line: Option<usize>,
    },

    /// Property name is not defined on the object.
    #[error("no such property '{property}' of {part}")]
    UnknownProperty {
        /// Display form of the part that was asked.
        part: String,
        /// Requested property name.
        property: String,
    },

    /// Chunk or part ordinal was not a natural number.
    #[error("expected a natural number ordinal, got '{found}'")]
    InvalidOrdinal {
        /// The offending value.
        found: String,
    },

    /// No part matched a specifier.
    #[error("no such {0}")]
    PartNotFound(String),

    /// Function call walked the whole hierarchy without finding a definition.
    #[error("no handler for function '{0}'")]
    FunctionNotFound(String),

    /// Property write rejected.
    #[error("can't set property '{property}': {reason}")]
    Permission {
        /// Property that was written.
        property: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// Any other semantic failure.
    #[error("{0}")]
    Semantic(String),

    /// Execution was interrupted by the host.
    #[error("script execution aborted")]
    Aborted,

    /// An error annotated with the script position it surfaced at.
    #[error("{source} (in {location})")]
    Located {
        /// Script position.
        location: SourceLocation,
        /// The underlying error.
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Build a syntax error without a line.
    pub fn syntax(message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            message: message.into(),
            line: None,
        }
    }

    /// Build a generic semantic error.
    pub fn semantic(message: impl Into<String>) -> Self {
        ScriptError::Semantic(message.into())
    }

    /// Build a permission error for `property`.
    pub fn permission(property: impl Into<String>, reason: impl Into<String>) -> Self {
        ScriptError::Permission {
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Category of this error, looking through location annotations.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScriptError::Syntax { .. } => ErrorCategory::Syntax,
            ScriptError::Permission { .. } => ErrorCategory::Permission,
            ScriptError::Located { source, .. } => source.category(),
            _ => ErrorCategory::Semantic,
        }
    }

    /// Attach a script location unless one is already present.
    pub fn at(self, location: SourceLocation) -> Self {
        match self {
            located @ ScriptError::Located { .. } => located,
            other => ScriptError::Located {
                location,
                source: Box::new(other),
            },
        }
    }

    /// Script location, if the error has been annotated.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            ScriptError::Located { location, .. } => Some(location),
            _ => None,
        }
    }

    /// The error with any location annotation stripped.
    pub fn root(&self) -> &ScriptError {
        match self {
            ScriptError::Located { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience result alias for script-level operations
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Script, property, chunk or part failure
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// The script worker is no longer accepting jobs
    #[error("Script worker has stopped")]
    WorkerStopped,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
