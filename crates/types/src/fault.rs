use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Category of an application-level failure reported over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Rejected before touching the filesystem: bad path, missing argument,
    /// unknown operation.
    Validation,
    NotFound,
    NotADirectory,
    IsADirectory,
    PermissionDenied,
    /// Declared transfer size above the configured maximum.
    TooLarge,
    /// The byte stream ended before the declared length.
    Transfer,
    Io,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            FaultKind::Validation => "validation",
            FaultKind::NotFound => "not found",
            FaultKind::NotADirectory => "not a directory",
            FaultKind::IsADirectory => "is a directory",
            FaultKind::PermissionDenied => "permission denied",
            FaultKind::TooLarge => "too large",
            FaultKind::Transfer => "transfer",
            FaultKind::Io => "io",
        };
        f.write_str(value)
    }
}

/// Structured error carried inside a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    /// Classify an I/O error raised by a filesystem call on `subject`.
    pub fn from_io(err: &io::Error, subject: impl fmt::Display) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FaultKind::NotFound,
            io::ErrorKind::PermissionDenied => FaultKind::PermissionDenied,
            io::ErrorKind::NotADirectory => FaultKind::NotADirectory,
            io::ErrorKind::IsADirectory => FaultKind::IsADirectory,
            _ => FaultKind::Io,
        };
        Self::new(kind, format!("{subject}: {err}"))
    }
}
