// Error record shared by every layer above the format code.

use std::fmt;

use crate::vcdiff::FormatError;

/// What went wrong, at the granularity callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The engine could not be set up (bad dictionary, allocation failure).
    Init,
    /// The encoder failed mid-stream.
    Encode,
    /// The decoder rejected its input.
    Decode,
    /// Invalid options or arguments, reported before any engine exists.
    Validation,
    /// The session was already closed or errored.
    ClosedSession,
}

impl ErrorKind {
    /// Numeric code of the engine error kinds; `None` for errors raised by
    /// the adapter itself.
    pub fn native_code(self) -> Option<i32> {
        match self {
            ErrorKind::Init => Some(1),
            ErrorKind::Encode => Some(2),
            ErrorKind::Decode => Some(3),
            ErrorKind::Validation | ErrorKind::ClosedSession => None,
        }
    }

    /// Stable symbolic name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Init => "VCD_INIT_ERROR",
            ErrorKind::Encode => "VCD_ENCODE_ERROR",
            ErrorKind::Decode => "VCD_DECODE_ERROR",
            ErrorKind::Validation => "VCD_VALIDATION_ERROR",
            ErrorKind::ClosedSession => "VCD_CLOSED_SESSION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{kind, native_code, message}`. Cloned freely: one failure is handed to
/// the error notification, every pending callback and the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct VcdiffError {
    kind: ErrorKind,
    native_code: Option<i32>,
    message: String,
}

impl VcdiffError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            native_code: kind.native_code(),
            message: message.into(),
        }
    }

    pub fn init(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Init, message)
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encode, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClosedSession, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn native_code(&self) -> Option<i32> {
        self.native_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<FormatError> for VcdiffError {
    fn from(e: FormatError) -> Self {
        Self::decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kinds_carry_native_codes() {
        assert_eq!(VcdiffError::init("x").native_code(), Some(1));
        assert_eq!(VcdiffError::encode("x").native_code(), Some(2));
        assert_eq!(VcdiffError::decode("x").native_code(), Some(3));
        assert_eq!(VcdiffError::validation("x").native_code(), None);
        assert_eq!(VcdiffError::closed("x").native_code(), None);
    }

    #[test]
    fn display_names_the_kind() {
        let err = VcdiffError::closed("write after end");
        assert_eq!(err.to_string(), "VCD_CLOSED_SESSION: write after end");
    }

    #[test]
    fn format_errors_become_decode_errors() {
        let err: VcdiffError = FormatError::TargetNotAllowed.into();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.message(), "VCD_TARGET windows are not allowed");
    }
}
