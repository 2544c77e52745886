//! Flat error taxonomy shared by every engine operation.

/// Error codes reported by the engine.
///
/// Each variant carries a stable numeric code (see [`Error::code`]) so that
/// thin wrappers can hand it across a language boundary unchanged. `0` is
/// reserved for "no error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u32)]
pub enum Error {
    /// An allocation was refused by the memory provider
    #[error("Out of memory")]
    OutOfMemory = 1,

    /// Architecture unknown or excluded at build time
    #[error("Unsupported architecture")]
    UnsupportedArch = 2,

    /// The query cannot be answered for this record's architecture
    #[error("Invalid handle for this query")]
    UnsupportedQuery = 3,

    /// No session, or the session was already closed
    #[error("Invalid handle")]
    InvalidHandle = 4,

    /// Mode flags not valid for the architecture
    #[error("Invalid mode")]
    InvalidMode = 5,

    /// Option or option value not supported
    #[error("Invalid option")]
    InvalidOption = 6,

    /// The record was produced without detail mode
    #[error("Details are unavailable")]
    DetailUnavailable = 7,

    /// No memory provider was installed before opening a session
    #[error("Dynamic memory management uninitialized")]
    MemoryNotConfigured = 8,
}

impl Error {
    /// Stable numeric code of this error.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a numeric code back to an error. `0` (OK) and unknown codes give `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Error::OutOfMemory,
            2 => Error::UnsupportedArch,
            3 => Error::UnsupportedQuery,
            4 => Error::InvalidHandle,
            5 => Error::InvalidMode,
            6 => Error::InvalidOption,
            7 => Error::DetailUnavailable,
            8 => Error::MemoryNotConfigured,
            _ => return None,
        })
    }
}

/// Human-readable description of a numeric error code.
pub fn strerror(code: u32) -> &'static str {
    match code {
        0 => "OK",
        1 => "Out of memory",
        2 => "Unsupported architecture",
        3 => "Invalid handle for this query",
        4 => "Invalid handle",
        5 => "Invalid mode",
        6 => "Invalid option",
        7 => "Details are unavailable",
        8 => "Dynamic memory management uninitialized",
        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 1..=8 {
            let err = Error::from_code(code).unwrap();
            assert_eq!(err.code(), code);
            assert_eq!(err.to_string(), strerror(code));
        }
    }

    #[test]
    fn test_ok_and_unknown_codes() {
        assert_eq!(Error::from_code(0), None);
        assert_eq!(Error::from_code(42), None);
        assert_eq!(strerror(0), "OK");
        assert_eq!(strerror(42), "Unknown error code");
    }
}
