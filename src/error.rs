//! Library error types.

use std::fmt;

/// An sse-index Result, normally returning an sse-index [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An sse-index error. Encompasses any issue that can happen during
/// configuration, database setup, token generation, search, or
/// serialization of the scheme structures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Occurs when a configuration is rejected: a required key is missing, a
    /// primitive name is unknown, or a parameter is out of its legal range
    /// (e.g. an AES key length other than 16, 24, or 32 bytes).
    Config(String),
    /// The database is too large for the chosen parameters, e.g. a pointer
    /// index would not fit in the configured index size.
    SizeOverflow {
        /// What overflowed
        what: &'static str,
        /// The largest value the parameters can represent
        limit: usize,
        /// The value the database required
        actual: usize,
    },
    /// A ciphertext failed to decrypt or unpad. On honest inputs this
    /// indicates a corrupted encrypted database or a wrong key.
    Decryption,
    /// Serialized data did not begin with the expected magic header.
    BadHeader(String),
    /// Serialized data ended before the decoder was done.
    LengthTooShort {
        /// What step of the decoding we were on when it failed
        step: &'static str,
        /// The number of bytes actually available
        actual: usize,
        /// The number of bytes the step needed
        expected: usize,
    },
    /// A primitive was called with a key or message of the wrong size, or a
    /// fixed-size field was decoded from a body of the wrong length.
    LengthMismatch {
        /// Which input had the wrong length
        what: &'static str,
        /// The length required by the configuration
        expected: usize,
        /// The length actually supplied
        actual: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Config(ref err) => write!(f, "Bad configuration: {}", err),
            Error::SizeOverflow {
                what,
                limit,
                actual,
            } => write!(
                f,
                "Database too large: {} needs {}, parameters allow at most {}",
                what, actual, limit
            ),
            Error::Decryption => write!(f, "Ciphertext failed to decrypt"),
            Error::BadHeader(ref err) => write!(f, "Data has bad magic header: {}", err),
            Error::LengthTooShort {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected {} more bytes, but got {} on step [{}]",
                expected, actual, step
            ),
            Error::LengthMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Length mismatch for {}: expected {} bytes, got {}",
                what, expected, actual
            ),
        }
    }
}

impl std::error::Error for Error {}
