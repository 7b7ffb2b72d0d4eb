//! Session error types

use std::fmt;

/// Errors that can occur during session operations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The backend is not connected (never connected, or closed)
    Connection,
    /// Cookie envelope could not be produced or verified
    Cookie(CookieError),
    /// Error during payload serialization/deserialization
    Serialization(String),
    /// Error reported by the key-value backend, including invalid record keys
    Backend(String),
}

/// Reasons a cookie envelope is rejected or cannot be built
#[derive(Debug, Clone, PartialEq)]
pub enum CookieError {
    /// A hash or block key is unusable
    InvalidKey(String),
    /// The envelope is not valid base64 or has the wrong structure
    Decode(String),
    /// The signature does not match
    MacInvalid,
    /// The envelope is older than its max age allows
    Expired,
    /// The envelope exceeds the maximum cookie length
    TooLong,
    /// The encrypted value could not be decrypted
    Decrypt,
    /// The value could not be encrypted
    Encrypt,
    /// No codec was configured
    NoCodecs,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connection => {
                write!(f, "Session store error: backend isn't connected")
            }
            SessionError::Cookie(e) => write!(f, "Cookie error: {}", e),
            SessionError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            SessionError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieError::InvalidKey(msg) => write!(f, "invalid key: {}", msg),
            CookieError::Decode(msg) => write!(f, "malformed value: {}", msg),
            CookieError::MacInvalid => write!(f, "the value is not valid"),
            CookieError::Expired => write!(f, "expired timestamp"),
            CookieError::TooLong => write!(f, "the value is too long"),
            CookieError::Decrypt => write!(f, "the value could not be decrypted"),
            CookieError::Encrypt => write!(f, "the value could not be encrypted"),
            CookieError::NoCodecs => write!(f, "no codecs were provided"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Cookie(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for CookieError {}

impl From<CookieError> for SessionError {
    fn from(err: CookieError) -> Self {
        SessionError::Cookie(err)
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::Backend(format!("redis: {}", err))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}
