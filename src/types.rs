//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique session identifier
//! - `Nickname`: validated 2-20 character handle without whitespace

use uuid::Uuid;

use crate::error::HandshakeError;

/// Minimum nickname length in characters
pub const NICKNAME_MIN_LEN: usize = 2;

/// Maximum nickname length in characters
pub const NICKNAME_MAX_LEN: usize = 20;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4. Two sessions that used the same nickname at different
/// times still have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated nickname
///
/// Only constructed through [`Nickname::parse`], so every value in the
/// registry satisfies the format rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Trim the raw input and check the format rule
    pub fn parse(raw: &str) -> Result<Self, HandshakeError> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len)
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(HandshakeError::InvalidFormat);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Nickname {
    fn borrow(&self) -> &str {
        &self.0
    }
}
