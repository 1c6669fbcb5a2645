//! Room identifiers.
//!
//! Identifiers are 64 lowercase hex characters drawn from 32 bytes of OS
//! randomness. Client-supplied identifiers are format-checked before any
//! directory lookup.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Length of a room identifier in characters.
pub const ROOM_ID_LEN: usize = 64;

/// Error produced when a client-supplied room identifier is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomIdError {
    #[error("room id must be {expected} characters, got {0}", expected = ROOM_ID_LEN)]
    WrongLength(usize),
    #[error("room id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Opaque, unguessable room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOM_ID_LEN / 2];
        OsRng.fill_bytes(&mut bytes);

        let mut id = String::with_capacity(ROOM_ID_LEN);
        for byte in bytes {
            // Writing into a String cannot fail.
            let _ = write!(id, "{:02x}", byte);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        if len != ROOM_ID_LEN {
            return Err(RoomIdError::WrongLength(len));
        }
        if let Some(c) = s.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(RoomIdError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
