//! Account identifiers.

use crate::error::{RecordError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_DID_LEN: usize = 2048;

/// A validated decentralized identifier, e.g. `did:plc:abc123`.
///
/// Comparison is plain string comparison; a DID never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string.
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(RecordError::InvalidDid(s.to_string()))
        }
    }

    /// The DID method (`plc`, `web`, ...).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(s: &str) -> bool {
    if s.len() > MAX_DID_LEN || s.ends_with(':') {
        return false;
    }
    let Some(rest) = s.strip_prefix("did:") else {
        return false;
    };
    let Some((method, id)) = rest.split_once(':') else {
        return false;
    };
    !method.is_empty()
        && method.bytes().all(|b| b.is_ascii_lowercase())
        && !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
}

impl FromStr for Did {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = RecordError;

    fn try_from(s: String) -> Result<Self> {
        if is_valid(&s) {
            Ok(Self(s))
        } else {
            Err(RecordError::InvalidDid(s))
        }
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
