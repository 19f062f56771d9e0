//! AT URI parsing.

use crate::did::Did;
use crate::error::{RecordError, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed `at://` record reference.
///
/// Only the authority is needed by the rules (it is the account that owns
/// the record), but collection and record key are kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    authority: String,
    collection: Option<String>,
    rkey: Option<String>,
}

impl AtUri {
    /// Parse an AT URI.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || RecordError::InvalidUri(s.to_string());

        let rest = s.strip_prefix("at://").ok_or_else(invalid)?;
        if rest.contains(['?', '#', ' ']) {
            return Err(invalid());
        }

        let mut parts = rest.split('/');
        let authority = parts.next().filter(|a| !a.is_empty()).ok_or_else(invalid)?;
        let collection = parts.next();
        let rkey = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }
        if matches!(collection, Some("")) || matches!(rkey, Some("")) {
            return Err(invalid());
        }
        if !valid_authority(authority) {
            return Err(invalid());
        }

        Ok(Self {
            authority: authority.to_string(),
            collection: collection.map(str::to_string),
            rkey: rkey.map(str::to_string),
        })
    }

    /// The raw authority segment (DID or handle).
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The authority as a DID; fails for handle authorities.
    pub fn authority_did(&self) -> Result<Did> {
        Did::parse(&self.authority).map_err(|_| RecordError::AuthorityNotDid(self.authority.clone()))
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn rkey(&self) -> Option<&str> {
        self.rkey.as_deref()
    }
}

fn valid_authority(authority: &str) -> bool {
    if authority.starts_with("did:") {
        return Did::parse(authority).is_ok();
    }
    // handle: dotted hostname
    authority.contains('.')
        && authority
            .split('.')
            .all(|label| !label.is_empty() && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-'))
}

impl FromStr for AtUri {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}", self.authority)?;
        if let Some(collection) = &self.collection {
            write!(f, "/{}", collection)?;
        }
        if let Some(rkey) = &self.rkey {
            write!(f, "/{}", rkey)?;
        }
        Ok(())
    }
}
