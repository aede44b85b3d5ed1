//! Client-side identifiers.
//!
//! Rows created while the authoritative store has not answered yet carry a
//! [`TempId`]. A create mints one root id; a transfer's incoming leg and the
//! instances of a recurring series derive theirs from it:
//!
//! - `tmp-<uuid>`: the row itself (outgoing leg, series template)
//! - `tmp-<uuid>~in`: incoming transfer leg
//! - `tmp-<uuid>#<n>`: n-th series instance
//!
//! The root doubles as the idempotency key of the create, so a replayed
//! create is recognised by the store.

use std::{borrow::Borrow, collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClientError;

const TEMP_PREFIX: &str = "tmp-";
const INCOMING_SUFFIX: &str = "~in";

/// Temporary id to the authoritative id that replaced it.
pub type IdMap = BTreeMap<TempId, Uuid>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    pub fn new() -> Self {
        Self(format!("{TEMP_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn incoming_leg(&self) -> Self {
        Self(format!("{}{INCOMING_SUFFIX}", self.root().0))
    }

    pub fn instance(&self, index: usize) -> Self {
        Self(format!("{}#{index}", self.root().0))
    }

    /// The id minted by the create this id descends from.
    pub fn root(&self) -> Self {
        let end = self
            .0
            .find(['~', '#'])
            .unwrap_or(self.0.len());
        Self(self.0[..end].to_string())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl Borrow<str> for TempId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of a row as the client knows it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LocalId {
    Real(Uuid),
    Temp(TempId),
}

impl LocalId {
    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn real(&self) -> Option<Uuid> {
        match self {
            Self::Real(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }

    /// Swaps a temporary id for its authoritative one when `ids` knows it.
    pub fn resolve(&self, ids: &IdMap) -> Self {
        match self {
            Self::Temp(temp) => ids
                .get(temp)
                .map_or_else(|| self.clone(), |id| Self::Real(*id)),
            Self::Real(_) => self.clone(),
        }
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(id) => write!(f, "{id}"),
            Self::Temp(temp) => write!(f, "{temp}"),
        }
    }
}

impl FromStr for LocalId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(TEMP_PREFIX) {
            return Ok(Self::Temp(TempId(s.to_string())));
        }
        Uuid::parse_str(s)
            .map(Self::Real)
            .map_err(|err| ClientError::InvalidInput(format!("bad id {s:?}: {err}")))
    }
}

impl TryFrom<String> for LocalId {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalId> for String {
    fn from(value: LocalId) -> Self {
        value.to_string()
    }
}

impl From<Uuid> for LocalId {
    fn from(value: Uuid) -> Self {
        Self::Real(value)
    }
}

impl From<TempId> for LocalId {
    fn from(value: TempId) -> Self {
        Self::Temp(value)
    }
}
