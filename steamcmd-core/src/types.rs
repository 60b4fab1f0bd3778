//! Identifier types shared across the crate.
//!
//! Steam identifies installable bundles by a positive numeric app id. The
//! newtypes here make a zero id unrepresentable and keep app ids, workshop
//! item ids and build ids from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

// ============================================================================
// App Identifier
// ============================================================================

/// Numeric identifier of an app on the Steam content network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AppId(NonZeroU32);

impl AppId {
    /// Creates an app id, returning `None` for zero.
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Returns the raw numeric id.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for AppId {
    type Error = String;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::new(id).ok_or_else(|| "App id must be a positive integer".to_string())
    }
}

impl From<AppId> for u32 {
    fn from(id: AppId) -> Self {
        id.get()
    }
}

impl std::str::FromStr for AppId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid app id: {}", s))?;
        Self::try_from(id)
    }
}

// ============================================================================
// Workshop / Build Identifiers
// ============================================================================

/// Identifier of a Steam Workshop item (mod).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkshopItemId(pub u64);

impl fmt::Display for WorkshopItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build id of an app depot, as reported by the Steam content network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub u64);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
