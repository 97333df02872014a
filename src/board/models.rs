use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: i64,
    pub stack: String,
    pub rank: i64,
    pub title: String,
    pub color: String,
}

/// Fields supplied by the caller when adding a card; the rank is assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCard {
    pub stack: String,
    pub title: String,
    #[serde(default)]
    pub color: String,
}

/// Current version of a stack. A stack that was never mutated is at 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub version: i64,
}

/// The version of a stack a client last saw. A mutation carrying a stale
/// guard fails with `VersionConflict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackGuard {
    pub name: String,
    pub version: i64,
}

impl StackGuard {
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// How out-of-range target ranks are handled.
///
/// | Policy   | Behaviour                                         |
/// |----------|---------------------------------------------------|
/// | `Reject` | fail with `InvalidRank` (default)                 |
/// | `Clamp`  | move to the nearest end of the valid range        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankPolicy {
    #[default]
    Reject,
    Clamp,
}

impl RankPolicy {
    /// Resolve `rank` against the inclusive range `0..=max`.
    pub fn resolve(self, rank: i64, max: i64) -> Result<i64, BoardError> {
        if (0..=max).contains(&rank) {
            return Ok(rank);
        }
        match self {
            Self::Reject => Err(BoardError::InvalidRank { rank, max }),
            Self::Clamp => Ok(rank.clamp(0, max)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Clamp => "clamp",
        }
    }
}

impl std::fmt::Display for RankPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "clamp" => Ok(Self::Clamp),
            _ => Err(format!(
                "Invalid rank policy '{}'. Valid values: reject, clamp",
                s
            )),
        }
    }
}
