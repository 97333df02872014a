use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ScopeError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub summary: String,
    pub description: String,
    /// Hidden from listings.
    pub closed: bool,
    /// Visibility gated by the membership token.
    pub restricted: bool,
    /// Members are excluded instead of admitted.
    pub invert_members: bool,
}

impl Project {
    pub fn membership_token(&self) -> String {
        membership_token(self.id)
    }
}

/// Permission action that makes its holder a member of project `id`.
pub fn membership_token(id: i64) -> String {
    format!("PROJECT_{}_MEMBER", id)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub invert_members: bool,
}

impl NewProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a project's visibility flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFlags {
    pub closed: Option<bool>,
    pub restricted: Option<bool>,
    pub invert_members: Option<bool>,
}

/// Resource kinds that can be scoped to projects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    Ticket,
    Milestone,
    Component,
    Version,
}

impl Realm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Milestone => "milestone",
            Self::Component => "component",
            Self::Version => "version",
        }
    }

    /// Tickets and versions belong to at most one project.
    pub fn single_project(&self) -> bool {
        matches!(self, Self::Ticket | Self::Version)
    }
}

impl std::fmt::Display for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Realm {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket" => Ok(Self::Ticket),
            "milestone" => Ok(Self::Milestone),
            "component" => Ok(Self::Component),
            "version" => Ok(Self::Version),
            _ => Err(ScopeError::InvalidRealm(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub realm: Realm,
    pub name: String,
}

impl ResourceRef {
    pub fn new(realm: Realm, name: impl Into<String>) -> Self {
        Self {
            realm,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.realm, self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeAction {
    /// Appear in listings; closed projects are hidden.
    List,
    /// Open the item itself.
    #[default]
    Access,
}

impl ScopeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Access => "access",
        }
    }
}

impl FromStr for ScopeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "access" => Ok(Self::Access),
            _ => Err(format!("Invalid action '{}'. Valid values: list, access", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeTarget {
    Project { id: i64 },
    Resource { resource: ResourceRef },
}

impl std::fmt::Display for ScopeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project { id } => write!(f, "project {}", id),
            Self::Resource { resource } => write!(f, "{}", resource),
        }
    }
}

/// Outcome of a scope check. `NoOpinion` defers to the host's generic
/// permission policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    NoOpinion,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Turn a `Deny` into `PermissionDenied`; anything else passes.
    pub fn require(
        self,
        subject: &str,
        action: ScopeAction,
        target: &ScopeTarget,
    ) -> Result<(), ScopeError> {
        match self {
            Self::Deny => Err(ScopeError::PermissionDenied {
                subject: subject.to_string(),
                action: action.as_str().to_string(),
                target: target.to_string(),
            }),
            Self::Allow | Self::NoOpinion => Ok(()),
        }
    }
}

/// One row of the host permission table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PermissionRow {
    pub subject: String,
    pub action: String,
}

impl PermissionRow {
    /// Rows whose action is not an uppercase token name a group the subject
    /// belongs to.
    pub fn is_group_membership(&self) -> bool {
        !is_permission_token(&self.action)
    }
}

/// True for action names like `CARDS_ADMIN`: at least one cased character
/// and no lowercase ones.
pub fn is_permission_token(action: &str) -> bool {
    action.chars().any(char::is_uppercase) && !action.chars().any(char::is_lowercase)
}
