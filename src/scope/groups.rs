//! Sources of a subject's initial group memberships.
//!
//! Providers are constructed and wired into `ScopeFilter` at startup; the
//! closure then expands whatever they report through the permission table.

use std::collections::BTreeMap;

pub const ANONYMOUS: &str = "anonymous";
pub const AUTHENTICATED: &str = "authenticated";

pub trait GroupProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Groups `subject` belongs to directly, before closure expansion.
    fn groups_for(&self, subject: &str) -> Vec<String>;
}

/// The host's pseudo-groups: everyone is `anonymous`, every named subject
/// is also `authenticated`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinGroups;

impl GroupProvider for BuiltinGroups {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn groups_for(&self, subject: &str) -> Vec<String> {
        if subject == ANONYMOUS || subject.is_empty() {
            vec![ANONYMOUS.to_string()]
        } else {
            vec![ANONYMOUS.to_string(), AUTHENTICATED.to_string()]
        }
    }
}

/// Groups declared in the `[groups]` configuration table.
#[derive(Debug, Default, Clone)]
pub struct StaticGroups {
    /// member -> groups
    memberships: BTreeMap<String, Vec<String>>,
}

impl StaticGroups {
    /// Build from a `group -> members` table.
    pub fn from_table(table: &BTreeMap<String, Vec<String>>) -> Self {
        let mut memberships: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (group, members) in table {
            for member in members {
                let groups = memberships.entry(member.clone()).or_default();
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        Self { memberships }
    }

    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }
}

impl GroupProvider for StaticGroups {
    fn name(&self) -> &'static str {
        "static"
    }

    fn groups_for(&self, subject: &str) -> Vec<String> {
        self.memberships.get(subject).cloned().unwrap_or_default()
    }
}
