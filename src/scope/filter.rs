//! Allow/deny decisions for projects and project-scoped resources.

use super::closure::Closure;
use super::groups::{BuiltinGroups, GroupProvider};
use super::models::{Decision, Project, ResourceRef, ScopeAction, ScopeTarget};
use super::registry::ScopeSnapshot;
use crate::errors::ScopeError;

pub const DEFAULT_MAX_CLOSURE_DEPTH: usize = 16;

/// Evaluates scope checks against a `ScopeSnapshot`.
///
/// The filter holds no table data; every call takes the snapshot the
/// caller obtained from its `ProjectRegistry`.
pub struct ScopeFilter {
    providers: Vec<Box<dyn GroupProvider>>,
    max_depth: usize,
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLOSURE_DEPTH)
    }
}

impl ScopeFilter {
    /// A filter seeded with the built-in `anonymous`/`authenticated` groups.
    pub fn new(max_depth: usize) -> Self {
        Self {
            providers: vec![Box::new(BuiltinGroups)],
            max_depth,
        }
    }

    pub fn with_provider(mut self, provider: impl GroupProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// `subject` plus every group it transitively belongs to.
    pub fn identities(&self, snapshot: &ScopeSnapshot, subject: &str) -> Result<Closure, ScopeError> {
        let seeds: Vec<String> = self
            .providers
            .iter()
            .flat_map(|p| p.groups_for(subject))
            .collect();
        snapshot.graph().expand(subject, &seeds, self.max_depth)
    }

    /// Whether any identity of `subject` holds `action` in the permission table.
    pub fn has_permission(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
        action: &str,
    ) -> Result<bool, ScopeError> {
        let closure = self.identities(snapshot, subject)?;
        Ok(holds(snapshot, &closure, action))
    }

    pub fn check(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
        action: ScopeAction,
        target: &ScopeTarget,
    ) -> Result<Decision, ScopeError> {
        match target {
            ScopeTarget::Project { id } => self.check_project(snapshot, subject, action, *id),
            ScopeTarget::Resource { resource } => {
                self.check_resource(snapshot, subject, action, resource)
            }
        }
    }

    pub fn check_project(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
        action: ScopeAction,
        id: i64,
    ) -> Result<Decision, ScopeError> {
        let Some(project) = snapshot.project(id) else {
            return Ok(Decision::NoOpinion);
        };
        let closure = self.identities(snapshot, subject)?;
        Ok(project_decision(snapshot, &closure, project, action))
    }

    pub fn check_resource(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
        action: ScopeAction,
        resource: &ResourceRef,
    ) -> Result<Decision, ScopeError> {
        if !snapshot.resource_known(resource) {
            return Ok(Decision::NoOpinion);
        }
        if snapshot.links(resource).is_empty() {
            return Ok(Decision::Allow);
        }
        let closure = self.identities(snapshot, subject)?;
        Ok(resource_decision(snapshot, &closure, resource, action))
    }

    /// Projects `subject` may list, sorted by name.
    pub fn visible_projects(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
    ) -> Result<Vec<Project>, ScopeError> {
        let closure = self.identities(snapshot, subject)?;
        let mut visible: Vec<Project> = snapshot
            .projects()
            .filter(|p| project_decision(snapshot, &closure, p, ScopeAction::List).is_allowed())
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(visible)
    }

    /// Drop the resources `subject` is denied; keeps the input order.
    pub fn filter_resources(
        &self,
        snapshot: &ScopeSnapshot,
        subject: &str,
        resources: &[ResourceRef],
        action: ScopeAction,
    ) -> Result<Vec<ResourceRef>, ScopeError> {
        let closure = self.identities(snapshot, subject)?;
        Ok(resources
            .iter()
            .filter(|r| {
                !snapshot.resource_known(r)
                    || resource_decision(snapshot, &closure, r, action) != Decision::Deny
            })
            .cloned()
            .collect())
    }
}

fn holds(snapshot: &ScopeSnapshot, closure: &Closure, action: &str) -> bool {
    snapshot
        .holders_of(action)
        .is_some_and(|holders| closure.intersects(holders))
}

fn project_decision(
    snapshot: &ScopeSnapshot,
    closure: &Closure,
    project: &Project,
    action: ScopeAction,
) -> Decision {
    if project.closed && action == ScopeAction::List {
        return Decision::Deny;
    }
    if !project.restricted {
        return Decision::Allow;
    }
    let member = holds(snapshot, closure, &project.membership_token());
    if member != project.invert_members {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Union over the resource's projects. Links to projects the snapshot does
/// not know are skipped; if nothing is left the filter has no opinion.
fn resource_decision(
    snapshot: &ScopeSnapshot,
    closure: &Closure,
    resource: &ResourceRef,
    action: ScopeAction,
) -> Decision {
    let links = snapshot.links(resource);
    if links.is_empty() {
        return Decision::Allow;
    }
    let mut saw_project = false;
    for id in links {
        let Some(project) = snapshot.project(*id) else {
            tracing::warn!(resource = %resource, project = id, "resource linked to unknown project");
            continue;
        };
        saw_project = true;
        if project_decision(snapshot, closure, project, action).is_allowed() {
            return Decision::Allow;
        }
    }
    if saw_project {
        Decision::Deny
    } else {
        Decision::NoOpinion
    }
}
