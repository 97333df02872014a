//! In-memory view of the scope tables, rebuilt on demand.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::closure::GroupGraph;
use super::models::{PermissionRow, Project, ResourceRef};
use crate::db::Db;
use crate::errors::ScopeError;

/// Immutable copy of projects, resource links and permission rows.
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    projects: BTreeMap<i64, Project>,
    links: HashMap<ResourceRef, Vec<i64>>,
    resources: HashSet<ResourceRef>,
    permissions: Vec<PermissionRow>,
    graph: GroupGraph,
    /// action -> subjects holding it directly
    holders: HashMap<String, BTreeSet<String>>,
}

impl ScopeSnapshot {
    pub fn load(db: &Db) -> Result<Self, ScopeError> {
        let projects = db
            .list_projects()?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut links: HashMap<ResourceRef, Vec<i64>> = HashMap::new();
        for (resource, project_id) in db.list_resource_links()? {
            links.entry(resource).or_default().push(project_id);
        }
        for ids in links.values_mut() {
            ids.sort_unstable();
        }

        let resources = db.list_resources()?.into_iter().collect();
        let permissions = db.list_permissions()?;
        Ok(Self::build(projects, links, resources, permissions))
    }

    fn build(
        projects: BTreeMap<i64, Project>,
        links: HashMap<ResourceRef, Vec<i64>>,
        resources: HashSet<ResourceRef>,
        permissions: Vec<PermissionRow>,
    ) -> Self {
        let graph = GroupGraph::from_permissions(&permissions);
        let mut holders: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in &permissions {
            holders
                .entry(row.action.clone())
                .or_default()
                .insert(row.subject.clone());
        }
        Self {
            projects,
            links,
            resources,
            permissions,
            graph,
            holders,
        }
    }

    pub fn project(&self, id: i64) -> Option<&Project> {
        self.projects.get(&id)
    }

    /// Projects in id order.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn resource_known(&self, resource: &ResourceRef) -> bool {
        self.resources.contains(resource)
    }

    /// Project ids `resource` is associated with; empty when unlinked.
    pub fn links(&self, resource: &ResourceRef) -> &[i64] {
        self.links.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn holders_of(&self, action: &str) -> Option<&BTreeSet<String>> {
        self.holders.get(action)
    }

    pub fn permissions(&self) -> &[PermissionRow] {
        &self.permissions
    }

    pub fn graph(&self) -> &GroupGraph {
        &self.graph
    }
}

/// Shared owner of the current `ScopeSnapshot`.
///
/// The snapshot is loaded lazily and replaced wholesale; readers holding an
/// older `Arc` keep a consistent view until they drop it.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    current: RwLock<Option<Arc<ScopeSnapshot>>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from the store.
    pub fn reload(&self, db: &Db) -> Result<Arc<ScopeSnapshot>, ScopeError> {
        let snapshot = Arc::new(ScopeSnapshot::load(db)?);
        let mut current = self.current.write().map_err(|_| ScopeError::LockPoisoned)?;
        *current = Some(snapshot.clone());
        tracing::info!(
            projects = snapshot.projects.len(),
            resources = snapshot.resources.len(),
            permissions = snapshot.permissions.len(),
            "Scope registry reloaded"
        );
        Ok(snapshot)
    }

    /// Drop the snapshot; the next `snapshot` call reloads.
    pub fn invalidate(&self) -> Result<(), ScopeError> {
        let mut current = self.current.write().map_err(|_| ScopeError::LockPoisoned)?;
        if current.take().is_some() {
            tracing::debug!("Scope registry invalidated");
        }
        Ok(())
    }

    /// Current snapshot, loading it first if none is held.
    pub fn snapshot(&self, db: &Db) -> Result<Arc<ScopeSnapshot>, ScopeError> {
        {
            let current = self.current.read().map_err(|_| ScopeError::LockPoisoned)?;
            if let Some(snapshot) = current.as_ref() {
                return Ok(snapshot.clone());
            }
        }
        self.reload(db)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().map(|c| c.is_some()).unwrap_or(false)
    }
}
