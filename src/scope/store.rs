//! Project, resource-link and permission rows behind the scope filter.

use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;
use crate::db::Db;
use crate::errors::ScopeError;

impl Db {
    // ── Projects ──────────────────────────────────────────────────────

    pub fn create_project(&self, project: &NewProject) -> Result<Project, ScopeError> {
        if project.name.trim().is_empty() {
            return Err(ScopeError::BadRequest("project name must not be empty".into()));
        }
        self.transaction(|tx| {
            let inserted = tx.execute(
                "INSERT INTO smp_project (name, summary, description, closed, restricted, invert_members)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    project.name,
                    project.summary,
                    project.description,
                    project.closed,
                    project.restricted,
                    project.invert_members
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Err(ScopeError::BadRequest(format!(
                        "project '{}' already exists",
                        project.name
                    )));
                }
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();
            fetch_project(tx, id)?.ok_or(ScopeError::ProjectNotFound { id })
        })
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>, ScopeError> {
        fetch_project(&self.conn, id)
    }

    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, ScopeError> {
        Ok(self
            .conn
            .query_row(
                &format!("{} WHERE name = ?1", SELECT_PROJECT),
                params![name],
                read_project,
            )
            .optional()?)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, ScopeError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY name", SELECT_PROJECT))?;
        let rows = stmt.query_map([], read_project)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    pub fn update_project_flags(&self, id: i64, flags: &ProjectFlags) -> Result<Project, ScopeError> {
        self.transaction(|tx| {
            let current = fetch_project(tx, id)?.ok_or(ScopeError::ProjectNotFound { id })?;
            tx.execute(
                "UPDATE smp_project SET closed = ?1, restricted = ?2, invert_members = ?3
                 WHERE id_project = ?4",
                params![
                    flags.closed.unwrap_or(current.closed),
                    flags.restricted.unwrap_or(current.restricted),
                    flags.invert_members.unwrap_or(current.invert_members),
                    id
                ],
            )?;
            fetch_project(tx, id)?.ok_or(ScopeError::ProjectNotFound { id })
        })
    }

    /// Delete a project, its resource links and its membership grants.
    pub fn delete_project(&self, id: i64) -> Result<bool, ScopeError> {
        self.transaction(|tx| {
            tx.execute(
                "DELETE FROM permission WHERE action = ?1",
                params![membership_token(id)],
            )?;
            let count = tx.execute("DELETE FROM smp_project WHERE id_project = ?1", params![id])?;
            Ok(count > 0)
        })
    }

    // ── Resources ─────────────────────────────────────────────────────

    pub fn register_resource(&self, resource: &ResourceRef) -> Result<(), ScopeError> {
        insert_resource(&self.conn, resource)
    }

    /// Associate a resource with a project, registering the resource if
    /// needed. Tickets and versions keep only their latest link.
    pub fn link_resource(&self, resource: &ResourceRef, project_id: i64) -> Result<(), ScopeError> {
        self.transaction(|tx| {
            if fetch_project(tx, project_id)?.is_none() {
                return Err(ScopeError::ProjectNotFound { id: project_id });
            }
            insert_resource(tx, resource)?;
            if resource.realm.single_project() {
                tx.execute(
                    "DELETE FROM smp_resource_project WHERE realm = ?1 AND name = ?2",
                    params![resource.realm.as_str(), resource.name],
                )?;
            }
            tx.execute(
                "INSERT OR IGNORE INTO smp_resource_project (realm, name, id_project) VALUES (?1, ?2, ?3)",
                params![resource.realm.as_str(), resource.name, project_id],
            )?;
            Ok(())
        })
    }

    pub fn unlink_resource(&self, resource: &ResourceRef, project_id: i64) -> Result<bool, ScopeError> {
        let count = self.conn.execute(
            "DELETE FROM smp_resource_project WHERE realm = ?1 AND name = ?2 AND id_project = ?3",
            params![resource.realm.as_str(), resource.name, project_id],
        )?;
        Ok(count > 0)
    }

    /// Projects a registered resource is linked to, in id order.
    pub fn resource_projects(&self, resource: &ResourceRef) -> Result<Vec<i64>, ScopeError> {
        let known = self
            .conn
            .query_row(
                "SELECT 1 FROM smp_resource WHERE realm = ?1 AND name = ?2",
                params![resource.realm.as_str(), resource.name],
                |_| Ok(()),
            )
            .optional()?;
        if known.is_none() {
            return Err(ScopeError::ResourceNotFound {
                realm: resource.realm.to_string(),
                name: resource.name.clone(),
            });
        }
        let mut stmt = self.conn.prepare(
            "SELECT id_project FROM smp_resource_project WHERE realm = ?1 AND name = ?2 ORDER BY id_project",
        )?;
        let rows = stmt.query_map(params![resource.realm.as_str(), resource.name], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn list_resources(&self) -> Result<Vec<ResourceRef>, ScopeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT realm, name FROM smp_resource ORDER BY realm, name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut resources = Vec::new();
        for row in rows {
            let (realm, name) = row?;
            resources.push(ResourceRef::new(realm.parse()?, name));
        }
        Ok(resources)
    }

    /// Every `(realm, name, project)` link.
    pub fn list_resource_links(&self) -> Result<Vec<(ResourceRef, i64)>, ScopeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT realm, name, id_project FROM smp_resource_project")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut links = Vec::new();
        for row in rows {
            let (realm, name, id) = row?;
            links.push((ResourceRef::new(realm.parse()?, name), id));
        }
        Ok(links)
    }

    // ── Permissions ───────────────────────────────────────────────────

    pub fn grant(&self, subject: &str, action: &str) -> Result<(), ScopeError> {
        if subject.is_empty() || action.is_empty() {
            return Err(ScopeError::BadRequest("subject and action must not be empty".into()));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO permission (username, action) VALUES (?1, ?2)",
            params![subject, action],
        )?;
        Ok(())
    }

    pub fn revoke(&self, subject: &str, action: &str) -> Result<bool, ScopeError> {
        let count = self.conn.execute(
            "DELETE FROM permission WHERE username = ?1 AND action = ?2",
            params![subject, action],
        )?;
        Ok(count > 0)
    }

    /// Record that `subject` is a member of `group`.
    pub fn add_group_member(&self, subject: &str, group: &str) -> Result<(), ScopeError> {
        if is_permission_token(group) {
            return Err(ScopeError::BadRequest(format!(
                "'{}' is a permission token, not a group name",
                group
            )));
        }
        self.grant(subject, group)
    }

    /// Grant the project's membership token to `subject`.
    pub fn grant_membership(&self, project_id: i64, subject: &str) -> Result<(), ScopeError> {
        if subject.is_empty() {
            return Err(ScopeError::BadRequest("subject must not be empty".into()));
        }
        self.transaction(|tx| {
            if fetch_project(tx, project_id)?.is_none() {
                return Err(ScopeError::ProjectNotFound { id: project_id });
            }
            tx.execute(
                "INSERT OR IGNORE INTO permission (username, action) VALUES (?1, ?2)",
                params![subject, membership_token(project_id)],
            )?;
            Ok(())
        })
    }

    pub fn revoke_membership(&self, project_id: i64, subject: &str) -> Result<bool, ScopeError> {
        self.revoke(subject, &membership_token(project_id))
    }

    pub fn list_permissions(&self) -> Result<Vec<PermissionRow>, ScopeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, action FROM permission ORDER BY username, action")?;
        let rows = stmt.query_map([], |row| {
            Ok(PermissionRow {
                subject: row.get(0)?,
                action: row.get(1)?,
            })
        })?;
        let mut perms = Vec::new();
        for row in rows {
            perms.push(row?);
        }
        Ok(perms)
    }
}

const SELECT_PROJECT: &str =
    "SELECT id_project, name, summary, description, closed, restricted, invert_members FROM smp_project";

fn read_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        summary: row.get(2)?,
        description: row.get(3)?,
        closed: row.get(4)?,
        restricted: row.get(5)?,
        invert_members: row.get(6)?,
    })
}

fn fetch_project(conn: &Connection, id: i64) -> Result<Option<Project>, ScopeError> {
    Ok(conn
        .query_row(
            &format!("{} WHERE id_project = ?1", SELECT_PROJECT),
            params![id],
            read_project,
        )
        .optional()?)
}

fn insert_resource(conn: &Connection, resource: &ResourceRef) -> Result<(), ScopeError> {
    if resource.name.is_empty() {
        return Err(ScopeError::BadRequest("resource name must not be empty".into()));
    }
    conn.execute(
        "INSERT OR IGNORE INTO smp_resource (realm, name) VALUES (?1, ?2)",
        params![resource.realm.as_str(), resource.name],
    )?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_create_and_get_project() -> Result<()> {
        let db = Db::open_in_memory()?;
        let project = db.create_project(&NewProject {
            name: "apollo".into(),
            summary: "moon".into(),
            restricted: true,
            ..NewProject::default()
        })?;
        assert!(project.id > 0);
        assert!(project.restricted);
        assert!(!project.closed);

        let fetched = db.get_project(project.id)?.expect("project should exist");
        assert_eq!(fetched, project);
        assert_eq!(db.get_project_by_name("apollo")?, Some(project));
        assert!(db.get_project_by_name("gemini")?.is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_project_name_is_bad_request() -> Result<()> {
        let db = Db::open_in_memory()?;
        db.create_project(&NewProject::named("apollo"))?;
        let err = db.create_project(&NewProject::named("apollo")).unwrap_err();
        assert!(matches!(err, ScopeError::BadRequest(_)));
        assert_eq!(db.list_projects()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_list_projects_sorted_by_name() -> Result<()> {
        let db = Db::open_in_memory()?;
        db.create_project(&NewProject::named("zeta"))?;
        db.create_project(&NewProject::named("alpha"))?;
        let names: Vec<_> = db.list_projects()?.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        Ok(())
    }

    #[test]
    fn test_update_flags_is_partial() -> Result<()> {
        let db = Db::open_in_memory()?;
        let project = db.create_project(&NewProject::named("apollo"))?;

        let updated = db.update_project_flags(
            project.id,
            &ProjectFlags {
                restricted: Some(true),
                ..ProjectFlags::default()
            },
        )?;
        assert!(updated.restricted);
        assert!(!updated.closed);

        let updated = db.update_project_flags(
            project.id,
            &ProjectFlags {
                closed: Some(true),
                ..ProjectFlags::default()
            },
        )?;
        assert!(updated.restricted);
        assert!(updated.closed);

        assert!(matches!(
            db.update_project_flags(99, &ProjectFlags::default()),
            Err(ScopeError::ProjectNotFound { id: 99 })
        ));
        Ok(())
    }

    #[test]
    fn test_link_resource_registers_and_links() -> Result<()> {
        let db = Db::open_in_memory()?;
        let a = db.create_project(&NewProject::named("a"))?;
        let b = db.create_project(&NewProject::named("b"))?;
        let milestone = ResourceRef::new(Realm::Milestone, "m1");

        db.link_resource(&milestone, a.id)?;
        db.link_resource(&milestone, b.id)?;
        db.link_resource(&milestone, b.id)?;

        assert_eq!(db.resource_projects(&milestone)?, vec![a.id, b.id]);
        assert_eq!(db.list_resources()?, vec![milestone.clone()]);
        assert_eq!(db.list_resource_links()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_ticket_keeps_single_project() -> Result<()> {
        let db = Db::open_in_memory()?;
        let a = db.create_project(&NewProject::named("a"))?;
        let b = db.create_project(&NewProject::named("b"))?;
        let ticket = ResourceRef::new(Realm::Ticket, "17");

        db.link_resource(&ticket, a.id)?;
        db.link_resource(&ticket, b.id)?;
        assert_eq!(db.resource_projects(&ticket)?, vec![b.id]);
        Ok(())
    }

    #[test]
    fn test_link_to_missing_project_is_not_found() -> Result<()> {
        let db = Db::open_in_memory()?;
        let err = db
            .link_resource(&ResourceRef::new(Realm::Component, "ui"), 5)
            .unwrap_err();
        assert!(matches!(err, ScopeError::ProjectNotFound { id: 5 }));
        assert!(db.list_resources()?.is_empty());
        assert!(matches!(
            db.resource_projects(&ResourceRef::new(Realm::Component, "ui")),
            Err(ScopeError::ResourceNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unlink_resource() -> Result<()> {
        let db = Db::open_in_memory()?;
        let a = db.create_project(&NewProject::named("a"))?;
        let comp = ResourceRef::new(Realm::Component, "ui");
        db.link_resource(&comp, a.id)?;

        assert!(db.unlink_resource(&comp, a.id)?);
        assert!(!db.unlink_resource(&comp, a.id)?);
        assert!(db.resource_projects(&comp)?.is_empty());
        assert_eq!(db.list_resources()?, vec![comp]);
        Ok(())
    }

    #[test]
    fn test_delete_project_cascades_links_and_grants() -> Result<()> {
        let db = Db::open_in_memory()?;
        let a = db.create_project(&NewProject::named("a"))?;
        let milestone = ResourceRef::new(Realm::Milestone, "m1");
        db.link_resource(&milestone, a.id)?;
        db.grant_membership(a.id, "alice")?;
        db.add_group_member("alice", "dev")?;

        assert!(db.delete_project(a.id)?);
        assert!(db.resource_projects(&milestone)?.is_empty());
        assert_eq!(
            db.list_permissions()?,
            vec![PermissionRow {
                subject: "alice".into(),
                action: "dev".into()
            }]
        );
        assert!(!db.delete_project(a.id)?);
        Ok(())
    }

    #[test]
    fn test_grant_and_revoke() -> Result<()> {
        let db = Db::open_in_memory()?;
        db.grant("alice", "CARDS_ADMIN")?;
        db.grant("alice", "CARDS_ADMIN")?;
        assert_eq!(db.list_permissions()?.len(), 1);
        assert!(db.revoke("alice", "CARDS_ADMIN")?);
        assert!(!db.revoke("alice", "CARDS_ADMIN")?);
        Ok(())
    }

    #[test]
    fn test_group_member_rejects_permission_token() -> Result<()> {
        let db = Db::open_in_memory()?;
        let err = db.add_group_member("alice", "TICKET_ADMIN").unwrap_err();
        assert!(matches!(err, ScopeError::BadRequest(_)));
        Ok(())
    }

    #[test]
    fn test_grant_membership_requires_project() -> Result<()> {
        let db = Db::open_in_memory()?;
        assert!(matches!(
            db.grant_membership(3, "alice"),
            Err(ScopeError::ProjectNotFound { id: 3 })
        ));
        assert!(db.list_permissions()?.is_empty());

        let p = db.create_project(&NewProject::named("p"))?;
        db.grant_membership(p.id, "dev")?;
        assert!(db.list_permissions()?.contains(&PermissionRow {
            subject: "dev".into(),
            action: p.membership_token(),
        }));
        assert!(db.revoke_membership(p.id, "dev")?);
        Ok(())
    }
}
