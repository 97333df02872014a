//! `project`, `group` and `permission` subcommands.

use anyhow::Result;
use tracboard::config::TracboardConfig;
use tracboard::scope::{NewProject, ProjectFlags, Realm, ResourceRef, ScopeSnapshot};
use tracboard::server::build_filter;

use super::{open_db, print_json, resolve_project};
use crate::{GroupCommands, PermissionCommands, ProjectCommands};

pub fn cmd_project(config: &TracboardConfig, command: ProjectCommands) -> Result<()> {
    let db = open_db(config)?;

    match command {
        ProjectCommands::Add {
            name,
            summary,
            description,
            restricted,
            closed,
            invert_members,
        } => {
            let project = db.create_project(&NewProject {
                name,
                summary,
                description,
                closed,
                restricted,
                invert_members,
            })?;
            print_json(&project)
        }
        ProjectCommands::List { subject } => match subject {
            Some(subject) => {
                let snapshot = ScopeSnapshot::load(&db)?;
                let projects = build_filter(config).visible_projects(&snapshot, &subject)?;
                print_json(&projects)
            }
            None => print_json(&db.list_projects()?),
        },
        ProjectCommands::Flags {
            project,
            closed,
            restricted,
            invert_members,
        } => {
            let id = resolve_project(&db, &project)?.id;
            let updated = db.update_project_flags(
                id,
                &ProjectFlags {
                    closed,
                    restricted,
                    invert_members,
                },
            )?;
            print_json(&updated)
        }
        ProjectCommands::Grant { project, subject } => {
            let project = resolve_project(&db, &project)?;
            db.grant_membership(project.id, &subject)?;
            print_json(&serde_json::json!({
                "subject": subject,
                "action": project.membership_token(),
                "granted": true,
            }))
        }
        ProjectCommands::Revoke { project, subject } => {
            let project = resolve_project(&db, &project)?;
            let revoked = db.revoke_membership(project.id, &subject)?;
            print_json(&serde_json::json!({
                "subject": subject,
                "action": project.membership_token(),
                "revoked": revoked,
            }))
        }
        ProjectCommands::Link {
            project,
            realm,
            name,
        } => {
            let project = resolve_project(&db, &project)?;
            let resource = ResourceRef::new(realm.parse::<Realm>()?, name);
            db.link_resource(&resource, project.id)?;
            print_json(&serde_json::json!({
                "resource": resource,
                "projects": db.resource_projects(&resource)?,
            }))
        }
        ProjectCommands::Unlink {
            project,
            realm,
            name,
        } => {
            let project = resolve_project(&db, &project)?;
            let resource = ResourceRef::new(realm.parse::<Realm>()?, name);
            let unlinked = db.unlink_resource(&resource, project.id)?;
            print_json(&serde_json::json!({
                "resource": resource,
                "unlinked": unlinked,
            }))
        }
        ProjectCommands::Delete { project } => {
            let project = resolve_project(&db, &project)?;
            let deleted = db.delete_project(project.id)?;
            print_json(&serde_json::json!({ "id": project.id, "deleted": deleted }))
        }
    }
}

pub fn cmd_group(config: &TracboardConfig, command: GroupCommands) -> Result<()> {
    let db = open_db(config)?;

    match command {
        GroupCommands::Add { subject, group } => {
            db.add_group_member(&subject, &group)?;
            print_json(&serde_json::json!({ "subject": subject, "group": group, "added": true }))
        }
        GroupCommands::Remove { subject, group } => {
            let removed = db.revoke(&subject, &group)?;
            print_json(&serde_json::json!({ "subject": subject, "group": group, "removed": removed }))
        }
        GroupCommands::Show { subject } => {
            let snapshot = ScopeSnapshot::load(&db)?;
            let closure = build_filter(config).identities(&snapshot, &subject)?;
            print_json(&serde_json::json!({
                "subject": subject,
                "identities": closure.identities,
                "cycles": closure.cycles,
                "depth": closure.depth,
            }))
        }
    }
}

pub fn cmd_permission(config: &TracboardConfig, command: PermissionCommands) -> Result<()> {
    let db = open_db(config)?;

    match command {
        PermissionCommands::Grant { subject, action } => {
            db.grant(&subject, &action)?;
            print_json(&serde_json::json!({ "subject": subject, "action": action, "granted": true }))
        }
        PermissionCommands::Revoke { subject, action } => {
            let revoked = db.revoke(&subject, &action)?;
            print_json(&serde_json::json!({ "subject": subject, "action": action, "revoked": revoked }))
        }
        PermissionCommands::List => print_json(&db.list_permissions()?),
    }
}
