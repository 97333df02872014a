use anyhow::Result;
use tracboard::config::TracboardConfig;
use tracboard::scope::{Decision, Realm, ResourceRef, ScopeAction, ScopeSnapshot, ScopeTarget};
use tracboard::server::build_filter;

use super::{open_db, print_json};

pub fn cmd_check(
    config: &TracboardConfig,
    subject: &str,
    realm: &str,
    name: &str,
    action: &str,
) -> Result<()> {
    let action: ScopeAction = action.parse().map_err(anyhow::Error::msg)?;
    let db = open_db(config)?;

    let target = if realm == "project" {
        // Numeric keys are ids even when no such project exists; the
        // filter answers `no_opinion` for those.
        let id = match name.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => db.get_project_by_name(name)?.map(|p| p.id),
        };
        match id {
            Some(id) => ScopeTarget::Project { id },
            None => {
                tracing::debug!(subject, project = name, "scope check on unknown project name");
                return print_json(&serde_json::json!({
                    "subject": subject,
                    "action": action,
                    "target": { "kind": "project", "name": name },
                    "decision": Decision::NoOpinion,
                }));
            }
        }
    } else {
        ScopeTarget::Resource {
            resource: ResourceRef::new(realm.parse::<Realm>()?, name),
        }
    };

    let snapshot = ScopeSnapshot::load(&db)?;
    let decision = build_filter(config).check(&snapshot, subject, action, &target)?;
    tracing::debug!(subject, %target, ?decision, "scope check");

    print_json(&serde_json::json!({
        "subject": subject,
        "action": action,
        "target": target,
        "decision": decision,
    }))
}
