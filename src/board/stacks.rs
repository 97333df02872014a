//! Per-stack version counters used as optimistic concurrency guards.

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::models::{Stack, StackGuard};
use crate::errors::BoardError;

pub(crate) fn current_version(conn: &Connection, name: &str) -> Result<i64, BoardError> {
    let version = conn
        .query_row(
            "SELECT version FROM cards_stacks WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}

/// Verify every guard against the stored versions, then bump each touched
/// stack. Must run inside the caller's transaction so a later failure also
/// undoes the bump.
pub(crate) fn check_and_bump(
    conn: &Connection,
    guards: &[StackGuard],
    touched: &[&str],
) -> Result<(), BoardError> {
    for guard in guards {
        let actual = current_version(conn, &guard.name)?;
        if actual != guard.version {
            tracing::warn!(
                stack = %guard.name,
                expected = guard.version,
                actual,
                "stack version conflict"
            );
            return Err(BoardError::VersionConflict {
                stack: guard.name.clone(),
                expected: guard.version,
                actual,
            });
        }
    }

    for name in touched {
        conn.execute(
            "INSERT INTO cards_stacks (name, version) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET version = version + 1",
            params![name],
        )?;
    }
    Ok(())
}

/// Versions for the named stacks. Stacks without a row are reported at 0.
pub(crate) fn select_by_names(conn: &Connection, names: &[String]) -> Result<Vec<Stack>, BoardError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let holders = vec!["?"; names.len()].join(",");
    let sql = format!(
        "SELECT name, version FROM cards_stacks WHERE name IN ({}) ORDER BY name",
        holders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(names.iter()), |row| {
        Ok(Stack {
            name: row.get(0)?,
            version: row.get(1)?,
        })
    })?;
    let mut found = Vec::new();
    for row in rows {
        found.push(row?);
    }

    let mut stacks: Vec<Stack> = names
        .iter()
        .map(|name| {
            let version = found
                .iter()
                .find(|s| &s.name == name)
                .map(|s| s.version)
                .unwrap_or(0);
            Stack {
                name: name.clone(),
                version,
            }
        })
        .collect();
    stacks.sort_by(|a, b| a.name.cmp(&b.name));
    stacks.dedup_by(|a, b| a.name == b.name);
    Ok(stacks)
}
