//! Typed error hierarchy for tracboard.
//!
//! Two top-level enums cover the two subsystems:
//! - `BoardError`: ranked card stacks
//! - `ScopeError`: project scoping and permission checks

use thiserror::Error;

/// Errors from the ordered-list engine.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Card {id} not found")]
    CardNotFound { id: i64 },

    #[error("Rank {rank} is out of range (valid: 0..={max})")]
    InvalidRank { rank: i64, max: i64 },

    #[error("Stack '{stack}' changed: expected version {expected}, found {actual}")]
    VersionConflict {
        stack: String,
        expected: i64,
        actual: i64,
    },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors from the scoped-permission filter and its store.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Project '{name}' not found")]
    ProjectNameNotFound { name: String },

    #[error("Resource {realm}:{name} not found")]
    ResourceNotFound { realm: String, name: String },

    #[error("Invalid realm '{0}'")]
    InvalidRealm(String),

    #[error("Permission denied: {subject} may not {action} {target}")]
    PermissionDenied {
        subject: String,
        action: String,
        target: String,
    },

    #[error("Group closure for '{subject}' exceeded depth {limit}")]
    ClosureLimitExceeded { subject: String, limit: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_error_card_not_found_carries_id() {
        let err = BoardError::CardNotFound { id: 42 };
        match &err {
            BoardError::CardNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected CardNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn board_error_version_conflict_mentions_stack() {
        let err = BoardError::VersionConflict {
            stack: "todo".into(),
            expected: 3,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("todo"));
        assert!(msg.contains('3'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn board_error_converts_from_rusqlite() {
        let err: BoardError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, BoardError::Database(_)));
    }

    #[test]
    fn scope_error_permission_denied_is_matchable() {
        let err = ScopeError::PermissionDenied {
            subject: "alice".into(),
            action: "access".into(),
            target: "project 7".into(),
        };
        assert!(matches!(err, ScopeError::PermissionDenied { .. }));
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::CardNotFound { id: 1 });
        assert_std_error(&ScopeError::InvalidRealm("wiki".into()));
    }
}
