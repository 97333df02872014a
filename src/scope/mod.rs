//! Project scoping for tickets, milestones, components and versions.
//!
//! | Module     | Responsibility                                            |
//! |------------|-----------------------------------------------------------|
//! | `models`   | `Project`, `Realm`, `ResourceRef`, `Decision`             |
//! | `store`    | project, resource-link and permission rows on `Db`        |
//! | `registry` | `ScopeSnapshot` and the reloadable `ProjectRegistry`      |
//! | `closure`  | breadth-first group expansion with cycle and depth guards |
//! | `groups`   | `GroupProvider` seeds: built-in and configured groups     |
//! | `filter`   | `ScopeFilter`: allow / deny / no-opinion decisions        |

pub mod closure;
pub mod filter;
pub mod groups;
pub mod models;
pub mod registry;
mod store;

pub use closure::{Closure, GroupGraph};
pub use filter::{DEFAULT_MAX_CLOSURE_DEPTH, ScopeFilter};
pub use groups::{BuiltinGroups, GroupProvider, StaticGroups};
pub use models::{
    Decision, NewProject, PermissionRow, Project, ProjectFlags, Realm, ResourceRef, ScopeAction,
    ScopeTarget, membership_token,
};
pub use registry::{ProjectRegistry, ScopeSnapshot};
