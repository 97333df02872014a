//! Kanban-style stacks of ranked cards.
//!
//! | Module   | Responsibility                                          |
//! |----------|---------------------------------------------------------|
//! | `models` | `Card`, `Stack`, `StackGuard`, `RankPolicy`             |
//! | `ranks`  | `Board`: add / move / delete with dense rank shifting   |
//! | `stacks` | per-stack version counters (check-and-bump)             |

pub mod models;
pub mod ranks;
mod stacks;

pub use models::{Card, NewCard, RankPolicy, Stack, StackGuard};
pub use ranks::Board;
