//! `card` subcommands.
//!
//! The CLI runs as the database owner, so the `required_permission` gate
//! of the HTTP API does not apply here.

use anyhow::Result;
use tracboard::board::{Board, NewCard, StackGuard};
use tracboard::config::TracboardConfig;
use tracboard::errors::BoardError;

use super::{open_db, print_json};
use crate::CardCommands;

pub fn cmd_card(config: &TracboardConfig, command: CardCommands) -> Result<()> {
    let db = open_db(config)?;
    let board = Board::new(&db, config.board.rank_policy);

    match command {
        CardCommands::Add {
            stack,
            title,
            color,
            version,
        } => {
            let guard = version.map(|v| StackGuard::new(stack.clone(), v));
            let card = board.add(&NewCard { stack, title, color }, guard.as_ref())?;
            print_json(&card)
        }
        CardCommands::Move {
            id,
            stack,
            rank,
            version,
            from_version,
        } => {
            let mut guards = Vec::new();
            if let Some(v) = from_version {
                guards.push(StackGuard::new(stack_of(&board, id)?, v));
            }
            if let Some(v) = version {
                guards.push(StackGuard::new(stack.clone(), v));
            }
            let card = board.move_card(id, &stack, rank, &guards)?;
            print_json(&card)
        }
        CardCommands::Edit {
            id,
            title,
            color,
            version,
        } => {
            let guard = match version {
                Some(v) => Some(StackGuard::new(stack_of(&board, id)?, v)),
                None => None,
            };
            let card = board.update_card(id, title.as_deref(), color.as_deref(), guard.as_ref())?;
            print_json(&card)
        }
        CardCommands::Delete { id, version } => {
            let guard = match version {
                Some(v) => Some(StackGuard::new(stack_of(&board, id)?, v)),
                None => None,
            };
            let card = board.delete(id, guard.as_ref())?;
            print_json(&serde_json::json!({ "deleted": card }))
        }
        CardCommands::List { stacks } => print_json(&board.list_cards_in(&stacks)?),
        CardCommands::Stacks { names } => print_json(&board.get_stacks(&names)?),
    }
}

fn stack_of(board: &Board<'_>, id: i64) -> Result<String, BoardError> {
    board
        .get_card(id)?
        .map(|c| c.stack)
        .ok_or(BoardError::CardNotFound { id })
}
