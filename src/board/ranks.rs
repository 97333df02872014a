//! Dense per-stack rank maintenance.
//!
//! Every mutation runs in one transaction and leaves each touched stack
//! with ranks exactly `0..N-1`. Ranks of displaced siblings are shifted
//! with set-based `UPDATE`s before the moved card is written.

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::models::{Card, NewCard, RankPolicy, Stack, StackGuard};
use super::stacks;
use crate::db::Db;
use crate::errors::BoardError;

/// Ordered-list engine over the `cards` table.
pub struct Board<'a> {
    db: &'a Db,
    policy: RankPolicy,
}

impl<'a> Board<'a> {
    pub fn new(db: &'a Db, policy: RankPolicy) -> Self {
        Self { db, policy }
    }

    /// Append a card to the end of its stack.
    pub fn add(&self, card: &NewCard, guard: Option<&StackGuard>) -> Result<Card, BoardError> {
        if card.stack.is_empty() {
            return Err(BoardError::BadRequest("stack name must not be empty".into()));
        }
        self.db.transaction(|tx| {
            stacks::check_and_bump(tx, guard_slice(guard), &[&card.stack])?;
            let rank: i64 = tx.query_row(
                "SELECT COALESCE(MAX(rank) + 1, 0) FROM cards WHERE stack = ?1",
                params![card.stack],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO cards (stack, rank, title, color) VALUES (?1, ?2, ?3, ?4)",
                params![card.stack, rank, card.title, card.color],
            )?;
            let id = tx.last_insert_rowid();
            tracing::debug!(id, stack = %card.stack, rank, "card added");
            fetch(tx, id)
        })
    }

    /// Move a card to `new_rank` in `new_stack`, shifting displaced siblings.
    ///
    /// Valid ranks are `0..=count-1` within the same stack and
    /// `0..=count` when crossing into another stack.
    pub fn move_card(
        &self,
        id: i64,
        new_stack: &str,
        new_rank: i64,
        guards: &[StackGuard],
    ) -> Result<Card, BoardError> {
        if new_stack.is_empty() {
            return Err(BoardError::BadRequest("stack name must not be empty".into()));
        }
        self.db.transaction(|tx| {
            let current = fetch(tx, id)?;
            let old_stack = current.stack.as_str();
            let old_rank = current.rank;

            if new_stack == old_stack {
                stacks::check_and_bump(tx, guards, &[old_stack])?;
                let rank = self.policy.resolve(new_rank, stack_len(tx, old_stack)? - 1)?;
                if rank < old_rank {
                    tx.execute(
                        "UPDATE cards SET rank = rank + 1
                         WHERE stack = ?1 AND rank >= ?2 AND rank < ?3",
                        params![old_stack, rank, old_rank],
                    )?;
                } else if rank > old_rank {
                    tx.execute(
                        "UPDATE cards SET rank = rank - 1
                         WHERE stack = ?1 AND rank > ?2 AND rank <= ?3",
                        params![old_stack, old_rank, rank],
                    )?;
                }
                tx.execute(
                    "UPDATE cards SET rank = ?1 WHERE id = ?2",
                    params![rank, id],
                )?;
                tracing::debug!(id, stack = old_stack, from = old_rank, to = rank, "card reordered");
            } else {
                stacks::check_and_bump(tx, guards, &[old_stack, new_stack])?;
                let rank = self.policy.resolve(new_rank, stack_len(tx, new_stack)?)?;
                tx.execute(
                    "UPDATE cards SET rank = rank - 1 WHERE stack = ?1 AND rank > ?2",
                    params![old_stack, old_rank],
                )?;
                tx.execute(
                    "UPDATE cards SET rank = rank + 1 WHERE stack = ?1 AND rank >= ?2",
                    params![new_stack, rank],
                )?;
                tx.execute(
                    "UPDATE cards SET stack = ?1, rank = ?2 WHERE id = ?3",
                    params![new_stack, rank, id],
                )?;
                tracing::debug!(
                    id,
                    from_stack = old_stack,
                    to_stack = new_stack,
                    from = old_rank,
                    to = rank,
                    "card moved across stacks"
                );
            }
            fetch(tx, id)
        })
    }

    /// Edit a card's text fields without touching its rank.
    pub fn update_card(
        &self,
        id: i64,
        title: Option<&str>,
        color: Option<&str>,
        guard: Option<&StackGuard>,
    ) -> Result<Card, BoardError> {
        self.db.transaction(|tx| {
            let current = fetch(tx, id)?;
            stacks::check_and_bump(tx, guard_slice(guard), &[&current.stack])?;
            tx.execute(
                "UPDATE cards SET title = ?1, color = ?2 WHERE id = ?3",
                params![
                    title.unwrap_or(&current.title),
                    color.unwrap_or(&current.color),
                    id
                ],
            )?;
            fetch(tx, id)
        })
    }

    /// Remove a card and close the gap it leaves behind.
    pub fn delete(&self, id: i64, guard: Option<&StackGuard>) -> Result<Card, BoardError> {
        self.db.transaction(|tx| {
            let current = fetch(tx, id)?;
            stacks::check_and_bump(tx, guard_slice(guard), &[&current.stack])?;
            tx.execute(
                "UPDATE cards SET rank = rank - 1 WHERE stack = ?1 AND rank > ?2",
                params![current.stack, current.rank],
            )?;
            tx.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
            tracing::debug!(id, stack = %current.stack, rank = current.rank, "card deleted");
            Ok(current)
        })
    }

    pub fn get_card(&self, id: i64) -> Result<Option<Card>, BoardError> {
        match fetch(&self.db.conn, id) {
            Ok(card) => Ok(Some(card)),
            Err(BoardError::CardNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Cards of one stack in rank order.
    pub fn list_cards(&self, stack: &str) -> Result<Vec<Card>, BoardError> {
        self.list_cards_in(&[stack.to_string()])
    }

    /// Cards of several stacks, ordered by stack then rank.
    pub fn list_cards_in(&self, stacks: &[String]) -> Result<Vec<Card>, BoardError> {
        if stacks.is_empty() {
            return Ok(Vec::new());
        }
        let holders = vec!["?"; stacks.len()].join(",");
        let sql = format!(
            "SELECT id, stack, rank, title, color FROM cards
             WHERE stack IN ({}) ORDER BY stack, rank",
            holders
        );
        let mut stmt = self.db.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(stacks.iter()), read_card)?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row?);
        }
        Ok(cards)
    }

    pub fn get_stacks(&self, names: &[String]) -> Result<Vec<Stack>, BoardError> {
        stacks::select_by_names(&self.db.conn, names)
    }
}

fn guard_slice(guard: Option<&StackGuard>) -> &[StackGuard] {
    guard.map(std::slice::from_ref).unwrap_or(&[])
}

fn read_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        stack: row.get(1)?,
        rank: row.get(2)?,
        title: row.get(3)?,
        color: row.get(4)?,
    })
}

fn fetch(conn: &Connection, id: i64) -> Result<Card, BoardError> {
    conn.query_row(
        "SELECT id, stack, rank, title, color FROM cards WHERE id = ?1",
        params![id],
        read_card,
    )
    .optional()?
    .ok_or(BoardError::CardNotFound { id })
}

fn stack_len(conn: &Connection, stack: &str) -> Result<i64, BoardError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM cards WHERE stack = ?1",
        params![stack],
        |row| row.get(0),
    )?)
}

// ── Tests ─────────────────────────────────────────────────────────────
