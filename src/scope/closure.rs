//! Breadth-first expansion of a subject's group memberships.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::models::PermissionRow;
use crate::errors::ScopeError;

/// Directed membership graph: `member -> groups it belongs to`.
#[derive(Debug, Clone, Default)]
pub struct GroupGraph {
    edges: HashMap<String, Vec<String>>,
}

impl GroupGraph {
    pub fn from_permissions(rows: &[PermissionRow]) -> Self {
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows.iter().filter(|r| r.is_group_membership()) {
            let groups = edges.entry(row.subject.clone()).or_default();
            if !groups.contains(&row.action) {
                groups.push(row.action.clone());
            }
        }
        Self { edges }
    }

    pub fn direct_groups(&self, member: &str) -> &[String] {
        self.edges.get(member).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Expand `subject` plus `seeds` through the membership graph.
    ///
    /// Each identity is visited once. An edge to an identity already
    /// visited is recorded as a cycle when that identity can reach back
    /// to the edge's source. Fails when identities remain unexplored after
    /// `max_depth` levels.
    pub fn expand(
        &self,
        subject: &str,
        seeds: &[String],
        max_depth: usize,
    ) -> Result<Closure, ScopeError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = VecDeque::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for seed in std::iter::once(subject).chain(seeds.iter().map(String::as_str)) {
            if visited.insert(seed.to_string()) {
                frontier.push_back(seed.to_string());
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            if depth == max_depth {
                let unexplored = frontier
                    .iter()
                    .any(|node| self.direct_groups(node).iter().any(|g| !visited.contains(g)));
                if unexplored {
                    return Err(ScopeError::ClosureLimitExceeded {
                        subject: subject.to_string(),
                        limit: max_depth,
                    });
                }
                break;
            }

            let mut next = VecDeque::new();
            for node in frontier.drain(..) {
                for group in self.direct_groups(&node) {
                    if visited.contains(group) {
                        if let Some(cycle) = self.path_between(group, &node).map(canonical_cycle) {
                            if !cycles.contains(&cycle) {
                                tracing::debug!(subject, cycle = ?cycle, "group membership cycle");
                                cycles.push(cycle);
                            }
                        }
                        continue;
                    }
                    visited.insert(group.clone());
                    next.push_back(group.clone());
                }
            }
            frontier = next;
            depth += 1;
        }

        Ok(Closure {
            identities: visited.into_iter().collect(),
            cycles,
            depth,
        })
    }

    /// Shortest membership path `from .. to`, or `None` when `to` is
    /// unreachable from `from`.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut parent: HashMap<&str, Option<&str>> = HashMap::from([(from, None)]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![node.to_string()];
                let mut current = node;
                while let Some(Some(up)) = parent.get(current) {
                    path.push(up.to_string());
                    current = *up;
                }
                path.reverse();
                return Some(path);
            }
            for group in self.direct_groups(node) {
                if !parent.contains_key(group.as_str()) {
                    parent.insert(group.as_str(), Some(node));
                    queue.push_back(group.as_str());
                }
            }
        }
        None
    }
}

/// Rotate a cycle so it starts at its smallest identity. The same loop
/// found from different edges then compares equal.
fn canonical_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(start);
    }
    cycle
}

/// Every identity a subject acts as: itself plus all transitive groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub identities: BTreeSet<String>,
    /// Membership cycles met during expansion, each listed in edge order
    /// starting from its smallest identity.
    pub cycles: Vec<Vec<String>>,
    /// Levels expanded before the frontier emptied.
    pub depth: usize,
}

impl Closure {
    pub fn intersects(&self, subjects: &BTreeSet<String>) -> bool {
        // Walk the smaller side.
        if subjects.len() < self.identities.len() {
            subjects.iter().any(|s| self.identities.contains(s))
        } else {
            self.identities.iter().any(|s| subjects.contains(s))
        }
    }
}
