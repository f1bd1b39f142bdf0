//! Priority reordering.
//!
//! Priorities live in each task's text, so a move rewrites the text of the
//! tasks whose order key changes and nothing else. Values may go negative
//! and need not be contiguous; dense renumbering only happens on a full
//! document parse.

use crate::entry::{set_priority, Entry};
use crate::error::{CoreError, Result};
use crate::wire::{Collection, Mutation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A requested move within the task order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityOp {
    /// Before every other task.
    #[serde(rename = "topqueue")]
    ToFront,
    /// Swap with the previous task.
    #[serde(rename = "up1")]
    Up,
    /// Swap with the next task.
    #[serde(rename = "down1")]
    Down,
    /// After every other task.
    #[serde(rename = "bury")]
    ToBack,
}

impl PriorityOp {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToFront => "topqueue",
            Self::Up => "up1",
            Self::Down => "down1",
            Self::ToBack => "bury",
        }
    }
}

impl fmt::Display for PriorityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityOp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topqueue" => Ok(Self::ToFront),
            "up1" => Ok(Self::Up),
            "down1" => Ok(Self::Down),
            "bury" => Ok(Self::ToBack),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

/// Compute new text for the tasks affected by moving `id`.
///
/// Only changed tasks are returned. A swap at the edge of the order returns
/// nothing.
///
/// # Errors
/// Returns `CoreError::NotFound` if `id` is not in the collection, or a
/// parse error if stored text is not a fragment.
pub fn reorder_task(collection: &Collection, id: &str, op: PriorityOp) -> Result<Vec<Mutation>> {
    let target = collection
        .get(id)
        .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

    let mutations = match op {
        PriorityOp::ToFront => {
            let priority = front_priority(collection)?;
            vec![Mutation::new(id, set_priority(&target.fulltext, priority))]
        }
        PriorityOp::ToBack => {
            let priority = back_priority(collection)?;
            vec![Mutation::new(id, set_priority(&target.fulltext, priority))]
        }
        PriorityOp::Up => move_past(collection, id, -1)?,
        PriorityOp::Down => move_past(collection, id, 1)?,
    };

    Ok(mutations)
}

/// Priority that sorts before every task in the collection.
///
/// # Errors
/// Returns a parse error if stored text is not a fragment.
pub fn front_priority(collection: &Collection) -> Result<i64> {
    let min = set_priorities(collection)?.into_iter().min().unwrap_or(0);
    min.checked_sub(1).ok_or(CoreError::PriorityOverflow(min))
}

/// Priority that sorts after every task in the collection.
///
/// # Errors
/// Returns a parse error if stored text is not a fragment.
pub fn back_priority(collection: &Collection) -> Result<i64> {
    let max = set_priorities(collection)?.into_iter().max().unwrap_or(0);
    max.checked_add(1).ok_or(CoreError::PriorityOverflow(max))
}

/// New priorities for a task and the neighbor it swaps with.
///
/// The neighbor takes the task's old value, pulled to 0 when the two
/// straddle zero; the task lands one step past it in `direction`.
/// Returns `(own, neighbor)`, or `None` when the task would land outside
/// the integer range.
#[must_use]
pub const fn swap_priorities(own: i64, neighbor: i64, direction: i64) -> Option<(i64, i64)> {
    let straddles = (own < 0 && neighbor > 0) || (own > 0 && neighbor < 0);
    let neighbor_new = if straddles { 0 } else { own };
    match neighbor_new.checked_add(direction) {
        Some(own_new) => Some((own_new, neighbor_new)),
        None => None,
    }
}

fn set_priorities(collection: &Collection) -> Result<Vec<i64>> {
    Ok(collection
        .parse_entries()?
        .into_iter()
        .filter_map(|e| e.priority)
        .collect())
}

fn move_past(collection: &Collection, id: &str, direction: i64) -> Result<Vec<Mutation>> {
    let mut ordered: Vec<Entry> = collection
        .parse_entries()?
        .into_iter()
        .filter(|e| e.priority.is_some())
        .collect();

    ordered.sort_by(|a, b| {
        let ascending = a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id));
        if direction > 0 { ascending } else { ascending.reverse() }
    });

    let Some(index) = ordered.iter().position(|e| e.id == id) else {
        // Unprioritized tasks have no neighbor to swap with.
        return Ok(Vec::new());
    };
    let Some(neighbor) = ordered.get(index + 1) else {
        return Ok(Vec::new());
    };
    let own = &ordered[index];
    let own_priority = own.priority.unwrap_or_default();

    let (own_new, neighbor_new) = swap_priorities(
        own_priority,
        neighbor.priority.unwrap_or_default(),
        direction,
    )
    .ok_or(CoreError::PriorityOverflow(own_priority))?;

    Ok(vec![
        rewrite(collection, &own.id, own_new),
        rewrite(collection, &neighbor.id, neighbor_new),
    ])
}

fn rewrite(collection: &Collection, id: &str, priority: i64) -> Mutation {
    let text = collection.get(id).map_or("", |e| e.fulltext.as_str());
    Mutation::new(id, set_priority(text, priority))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Hasher;
    use crate::wire::WireEntry;

    fn task(id: &str, priority: i64) -> WireEntry {
        let text = format!(
            "* Task {id}\n:PROPERTIES:\n:ID:       {id}\n:TimeTrackerPriority:       {priority}\n:END:\n"
        );
        WireEntry::new(id, text, &Sha256Hasher, 0)
    }

    fn collection(tasks: &[(&str, i64)]) -> Collection {
        let mut collection = Collection::new();
        for (id, priority) in tasks {
            collection.entries.insert((*id).to_string(), task(id, *priority));
        }
        collection
    }

    fn priorities(mutations: &[Mutation]) -> Vec<(String, i64)> {
        mutations
            .iter()
            .map(|m| {
                let entry = Entry::parse(&m.fulltext).unwrap();
                (m.id.clone(), entry.priority.unwrap())
            })
            .collect()
    }

    #[test]
    fn test_to_front_and_back() {
        let tasks = collection(&[("a", 1), ("b", 2), ("c", 3)]);

        let front = reorder_task(&tasks, "c", PriorityOp::ToFront).unwrap();
        assert_eq!(priorities(&front), vec![("c".to_string(), 0)]);

        let back = reorder_task(&tasks, "a", PriorityOp::ToBack).unwrap();
        assert_eq!(priorities(&back), vec![("a".to_string(), 4)]);
    }

    #[test]
    fn test_up_swaps_with_previous() {
        let tasks = collection(&[("t1", 1), ("t2", 2), ("t3", 3)]);

        let moved = priorities(&reorder_task(&tasks, "t3", PriorityOp::Up).unwrap());
        assert_eq!(moved, vec![("t3".to_string(), 2), ("t2".to_string(), 3)]);

        let t3 = moved[0].1;
        let t2 = moved[1].1;
        assert!(t3 < t2);
        assert!(1 < t3, "untouched t1 stays first");
    }

    #[test]
    fn test_down_swaps_with_next() {
        let tasks = collection(&[("t1", 1), ("t2", 2), ("t3", 3)]);
        let moved = priorities(&reorder_task(&tasks, "t1", PriorityOp::Down).unwrap());
        assert_eq!(moved, vec![("t1".to_string(), 2), ("t2".to_string(), 1)]);
    }

    #[test]
    fn test_swap_at_edge_is_noop() {
        let tasks = collection(&[("t1", 1), ("t2", 2)]);
        assert!(reorder_task(&tasks, "t1", PriorityOp::Up).unwrap().is_empty());
        assert!(reorder_task(&tasks, "t2", PriorityOp::Down).unwrap().is_empty());
    }

    #[test]
    fn test_collapse_across_zero() {
        assert_eq!(swap_priorities(-3, 2, 1), Some((1, 0)));
        assert_eq!(swap_priorities(4, -1, -1), Some((-1, 0)));
        assert_eq!(swap_priorities(2, 3, 1), Some((3, 2)));
        assert_eq!(swap_priorities(-2, -5, -1), Some((-3, -2)));

        let tasks = collection(&[("neg", -3), ("pos", 2)]);
        let moved = priorities(&reorder_task(&tasks, "neg", PriorityOp::Down).unwrap());
        assert_eq!(moved, vec![("neg".to_string(), 1), ("pos".to_string(), 0)]);
    }

    #[test]
    fn test_unknown_id() {
        let tasks = collection(&[("a", 1)]);
        let err = reorder_task(&tasks, "missing", PriorityOp::Up).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn test_only_moved_text_changes() {
        let tasks = collection(&[("a", 1), ("b", 2)]);
        let moved = reorder_task(&tasks, "b", PriorityOp::ToFront).unwrap();
        assert_eq!(
            moved[0].fulltext,
            tasks.get("b").unwrap().fulltext.replace("Priority:       2", "Priority:       0")
        );
    }

    #[test]
    fn test_op_names() {
        assert_eq!("up1".parse::<PriorityOp>().unwrap(), PriorityOp::Up);
        assert_eq!(PriorityOp::ToBack.to_string(), "bury");
        assert!(matches!(
            "sideways".parse::<PriorityOp>(),
            Err(CoreError::UnknownOperation(op)) if op == "sideways"
        ));
    }

    #[test]
    fn test_moves_at_integer_limits_fail() {
        let low = collection(&[("a", i64::MIN), ("b", 2)]);
        assert!(matches!(
            reorder_task(&low, "b", PriorityOp::ToFront),
            Err(CoreError::PriorityOverflow(i64::MIN))
        ));

        let high = collection(&[("a", 1), ("b", i64::MAX)]);
        assert!(matches!(
            reorder_task(&high, "a", PriorityOp::ToBack),
            Err(CoreError::PriorityOverflow(i64::MAX))
        ));

        // Tied at MIN: "a" keeps MIN and "b" would land one below it.
        let bottom = collection(&[("a", i64::MIN), ("b", i64::MIN)]);
        assert!(matches!(
            reorder_task(&bottom, "b", PriorityOp::Up),
            Err(CoreError::PriorityOverflow(_))
        ));
        assert_eq!(swap_priorities(i64::MAX, i64::MAX, 1), None);
    }

    #[test]
    fn test_front_priority_of_empty_collection() {
        assert_eq!(front_priority(&Collection::new()).unwrap(), -1);
        assert_eq!(back_priority(&Collection::new()).unwrap(), 1);
    }
}
