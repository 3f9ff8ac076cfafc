//! Parent/child reconstruction from list indentation.

use crate::bounded::IterationGuard;
use crate::config::ParseLimits;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentStackEntry {
    pub task_id: String,
    pub indent_level: usize,
    pub actual_spaces: usize,
}

/// Where a new task lands in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub parent_id: Option<String>,
    pub indent_level: usize,
}

/// Monotonic stack of open ancestors. Equal indentation closes the previous
/// entry, so same-depth items are siblings.
#[derive(Debug, Clone)]
pub struct IndentStack {
    entries: VecDeque<IndentStackEntry>,
    max_size: usize,
    max_operations: usize,
    max_indent: usize,
}

impl IndentStack {
    pub fn new(limits: &ParseLimits) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size: limits.max_stack_size.max(1),
            max_operations: limits.max_stack_operations,
            max_indent: limits.max_indent_size,
        }
    }

    pub fn place(&mut self, task_id: &str, actual_spaces: usize) -> Placement {
        let spaces = actual_spaces.min(self.max_indent);
        let mut guard = IterationGuard::new("indent stack", self.max_operations);
        while self
            .entries
            .back()
            .is_some_and(|top| top.actual_spaces >= spaces)
        {
            if !guard.tick() {
                // Can't trust what is left; start a fresh root.
                self.entries.clear();
                break;
            }
            self.entries.pop_back();
        }

        let placement = match self.entries.back() {
            Some(parent) => Placement {
                parent_id: Some(parent.task_id.clone()),
                indent_level: parent.indent_level + 1,
            },
            None => Placement {
                parent_id: None,
                indent_level: 0,
            },
        };

        self.entries.push_back(IndentStackEntry {
            task_id: task_id.to_string(),
            indent_level: placement.indent_level,
            actual_spaces: spaces,
        });
        if self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        placement
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> IndentStack {
        IndentStack::new(&ParseLimits::default())
    }

    #[test]
    fn nesting_and_siblings() {
        let mut s = stack();
        assert_eq!(s.place("a", 0).parent_id, None);
        let b = s.place("b", 2);
        assert_eq!(b.parent_id.as_deref(), Some("a"));
        assert_eq!(b.indent_level, 1);
        let c = s.place("c", 2);
        assert_eq!(c.parent_id.as_deref(), Some("a"));
        let d = s.place("d", 4);
        assert_eq!((d.parent_id.as_deref(), d.indent_level), (Some("c"), 2));
        let e = s.place("e", 0);
        assert_eq!((e.parent_id, e.indent_level), (None, 0));
    }

    #[test]
    fn level_follows_parent_not_raw_indent() {
        let mut s = stack();
        s.place("a", 0);
        let b = s.place("b", 8);
        assert_eq!(b.indent_level, 1);
        let c = s.place("c", 4);
        assert_eq!((c.parent_id.as_deref(), c.indent_level), (Some("a"), 1));
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let limits = ParseLimits {
            max_stack_size: 2,
            ..ParseLimits::default()
        };
        let mut s = IndentStack::new(&limits);
        s.place("a", 0);
        s.place("b", 1);
        s.place("c", 2);
        assert_eq!(s.len(), 2);
        let d = s.place("d", 1);
        assert_eq!(d.parent_id, None);
        assert_eq!(d.indent_level, 0);
    }

    #[test]
    fn indents_are_clamped() {
        let limits = ParseLimits {
            max_indent_size: 4,
            ..ParseLimits::default()
        };
        let mut s = IndentStack::new(&limits);
        s.place("a", 4);
        let b = s.place("b", 40);
        assert_eq!(b.parent_id, None);
    }

    #[test]
    fn tripped_guard_starts_a_fresh_root() {
        let limits = ParseLimits {
            max_stack_operations: 1,
            ..ParseLimits::default()
        };
        let mut s = IndentStack::new(&limits);
        s.place("a", 0);
        s.place("b", 2);
        s.place("c", 4);
        // Reaching "a" needs two pops; the guard allows one.
        let d = s.place("d", 2);
        assert_eq!((d.parent_id, d.indent_level), (None, 0));
        assert_eq!(s.len(), 1);

        let mut roomy = stack();
        roomy.place("a", 0);
        roomy.place("b", 2);
        roomy.place("c", 4);
        assert_eq!(roomy.place("d", 2).parent_id.as_deref(), Some("a"));
    }
}
