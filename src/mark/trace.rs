//! Trace: an immutable, timestamp-ordered sequence of marks.

use super::types::Mark;

/// An immutable sequence of marks. This crate keeps a single `Mark` type,
/// so homogeneity across a trace's elements holds trivially.
///
/// Every operation returns a new `Trace` rather than mutating in place,
/// the same functional collection idiom as `Context`'s immutable-by-
/// convention node/edge iterators, taken further here since `Trace` never
/// exposes a mutable handle at all.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    marks: Vec<Mark>,
}

impl Trace {
    pub fn new() -> Self {
        Self { marks: Vec::new() }
    }

    pub fn from_marks(mut marks: Vec<Mark>) -> Self {
        marks.sort_by_key(|m| m.timestamp);
        Self { marks }
    }

    /// Returns a new `Trace` with `mark` inserted in timestamp order.
    pub fn append(&self, mark: Mark) -> Trace {
        let mut marks = self.marks.clone();
        let insert_at = marks.partition_point(|m| m.timestamp <= mark.timestamp);
        marks.insert(insert_at, mark);
        Trace { marks }
    }

    pub fn filter(&self, predicate: impl Fn(&Mark) -> bool) -> Trace {
        Trace {
            marks: self.marks.iter().filter(|m| predicate(m)).cloned().collect(),
        }
    }

    /// Timestamp-ordered merge of two traces.
    pub fn merge(&self, other: &Trace) -> Trace {
        let mut marks = self.marks.clone();
        marks.extend(other.marks.iter().cloned());
        marks.sort_by_key(|m| m.timestamp);
        Trace { marks }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn last(&self) -> Option<&Mark> {
        self.marks.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> {
        self.marks.iter()
    }
}

impl std::ops::Index<usize> for Trace {
    type Output = Mark;
    fn index(&self, index: usize) -> &Mark {
        &self.marks[index]
    }
}
