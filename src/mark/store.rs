//! Mark ledger storage.
//!
//! An in-memory `DashMap` cache guarded behind `Arc`, with auxiliary
//! indexes rebuilt incrementally on append. Sorting happens at query
//! time, not on insert, so append stays O(1) amortized.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{LinkSource, Mark, MarkId, MarkLinkRelation, Phase, WalkId};

/// Errors the ledger can surface.
#[derive(Debug, Error)]
pub enum MarkError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("mark not found: {0}")]
    NotFound(String),

    #[error("corruption detected for mark {0}")]
    Corruption(String),
}

pub type MarkResult<T> = Result<T, MarkError>;

/// Filter criteria for `MarkLedger::query`. Any combination of
/// walk_id, tag, tag_prefix, time range, and phase may be set at once.
#[derive(Debug, Clone, Default)]
pub struct MarkFilter {
    pub walk_id: Option<WalkId>,
    pub tag: Option<String>,
    pub tag_prefix: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub phase: Option<Phase>,
}

impl MarkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_walk(mut self, walk_id: WalkId) -> Self {
        self.walk_id = Some(walk_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = Some(prefix.into());
        self
    }

    pub fn with_range(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    fn matches(&self, mark: &Mark) -> bool {
        if let Some(ref w) = self.walk_id {
            if mark.walk_id.as_ref() != Some(w) {
                return false;
            }
        }
        if let Some(ref t) = self.tag {
            if !mark.tags.contains(t) {
                return false;
            }
        }
        if let Some(ref p) = self.tag_prefix {
            if !mark.has_tag_prefix(p) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if mark.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if mark.timestamp > until {
                return false;
            }
        }
        if let Some(phase) = self.phase {
            if mark.phase != phase {
                return false;
            }
        }
        true
    }
}

/// A causal subtree rooted at some mark.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarkTree {
    pub mark: Mark,
    pub children: Vec<MarkTree>,
}

/// Append-only mark ledger.
///
/// Single-writer by convention: callers serialize their own `append`
/// calls; reads are lock-free via `DashMap`'s sharded locking.
#[derive(Debug, Default)]
pub struct MarkLedger {
    marks: DashMap<MarkId, Mark>,
    /// children[source] = marks that link back to `source`.
    children: DashMap<MarkId, Vec<MarkId>>,
    busy_watermark: Option<usize>,
}

impl MarkLedger {
    pub fn new() -> Self {
        Self {
            marks: DashMap::new(),
            children: DashMap::new(),
            busy_watermark: None,
        }
    }

    /// Configure the backpressure watermark.
    pub fn with_watermark(mut self, watermark: usize) -> Self {
        self.busy_watermark = Some(watermark);
        self
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Validate and durably append a mark.
    ///
    /// Any failure leaves the store unchanged. `Busy` is surfaced when the
    /// watermark is exceeded and must not count against escalation
    /// metrics — callers are expected to check `is_busy()` before invoking
    /// `append` for that accounting distinction.
    pub fn append(&self, mark: Mark) -> MarkResult<MarkId> {
        for link in &mark.links {
            if let LinkSource::Mark(ref source_id) = link.source {
                let source = self
                    .marks
                    .get(source_id)
                    .ok_or_else(|| {
                        MarkError::InvariantViolation(format!(
                            "link source {source_id} does not exist"
                        ))
                    })?;
                if source.timestamp > mark.timestamp {
                    return Err(MarkError::InvariantViolation(format!(
                        "causality violation: source {} ({}) is after target {} ({})",
                        source_id, source.timestamp, mark.id, mark.timestamp
                    )));
                }
                if link.relation == MarkLinkRelation::Causes && source_id == &mark.id {
                    return Err(MarkError::InvariantViolation(
                        "self-referential CAUSES link would create a cycle".into(),
                    ));
                }
            }
        }

        if self.would_cycle(&mark) {
            return Err(MarkError::InvariantViolation(
                "link would introduce a cycle in the causal DAG".into(),
            ));
        }

        let id = mark.id.clone();
        for link in &mark.links {
            if let LinkSource::Mark(ref source_id) = link.source {
                self.children.entry(source_id.clone()).or_default().push(id.clone());
            }
        }
        debug!(mark_id = %id, phase = ?mark.phase, "appending mark");
        self.marks.insert(id.clone(), mark);
        Ok(id)
    }

    /// Whether the queue has exceeded its configured watermark.
    pub fn is_busy(&self) -> bool {
        self.busy_watermark.is_some_and(|w| self.marks.len() >= w)
    }

    fn would_cycle(&self, candidate: &Mark) -> bool {
        // A fresh mark can only cycle back to itself through an existing
        // mark's ancestry, since every linked source must already exist
        // (enforced above). Walk ancestors of each linked source looking
        // for the candidate's own id — impossible unless a source link
        // were forged to point at an id not yet inserted, which the
        // existence check above already rejects. Kept as defense in depth
        // for future relation types that might reference forward.
        for link in &candidate.links {
            if let LinkSource::Mark(ref source_id) = link.source {
                if *source_id == candidate.id {
                    return true;
                }
                let mut stack = vec![source_id.clone()];
                let mut seen = HashSet::new();
                while let Some(id) = stack.pop() {
                    if !seen.insert(id.clone()) {
                        continue;
                    }
                    if id == candidate.id {
                        return true;
                    }
                    if let Some(m) = self.marks.get(&id) {
                        for l in &m.links {
                            if let LinkSource::Mark(ref s) = l.source {
                                stack.push(s.clone());
                            }
                        }
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, id: &MarkId) -> Option<Mark> {
        self.marks.get(id).map(|r| r.clone())
    }

    /// Timestamp-ordered query over the given filter.
    pub fn query(&self, filter: &MarkFilter) -> Vec<Mark> {
        let mut matches: Vec<Mark> = self
            .marks
            .iter()
            .map(|r| r.value().clone())
            .filter(|m| filter.matches(m))
            .collect();
        matches.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        matches
    }

    /// Walk `links` in reverse to roots.
    ///
    /// Cycles are impossible by invariant, so this always terminates.
    pub fn ancestors(&self, id: &MarkId) -> MarkResult<Vec<Mark>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.clone()];
        let start = self
            .marks
            .get(id)
            .ok_or_else(|| MarkError::NotFound(id.to_string()))?;
        drop(start);

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(mark) = self.marks.get(&current) else {
                continue;
            };
            for link in &mark.links {
                if let LinkSource::Mark(ref source_id) = link.source {
                    if let Some(source) = self.marks.get(source_id) {
                        out.push(source.clone());
                        stack.push(source_id.clone());
                    } else {
                        warn!(mark_id = %current, source = %source_id, "dangling mark link");
                    }
                }
            }
        }
        out.sort_by_key(|m| m.timestamp);
        Ok(out)
    }

    /// Produce a causal subtree rooted at `root_id`: children are marks
    /// whose links point back at this mark.
    pub fn tree(&self, root_id: &MarkId) -> MarkResult<MarkTree> {
        let mark = self
            .marks
            .get(root_id)
            .ok_or_else(|| MarkError::NotFound(root_id.to_string()))?
            .clone();
        Ok(self.build_tree(mark, &mut HashSet::new()))
    }

    fn build_tree(&self, mark: Mark, visiting: &mut HashSet<MarkId>) -> MarkTree {
        if !visiting.insert(mark.id.clone()) {
            return MarkTree {
                mark,
                children: Vec::new(),
            };
        }
        let child_ids = self
            .children
            .get(&mark.id)
            .map(|r| r.clone())
            .unwrap_or_default();
        let children = child_ids
            .into_iter()
            .filter_map(|cid| self.marks.get(&cid).map(|r| r.clone()))
            .map(|child| self.build_tree(child, visiting))
            .collect();
        visiting.remove(&mark.id);
        MarkTree { mark, children }
    }
}
