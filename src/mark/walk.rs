//! Walk: a named work-stream binding a trace to an optional plan.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::{MarkId, Phase, Umwelt, WalkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalkStatus {
    Active,
    Paused,
    Completed,
}

/// A named work-stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Walk {
    pub id: WalkId,
    pub root_plan: Option<String>,
    pub phase: Phase,
    pub marks: Vec<MarkId>,
    pub participants: HashSet<String>,
    pub status: WalkStatus,
}

impl Walk {
    pub fn new(root_plan: Option<String>) -> Self {
        Self {
            id: WalkId::new(),
            root_plan,
            phase: Phase::Sense,
            marks: Vec::new(),
            participants: HashSet::new(),
            status: WalkStatus::Active,
        }
    }

    /// Marks only ever accumulate; a walk's mark list never shrinks.
    pub fn record_mark(&mut self, mark_id: MarkId, umwelt: &Umwelt) {
        self.marks.push(mark_id);
        self.participants.insert(umwelt.observer.clone());
    }

    /// Advance phase, rejecting transitions outside the declared grammar.
    pub fn transition_phase(&mut self, to: Phase) -> Result<(), String> {
        if !self.phase.can_transition_to(to) {
            return Err(format!(
                "illegal phase transition {:?} -> {:?}",
                self.phase, to
            ));
        }
        self.phase = to;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.status = WalkStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = WalkStatus::Active;
    }

    pub fn complete(&mut self) {
        self.status = WalkStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_follow_grammar() {
        let mut w = Walk::new(None);
        assert_eq!(w.phase, Phase::Sense);
        w.transition_phase(Phase::Act).unwrap();
        w.transition_phase(Phase::Reflect).unwrap();
        w.transition_phase(Phase::Sense).unwrap();
        assert!(w.transition_phase(Phase::Reflect).is_err());
    }

    #[test]
    fn recording_marks_is_monotonic() {
        let mut w = Walk::new(None);
        let umwelt = Umwelt::new("alice");
        w.record_mark(MarkId::new(), &umwelt);
        w.record_mark(MarkId::new(), &umwelt);
        assert_eq!(w.marks.len(), 2);
        assert_eq!(w.participants.len(), 1);
    }
}
