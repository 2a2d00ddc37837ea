//! One-step-later continuations.
//!
//! Some reconciliation can only be judged after the host has run one physics
//! step (did the constraint survive? did the tree really split?). `Deferred`
//! models that as a single pending task keyed by the step counter. Repeated
//! requests coalesce: the task moves to the most recent request instead of
//! stacking.

use serde::{Deserialize, Serialize};

/// A one-shot task due one step after the latest request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deferred {
    due_step: Option<u64>,
    /// Requests folded into the pending run
    requests: u32,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a run one step after `now`.
    ///
    /// Returns `true` when nothing was pending before.
    pub fn schedule(&mut self, now: u64) -> bool {
        let fresh = self.due_step.is_none();
        self.due_step = Some(now + 1);
        self.requests = self.requests.saturating_add(1);
        fresh
    }

    pub fn is_pending(&self) -> bool {
        self.due_step.is_some()
    }

    pub fn due_step(&self) -> Option<u64> {
        self.due_step
    }

    /// Number of requests collapsed into the pending run.
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Fire if due at `now`. Fires at most once per schedule.
    pub fn take_due(&mut self, now: u64) -> bool {
        match self.due_step {
            Some(due) if now >= due => {
                self.due_step = None;
                self.requests = 0;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.due_step = None;
        self.requests = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_one_step_later() {
        let mut d = Deferred::new();
        assert!(d.schedule(10));
        assert!(!d.take_due(10));
        assert!(d.take_due(11));
        assert!(!d.take_due(12));
    }

    #[test]
    fn test_requests_coalesce_to_latest() {
        let mut d = Deferred::new();
        assert!(d.schedule(10));
        assert!(!d.schedule(11));
        assert!(!d.schedule(12));
        assert_eq!(d.requests(), 3);
        assert_eq!(d.due_step(), Some(13));
        assert!(!d.take_due(12));
        assert!(d.take_due(13));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_cancel() {
        let mut d = Deferred::new();
        d.schedule(0);
        d.cancel();
        assert!(!d.take_due(5));
    }
}
