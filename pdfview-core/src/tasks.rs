use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskPurpose {
    ReloadDocument,
    AnnotationCapture,
    SearchAsYouType,
    ClearSynctexMarker,
}

/// Single-shot timers keyed by purpose. Scheduling a purpose again replaces its deadline.
#[derive(Debug, Default, Clone)]
pub struct DelayedTasks {
    pending: HashMap<TaskPurpose, Instant>,
}

impl DelayedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, purpose: TaskPurpose, delay: Duration, now: Instant) {
        self.pending.insert(purpose, now + delay);
    }

    pub fn cancel(&mut self, purpose: TaskPurpose) -> bool {
        self.pending.remove(&purpose).is_some()
    }

    pub fn is_pending(&self, purpose: TaskPurpose) -> bool {
        self.pending.contains_key(&purpose)
    }

    pub fn deadline(&self, purpose: TaskPurpose) -> Option<Instant> {
        self.pending.get(&purpose).copied()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Removes and returns every task due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TaskPurpose> {
        let mut due: Vec<(Instant, TaskPurpose)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(purpose, deadline)| (*deadline, *purpose))
            .collect();
        due.sort();
        for (_, purpose) in &due {
            self.pending.remove(purpose);
        }
        due.into_iter().map(|(_, purpose)| purpose).collect()
    }
}
