//! Single-slot holder for deferred task failures.
//!
//! Worker and cooperative bodies never raise where they run. A failure is
//! parked here and taken by the driving thread on its next check. The slot
//! holds one value: a second failure stored before the first is observed
//! replaces it.

use crate::error::TaskError;

#[derive(Debug, Default)]
pub(crate) struct ExceptionSlot {
    pending: Option<TaskError>,
}

impl ExceptionSlot {
    /// Store a failure, returning the unobserved one it replaced
    pub fn store(&mut self, error: TaskError) -> Option<TaskError> {
        self.pending.replace(error)
    }

    /// Take the pending failure, leaving the slot empty
    pub fn take(&mut self) -> Option<TaskError> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    #[test]
    fn test_take_empties_slot() {
        let mut slot = ExceptionSlot::default();
        slot.store(TaskError::failed(TaskId(1), "boom"));
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_store_overwrites_unobserved_failure() {
        let mut slot = ExceptionSlot::default();
        assert!(slot.store(TaskError::failed(TaskId(1), "first")).is_none());

        let replaced = slot.store(TaskError::failed(TaskId(2), "second"));
        assert_eq!(replaced.map(|e| e.task()), Some(TaskId(1)));
        assert_eq!(slot.take().map(|e| e.task()), Some(TaskId(2)));
    }
}
