//! Task queue storage
//!
//! Four disjoint insertion-ordered queues keyed by task id.

use indexmap::IndexMap;

use crate::task::TaskRef;
use crate::types::{QueueKind, TaskId};

/// The scheduled, running, waiting and finishing queues
#[derive(Default)]
pub(crate) struct TaskQueues {
    scheduled: IndexMap<TaskId, TaskRef>,
    running: IndexMap<TaskId, TaskRef>,
    waiting: IndexMap<TaskId, TaskRef>,
    finishing: IndexMap<TaskId, TaskRef>,
}

impl TaskQueues {
    fn queue(&self, kind: QueueKind) -> &IndexMap<TaskId, TaskRef> {
        match kind {
            QueueKind::Scheduled => &self.scheduled,
            QueueKind::Running => &self.running,
            QueueKind::Waiting => &self.waiting,
            QueueKind::Finishing => &self.finishing,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut IndexMap<TaskId, TaskRef> {
        match kind {
            QueueKind::Scheduled => &mut self.scheduled,
            QueueKind::Running => &mut self.running,
            QueueKind::Waiting => &mut self.waiting,
            QueueKind::Finishing => &mut self.finishing,
        }
    }

    /// Append to the back of a queue
    pub fn push(&mut self, kind: QueueKind, task: TaskRef) {
        self.queue_mut(kind).insert(task.id(), task);
    }

    /// Remove the oldest entry of a queue
    pub fn pop_front(&mut self, kind: QueueKind) -> Option<TaskRef> {
        self.queue_mut(kind)
            .shift_remove_index(0)
            .map(|(_, task)| task)
    }

    /// Remove a task from one queue, preserving the order of the rest
    pub fn remove(&mut self, kind: QueueKind, id: TaskId) -> Option<TaskRef> {
        self.queue_mut(kind).shift_remove(&id)
    }

    pub fn locate(&self, id: TaskId) -> Option<QueueKind> {
        QueueKind::ALL
            .into_iter()
            .find(|kind| self.queue(*kind).contains_key(&id))
    }

    pub fn len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        QueueKind::ALL
            .into_iter()
            .all(|kind| self.queue(kind).is_empty())
    }

    pub fn drain(&mut self, kind: QueueKind) -> Vec<TaskRef> {
        self.queue_mut(kind).drain(..).map(|(_, task)| task).collect()
    }

    pub fn tasks(&self, kind: QueueKind) -> impl Iterator<Item = &TaskRef> {
        self.queue(kind).values()
    }

    pub fn clear(&mut self) {
        for kind in QueueKind::ALL {
            self.queue_mut(kind).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::{StepSequence, Task, TaskContext, TaskCore};
    use std::sync::Arc;

    struct Noop(TaskCore);

    impl Task for Noop {
        fn core(&self) -> &TaskCore {
            &self.0
        }

        fn run(&self, _ctx: TaskContext) -> Result<Option<StepSequence>, TaskError> {
            Ok(None)
        }
    }

    fn noop() -> TaskRef {
        Arc::new(Noop(TaskCore::new()))
    }

    #[test]
    fn test_pop_front_is_fifo() {
        let mut queues = TaskQueues::default();
        let a = noop();
        let b = noop();
        let c = noop();
        queues.push(QueueKind::Scheduled, a.clone());
        queues.push(QueueKind::Scheduled, b.clone());
        queues.push(QueueKind::Scheduled, c.clone());

        queues.remove(QueueKind::Scheduled, b.id());

        assert_eq!(queues.pop_front(QueueKind::Scheduled).map(|t| t.id()), Some(a.id()));
        assert_eq!(queues.pop_front(QueueKind::Scheduled).map(|t| t.id()), Some(c.id()));
        assert!(queues.pop_front(QueueKind::Scheduled).is_none());
    }

    #[test]
    fn test_locate_and_remove() {
        let mut queues = TaskQueues::default();
        let task = noop();
        queues.push(QueueKind::Waiting, task.clone());

        assert_eq!(queues.locate(task.id()), Some(QueueKind::Waiting));
        assert!(!queues.is_empty());

        assert!(queues.remove(QueueKind::Running, task.id()).is_none());
        assert!(queues.remove(QueueKind::Waiting, task.id()).is_some());
        assert_eq!(queues.locate(task.id()), None);
        assert!(queues.is_empty());
    }

    #[test]
    fn test_drain_empties_only_that_queue() {
        let mut queues = TaskQueues::default();
        queues.push(QueueKind::Scheduled, noop());
        queues.push(QueueKind::Scheduled, noop());
        queues.push(QueueKind::Running, noop());

        assert_eq!(queues.drain(QueueKind::Scheduled).len(), 2);
        assert_eq!(queues.len(QueueKind::Scheduled), 0);
        assert_eq!(queues.len(QueueKind::Running), 1);
    }
}
