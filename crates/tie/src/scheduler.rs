//! Cooperative task queue for deferred pipe steps.
//!
//! A tick runs the tasks that were queued before it started; tasks deferred
//! while a tick runs wait for the next one. Everything happens on one thread,
//! so a tick is the only suspension point the engine has.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerInner {
    tasks: RefCell<VecDeque<Task>>,
    current_tick: Cell<u64>,
}

/// Shared handle to one task queue. Clones schedule onto the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task for the next tick.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.tasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.tasks.borrow().is_empty()
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.inner.current_tick.get()
    }

    /// Run one tick. Returns the number of tasks executed.
    pub fn run_tick(&self) -> usize {
        self.inner.current_tick.set(self.inner.current_tick.get() + 1);
        // Take the batch first: running tasks may defer more work.
        let batch: Vec<Task> = self.inner.tasks.borrow_mut().drain(..).collect();
        let executed = batch.len();
        for task in batch {
            task();
        }
        executed
    }

    /// Run ticks until no task is pending. Returns the number of ticks run.
    pub fn run_until_idle(&self) -> u64 {
        let mut ticks = 0;
        while !self.is_idle() {
            self.run_tick();
            ticks += 1;
        }
        ticks
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("current_tick", &self.current_tick())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_fifo_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            scheduler.defer(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.run_tick(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn tasks_deferred_during_a_tick_wait_for_the_next() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            let inner = scheduler.clone();
            scheduler.defer(move || {
                log.borrow_mut().push("first");
                let log = log.clone();
                inner.defer(move || log.borrow_mut().push("second"));
            });
        }

        scheduler.run_tick();
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(scheduler.current_tick(), 2);
    }
}
