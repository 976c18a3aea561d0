//! Timer scheduler: two priority bands of time-ordered tasks backed
//! by a min-heap keyed by monotonic deadline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// What a task's action should do once it has run.
pub enum TaskOutcome {
    /// Do not run again; the task is removed.
    Done,
    /// Re-schedule after `delay_ms` milliseconds, into the LOW priority
    /// band regardless of the task's original priority. Likely unintentional,
    /// but changing it would shift `set_interval`'s ordering against
    /// one-shot timers, so it stays as observed.
    Repeat(u64),
}

/// Priority band a task is scheduled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

type Action<C> = Box<dyn FnMut(&mut C) -> TaskOutcome>;
type Finalizer<C> = Box<dyn FnOnce(&mut C)>;

struct Task<C> {
    deadline: Instant,
    seq: u64,
    context: C,
    action: Action<C>,
    finalize: Option<Finalizer<C>>,
}

impl<C> Task<C> {
    fn run_finalizer(mut self) {
        if let Some(f) = self.finalize.take() {
            f(&mut self.context);
        }
    }
}

/// Heap ordering is reversed so `BinaryHeap` (a max-heap) behaves as a
/// min-heap over `deadline`; `seq` breaks ties in insertion order.
impl<C> PartialEq for Task<C> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<C> Eq for Task<C> {}
impl<C> PartialOrd for Task<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<C> Ord for Task<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Two min-heaps of deadline-ordered tasks, one per [`Priority`] band.
///
/// `context` (`C`) is caller-chosen state threaded through every task's
/// action and finalizer (in this crate, effectively `&mut Page`-shaped data
/// passed by value per task alongside its `{context, action_fn}` pair).
pub struct Scheduler<C> {
    high: BinaryHeap<Task<C>>,
    low: BinaryHeap<Task<C>>,
    next_seq: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            high: BinaryHeap::new(),
            low: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    /// Enqueues a one-shot task to run as soon as possible.
    pub fn schedule_once(
        &mut self,
        priority: Priority,
        context: C,
        action: impl FnMut(&mut C) -> TaskOutcome + 'static,
    ) {
        self.schedule_after(priority, context, 0, action, None);
    }

    /// Enqueues a task to run after `delay_ms` milliseconds, with an
    /// optional finalizer invoked exactly once: either when the task is
    /// dropped after running (if it does not repeat) or during [`Scheduler`]
    /// teardown.
    pub fn schedule_after(
        &mut self,
        priority: Priority,
        context: C,
        delay_ms: u64,
        action: impl FnMut(&mut C) -> TaskOutcome + 'static,
        finalize: Option<impl FnOnce(&mut C) + 'static>,
    ) {
        let seq = self.next_seq();
        let task = Task {
            deadline: Instant::now() + Duration::from_millis(delay_ms),
            seq,
            context,
            action: Box::new(action),
            finalize: finalize.map(|f| Box::new(f) as Finalizer<C>),
        };
        match priority {
            Priority::High => self.high.push(task),
            Priority::Low => self.low.push(task),
        }
    }

    fn drain_due(heap: &mut BinaryHeap<Task<C>>, repeats: &mut Vec<Task<C>>, now: Instant) {
        while let Some(top) = heap.peek() {
            if top.deadline > now {
                break;
            }
            let mut task = heap.pop().expect("peeked Some");
            match (task.action)(&mut task.context) {
                TaskOutcome::Done => {
                    task.run_finalizer();
                }
                TaskOutcome::Repeat(delay_ms) => {
                    debug_assert!(delay_ms > 0, "repeat delay must be > 0");
                    task.deadline = now + Duration::from_millis(delay_ms.max(1));
                    repeats.push(task);
                }
            }
        }
    }

    /// Drains the LOW heap of all due tasks, then the HIGH heap, running
    /// each task's action. Repeating tasks are re-inserted into the LOW
    /// heap regardless of which heap they ran from. Returns the earliest
    /// remaining HIGH deadline, if any, so the driver knows how long it may
    /// safely sleep before the next required wake-up.
    pub fn run(&mut self) -> Option<Instant> {
        let now = Instant::now();
        let mut repeats = Vec::new();

        Self::drain_due(&mut self.low, &mut repeats, now);
        Self::drain_due(&mut self.high, &mut repeats, now);

        for task in repeats {
            self.low.push(task);
        }

        self.high.peek().map(|t| t.deadline)
    }

    /// True if there are no pending tasks in either band.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }
}

impl<C> Drop for Scheduler<C> {
    fn drop(&mut self) {
        for task in self.high.drain() {
            task.run_finalizer();
        }
        for task in self.low.drain() {
            task.run_finalizer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread::sleep;

    #[test]
    fn runs_in_deadline_order_across_priorities() {
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let mut sched: Scheduler<Rc<RefCell<Vec<&'static str>>>> = Scheduler::new();

        let log_a = log.clone();
        sched.schedule_after(Priority::High, log_a, 3, |l| {
            l.borrow_mut().push("A");
            TaskOutcome::Done
        }, None::<fn(&mut Rc<RefCell<Vec<&'static str>>>)>);

        let log_b = log.clone();
        sched.schedule_after(Priority::High, log_b, 2, |l| {
            l.borrow_mut().push("B");
            TaskOutcome::Done
        }, None::<fn(&mut Rc<RefCell<Vec<&'static str>>>)>);

        sleep(Duration::from_millis(5));
        sched.run();

        assert_eq!(*log.borrow(), vec!["B", "A"]);
    }

    #[test]
    fn repeat_is_requeued_into_low_band() {
        let count = Rc::new(RefCell::new(0u32));
        let mut sched: Scheduler<Rc<RefCell<u32>>> = Scheduler::new();

        let c = count.clone();
        sched.schedule_once(Priority::High, c, |c| {
            let mut v = c.borrow_mut();
            *v += 1;
            if *v < 3 {
                TaskOutcome::Repeat(1)
            } else {
                TaskOutcome::Done
            }
        });

        for _ in 0..3 {
            sleep(Duration::from_millis(2));
            sched.run();
        }
        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn teardown_invokes_every_finalizer_exactly_once() {
        let finalized = Rc::new(RefCell::new(0u32));
        {
            let mut sched: Scheduler<Rc<RefCell<u32>>> = Scheduler::new();
            for _ in 0..3 {
                let f = finalized.clone();
                sched.schedule_after(
                    Priority::Low,
                    finalized.clone(),
                    60_000,
                    |_| TaskOutcome::Done,
                    Some(move |_: &mut Rc<RefCell<u32>>| {
                        *f.borrow_mut() += 1;
                    }),
                );
            }
        }
        assert_eq!(*finalized.borrow(), 3);
    }

    #[test]
    fn run_returns_earliest_high_deadline() {
        let mut sched: Scheduler<()> = Scheduler::new();
        sched.schedule_after(Priority::High, (), 50, |_| TaskOutcome::Done, None::<fn(&mut ())>);
        let next = sched.run();
        assert!(next.is_some());
        assert!(next.unwrap() > Instant::now());
    }
}
