//! Deferred calls, software timers and the dispatch loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::trace;
use parking_lot::Mutex;

/// Identifier of an armed timer, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

type Call = Box<dyn FnOnce() + Send>;
type TimerFn = Arc<Mutex<Box<dyn FnMut() + Send>>>;

struct Timer {
    id: u32,
    deadline: u64,
    period: Option<u64>,
    callback: TimerFn,
}

#[derive(Default)]
struct Inner {
    /// Virtual clock in milliseconds.
    now: u64,
    calls: VecDeque<Call>,
    timers: Vec<Timer>,
    next_id: u32,
    stop: bool,
}

/// Cooperative event queue.
///
/// Shared as `Arc<EventQueue>`; every entry point takes `&self` and the
/// internal lock is never held while a user callback runs, so handlers may
/// re-enter the queue API freely.
pub struct EventQueue {
    inner: Mutex<Inner>,
}

impl EventQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Enqueues a call behind all previously deferred calls.
    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.lock().calls.push_back(Box::new(f));
    }

    /// Arms a one-shot timer firing `delay_ms` after now.
    pub fn call_in<F>(&self, delay_ms: u64, f: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.arm(delay_ms, None, f)
    }

    /// Arms a periodic timer; the first fire is one full period from now.
    /// A zero period is clamped to one millisecond, the clock's resolution:
    /// a timer that is due again the instant it fires would starve every
    /// other handler on the queue.
    pub fn call_every<F>(&self, period_ms: u64, f: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let period_ms = period_ms.max(1);
        self.arm(period_ms, Some(period_ms), f)
    }

    /// Disarms a timer. Returns `false` if it was not armed.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.timers.len();
        inner.timers.retain(|t| t.id != id.0);
        inner.timers.len() != before
    }

    /// Number of deferred calls waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Runs at most one pending deferred call.
    pub fn dispatch_once(&self) -> bool {
        if let Some(call) = self.inner.lock().calls.pop_front() {
            call();
            true
        } else {
            false
        }
    }

    /// Moves the virtual clock forward by `ms`, draining deferred calls and
    /// firing due timers in deadline order.
    ///
    /// Intermediate deadlines are honored: a periodic timer with a 10 ms
    /// period fires ten times for `advance(100)`, and work enqueued by one
    /// fire is drained before any later deadline.
    pub fn advance(&self, ms: u64) {
        let target = self.inner.lock().now + ms;
        loop {
            self.drain_calls();
            let due = {
                let mut inner = self.inner.lock();
                match self.pop_due(&mut inner, target) {
                    Some(cb) => cb,
                    None => {
                        inner.now = target;
                        break;
                    }
                }
            };
            (*due.lock())();
        }
    }

    /// Requests `dispatch_forever` to return after the current handler.
    pub fn break_dispatch(&self) {
        self.inner.lock().stop = true;
    }

    /// Dispatches until [`EventQueue::break_dispatch`] is called, sleeping
    /// between deadlines and mapping real elapsed time onto the virtual
    /// clock.
    pub fn dispatch_forever(&self) {
        const IDLE_SLEEP: Duration = Duration::from_millis(10);

        let origin = Instant::now();
        let base = {
            let mut inner = self.inner.lock();
            inner.stop = false;
            inner.now
        };

        loop {
            let elapsed = origin.elapsed().as_millis() as u64;
            let now = base + elapsed;
            let behind = {
                let inner = self.inner.lock();
                now.saturating_sub(inner.now)
            };
            self.advance(behind);

            let mut inner = self.inner.lock();
            if inner.stop {
                inner.stop = false;
                return;
            }
            if !inner.calls.is_empty() {
                continue;
            }
            let sleep = match inner.timers.iter().map(|t| t.deadline).min() {
                Some(deadline) => {
                    Duration::from_millis(deadline.saturating_sub(inner.now)).min(IDLE_SLEEP)
                }
                None => IDLE_SLEEP,
            };
            drop(inner);
            std::thread::sleep(sleep);
        }
    }
}

impl EventQueue {
    fn arm<F>(&self, delay_ms: u64, period: Option<u64>, f: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let deadline = inner.now + delay_ms;
        inner.timers.push(Timer {
            id,
            deadline,
            period,
            callback: Arc::new(Mutex::new(Box::new(f) as Box<dyn FnMut() + Send>)),
        });
        trace!("armed timer {id} for t+{delay_ms}ms (period {period:?})");
        TimerId(id)
    }

    fn drain_calls(&self) {
        loop {
            let call = self.inner.lock().calls.pop_front();
            match call {
                Some(call) => call(),
                None => return,
            }
        }
    }

    /// Picks the earliest timer due at or before `horizon`, advances the
    /// clock to its deadline and re-arms or removes it. Returns its callback.
    fn pop_due(&self, inner: &mut Inner, horizon: u64) -> Option<TimerFn> {
        let idx = inner
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= horizon)
            .min_by_key(|(_, t)| t.deadline)
            .map(|(i, _)| i)?;

        inner.now = inner.timers[idx].deadline;
        match inner.timers[idx].period {
            Some(period) => {
                inner.timers[idx].deadline += period;
                Some(Arc::clone(&inner.timers[idx].callback))
            }
            None => Some(inner.timers.swap_remove(idx).callback),
        }
    }
}
