use super::event::{Event, Readiness};
use super::poller::{Interest, Poller};
use super::timer::TimerEntry;
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Callback invoked when a watched descriptor becomes ready.
type WatchFn = Rc<dyn Fn(Readiness)>;

/// Callback invoked once when a timer expires.
type TimerFn = Box<dyn FnOnce()>;

/// Identifies a descriptor registration inside a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(Key);

/// Identifies an armed one-shot timer inside a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// A single-threaded readiness reactor.
///
/// The reactor owns an epoll instance, the set of descriptor watches and a
/// queue of one-shot timers. Every callback runs on the thread that drives
/// the reactor through [`turn`](Self::turn), [`run`](Self::run) or
/// [`run_for`](Self::run_for).
///
/// `Reactor` is a cheap handle: clones share the same loop. Callbacks are
/// invoked while no internal state is borrowed, so they may freely register,
/// unregister, arm and disarm.
#[derive(Clone)]
pub struct Reactor {
    core: Rc<RefCell<Core>>,
}

struct Core {
    /// Platform-specific poller.
    poller: Poller,

    /// Buffer used to collect I/O events from the poller.
    events: Vec<Event>,

    /// Active watches indexed by poller tokens.
    watches: Slab<Watch>,

    /// Min-heap of timer deadlines. Entries for disarmed timers linger
    /// until they reach the front.
    timers: BinaryHeap<TimerEntry>,

    /// Callbacks of armed timers.
    armed: HashMap<u64, TimerFn>,

    /// Next timer id.
    next_timer: u64,

    /// Set by [`Reactor::stop`], cleared when `run` returns.
    stopped: bool,
}

struct Watch {
    fd: RawFd,
    interest: Interest,
    handler: WatchFn,
}

impl Reactor {
    /// Creates a new reactor.
    pub fn new() -> io::Result<Self> {
        let core = Core {
            poller: Poller::new()?,
            events: Vec::with_capacity(64),
            watches: Slab::new(64),
            timers: BinaryHeap::new(),
            armed: HashMap::new(),
            next_timer: 0,
            stopped: false,
        };

        Ok(Self {
            core: Rc::new(RefCell::new(core)),
        })
    }

    /// Watches `fd` for the given readiness.
    ///
    /// A descriptor may only be registered once at a time; change what it
    /// is watched for with [`set_interest`](Self::set_interest).
    pub fn register<F>(&self, fd: RawFd, interest: Interest, handler: F) -> io::Result<WatchId>
    where
        F: Fn(Readiness) + 'static,
    {
        let mut core = self.core.borrow_mut();

        let key = core.watches.insert(Watch {
            fd,
            interest,
            handler: Rc::new(handler),
        });

        if let Err(e) = core.poller.register(fd, key.to_u64(), interest) {
            let rejected = core.watches.remove(key);
            drop(core);
            drop(rejected);
            return Err(e);
        }

        tracing::trace!(fd, ?interest, "watch registered");
        Ok(WatchId(key))
    }

    /// Watches `fd` for read readiness.
    pub fn register_readable<F>(&self, fd: RawFd, handler: F) -> io::Result<WatchId>
    where
        F: Fn(Readiness) + 'static,
    {
        self.register(fd, Interest::READABLE, handler)
    }

    /// Watches `fd` for write readiness.
    pub fn register_writable<F>(&self, fd: RawFd, handler: F) -> io::Result<WatchId>
    where
        F: Fn(Readiness) + 'static,
    {
        self.register(fd, Interest::WRITABLE, handler)
    }

    /// Changes the readiness a watch listens for.
    pub fn set_interest(&self, id: WatchId, interest: Interest) -> io::Result<()> {
        let mut core = self.core.borrow_mut();
        let core = &mut *core;

        let Some(watch) = core.watches.get_mut(id.0) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "watch is not registered",
            ));
        };

        if watch.interest == interest {
            return Ok(());
        }

        core.poller.reregister(watch.fd, id.0.to_u64(), interest)?;
        watch.interest = interest;

        Ok(())
    }

    /// Removes a watch. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: WatchId) {
        let removed = {
            let mut core = self.core.borrow_mut();
            let removed = core.watches.remove(id.0);

            if let Some(watch) = &removed {
                core.poller.deregister(watch.fd);
                tracing::trace!(fd = watch.fd, "watch removed");
            }

            removed
        };

        // The handler may own the last handle to something that calls back
        // into the reactor when dropped.
        drop(removed);
    }

    /// Arms a one-shot timer that runs `callback` after `delay`.
    pub fn arm_timer<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let mut core = self.core.borrow_mut();

        let id = core.next_timer;
        core.next_timer += 1;

        core.timers.push(TimerEntry {
            deadline: Instant::now() + delay,
            id,
        });
        core.armed.insert(id, Box::new(callback));

        TimerId(id)
    }

    /// Disarms a timer. Timers that already fired are ignored.
    pub fn disarm_timer(&self, id: TimerId) {
        let removed = self.core.borrow_mut().armed.remove(&id.0);
        drop(removed);
    }

    /// Whether the timer is still waiting to fire.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.core.borrow().armed.contains_key(&id.0)
    }

    /// Number of active watches.
    pub fn watch_count(&self) -> usize {
        self.core.borrow().watches.len()
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.core.borrow().armed.len()
    }

    /// Makes the current [`run`](Self::run) or [`run_for`](Self::run_for)
    /// return after the callback that called it.
    pub fn stop(&self) {
        self.core.borrow_mut().stopped = true;
    }

    /// Runs one iteration of the loop.
    ///
    /// Waits for readiness for at most `max_wait` (forever if `None`),
    /// bounded by the next timer deadline, then dispatches I/O callbacks
    /// followed by expired timers. Returns the number of callbacks run.
    pub fn turn(&self, max_wait: Option<Duration>) -> io::Result<usize> {
        let mut events = {
            let mut core = self.core.borrow_mut();
            let timeout = core.poll_timeout(max_wait);
            let mut events = mem::take(&mut core.events);

            core.poller.poll(&mut events, timeout)?;
            events
        };

        let mut dispatched = 0;

        for event in events.drain(..) {
            let target = {
                let core = self.core.borrow();
                core.watches
                    .get(Key::from_u64(event.token))
                    .map(|w| (w.handler.clone(), event.readiness(w.interest)))
            };

            // The watch may have been removed or narrowed by an earlier
            // callback of this turn.
            if let Some((handler, readiness)) = target {
                if !readiness.is_empty() {
                    handler(readiness);
                    dispatched += 1;
                }
            }
        }

        self.core.borrow_mut().events = events;

        let now = Instant::now();

        loop {
            let next = self.core.borrow_mut().pop_expired(now);
            let Some(callback) = next else {
                break;
            };

            callback();
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Runs the loop until nothing is registered or [`stop`](Self::stop)
    /// is called.
    pub fn run(&self) -> io::Result<()> {
        while !self.take_stopped() && self.has_work() {
            self.turn(None)?;
        }

        Ok(())
    }

    /// Runs the loop until `duration` has elapsed, nothing is registered,
    /// or [`stop`](Self::stop) is called.
    pub fn run_for(&self, duration: Duration) -> io::Result<()> {
        let deadline = Instant::now() + duration;

        while !self.take_stopped() && self.has_work() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            self.turn(Some(deadline - now))?;
        }

        Ok(())
    }

    fn has_work(&self) -> bool {
        let core = self.core.borrow();
        !core.watches.is_empty() || !core.armed.is_empty()
    }

    fn take_stopped(&self) -> bool {
        mem::take(&mut self.core.borrow_mut().stopped)
    }
}

impl Core {
    /// Computes how long the poller may block.
    fn poll_timeout(&mut self, max_wait: Option<Duration>) -> Option<Duration> {
        self.discard_disarmed();

        let until_timer = self
            .timers
            .peek()
            .map(|t| t.deadline.saturating_duration_since(Instant::now()));

        match (until_timer, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drops heap entries of disarmed timers sitting at the front.
    fn discard_disarmed(&mut self) {
        while let Some(top) = self.timers.peek() {
            if self.armed.contains_key(&top.id) {
                break;
            }
            self.timers.pop();
        }
    }

    /// Pops the next timer due at `now`, skipping disarmed ones.
    fn pop_expired(&mut self, now: Instant) -> Option<TimerFn> {
        loop {
            if self.timers.peek()?.deadline > now {
                return None;
            }

            let entry = self.timers.pop()?;

            if let Some(callback) = self.armed.remove(&entry.id) {
                return Some(callback);
            }
        }
    }
}
