//! # Reactor: the event loop pumped by every executor thread.
//!
//! One [`Reactor`] is shared by the calling thread of `Executor::run` and all
//! worker threads. Each of them calls [`Reactor::run`], which pops ready jobs
//! and runs them until the loop is stopped or runs out of work.
//!
//! ## Architecture
//! ```text
//! post(job) ─────────────────────────────┐
//! Timer::async_wait(job) ─► deadlines ───┼─► ready queue ─► run() on N+1 threads
//! deliver_signal(n) ─► signal waiters ───┘        (promote due timers first)
//! ```
//!
//! ## Outstanding work
//! A job counts as outstanding from the moment it is queued (or armed, or
//! waiting for a signal) until it has finished running. When the count drops
//! to zero every pump returns and the loop becomes stopped, like an idle
//! `io_context`.
//!
//! ## Rules
//! - `stop()` is sticky until `restart()`; queued work survives a stop.
//! - Jobs run without the reactor lock held, so they may post, arm timers or
//!   stop the loop freely.
//! - Cancelled timer waits are discarded (their jobs are dropped, not run).
//! - A job returning `Err` ends the pump that ran it with that error.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::TaskError;
use crate::sync::lock;

/// A unit of work queued on the reactor.
pub(crate) type Job = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// A one-shot signal handler.
pub(crate) type SignalJob = Box<dyn FnOnce(i32) + Send + 'static>;

/// Identity of a [`Timer`] inside its reactor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(u64);

/// A job waiting for its timer to expire.
struct PendingWait {
    timer: TimerId,
    job: Job,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Job>,
    /// Min-heap of `(deadline, seq)`; entries whose `seq` left `waits` are stale.
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    waits: HashMap<u64, PendingWait>,
    signal_waiters: VecDeque<SignalJob>,
    queued_signals: VecDeque<i32>,
    outstanding: usize,
    stopped: bool,
    next_seq: u64,
}

impl State {
    /// Moves every wait whose deadline passed into the ready queue.
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((at, seq))) = self.deadlines.peek().copied() {
            if at > now {
                break;
            }
            self.deadlines.pop();
            if let Some(wait) = self.waits.remove(&seq) {
                self.ready.push_back(wait.job);
            }
        }
    }

    /// Earliest live deadline, discarding stale heap entries on the way.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, seq))) = self.deadlines.peek().copied() {
            if self.waits.contains_key(&seq) {
                return Some(at);
            }
            self.deadlines.pop();
        }
        None
    }
}

/// Multi-threaded event loop with timers and signal waits.
#[derive(Default)]
pub(crate) struct Reactor {
    state: Mutex<State>,
    wakeup: Condvar,
    next_timer: AtomicU64,
}

/// Marks one outstanding job finished when dropped, including on unwind.
struct Completion<'a>(&'a Reactor);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.0.state);
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding == 0 {
            self.0.wakeup.notify_all();
        }
    }
}

impl Reactor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues `job` to run once on any pump thread.
    pub(crate) fn post(&self, job: Job) {
        let mut state = lock(&self.state);
        state.ready.push_back(job);
        state.outstanding += 1;
        drop(state);
        self.wakeup.notify_one();
    }

    /// Pumps jobs until the loop is stopped or out of work.
    ///
    /// Returns the error of the first failing job run by this thread; other
    /// pumps keep going until someone stops the loop.
    pub(crate) fn run(&self) -> Result<(), TaskError> {
        while let Some(job) = self.next_job() {
            let _done = Completion(self);
            job()?;
        }
        Ok(())
    }

    fn next_job(&self) -> Option<Job> {
        let mut state = lock(&self.state);
        loop {
            if state.stopped {
                return None;
            }
            if state.outstanding == 0 {
                state.stopped = true;
                self.wakeup.notify_all();
                return None;
            }

            let now = Instant::now();
            state.promote_due(now);
            if let Some(job) = state.ready.pop_front() {
                if !state.ready.is_empty() {
                    self.wakeup.notify_one();
                }
                return Some(job);
            }

            let next = state.next_deadline();
            state = match next {
                Some(at) => self.wait_timeout(state, at.saturating_duration_since(now)),
                None => self
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn wait_timeout<'a>(
        &self,
        state: MutexGuard<'a, State>,
        timeout: Duration,
    ) -> MutexGuard<'a, State> {
        match self.wakeup.wait_timeout(state, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Requests every pump to return as soon as its current job finishes.
    pub(crate) fn stop(&self) {
        lock(&self.state).stopped = true;
        self.wakeup.notify_all();
    }

    /// Clears the stopped state so the loop can be run again.
    pub(crate) fn restart(&self) {
        lock(&self.state).stopped = false;
    }

    pub(crate) fn stopped(&self) -> bool {
        lock(&self.state).stopped
    }

    /// Jobs queued, running, armed on timers or waiting for signals.
    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        lock(&self.state).outstanding
    }

    fn new_timer_id(&self) -> TimerId {
        TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed))
    }

    fn schedule(&self, timer: TimerId, at: Instant, job: Job) {
        let mut state = lock(&self.state);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.deadlines.push(Reverse((at, seq)));
        state.waits.insert(seq, PendingWait { timer, job });
        state.outstanding += 1;
        drop(state);
        self.wakeup.notify_one();
    }

    fn cancel(&self, timer: TimerId) -> usize {
        let removed: Vec<PendingWait> = {
            let mut state = lock(&self.state);
            let seqs: Vec<u64> = state
                .waits
                .iter()
                .filter(|(_, wait)| wait.timer == timer)
                .map(|(seq, _)| *seq)
                .collect();
            let removed: Vec<PendingWait> = seqs
                .iter()
                .filter_map(|seq| state.waits.remove(seq))
                .collect();
            state.outstanding = state.outstanding.saturating_sub(removed.len());
            if state.outstanding == 0 {
                self.wakeup.notify_all();
            }
            removed
        };
        // Dropped outside the lock: captured state may call back into us.
        removed.len()
    }

    fn pending(&self, timer: TimerId) -> usize {
        lock(&self.state)
            .waits
            .values()
            .filter(|wait| wait.timer == timer)
            .count()
    }

    /// Waits for the next delivered signal; one delivery consumes the handler.
    pub(crate) fn add_signal_waiter(&self, handler: SignalJob) {
        let mut state = lock(&self.state);
        state.outstanding += 1;
        match state.queued_signals.pop_front() {
            Some(signal) => {
                state.ready.push_back(Box::new(move || {
                    handler(signal);
                    Ok(())
                }));
                drop(state);
                self.wakeup.notify_one();
            }
            None => state.signal_waiters.push_back(handler),
        }
    }

    /// Completes every waiting signal handler with `signal`, or queues the
    /// notification when nobody is waiting.
    pub(crate) fn deliver_signal(&self, signal: i32) {
        let mut state = lock(&self.state);
        if state.signal_waiters.is_empty() {
            state.queued_signals.push_back(signal);
            return;
        }
        while let Some(handler) = state.signal_waiters.pop_front() {
            state.ready.push_back(Box::new(move || {
                handler(signal);
                Ok(())
            }));
        }
        drop(state);
        self.wakeup.notify_all();
    }

    /// Drops signal notifications nobody consumed.
    pub(crate) fn clear_signals(&self) {
        lock(&self.state).queued_signals.clear();
    }
}

/// Stand-in expiry for delays that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// A cancellable monotonic timer bound to a reactor.
///
/// The expiry is either a known instant or unknown; an unknown expiry makes
/// the next wait complete immediately. Dropping the timer cancels its waits.
pub(crate) struct Timer {
    reactor: Arc<Reactor>,
    id: TimerId,
    expiry: Option<Instant>,
}

impl Timer {
    pub(crate) fn new(reactor: Arc<Reactor>) -> Self {
        let id = reactor.new_timer_id();
        Self {
            reactor,
            id,
            expiry: Some(Instant::now()),
        }
    }

    /// Current expiry; `None` when unknown.
    pub(crate) fn expiry(&self) -> Option<Instant> {
        self.expiry
    }

    /// Sets the expiry to `delay` from now; returns how many waits were cancelled.
    pub(crate) fn expires_after(&mut self, delay: Duration) -> usize {
        let cancelled = self.cancel();
        let now = Instant::now();
        self.expiry = Some(now.checked_add(delay).unwrap_or(now + FAR_FUTURE));
        cancelled
    }

    /// Makes the expiry unknown (fires immediately); returns how many waits were cancelled.
    pub(crate) fn expire_now(&mut self) -> usize {
        let cancelled = self.cancel();
        self.expiry = None;
        cancelled
    }

    /// Arms one completion at the current expiry.
    pub(crate) fn async_wait(&self, job: Job) {
        let at = self.expiry.unwrap_or_else(Instant::now);
        self.reactor.schedule(self.id, at, job);
    }

    /// Discards pending waits; returns how many there were.
    pub(crate) fn cancel(&self) -> usize {
        self.reactor.cancel(self.id)
    }

    /// Number of armed completions.
    pub(crate) fn pending(&self) -> usize {
        self.reactor.pending(self.id)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.reactor.cancel(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counter_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn runs_posted_jobs_then_stops_when_idle() {
        let reactor = Reactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        reactor.post(counter_job(&counter));
        reactor.post(counter_job(&counter));

        assert!(reactor.run().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(reactor.outstanding(), 0);
        assert!(reactor.stopped());
    }

    #[test]
    fn stopped_loop_keeps_work_until_restart() {
        let reactor = Reactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        reactor.stop();
        reactor.post(counter_job(&counter));

        assert!(reactor.run().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        reactor.restart();
        assert!(reactor.run().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn job_error_ends_the_pump_and_counts_as_done() {
        let reactor = Reactor::new();
        reactor.post(Box::new(|| Err(TaskError::fail("boom"))));

        assert_eq!(reactor.run(), Err(TaskError::fail("boom")));
        assert_eq!(reactor.outstanding(), 0);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let reactor = Arc::new(Reactor::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut late = Timer::new(Arc::clone(&reactor));
        let mut early = Timer::new(Arc::clone(&reactor));
        late.expires_after(Duration::from_millis(20));
        early.expires_after(Duration::from_millis(5));
        for (timer, tag) in [(&late, "late"), (&early, "early")] {
            let order = Arc::clone(&order);
            timer.async_wait(Box::new(move || {
                order.lock().unwrap().push(tag);
                Ok(())
            }));
        }

        let started = Instant::now();
        assert!(reactor.run().is_ok());
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn cancel_discards_waits_and_releases_work() {
        let reactor = Arc::new(Reactor::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut timer = Timer::new(Arc::clone(&reactor));
        timer.expires_after(Duration::from_secs(3600));
        timer.async_wait(counter_job(&counter));
        assert_eq!(timer.pending(), 1);
        assert_eq!(reactor.outstanding(), 1);

        assert_eq!(timer.expires_after(Duration::from_secs(3600)), 1);
        assert_eq!(timer.pending(), 0);
        assert_eq!(reactor.outstanding(), 0);

        timer.async_wait(counter_job(&counter));
        drop(timer);
        assert_eq!(reactor.outstanding(), 0);
        assert!(reactor.run().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn expire_now_fires_immediately() {
        let reactor = Arc::new(Reactor::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut timer = Timer::new(Arc::clone(&reactor));
        timer.expires_after(Duration::from_secs(3600));
        timer.async_wait(counter_job(&counter));

        assert_eq!(timer.expire_now(), 1);
        assert_eq!(timer.expiry(), None);
        timer.async_wait(counter_job(&counter));

        let started = Instant::now();
        assert!(reactor.run().is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_wakes_idle_pumps() {
        let reactor = Arc::new(Reactor::new());
        let mut timer = Timer::new(Arc::clone(&reactor));
        timer.expires_after(Duration::from_secs(3600));
        timer.async_wait(Box::new(|| Ok(())));

        let pumps: Vec<_> = (0..3)
            .map(|_| {
                let reactor = Arc::clone(&reactor);
                thread::spawn(move || reactor.run())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        reactor.stop();
        for pump in pumps {
            assert!(pump.join().unwrap().is_ok());
        }
        assert!(reactor.stopped());
        assert_eq!(timer.pending(), 1);
    }

    #[test]
    fn queued_signal_completes_the_next_waiter() {
        let reactor = Reactor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        reactor.deliver_signal(15);
        let sink = Arc::clone(&seen);
        reactor.add_signal_waiter(Box::new(move |n| sink.lock().unwrap().push(n)));
        assert!(reactor.run().is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![15]);
    }

    #[test]
    fn signal_waiter_is_outstanding_work_until_delivery() {
        let reactor = Arc::new(Reactor::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        reactor.add_signal_waiter(Box::new(move |n| {
            sink.store(n as usize, Ordering::SeqCst);
        }));
        assert_eq!(reactor.outstanding(), 1);

        let pump = {
            let reactor = Arc::clone(&reactor);
            thread::spawn(move || reactor.run())
        };
        thread::sleep(Duration::from_millis(10));
        reactor.deliver_signal(2);
        assert!(pump.join().unwrap().is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
