use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use super::{TimeSource, TimerCallback, TimerId};
use crate::Result;

/// Manually advanced clock for deterministic tests and offline simulation.
///
/// Callbacks run on the thread that calls [`VirtualTimeSource::advance`], in
/// deadline order, with the clock set to each callback's deadline while it
/// runs.
#[derive(Default)]
pub struct VirtualTimeSource {
    inner: Mutex<VirtualQueue>,
}

#[derive(Default)]
struct VirtualQueue {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<(Duration, TimerId), TimerCallback>,
    peak_pending: usize,
}

impl VirtualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`, firing every callback whose deadline
    /// falls inside the window, including ones scheduled by earlier callbacks
    /// in the same window. Returns how many callbacks fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now.saturating_add(by);
        let mut fired = 0;

        loop {
            let callback = {
                let mut queue = self.lock();
                let due = queue
                    .timers
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        queue.now = key.0;
                        queue.timers.remove(&key)
                    }
                    None => {
                        queue.now = target;
                        break;
                    }
                }
            };

            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }

        fired
    }

    pub fn advance_ms(&self, millis: u64) -> usize {
        self.advance(Duration::from_millis(millis))
    }

    /// Deadline of the next pending callback, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.lock().timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Largest number of callbacks that were ever pending at once.
    pub fn peak_pending(&self) -> usize {
        self.lock().peak_pending
    }

    fn lock(&self) -> MutexGuard<'_, VirtualQueue> {
        // Callbacks never run under this lock, so a poisoned queue is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeSource for VirtualTimeSource {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId> {
        let mut queue = self.lock();
        let id = TimerId::new(queue.next_id);
        queue.next_id += 1;
        let deadline = queue.now.saturating_add(delay);
        queue.timers.insert((deadline, id), callback);
        queue.peak_pending = queue.peak_pending.max(queue.timers.len());
        Ok(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let removed = {
            let mut queue = self.lock();
            let key = queue.timers.keys().find(|(_, timer)| *timer == id).copied();
            key.and_then(|key| queue.timers.remove(&key))
        };
        removed.is_some()
    }

    fn pending(&self) -> usize {
        self.lock().timers.len()
    }
}

impl std::fmt::Debug for VirtualTimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.lock();
        f.debug_struct("VirtualTimeSource")
            .field("now", &queue.now)
            .field("pending", &queue.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> TimerCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| -> TimerCallback {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[test]
    fn fires_in_deadline_order_only_once_due() {
        let source = VirtualTimeSource::new();
        let (log, make) = recorder();
        source.schedule(Duration::from_millis(30), make("late")).unwrap();
        source.schedule(Duration::from_millis(10), make("early")).unwrap();

        assert_eq!(source.advance_ms(9), 0);
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(source.advance_ms(1), 1);
        assert_eq!(source.advance_ms(25), 1);
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
        assert_eq!(source.now(), Duration::from_millis(35));
    }

    #[test]
    fn cancelled_callbacks_never_fire() {
        let source = VirtualTimeSource::new();
        let (log, make) = recorder();
        let id = source.schedule(Duration::from_millis(5), make("gone")).unwrap();

        assert!(source.cancel(id));
        assert!(!source.cancel(id));
        assert_eq!(source.advance_ms(100), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn runs_callbacks_chained_inside_the_window() {
        let source = Arc::new(VirtualTimeSource::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let chained_source = source.clone();
        let chained_seen = seen.clone();
        source
            .schedule(
                Duration::from_millis(10),
                Box::new(move || {
                    chained_seen.lock().unwrap().push(chained_source.now());
                    let inner_seen = chained_seen.clone();
                    let inner_source = chained_source.clone();
                    chained_source
                        .schedule(
                            Duration::from_millis(10),
                            Box::new(move || inner_seen.lock().unwrap().push(inner_source.now())),
                        )
                        .unwrap();
                }),
            )
            .unwrap();

        assert_eq!(source.advance_ms(25), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(source.peak_pending(), 1);
    }
}
