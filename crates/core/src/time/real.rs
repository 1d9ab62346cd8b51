use std::{
    collections::BTreeMap,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::{TimeSource, TimerCallback, TimerId};
use crate::{Result, RotatorError};

/// Wall-clock scheduler backed by a single timer thread.
///
/// Callbacks run one at a time on the timer thread, so callbacks scheduled on
/// the same source never overlap. Dropping the source stops the thread and
/// discards anything still pending.
pub struct RealTimeSource {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    epoch: Instant,
    queue: Mutex<Queue>,
    wake: Condvar,
}

#[derive(Default)]
struct Queue {
    next_id: u64,
    timers: BTreeMap<(Instant, TimerId), TimerCallback>,
    shutdown: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RealTimeSource {
    /// Spawns the timer thread. Fails if the host cannot start one.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            epoch: Instant::now(),
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("word-rotator-timer".to_string())
            .spawn(move || run_timers(&worker_shared))
            .map_err(|err| {
                RotatorError::TimeSourceUnavailable(format!("failed to spawn timer thread: {err}"))
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }
}

fn run_timers(shared: &Shared) {
    let mut queue = shared.lock();
    loop {
        if queue.shutdown {
            break;
        }

        let now = Instant::now();
        match queue.timers.keys().next().copied() {
            None => {
                queue = shared.wake.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
            Some(key) if key.0 <= now => {
                let callback = queue.timers.remove(&key);
                drop(queue);
                if let Some(callback) = callback {
                    callback();
                }
                queue = shared.lock();
            }
            Some((deadline, _)) => {
                let (guard, _) = shared
                    .wake
                    .wait_timeout(queue, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                queue = guard;
            }
        }
    }
    tracing::debug!(dropped = queue.timers.len(), "timer thread shutting down");
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Duration {
        self.shared.epoch.elapsed()
    }

    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId> {
        if !self.worker_alive() {
            return Err(RotatorError::TimeSourceUnavailable(
                "timer thread is not running".to_string(),
            ));
        }

        let deadline = Instant::now() + delay;
        let mut queue = self.shared.lock();
        if queue.shutdown {
            return Err(RotatorError::TimeSourceUnavailable(
                "timer thread is shutting down".to_string(),
            ));
        }
        let id = TimerId::new(queue.next_id);
        queue.next_id += 1;
        queue.timers.insert((deadline, id), callback);
        drop(queue);

        self.shared.wake.notify_one();
        Ok(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        // The removed callback is dropped after the lock is released.
        let removed = {
            let mut queue = self.shared.lock();
            let key = queue.timers.keys().find(|(_, timer)| *timer == id).copied();
            key.and_then(|key| queue.timers.remove(&key))
        };
        removed.is_some()
    }

    fn pending(&self) -> usize {
        self.shared.lock().timers.len()
    }
}

impl Drop for RealTimeSource {
    fn drop(&mut self) {
        let dropped = {
            let mut queue = self.shared.lock();
            queue.shutdown = true;
            std::mem::take(&mut queue.timers)
        };
        self.shared.wake.notify_all();
        // Pending callbacks may own the last handle to this source; drop them
        // outside the queue lock.
        drop(dropped);

        if let Some(worker) = self.worker.take() {
            // The last owner can be a callback running on the timer thread itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for RealTimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeSource")
            .field("pending", &self.pending())
            .field("alive", &self.worker_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn fires_after_the_requested_delay() {
        let source = RealTimeSource::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();

        source
            .schedule(
                Duration::from_millis(20),
                Box::new(move || {
                    let _ = tx.send(Instant::now());
                }),
            )
            .unwrap();

        let fired_at = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("timer should fire");
        assert!(fired_at.duration_since(started) >= Duration::from_millis(20));
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let source = RealTimeSource::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();

        let id = source
            .schedule(
                Duration::from_millis(50),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();

        assert!(source.cancel(id));
        assert_eq!(source.pending(), 0);
        // The sender was dropped with the callback, so the channel disconnects.
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(200)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn earlier_deadline_wakes_a_sleeping_worker() {
        let source = RealTimeSource::new().unwrap();
        let (tx, rx) = mpsc::channel();

        let slow = tx.clone();
        source
            .schedule(
                Duration::from_secs(30),
                Box::new(move || {
                    let _ = slow.send("slow");
                }),
            )
            .unwrap();
        source
            .schedule(
                Duration::from_millis(10),
                Box::new(move || {
                    let _ = tx.send("fast");
                }),
            )
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("fast"));
        assert_eq!(source.pending(), 1);
    }
}
