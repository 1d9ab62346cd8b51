use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    thread::{self, ThreadId},
    time::Duration,
};

use crate::{
    time::{TimeSource, TimerId},
    AnimationPhase, Result, RotatorError,
};

/// Lengths of the three phase windows that make up one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    pub visible: Duration,
    pub exiting: Duration,
    pub entering: Duration,
}

impl PhaseTimings {
    /// Builds timings from explicit windows. Every window must be non-zero.
    pub fn new(visible: Duration, exiting: Duration, entering: Duration) -> Result<Self> {
        if visible.is_zero() || exiting.is_zero() || entering.is_zero() {
            return Err(RotatorError::InvalidTiming(format!(
                "phase windows must be non-zero (visible {visible:?}, exiting {exiting:?}, entering {entering:?})"
            )));
        }
        Ok(Self {
            visible,
            exiting,
            entering,
        })
    }

    /// How long `phase` lasts before the next boundary.
    pub fn duration_of(&self, phase: AnimationPhase) -> Duration {
        match phase {
            AnimationPhase::Visible => self.visible,
            AnimationPhase::Exiting => self.exiting,
            AnimationPhase::Entering => self.entering,
        }
    }

    pub fn cycle(&self) -> Duration {
        self.visible + self.exiting + self.entering
    }
}

type BoundaryFn = Box<dyn FnMut(AnimationPhase) + Send + 'static>;

/// Drives the Visible → Exiting → Entering cycle with a chain of single-shot
/// timers. Each boundary schedules the next one, so at most one timer per
/// running clock is ever outstanding.
pub struct PhaseClock {
    source: Arc<dyn TimeSource>,
    timings: PhaseTimings,
}

struct ChainStatus {
    phase: AnimationPhase,
    pending: Option<TimerId>,
    /// Thread currently inside `on_boundary`, if any.
    firing_on: Option<ThreadId>,
}

struct Chain {
    source: Arc<dyn TimeSource>,
    timings: PhaseTimings,
    cancelled: AtomicBool,
    // Never held while `on_boundary` runs.
    status: Mutex<ChainStatus>,
    // Held for a whole boundary; `cancel` takes it to wait out a running callback.
    on_boundary: Mutex<BoundaryFn>,
}

impl Chain {
    // Boundary panics are caught before they unwind through either guard, so
    // neither lock can be left half-written.
    fn status(&self) -> MutexGuard<'_, ChainStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback(&self) -> MutexGuard<'_, BoundaryFn> {
        self.on_boundary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl PhaseClock {
    /// Creates a clock that schedules on `source` using `timings`. Nothing
    /// runs until [`PhaseClock::start`].
    pub fn new(source: Arc<dyn TimeSource>, timings: PhaseTimings) -> Self {
        Self { source, timings }
    }

    /// Window lengths this clock was built with.
    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    /// Starts a new chain in the `Visible` phase. `on_boundary` receives each
    /// phase as it begins; the initial `Visible` is not reported.
    ///
    /// `on_boundary` may cancel its own chain. A panic inside it stops the
    /// chain instead of leaving it stuck.
    pub fn start<F>(&self, on_boundary: F) -> Result<CancelHandle>
    where
        F: FnMut(AnimationPhase) + Send + 'static,
    {
        let chain = Arc::new(Chain {
            source: self.source.clone(),
            timings: self.timings,
            cancelled: AtomicBool::new(false),
            status: Mutex::new(ChainStatus {
                phase: AnimationPhase::Visible,
                pending: None,
                firing_on: None,
            }),
            on_boundary: Mutex::new(Box::new(on_boundary)),
        });

        arm(&chain, AnimationPhase::Visible)?;
        Ok(CancelHandle { chain })
    }

    /// Stops the chain behind `handle`. Same as [`CancelHandle::cancel`].
    pub fn cancel(&self, handle: &CancelHandle) {
        handle.cancel();
    }
}

/// Schedules the boundary that ends `phase`.
fn arm(chain: &Arc<Chain>, phase: AnimationPhase) -> Result<()> {
    let delay = chain.timings.duration_of(phase);
    let weak = Arc::downgrade(chain);
    let id = chain
        .source
        .schedule(delay, Box::new(move || fire(&weak)))?;
    chain.status().pending = Some(id);
    Ok(())
}

fn fire(weak: &Weak<Chain>) {
    let Some(chain) = weak.upgrade() else {
        return;
    };

    let mut on_boundary = chain.callback();
    if chain.is_cancelled() {
        return;
    }

    let phase = {
        let mut status = chain.status();
        status.pending = None;
        status.phase = status.phase.next();
        status.firing_on = Some(thread::current().id());
        status.phase
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*on_boundary)(phase)));
    chain.status().firing_on = None;

    if outcome.is_err() {
        tracing::error!(%phase, "phase boundary callback panicked; stopping");
        chain.cancelled.store(true, Ordering::SeqCst);
        return;
    }
    // Cancelled from inside the callback.
    if chain.is_cancelled() {
        return;
    }

    if let Err(err) = arm(&chain, phase) {
        tracing::error!(%err, %phase, "failed to schedule next phase boundary; stopping");
        chain.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Owner of a running phase chain. Dropping the handle cancels the chain.
pub struct CancelHandle {
    chain: Arc<Chain>,
}

impl CancelHandle {
    /// Stops the chain. Once this returns no further boundary callbacks run.
    /// Calling it again is a no-op, and it is safe to call from inside the
    /// chain's own boundary callback.
    pub fn cancel(&self) {
        if self.chain.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.chain.status().firing_on == Some(thread::current().id()) {
            // `fire` sees the flag once the callback returns and skips re-arming.
            return;
        }

        // Wait out a boundary running on another thread; it re-checks the flag
        // before re-arming, and anything it armed is taken below.
        let _boundary = self.chain.callback();
        let pending = self.chain.status().pending.take();
        if let Some(id) = pending {
            self.chain.source.cancel(id);
        }
    }

    /// Whether the chain has stopped, either through [`CancelHandle::cancel`]
    /// or because a boundary could not be handled.
    pub fn is_cancelled(&self) -> bool {
        self.chain.is_cancelled()
    }

    /// Phase the chain is currently in.
    pub fn phase(&self) -> AnimationPhase {
        self.chain.status().phase
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("phase", &self.phase())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::VirtualTimeSource;

    fn default_timings() -> PhaseTimings {
        PhaseTimings::new(
            Duration::from_millis(2400),
            Duration::from_millis(300),
            Duration::from_millis(300),
        )
        .unwrap()
    }

    fn recording_clock() -> (
        Arc<VirtualTimeSource>,
        PhaseClock,
        Arc<Mutex<Vec<(Duration, AnimationPhase)>>>,
    ) {
        let source = Arc::new(VirtualTimeSource::new());
        let clock = PhaseClock::new(source.clone(), default_timings());
        let log = Arc::new(Mutex::new(Vec::new()));
        (source, clock, log)
    }

    #[test]
    fn reports_boundaries_at_window_edges() {
        let (source, clock, log) = recording_clock();
        let sink = log.clone();
        let observed = source.clone();
        let _handle = clock
            .start(move |phase| sink.lock().unwrap().push((observed.now(), phase)))
            .unwrap();

        source.advance_ms(6000);

        let ms = Duration::from_millis;
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (ms(2400), AnimationPhase::Exiting),
                (ms(2700), AnimationPhase::Entering),
                (ms(3000), AnimationPhase::Visible),
                (ms(5400), AnimationPhase::Exiting),
                (ms(5700), AnimationPhase::Entering),
                (ms(6000), AnimationPhase::Visible),
            ]
        );
    }

    #[test]
    fn keeps_a_single_outstanding_timer() {
        let (source, clock, _log) = recording_clock();
        let handle = clock.start(|_| {}).unwrap();

        for _ in 0..30 {
            assert_eq!(source.pending(), 1);
            source.advance_ms(100);
        }
        assert_eq!(source.peak_pending(), 1);

        handle.cancel();
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn cancel_stops_callbacks_and_is_idempotent() {
        let (source, clock, log) = recording_clock();
        let sink = log.clone();
        let handle = clock
            .start(move |phase| sink.lock().unwrap().push((Duration::ZERO, phase)))
            .unwrap();

        source.advance_ms(2500);
        clock.cancel(&handle);
        handle.cancel();
        source.advance_ms(10_000);

        assert!(handle.is_cancelled());
        assert_eq!(handle.phase(), AnimationPhase::Exiting);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn callback_can_cancel_its_own_chain() {
        let (source, clock, _log) = recording_clock();
        let slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_phase = Arc::new(Mutex::new(None));

        let inner_slot = slot.clone();
        let inner_calls = calls.clone();
        let inner_phase = seen_phase.clone();
        let handle = clock
            .start(move |_| {
                inner_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = inner_slot.lock().unwrap().as_ref() {
                    *inner_phase.lock().unwrap() = Some(handle.phase());
                    handle.cancel();
                    assert!(handle.is_cancelled());
                }
            })
            .unwrap();
        *slot.lock().unwrap() = Some(handle);

        source.advance_ms(2400);
        source.advance_ms(10_000);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_phase.lock().unwrap(), Some(AnimationPhase::Exiting));
        assert_eq!(source.pending(), 0);
        let handle = slot.lock().unwrap().take().unwrap();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn panicking_callback_stops_the_chain() {
        let (source, clock, _log) = recording_clock();
        let handle = clock.start(|_| panic!("renderer bug")).unwrap();

        assert_eq!(source.advance_ms(2400), 1);

        assert!(handle.is_cancelled());
        assert_eq!(source.pending(), 0);
        assert_eq!(source.advance_ms(10_000), 0);
        assert_eq!(handle.phase(), AnimationPhase::Exiting);
    }

    #[test]
    fn dropping_the_handle_cancels_the_chain() {
        let (source, clock, _log) = recording_clock();
        let handle = clock.start(|_| {}).unwrap();
        assert_eq!(source.pending(), 1);

        drop(handle);
        assert_eq!(source.pending(), 0);
    }

    #[test]
    fn rejects_zero_windows() {
        let err = PhaseTimings::new(
            Duration::ZERO,
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
        .unwrap_err();
        assert!(matches!(err, RotatorError::InvalidTiming(_)));
        assert_eq!(default_timings().cycle(), Duration::from_millis(3000));
    }
}
