use std::{
    sync::{
        mpsc::{self, Receiver, SyncSender, TrySendError},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use serde::Serialize;

use crate::{
    clock::{CancelHandle, PhaseClock},
    time::TimeSource,
    AnimationPhase, Result, RotatorConfig, RotatorError, WordList,
};

/// Frames a subscriber may fall behind by before new ones are dropped for it.
pub const SUBSCRIBER_BACKLOG: usize = 32;

/// Snapshot of a running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationState {
    /// Always a valid index into the controller's word list.
    pub word_index: usize,
    pub phase: AnimationPhase,
    /// Source time at which the current cycle's `Visible` phase began. Only
    /// for diagnostics; phase changes are driven by the clock alone.
    pub cycle_start: Duration,
}

/// What a renderer needs to draw the rotating word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub word: String,
    pub phase: AnimationPhase,
}

struct Shared {
    words: WordList,
    source: Arc<dyn TimeSource>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: Option<AnimationState>,
    subscribers: Vec<SyncSender<Frame>>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| RotatorError::msg("rotator state has been poisoned"))
    }

    fn frame_for(&self, state: &AnimationState) -> Option<Frame> {
        self.words.get(state.word_index).map(|word| Frame {
            word: word.to_string(),
            phase: state.phase,
        })
    }

    fn on_boundary(&self, phase: AnimationPhase) {
        let now = self.source.now();
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(err) => {
                tracing::error!(%err, %phase, "dropping phase boundary");
                return;
            }
        };
        let Some(state) = inner.state.as_mut() else {
            return;
        };

        match phase {
            AnimationPhase::Exiting => state.phase = AnimationPhase::Exiting,
            AnimationPhase::Entering => {
                *state = AnimationState {
                    word_index: self.words.next_index(state.word_index),
                    phase: AnimationPhase::Entering,
                    ..*state
                };
            }
            AnimationPhase::Visible => {
                *state = AnimationState {
                    phase: AnimationPhase::Visible,
                    cycle_start: now,
                    ..*state
                };
            }
        }

        let snapshot = *state;
        tracing::debug!(
            word_index = snapshot.word_index,
            phase = %snapshot.phase,
            "phase boundary"
        );

        if let Some(frame) = self.frame_for(&snapshot) {
            inner
                .subscribers
                .retain(|subscriber| match subscriber.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!(phase = %frame.phase, "subscriber lagging; frame dropped");
                        true
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                });
        }
    }
}

/// Cycles a word list through the visible, exiting and entering phases.
///
/// The controller owns its [`AnimationState`] exclusively: it changes only in
/// response to the single phase chain started by [`AnimationController::start`].
/// Renderers either poll [`AnimationController::frame`] or
/// [`AnimationController::subscribe`] to boundary updates.
pub struct AnimationController {
    shared: Arc<Shared>,
    clock: Option<CancelHandle>,
}

impl AnimationController {
    /// Validates `words` and `config`, then starts cycling from the first word
    /// in the `Visible` phase. Nothing is scheduled if validation fails.
    pub fn start<I, S>(words: I, config: &RotatorConfig, source: Arc<dyn TimeSource>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = WordList::new(words)?;
        config.validate()?;
        let timings = config.timings()?;

        let shared = Arc::new(Shared {
            words,
            source: source.clone(),
            inner: Mutex::new(Inner {
                state: Some(AnimationState {
                    word_index: 0,
                    phase: AnimationPhase::Visible,
                    cycle_start: source.now(),
                }),
                subscribers: Vec::new(),
            }),
        });

        let boundary_shared = shared.clone();
        let clock = PhaseClock::new(source, timings)
            .start(move |phase| boundary_shared.on_boundary(phase))?;

        tracing::info!(
            words = shared.words.len(),
            cycle_ms = config.cycle_duration_ms,
            "word rotator started"
        );

        Ok(Self {
            shared,
            clock: Some(clock),
        })
    }

    /// Cancels the phase chain and discards the state. Further calls are
    /// no-ops. Subscribers see their channel disconnect.
    pub fn stop(&mut self) {
        let Some(clock) = self.clock.take() else {
            return;
        };
        // Cancel before touching the state so no boundary can land after it.
        clock.cancel();

        // Clearing is safe even if a boundary panicked mid-update.
        let mut inner = self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state = None;
        inner.subscribers.clear();
        tracing::info!("word rotator stopped");
    }

    /// Whether the phase chain is still live. Turns `false` after
    /// [`AnimationController::stop`] and also when the chain died on its own,
    /// for example because the time source stopped accepting timers.
    pub fn is_running(&self) -> bool {
        self.clock
            .as_ref()
            .is_some_and(|clock| !clock.is_cancelled())
            && !self.shared.inner.is_poisoned()
    }

    /// Current state, or `None` once stopped.
    pub fn current_state(&self) -> Result<Option<AnimationState>> {
        Ok(self.shared.lock()?.state)
    }

    /// Current word and phase, or `None` once stopped.
    pub fn frame(&self) -> Result<Option<Frame>> {
        let state = self.current_state()?;
        Ok(state.and_then(|state| self.shared.frame_for(&state)))
    }

    /// Returns a channel that first yields the current frame and then one frame
    /// per phase boundary. A subscriber that falls more than
    /// [`SUBSCRIBER_BACKLOG`] frames behind misses the newest ones until it
    /// catches up; [`AnimationController::frame`] always has the latest. The
    /// channel disconnects when the controller stops.
    pub fn subscribe(&self) -> Result<Receiver<Frame>> {
        let (tx, rx) = mpsc::sync_channel(SUBSCRIBER_BACKLOG);
        let mut inner = self.shared.lock()?;
        let current = inner.state.and_then(|state| self.shared.frame_for(&state));
        if let Some(frame) = current {
            if tx.try_send(frame).is_ok() {
                inner.subscribers.push(tx);
            }
        }
        Ok(rx)
    }

    /// Words this controller rotates through.
    pub fn words(&self) -> &WordList {
        &self.shared.words
    }
}

impl Drop for AnimationController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AnimationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationController")
            .field("words", &self.shared.words.len())
            .field("state", &self.current_state().ok().flatten())
            .finish()
    }
}
