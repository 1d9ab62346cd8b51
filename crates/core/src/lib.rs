//! Core library for the Word Rotator animation controller.
//!
//! A controller cycles a fixed word list through three visual phases
//! (visible, exiting, entering) on a fixed cadence. Each module owns one
//! piece of that machinery:
//!
//! - [`cycler`] picks the next word index, healing any invalid input.
//! - [`clock`] chains single-shot timers across the phase boundaries.
//! - [`controller`] owns the `(word, phase)` state and its lifecycle.
//! - [`time`] abstracts scheduling so the same code runs on the wall clock
//!   and on a manually advanced virtual clock.
//!
//! Rendering is left to the caller, who polls or subscribes to [`Frame`]s.

pub mod clock;
pub mod config;
pub mod controller;
pub mod cycler;
pub mod error;
pub mod phase;
pub mod time;

pub use clock::{CancelHandle, PhaseClock, PhaseTimings};
pub use config::{AppConfig, PhaseSplit, RotatorConfig};
pub use controller::{AnimationController, AnimationState, Frame, SUBSCRIBER_BACKLOG};
pub use cycler::{next_index, WordList};
pub use error::{Result, RotatorError};
pub use phase::AnimationPhase;
pub use time::{RealTimeSource, TimeSource, TimerCallback, TimerId, VirtualTimeSource};
