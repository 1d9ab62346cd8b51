use serde::{Deserialize, Serialize};

/// Visual phase of the rotating word.
///
/// State machine: Visible → Exiting → Entering → Visible → …
///
/// There is no terminal phase; the cycle only ends when its controller stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPhase {
    /// The current word is fully shown.
    #[default]
    Visible,
    /// The current word is animating out.
    Exiting,
    /// The next word is animating in.
    Entering,
}

impl AnimationPhase {
    /// Returns the phase that follows `self` in the cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Visible => Self::Exiting,
            Self::Exiting => Self::Entering,
            Self::Entering => Self::Visible,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Exiting => "exiting",
            Self::Entering => "entering",
        }
    }
}

impl std::fmt::Display for AnimationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
