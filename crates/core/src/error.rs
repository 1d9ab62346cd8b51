/// Result alias that carries the custom [`RotatorError`] type.
pub type Result<T> = std::result::Result<T, RotatorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    /// A controller was started without any words to show.
    #[error("word list is empty")]
    EmptyWordList,
    /// A word in the list is empty or only whitespace.
    #[error("word at index {index} is blank")]
    EmptyWord { index: usize },
    /// The cycle duration or phase split cannot produce three ordered windows.
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
    /// The scheduler backing a time source cannot accept timers.
    #[error("time source unavailable: {0}")]
    TimeSourceUnavailable(String),
    /// Free-form runtime failure, such as a poisoned lock or a boundary that
    /// never arrived.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration files.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl RotatorError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
