use serde::Serialize;

use crate::{Result, RotatorError};

/// Returns the index that follows `current` in a list of `len` words.
///
/// Total over every input: an empty list yields `0` (callers must not index
/// with it), a single word always yields `0`, and any negative or
/// out-of-range `current` heals to `0` instead of producing another invalid
/// index.
pub fn next_index(current: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }

    let next = current
        .checked_add(1)
        .and_then(|next| usize::try_from(next).ok());
    match next {
        Some(next) if next < len => next,
        _ => 0,
    }
}

/// Ordered, non-empty list of display words. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Validates and wraps the provided words.
    pub fn new<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        if words.is_empty() {
            return Err(RotatorError::EmptyWordList);
        }
        if let Some(index) = words.iter().position(|word| word.trim().is_empty()) {
            return Err(RotatorError::EmptyWord { index });
        }

        Ok(Self { words })
    }

    /// Number of words; at least one.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at `index`, if the index is in range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    /// Index of the word shown after the one at `current`.
    pub fn next_index(&self, current: usize) -> usize {
        let current = isize::try_from(current).unwrap_or(-1);
        next_index(current, self.len())
    }

    /// Words in display order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}
