//! Bounded capture of helper output.

/// Default cap on retained characters.
pub const MAX_LOG_CHARACTERS: usize = 20_000;

/// Append-only text that keeps only its most recent characters.
///
/// Length is measured in `char`s, and trimming always happens on a character
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
    text: String,
    chars: usize,
    appended: usize,
    capacity: usize,
}

impl LogBuffer {
    /// Create an empty buffer holding at most `capacity` characters.
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            appended: 0,
            capacity,
        }
    }

    /// Append text, dropping the oldest characters beyond the cap.
    pub fn append(&mut self, text: &str) {
        let added = text.chars().count();
        self.text.push_str(text);
        self.chars += added;
        self.appended += added;

        if self.chars > self.capacity {
            let excess = self.chars - self.capacity;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
            self.chars = self.capacity;
        }
    }

    /// Remove all text.
    pub fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
        self.appended = 0;
    }

    /// Current contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of characters held.
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Characters appended since the last clear, including trimmed ones.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Text appended after `mark`, a value previously returned by
    /// [`appended`](Self::appended), as far as it is still held.
    pub fn since(&self, mark: usize) -> &str {
        let fresh = self.appended.saturating_sub(mark).min(self.chars);
        let skip = self.chars - fresh;
        let start = self
            .text
            .char_indices()
            .nth(skip)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len());
        &self.text[start..]
    }

    /// Maximum number of characters retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(MAX_LOG_CHARACTERS)
    }
}
