//! Prompt Text
//!
//! The text shown to the user describing what the backend is generating.
//! Only successful fetches replace it.

/// Default shown before the first successful fetch
pub const DEFAULT_PROMPT: &str = "psychedelic structure, high quality";

#[derive(Debug, Clone)]
pub struct PromptText {
    text: String,
    revision: u64,
}

impl PromptText {
    pub fn new(initial: impl Into<String>) -> Self {
        Self { text: initial.into(), revision: 0 }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Bumped on every change, lets the display layer refresh lazily
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the text, returning whether it changed
    pub fn set(&mut self, text: String) -> bool {
        if text == self.text {
            return false;
        }
        self.text = text;
        self.revision += 1;
        true
    }
}

impl Default for PromptText {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}
