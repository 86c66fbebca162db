//! User type-ahead state.
//!
//! Each keystroke issues a new sequence number. A search is only sent if its
//! number is still the latest once the debounce window has passed, and a
//! response is only applied if no newer search has been issued since. A slow
//! answer to an old query can never overwrite a newer one.

use serde::Serialize;

use crate::models::User;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchState {
    #[serde(skip)]
    seq: u64,
    pub text: String,
    pub results: Vec<User>,
    pub pending: bool,
}

impl SearchState {
    /// Record new input and return its sequence number.
    pub fn begin(&mut self, text: &str) -> u64 {
        self.seq += 1;
        self.text = text.to_string();
        self.pending = !text.trim().is_empty();
        if !self.pending {
            self.results.clear();
        }
        self.seq
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.seq
    }

    /// Apply results for `seq`. Returns `false` (and changes nothing) when a
    /// newer search has been issued in the meantime.
    pub fn accept(&mut self, seq: u64, results: Vec<User>) -> bool {
        if !self.is_current(seq) {
            return false;
        }
        self.results = results;
        self.pending = false;
        true
    }

    /// A failed search stops the spinner but keeps the previous results.
    pub fn fail(&mut self, seq: u64) {
        if self.is_current(seq) {
            self.pending = false;
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.results.iter().any(|u| u.id == user_id)
    }

    /// Forget text and results. The sequence keeps counting so that any
    /// response still in flight is discarded.
    pub fn reset(&mut self) {
        self.seq += 1;
        self.text.clear();
        self.results.clear();
        self.pending = false;
    }
}
