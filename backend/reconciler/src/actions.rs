//! Client-side gates that run before any reconciliation call is sent, and
//! the per-action submission lock.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::errors::{ConsoleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Reprocess,
    Assign,
    Ignore,
    Topup,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionKind::Reprocess => write!(f, "Reprocess"),
            ActionKind::Assign => write!(f, "Assign"),
            ActionKind::Ignore => write!(f, "Ignore"),
            ActionKind::Topup => write!(f, "Top-up"),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Validation gates
// ─────────────────────────────────────────────────────────

/// Parse the operator's top-up amount. Only whole, positive credit counts pass.
pub fn parse_topup_credits(input: &str) -> Result<u64> {
    match input.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Err(ConsoleError::validation(
            "Credits must be a positive whole number",
        )),
    }
}

pub fn require_confirmation(confirmed: bool) -> Result<()> {
    if confirmed {
        Ok(())
    } else {
        Err(ConsoleError::validation("Reprocess was not confirmed"))
    }
}

pub fn require_selected_user(user_id: Option<&str>) -> Result<String> {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ConsoleError::validation("Select a user before assigning")),
    }
}

/// The ignore prompt: cancelling it (`None`) or leaving it blank aborts.
pub fn ignore_note(prompt: Option<&str>) -> Result<String> {
    match prompt.map(str::trim) {
        Some(note) if !note.is_empty() => Ok(note.to_string()),
        _ => Err(ConsoleError::validation("Ignore cancelled: a reason is required")),
    }
}

/// Blank free-text notes are not sent at all.
pub fn optional_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
}

// ─────────────────────────────────────────────────────────
// Submission lock
// ─────────────────────────────────────────────────────────

/// Actions whose request is currently on the wire.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<ActionKind>>>,
}

impl InFlight {
    /// Claim `kind` for the duration of one request. A second claim fails with
    /// [`ConsoleError::Busy`] until the returned guard is dropped.
    pub fn try_begin(&self, kind: ActionKind) -> Result<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(kind) {
            return Err(ConsoleError::Busy(kind));
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            kind,
        })
    }

    pub fn snapshot(&self) -> Vec<ActionKind> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<ActionKind>>>,
    kind: ActionKind,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}
