//! Key event definitions
//!
//! Provides the key-press model delivered by the document and the
//! classification rules the wedge decoder relies on.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Key value that terminates a scanner burst
pub const ENTER: &str = "Enter";

/// Where a key event originated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTarget {
    /// Document body or any non-editable element
    #[default]
    Document,
    /// Single-line text input
    TextInput,
    /// Multi-line text area
    TextArea,
}

impl KeyTarget {
    /// Check if the target is a field a human may be typing into
    pub fn is_text_entry(&self) -> bool {
        matches!(self, KeyTarget::TextInput | KeyTarget::TextArea)
    }
}

/// A single key press as seen by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key value, e.g. `"a"`, `"7"`, `"Enter"`, `"Shift"`
    pub key: String,
    /// Element the event bubbled from
    pub target: KeyTarget,
    /// Dispatch time
    pub at: Instant,
}

impl KeyEvent {
    /// Create a key event stamped with the given time
    pub fn new(key: impl Into<String>, target: KeyTarget, at: Instant) -> Self {
        Self {
            key: key.into(),
            target,
            at,
        }
    }

    /// Check if this is the burst terminator
    pub fn is_enter(&self) -> bool {
        self.key == ENTER
    }

    /// The character carried by a single-character key.
    ///
    /// Named keys (`Shift`, `ArrowLeft`, `Tab`, `Enter`) return `None`.
    pub fn character(&self) -> Option<char> {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}
