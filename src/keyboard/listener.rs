//! Document-level key listener
//!
//! The hub stands in for the document: whatever feeds keystrokes into the
//! process (a wedge scanner, an IPC client, a test) calls `dispatch`, and the
//! hub forwards them to the one registered listener. Registration is a
//! guard; dropping it removes the listener.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::keys::{KeyEvent, KeyTarget};

/// Shared handle to the document-level key dispatch point
#[derive(Debug, Clone, Default)]
pub struct KeyboardHub {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<KeyEvent>>>>,
}

impl KeyboardHub {
    /// Create a hub with no listener installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the document-level listener
    ///
    /// Fails if a listener is already installed; callers must drop the
    /// previous guard first.
    pub fn register(&self) -> Result<KeyListener, ListenerError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(ListenerError::AlreadyRegistered);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(tx);
        debug!("key listener installed");

        Ok(KeyListener {
            rx,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Deliver a key press, stamped with the current time.
    ///
    /// Returns `false` when no listener is installed and the key was dropped.
    pub fn dispatch(&self, key: impl Into<String>, target: KeyTarget) -> bool {
        let event = KeyEvent::new(key, target, Instant::now());
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!(key = %event.key, "no key listener installed, dropping key");
                false
            }
        }
    }

    /// Check if a listener is currently installed
    pub fn is_listening(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Registration guard for the document-level key listener
#[derive(Debug)]
pub struct KeyListener {
    rx: mpsc::UnboundedReceiver<KeyEvent>,
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<KeyEvent>>>>,
}

impl KeyListener {
    /// Receive the next key event in arrival order
    pub async fn recv(&mut self) -> Option<KeyEvent> {
        self.rx.recv().await
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.slot.lock().take();
        debug!("key listener removed");
    }
}

/// Errors that can occur when installing the key listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("a key listener is already installed")]
    AlreadyRegistered,
}
