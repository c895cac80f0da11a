//! Keyboard module for scanner-wedge capture
//!
//! Models document-level key events, the listener capability that is
//! installed only while the device channel is active, and the decoder that
//! turns scanner bursts into finished strings.

mod keys;
mod listener;
mod wedge;

pub use keys::{KeyEvent, KeyTarget, ENTER};
pub use listener::{KeyListener, KeyboardHub, ListenerError};
pub use wedge::{WedgeDecoder, WedgeOutcome, DEFAULT_INACTIVITY_WINDOW};
