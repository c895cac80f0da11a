//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::CaptureEvent;
use crate::keyboard::KeyTarget;
use crate::state::{CaptureMode, Channel, ScanResult};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from UI clients to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current capture status
    GetStatus,

    /// Open the capture UI
    Open,

    /// Pick a capture channel
    SelectChannel { channel: Channel },

    /// Close the capture UI
    Cancel,

    /// Forward a key press from the document
    Key {
        key: String,
        #[serde(default)]
        target: KeyTarget,
    },

    /// Subscribe to scan results and capture events
    Subscribe,
}

/// Responses from the daemon to UI clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current capture status
    Status(CaptureStatus),

    /// Command accepted by the controller
    Ack,

    /// Key forwarded to the document
    KeyDispatched {
        /// Whether a key listener received it
        delivered: bool,
    },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// A session produced its result
    ScanResult(ScanResult),
    /// Capture lifecycle event
    CaptureEvent(CaptureEvent),
}

/// Capture status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatus {
    /// Daemon version
    pub version: String,

    /// Current controller mode
    pub mode: CaptureMode,

    /// Whether the document key listener is installed
    pub listening: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: CaptureMode::default(),
            listening: false,
            uptime_secs: 0,
        }
    }
}
