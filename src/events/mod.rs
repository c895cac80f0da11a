//! Events module for capture session transitions
//!
//! Structured events for session lifecycle, channel activation, and
//! user-visible notices such as camera failures.

use serde::{Deserialize, Serialize};

use crate::state::Channel;

/// Events emitted by the capture controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// Capture UI opened, waiting for a channel choice
    SessionOpened { session: u64 },

    /// A capture channel became active
    ChannelActivated { session: u64, channel: Channel },

    /// Camera acquired but not yet delivering frames
    CameraDeferred { session: u64 },

    /// A scan result was handed to the sink
    ScanCompleted {
        session: u64,
        channel: Channel,
        /// Duration in milliseconds since the session was opened
        duration_ms: u64,
    },

    /// Camera could not be used; shown to the operator
    CameraFailed { session: u64, message: String },

    /// Partial keystroke buffer dropped after the inactivity window
    BufferDiscarded { session: u64, chars: usize },

    /// Session ended without a result
    SessionCancelled {
        session: u64,
        /// Duration in milliseconds since the session was opened
        duration_ms: u64,
    },
}

impl std::fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureEvent::SessionOpened { session } => write!(f, "SESSION_OPENED (#{})", session),
            CaptureEvent::ChannelActivated { session, channel } => {
                write!(f, "CHANNEL_ACTIVATED (#{}, {})", session, channel)
            }
            CaptureEvent::CameraDeferred { session } => write!(f, "CAMERA_DEFERRED (#{})", session),
            CaptureEvent::ScanCompleted {
                session,
                channel,
                duration_ms,
            } => write!(f, "SCAN_COMPLETED (#{}, {}, {}ms)", session, channel, duration_ms),
            CaptureEvent::CameraFailed { session, message } => {
                write!(f, "CAMERA_FAILED (#{}): {}", session, message)
            }
            CaptureEvent::BufferDiscarded { session, chars } => {
                write!(f, "BUFFER_DISCARDED (#{}, {} chars)", session, chars)
            }
            CaptureEvent::SessionCancelled {
                session,
                duration_ms,
            } => write!(f, "SESSION_CANCELLED (#{}, {}ms)", session, duration_ms),
        }
    }
}
