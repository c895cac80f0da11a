//! State machine module for capture mode management
//!
//! Provides an explicit state machine with four modes:
//! - Idle: no capture session
//! - ChoicePrompt: session open, operator picks a channel
//! - CameraActive: live optical decoding
//! - DeviceListening: keyboard-wedge scanner capture

mod handle;
mod machine;
mod sink;

pub use handle::{CaptureError, CaptureHandle, ControlCommand};
pub use machine::{CaptureController, CaptureMode};
pub use sink::{Channel, ScanResult, ScanSink};
