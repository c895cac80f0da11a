//! Scan results and the sink that receives them

use serde::{Deserialize, Serialize};

/// The two capture channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Camera with live barcode recognition
    Optical,
    /// Keyboard-wedge scanner gun
    Device,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Optical => write!(f, "optical"),
            Channel::Device => write!(f, "device"),
        }
    }
}

/// Finalized value produced by exactly one channel per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Scanned text, unvalidated
    pub value: String,
    /// Channel that produced it
    pub channel: Channel,
}

/// Receiver of finalized scan results
pub trait ScanSink: Send {
    /// Called once per successful session
    fn on_scan_result(&mut self, result: ScanResult);
}

impl<F> ScanSink for F
where
    F: FnMut(ScanResult) + Send,
{
    fn on_scan_result(&mut self, result: ScanResult) {
        self(result)
    }
}
