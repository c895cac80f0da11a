//! Camera and barcode decoder seams
//!
//! Platform-agnostic traits for the live video feed and the per-frame
//! barcode recognizer. Hardware backends implement these; the decode loop
//! only ever talks to the traits.

use async_trait::async_trait;

/// One captured video frame
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Position in the stream, starting at 0
    pub sequence: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw pixel data in the backend's native layout
    pub pixels: Vec<u8>,
}

/// Live video stream handed out by a camera backend
#[async_trait]
pub trait VideoSource: Send {
    /// Whether frame data is available yet
    fn is_ready(&self) -> bool;

    /// Resolve once the source can provide frame data
    async fn wait_ready(&mut self) -> Result<(), CameraError>;

    /// Next frame, or `None` if the stream ended
    async fn next_frame(&mut self) -> Option<Frame>;

    /// Stop the underlying media stream
    fn stop(&mut self);
}

/// Per-frame barcode recognizer
pub trait BarcodeReader: Send {
    /// Try to recognize a barcode in a single frame
    fn decode(&mut self, frame: &Frame) -> Result<String, DecodeError>;

    /// Drop any state carried between frames
    fn reset(&mut self) {}
}

/// Source of camera streams and matching barcode readers
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Acquire exclusive access to the camera
    async fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError>;

    /// Fresh reader for one decode session
    fn reader(&self) -> Box<dyn BarcodeReader>;
}

/// Backend for hosts without a camera
///
/// Every acquisition fails with [`CameraError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCamera;

#[async_trait]
impl CameraBackend for UnavailableCamera {
    async fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError> {
        Err(CameraError::Unavailable(
            "no camera backend configured".to_string(),
        ))
    }

    fn reader(&self) -> Box<dyn BarcodeReader> {
        Box::new(NullReader)
    }
}

struct NullReader;

impl BarcodeReader for NullReader {
    fn decode(&mut self, _frame: &Frame) -> Result<String, DecodeError> {
        Err(DecodeError::NotFound)
    }
}

/// Errors raised while acquiring or running the camera
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("camera stream ended")]
    StreamEnded,
}

/// Per-frame decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No symbol in this frame; the normal steady state
    #[error("no barcode found in frame")]
    NotFound,

    #[error("barcode decode failed: {0}")]
    Failed(String),
}
