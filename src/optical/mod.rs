//! Optical module for camera-based barcode capture
//!
//! Defines the camera/decoder seams and the decode loop that runs frames
//! through the reader until the first barcode is recognized.

mod decode_loop;
mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use decode_loop::{DecodeSubscription, OpticalEvent};
pub use source::{
    BarcodeReader, CameraBackend, CameraError, DecodeError, Frame, UnavailableCamera, VideoSource,
};
