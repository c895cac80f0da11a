//! scan-capture: dual-channel barcode capture for warehouse intake
//!
//! An operator registers a tracking number either by pointing a camera at
//! the label or by firing a keyboard-wedge scanner gun. This crate provides:
//! - A keystroke-wedge decoder that tells scanner bursts from human typing
//! - An optical decode loop over a pluggable camera backend
//! - A capture mode controller that arbitrates between the two channels and
//!   hands exactly one result per session to a sink
//! - An IPC server so an external UI can drive sessions and receive results

pub mod config;
pub mod events;
pub mod ipc;
pub mod keyboard;
pub mod lifecycle;
pub mod optical;
pub mod state;
