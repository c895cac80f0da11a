//! Command handle for the capture controller

use tokio::sync::{mpsc, watch};

use super::machine::CaptureMode;
use super::sink::Channel;

/// Operator actions fed to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Open the capture UI
    Open,
    /// Pick a channel from the choice prompt
    Select(Channel),
    /// Close the capture UI from any mode
    Cancel,
}

/// Errors returned by [`CaptureHandle`]
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture controller is not running")]
    ControllerStopped,
}

/// Cloneable handle for driving a running controller
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    command_tx: mpsc::Sender<ControlCommand>,
    mode_rx: watch::Receiver<CaptureMode>,
}

impl CaptureHandle {
    /// Create a handle from the controller's command sender and mode watch
    pub fn new(command_tx: mpsc::Sender<ControlCommand>, mode_rx: watch::Receiver<CaptureMode>) -> Self {
        Self { command_tx, mode_rx }
    }

    /// Begin a session and show the choice prompt
    pub async fn open(&self) -> Result<(), CaptureError> {
        self.send(ControlCommand::Open).await
    }

    /// Activate a capture channel
    pub async fn select(&self, channel: Channel) -> Result<(), CaptureError> {
        self.send(ControlCommand::Select(channel)).await
    }

    /// End the session from any mode, releasing all resources
    pub async fn cancel(&self) -> Result<(), CaptureError> {
        self.send(ControlCommand::Cancel).await
    }

    /// Close the capture UI; same as [`cancel`](Self::cancel)
    pub async fn close(&self) -> Result<(), CaptureError> {
        self.cancel().await
    }

    /// Current controller mode
    pub fn mode(&self) -> CaptureMode {
        *self.mode_rx.borrow()
    }

    /// Wait until the controller reaches `mode`
    pub async fn wait_for_mode(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        self.mode_rx
            .wait_for(|current| *current == mode)
            .await
            .map(|_| ())
            .map_err(|_| CaptureError::ControllerStopped)
    }

    async fn send(&self, command: ControlCommand) -> Result<(), CaptureError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| CaptureError::ControllerStopped)
    }
}
