//! Optical decode loop
//!
//! One spawned task per subscription: acquire the camera, wait for frames,
//! run the reader on each frame until the first successful decode. The
//! stream and reader are released exactly once on every exit path.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::source::{BarcodeReader, CameraBackend, CameraError, DecodeError, VideoSource};

/// Events reported by a running decode loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpticalEvent {
    /// Video source is not ready yet, decode start deferred
    Deferred { session: u64 },
    /// First successful decode; the stream is already released
    Decoded { session: u64, text: String },
    /// Camera could not be acquired or the stream died
    Failed { session: u64, error: CameraError },
}

impl OpticalEvent {
    /// Session the event belongs to
    pub fn session(&self) -> u64 {
        match self {
            OpticalEvent::Deferred { session }
            | OpticalEvent::Decoded { session, .. }
            | OpticalEvent::Failed { session, .. } => *session,
        }
    }
}

/// Single-owner handle to a running decode loop
///
/// Dropping the handle also stops the loop; `stop` additionally waits until
/// the camera has been released.
#[derive(Debug)]
pub struct DecodeSubscription {
    session: u64,
    events: mpsc::Receiver<OpticalEvent>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DecodeSubscription {
    /// Spawn a decode loop for the given session
    pub fn start(session: u64, backend: Arc<dyn CameraBackend>) -> Self {
        let (event_tx, events) = mpsc::channel(4);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run_decode_loop(session, backend, event_tx, stop_rx));
        debug!(session, "optical decode loop spawned");

        Self {
            session,
            events,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Session this loop was started for
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Receive the next loop event
    pub async fn recv(&mut self) -> Option<OpticalEvent> {
        self.events.recv().await
    }

    /// Stop the loop and wait for the camera to be released
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The loop may already have exited on its own.
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(session = self.session, ?e, "optical decode task failed");
            }
        }
        debug!(session = self.session, "optical decode loop stopped");
    }
}

/// Camera stream and reader held for the lifetime of one loop
struct ActiveCapture {
    stream: Box<dyn VideoSource>,
    reader: Box<dyn BarcodeReader>,
    released: bool,
}

impl ActiveCapture {
    fn new(stream: Box<dyn VideoSource>, reader: Box<dyn BarcodeReader>) -> Self {
        Self {
            stream,
            reader,
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.reader.reset();
        self.stream.stop();
        debug!("camera stream released");
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_decode_loop(
    session: u64,
    backend: Arc<dyn CameraBackend>,
    event_tx: mpsc::Sender<OpticalEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let acquired = tokio::select! {
        biased;
        _ = &mut stop_rx => {
            debug!(session, "stopped before camera was acquired");
            return;
        }
        result = backend.acquire() => result,
    };

    let stream = match acquired {
        Ok(stream) => stream,
        Err(error) => {
            warn!(session, %error, "camera acquisition failed");
            let _ = event_tx.send(OpticalEvent::Failed { session, error }).await;
            return;
        }
    };

    let mut capture = ActiveCapture::new(stream, backend.reader());
    info!(session, "camera acquired");

    if !capture.stream.is_ready() {
        debug!(session, "video source not ready, deferring decode start");
        let _ = event_tx.send(OpticalEvent::Deferred { session }).await;

        let ready = tokio::select! {
            biased;
            _ = &mut stop_rx => {
                capture.release();
                return;
            }
            result = capture.stream.wait_ready() => result,
        };

        if let Err(error) = ready {
            warn!(session, %error, "video source never became ready");
            capture.release();
            let _ = event_tx.send(OpticalEvent::Failed { session, error }).await;
            return;
        }
    }

    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut stop_rx => {
                capture.release();
                return;
            }
            frame = capture.stream.next_frame() => frame,
        };

        let Some(frame) = frame else {
            warn!(session, "camera stream ended before a barcode was found");
            capture.release();
            let _ = event_tx
                .send(OpticalEvent::Failed {
                    session,
                    error: CameraError::StreamEnded,
                })
                .await;
            return;
        };

        match capture.reader.decode(&frame) {
            Ok(text) => {
                capture.release();
                info!(session, frame = frame.sequence, "barcode decoded");
                let _ = event_tx.send(OpticalEvent::Decoded { session, text }).await;
                return;
            }
            Err(DecodeError::NotFound) => {}
            Err(e) => {
                warn!(session, frame = frame.sequence, %e, "frame decode error");
            }
        }
    }
}
