//! Capture mode controller
//!
//! Arbitrates between the optical and device channels. Exactly one mode is
//! current; entering a channel installs its resources, and every exit path
//! releases them before the next mode is published.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::events::CaptureEvent;
use crate::keyboard::{KeyEvent, KeyListener, KeyboardHub, WedgeDecoder, WedgeOutcome};
use crate::optical::{CameraBackend, DecodeSubscription, OpticalEvent};

use super::handle::{CaptureHandle, ControlCommand};
use super::sink::{Channel, ScanResult, ScanSink};

/// The four modes of the capture UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// No session
    #[default]
    Idle,
    /// Session open, waiting for the operator to pick a channel
    ChoicePrompt,
    /// Camera streaming into the decode loop
    CameraActive,
    /// Document key listener installed for a wedge scanner
    DeviceListening,
}

impl CaptureMode {
    /// Channel that is live in this mode, if any
    pub fn channel(&self) -> Option<Channel> {
        match self {
            CaptureMode::CameraActive => Some(Channel::Optical),
            CaptureMode::DeviceListening => Some(Channel::Device),
            CaptureMode::Idle | CaptureMode::ChoicePrompt => None,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Idle => write!(f, "Idle"),
            CaptureMode::ChoicePrompt => write!(f, "ChoicePrompt"),
            CaptureMode::CameraActive => write!(f, "CameraActive"),
            CaptureMode::DeviceListening => write!(f, "DeviceListening"),
        }
    }
}

/// The state machine that owns both capture channels
pub struct CaptureController {
    /// Current mode
    mode: CaptureMode,
    /// Monotonic session id, bumped on every open
    session: u64,
    /// Time the current session was opened
    session_opened_at: Option<Instant>,
    keyboard: KeyboardHub,
    /// Present only while `DeviceListening`
    listener: Option<KeyListener>,
    wedge: WedgeDecoder,
    camera: Arc<dyn CameraBackend>,
    /// Present only while `CameraActive`
    optical: Option<DecodeSubscription>,
    sink: Box<dyn ScanSink>,
    event_tx: broadcast::Sender<CaptureEvent>,
    mode_tx: watch::Sender<CaptureMode>,
}

impl CaptureController {
    /// Create a controller in `Idle`
    pub fn new(
        keyboard: KeyboardHub,
        camera: Arc<dyn CameraBackend>,
        sink: impl ScanSink + 'static,
        event_tx: broadcast::Sender<CaptureEvent>,
    ) -> Self {
        let (mode_tx, _) = watch::channel(CaptureMode::Idle);
        Self {
            mode: CaptureMode::Idle,
            session: 0,
            session_opened_at: None,
            keyboard,
            listener: None,
            wedge: WedgeDecoder::default(),
            camera,
            optical: None,
            sink: Box::new(sink),
            event_tx,
            mode_tx,
        }
    }

    /// Use a different inactivity window for the wedge decoder
    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.wedge = WedgeDecoder::new(window);
        self
    }

    /// Get the current mode
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Id of the current or most recent session
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Build a handle that drives this controller through `command_tx`
    pub fn handle(&self, command_tx: mpsc::Sender<ControlCommand>) -> CaptureHandle {
        CaptureHandle::new(command_tx, self.mode_tx.subscribe())
    }

    /// Run the controller until the command channel closes
    pub async fn run(&mut self, mut command_rx: mpsc::Receiver<ControlCommand>) {
        info!("capture controller started in Idle mode");

        loop {
            let deadline = self.wedge.deadline();

            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = next_key(&mut self.listener) => {
                    self.handle_key(event).await;
                }
                _ = inactivity(deadline) => {
                    self.handle_inactivity(Instant::now());
                }
                Some(event) = next_optical(&mut self.optical) => {
                    self.handle_optical(event).await;
                }
            }
        }

        self.cancel().await;
        info!("capture controller stopped");
    }

    /// Apply one operator command
    pub async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Open => self.open(),
            ControlCommand::Select(channel) => self.select(channel).await,
            ControlCommand::Cancel => self.cancel().await,
        }
    }

    fn open(&mut self) {
        if self.mode != CaptureMode::Idle {
            warn!(mode = %self.mode, "capture already open, ignoring open");
            return;
        }

        self.session += 1;
        self.session_opened_at = Some(Instant::now());
        self.transition_to(CaptureMode::ChoicePrompt);
        self.emit(CaptureEvent::SessionOpened {
            session: self.session,
        });
    }

    async fn select(&mut self, channel: Channel) {
        if self.mode == CaptureMode::Idle {
            warn!(%channel, "no capture session open, ignoring channel selection");
            return;
        }
        if self.mode.channel() == Some(channel) {
            debug!(%channel, "channel already active");
            return;
        }

        // Switching channels tears the other one down first.
        self.release_channels().await;

        match channel {
            Channel::Optical => self.enter_camera(),
            Channel::Device => self.enter_device(),
        }
    }

    fn enter_camera(&mut self) {
        let subscription = DecodeSubscription::start(self.session, Arc::clone(&self.camera));
        self.optical = Some(subscription);
        self.transition_to(CaptureMode::CameraActive);
        self.emit(CaptureEvent::ChannelActivated {
            session: self.session,
            channel: Channel::Optical,
        });
    }

    fn enter_device(&mut self) {
        match self.keyboard.register() {
            Ok(listener) => {
                self.wedge.reset();
                self.listener = Some(listener);
                self.transition_to(CaptureMode::DeviceListening);
                self.emit(CaptureEvent::ChannelActivated {
                    session: self.session,
                    channel: Channel::Device,
                });
            }
            Err(e) => {
                error!(%e, "failed to install key listener");
                self.transition_to(CaptureMode::ChoicePrompt);
            }
        }
    }

    /// Feed a key event from the document listener
    pub async fn handle_key(&mut self, event: KeyEvent) {
        if self.mode != CaptureMode::DeviceListening {
            return;
        }

        if let WedgeOutcome::Finalized(value) = self.wedge.handle(&event) {
            self.complete(Channel::Device, value).await;
        }
    }

    /// Service the inactivity timer
    pub fn handle_inactivity(&mut self, now: Instant) {
        if let Some(chars) = self.wedge.expire(now) {
            debug!(chars, "inactivity window elapsed, key buffer cleared");
            self.emit(CaptureEvent::BufferDiscarded {
                session: self.session,
                chars,
            });
        }
    }

    /// Handle an event from the optical decode loop
    pub async fn handle_optical(&mut self, event: OpticalEvent) {
        if event.session() != self.session || self.mode != CaptureMode::CameraActive {
            debug!(
                event_session = event.session(),
                session = self.session,
                mode = %self.mode,
                "dropping stale optical event"
            );
            return;
        }

        match event {
            OpticalEvent::Deferred { session } => {
                self.emit(CaptureEvent::CameraDeferred { session });
            }
            OpticalEvent::Decoded { text, .. } => {
                self.complete(Channel::Optical, text).await;
            }
            OpticalEvent::Failed { session, error } => {
                warn!(session, %error, "optical channel failed, returning to choice prompt");
                self.release_channels().await;
                self.transition_to(CaptureMode::ChoicePrompt);
                self.emit(CaptureEvent::CameraFailed {
                    session,
                    message: error.to_string(),
                });
            }
        }
    }

    /// Hand a finalized value to the sink and end the session
    async fn complete(&mut self, channel: Channel, value: String) {
        if self.mode.channel() != Some(channel) {
            debug!(%channel, mode = %self.mode, "channel not active, suppressing result");
            return;
        }

        self.release_channels().await;

        let duration_ms = self.session_duration_ms();
        info!(
            session = self.session,
            %channel,
            duration_ms,
            "scan completed"
        );

        self.sink.on_scan_result(ScanResult { value, channel });
        self.emit(CaptureEvent::ScanCompleted {
            session: self.session,
            channel,
            duration_ms,
        });

        self.session_opened_at = None;
        self.transition_to(CaptureMode::Idle);
    }

    /// End the current session without a result. No-op when `Idle`.
    pub async fn cancel(&mut self) {
        if self.mode == CaptureMode::Idle {
            debug!("no capture session open, cancel is a no-op");
            return;
        }

        self.release_channels().await;

        let duration_ms = self.session_duration_ms();
        self.emit(CaptureEvent::SessionCancelled {
            session: self.session,
            duration_ms,
        });

        self.session_opened_at = None;
        self.transition_to(CaptureMode::Idle);
    }

    /// Release the key listener, buffer, timer and camera, whichever are held
    async fn release_channels(&mut self) {
        if self.listener.take().is_some() {
            debug!(session = self.session, "device channel released");
        }
        self.wedge.reset();

        if let Some(subscription) = self.optical.take() {
            subscription.stop().await;
            debug!(session = self.session, "optical channel released");
        }
    }

    fn session_duration_ms(&self) -> u64 {
        self.session_opened_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn transition_to(&mut self, new_mode: CaptureMode) {
        let old_mode = self.mode;
        if old_mode == new_mode {
            return;
        }

        info!(
            from = %old_mode,
            to = %new_mode,
            session = self.session,
            "mode transition"
        );

        self.mode = new_mode;
        self.mode_tx.send_replace(new_mode);
    }

    fn emit(&self, event: CaptureEvent) {
        debug!(%event, "emitting capture event");
        let _ = self.event_tx.send(event);
    }
}

async fn next_key(listener: &mut Option<KeyListener>) -> Option<KeyEvent> {
    match listener {
        Some(listener) => listener.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_optical(optical: &mut Option<DecodeSubscription>) -> Option<OpticalEvent> {
    match optical {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn inactivity(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
