//! Scripted camera used by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::source::{BarcodeReader, CameraBackend, CameraError, DecodeError, Frame, VideoSource};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// What a scripted frame contains
#[derive(Debug, Clone, Copy)]
pub(crate) enum FrameScript {
    /// No symbol in view
    Blank,
    /// Frame that makes the reader error out
    Garbled,
    /// Frame carrying a readable barcode
    Barcode(&'static str),
}

impl FrameScript {
    fn pixels(&self) -> Vec<u8> {
        match self {
            FrameScript::Blank => Vec::new(),
            FrameScript::Garbled => vec![0xff, 0xfe],
            FrameScript::Barcode(text) => text.as_bytes().to_vec(),
        }
    }
}

/// Counters shared between a scripted camera and the test
#[derive(Debug, Default)]
pub(crate) struct CameraStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    frames_read: AtomicUsize,
    reader_resets: AtomicUsize,
}

impl CameraStats {
    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn frames_read(&self) -> usize {
        self.frames_read.load(Ordering::SeqCst)
    }

    pub(crate) fn reader_resets(&self) -> usize {
        self.reader_resets.load(Ordering::SeqCst)
    }

    /// A stream is held right now
    pub(crate) fn is_streaming(&self) -> bool {
        self.acquired() > self.released()
    }
}

/// Camera backend that plays back a fixed list of frames
#[derive(Debug, Clone)]
pub(crate) struct ScriptedCamera {
    script: Vec<FrameScript>,
    stats: Arc<CameraStats>,
    denied: bool,
    ready_after: Option<Duration>,
    ends: bool,
}

impl ScriptedCamera {
    pub(crate) fn new(script: Vec<FrameScript>) -> Self {
        Self {
            script,
            stats: Arc::new(CameraStats::default()),
            denied: false,
            ready_after: None,
            ends: false,
        }
    }

    /// Camera whose permission prompt is always declined
    pub(crate) fn denied() -> Self {
        Self {
            denied: true,
            ..Self::new(Vec::new())
        }
    }

    /// Delay frame availability after acquisition
    pub(crate) fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = Some(delay);
        self
    }

    /// End the stream once the script is exhausted instead of idling
    pub(crate) fn ending(mut self) -> Self {
        self.ends = true;
        self
    }

    pub(crate) fn stats(&self) -> Arc<CameraStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl CameraBackend for ScriptedCamera {
    async fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError> {
        if self.denied {
            return Err(CameraError::PermissionDenied);
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSource {
            frames: self.script.iter().copied().collect(),
            next_sequence: 0,
            ready_at: self.ready_after.map(|delay| Instant::now() + delay),
            ends: self.ends,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn reader(&self) -> Box<dyn BarcodeReader> {
        Box::new(ScriptedReader {
            stats: Arc::clone(&self.stats),
        })
    }
}

struct ScriptedSource {
    frames: VecDeque<FrameScript>,
    next_sequence: u64,
    ready_at: Option<Instant>,
    ends: bool,
    stats: Arc<CameraStats>,
}

#[async_trait]
impl VideoSource for ScriptedSource {
    fn is_ready(&self) -> bool {
        self.ready_at.map_or(true, |at| Instant::now() >= at)
    }

    async fn wait_ready(&mut self) -> Result<(), CameraError> {
        if let Some(at) = self.ready_at {
            tokio::time::sleep_until(at).await;
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::sleep(FRAME_INTERVAL).await;
        match self.frames.pop_front() {
            Some(script) => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.stats.frames_read.fetch_add(1, Ordering::SeqCst);
                Some(Frame {
                    sequence,
                    width: 640,
                    height: 480,
                    pixels: script.pixels(),
                })
            }
            None if self.ends => None,
            None => std::future::pending().await,
        }
    }

    fn stop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedReader {
    stats: Arc<CameraStats>,
}

impl BarcodeReader for ScriptedReader {
    fn decode(&mut self, frame: &Frame) -> Result<String, DecodeError> {
        if frame.pixels.is_empty() {
            return Err(DecodeError::NotFound);
        }
        String::from_utf8(frame.pixels.clone())
            .map_err(|e| DecodeError::Failed(e.to_string()))
    }

    fn reset(&mut self) {
        self.stats.reader_resets.fetch_add(1, Ordering::SeqCst);
    }
}
