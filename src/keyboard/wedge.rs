//! Keystroke-wedge decoder
//!
//! Separates scanner bursts from human typing. Characters accumulate while
//! they arrive faster than the inactivity window; `Enter` finalizes the
//! buffer. A gap longer than the window silently discards what was buffered.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::keys::KeyEvent;

/// Default inactivity window between scanner keystrokes
pub const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::from_millis(100);

/// Result of feeding one key event to the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WedgeOutcome {
    /// Event did not touch the buffer
    Ignored,
    /// Character appended, inactivity deadline moved
    Accumulated,
    /// Burst terminated by Enter
    Finalized(String),
}

/// Buffer and inactivity deadline for one listening period
#[derive(Debug)]
pub struct WedgeDecoder {
    window: Duration,
    buffer: String,
    /// The single pending inactivity expiry
    deadline: Option<Instant>,
}

impl WedgeDecoder {
    /// Create a decoder with the given inactivity window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: String::new(),
            deadline: None,
        }
    }

    /// Inactivity window in use
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Characters accumulated so far
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// When the buffer expires, if anything is buffered
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Feed one key event
    pub fn handle(&mut self, event: &KeyEvent) -> WedgeOutcome {
        if event.target.is_text_entry() {
            trace!(key = %event.key, "key from text field, ignoring");
            return WedgeOutcome::Ignored;
        }

        // The timer may not have been serviced yet when a late key arrives.
        self.expire(event.at);

        if event.is_enter() {
            if self.buffer.is_empty() {
                return WedgeOutcome::Ignored;
            }
            let value = std::mem::take(&mut self.buffer);
            self.deadline = None;
            debug!(chars = value.chars().count(), "scanner burst finalized");
            return WedgeOutcome::Finalized(value);
        }

        match event.character() {
            Some(c) => {
                self.buffer.push(c);
                self.deadline = Some(event.at + self.window);
                WedgeOutcome::Accumulated
            }
            None => WedgeOutcome::Ignored,
        }
    }

    /// Clear the buffer if its deadline has passed.
    ///
    /// Returns the number of discarded characters, or `None` when nothing
    /// was pending.
    pub fn expire(&mut self, now: Instant) -> Option<usize> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let discarded = self.buffer.chars().count();
                self.buffer.clear();
                Some(discarded)
            }
            _ => None,
        }
    }

    /// Drop any buffered characters and the pending deadline
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.deadline = None;
    }
}

impl Default for WedgeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_INACTIVITY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::KeyTarget;

    const GAP: Duration = Duration::from_millis(5);

    /// Feed `keys` spaced `gap` apart starting at `start`, returning the time
    /// of the last key.
    fn feed(decoder: &mut WedgeDecoder, keys: &str, start: Instant, gap: Duration) -> Instant {
        let mut at = start;
        for c in keys.chars() {
            at += gap;
            let event = KeyEvent::new(c.to_string(), KeyTarget::Document, at);
            assert_eq!(decoder.handle(&event), WedgeOutcome::Accumulated);
        }
        at
    }

    fn enter(at: Instant) -> KeyEvent {
        KeyEvent::new("Enter", KeyTarget::Document, at)
    }

    #[test]
    fn test_burst_finalizes() {
        let mut decoder = WedgeDecoder::default();
        let last = feed(&mut decoder, "974345VVIC", Instant::now(), GAP);
        assert_eq!(decoder.buffer(), "974345VVIC");
        assert_eq!(decoder.deadline(), Some(last + DEFAULT_INACTIVITY_WINDOW));

        let outcome = decoder.handle(&enter(last + GAP));
        assert_eq!(outcome, WedgeOutcome::Finalized("974345VVIC".to_string()));
        assert_eq!(decoder.buffer(), "");
        assert_eq!(decoder.deadline(), None);
    }

    #[test]
    fn test_gap_discards_earlier_characters() {
        let mut decoder = WedgeDecoder::default();
        let paused_at = feed(&mut decoder, "9743", Instant::now(), GAP);
        let resumed = paused_at + Duration::from_millis(500) - GAP;
        let last = feed(&mut decoder, "45VVIC", resumed, GAP);

        let outcome = decoder.handle(&enter(last + GAP));
        assert_eq!(outcome, WedgeOutcome::Finalized("45VVIC".to_string()));
    }

    #[test]
    fn test_gap_just_inside_window_keeps_buffer() {
        let mut decoder = WedgeDecoder::default();
        let gap = DEFAULT_INACTIVITY_WINDOW - Duration::from_millis(1);
        let last = feed(&mut decoder, "ABC", Instant::now(), gap);
        let outcome = decoder.handle(&enter(last + gap));
        assert_eq!(outcome, WedgeOutcome::Finalized("ABC".to_string()));
    }

    #[test]
    fn test_enter_on_empty_buffer_is_noop() {
        let mut decoder = WedgeDecoder::default();
        assert_eq!(decoder.handle(&enter(Instant::now())), WedgeOutcome::Ignored);
        assert_eq!(decoder.deadline(), None);
    }

    #[test]
    fn test_enter_after_expiry_is_noop() {
        let mut decoder = WedgeDecoder::default();
        let last = feed(&mut decoder, "12", Instant::now(), GAP);
        let late = last + Duration::from_millis(250);
        assert_eq!(decoder.handle(&enter(late)), WedgeOutcome::Ignored);
    }

    #[test]
    fn test_text_field_keys_never_buffered() {
        let mut decoder = WedgeDecoder::default();
        let now = Instant::now();
        for target in [KeyTarget::TextInput, KeyTarget::TextArea] {
            let event = KeyEvent::new("x", target, now);
            assert_eq!(decoder.handle(&event), WedgeOutcome::Ignored);
            let event = KeyEvent::new("Enter", target, now);
            assert_eq!(decoder.handle(&event), WedgeOutcome::Ignored);
        }
        assert_eq!(decoder.buffer(), "");
    }

    #[test]
    fn test_named_keys_do_not_extend_deadline() {
        let mut decoder = WedgeDecoder::default();
        let start = Instant::now();
        let last = feed(&mut decoder, "A", start, GAP);
        let shift = KeyEvent::new("Shift", KeyTarget::Document, last + GAP);
        assert_eq!(decoder.handle(&shift), WedgeOutcome::Ignored);
        assert_eq!(decoder.deadline(), Some(last + DEFAULT_INACTIVITY_WINDOW));
        assert_eq!(decoder.buffer(), "A");
    }

    #[test]
    fn test_expire() {
        let mut decoder = WedgeDecoder::default();
        assert_eq!(decoder.expire(Instant::now()), None);

        let last = feed(&mut decoder, "xyz", Instant::now(), GAP);
        assert_eq!(decoder.expire(last + GAP), None);
        assert_eq!(decoder.buffer(), "xyz");

        assert_eq!(decoder.expire(last + DEFAULT_INACTIVITY_WINDOW), Some(3));
        assert_eq!(decoder.buffer(), "");
        assert_eq!(decoder.deadline(), None);
    }

    #[test]
    fn test_custom_window() {
        let mut decoder = WedgeDecoder::new(Duration::from_millis(20));
        let last = feed(&mut decoder, "ab", Instant::now(), Duration::from_millis(30));
        assert_eq!(decoder.buffer(), "b");
        assert_eq!(decoder.window(), Duration::from_millis(20));
        decoder.reset();
        assert_eq!(decoder.buffer(), "");
        assert_eq!(decoder.expire(last + Duration::from_secs(1)), None);
    }
}
