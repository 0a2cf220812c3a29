//! Speech capture engine: silence-endpointed wrapper over a platform
//! streaming recognizer.
//!
//! The underlying recognizer is continuous and event-driven; this module
//! reframes it as an explicit state machine (Idle → Listening → Finalizing
//! → Idle) with one timer-based transition: 800 ms without a new result
//! force-stops the recognizer. The caller gets a clean pseudo-turn-based
//! contract — start capture, eventually receive exactly one finalized
//! utterance or none.

use crate::config::CaptureConfig;
use crate::error::{EngineError, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Error codes reported by the platform recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    /// Microphone permission denied. Terminal for the session.
    PermissionDenied,
    /// No streaming recognizer available on this platform. Terminal.
    Unsupported,
    /// The recognizer heard nothing. Expected, non-actionable.
    NoSpeech,
    /// Capture was aborted mid-flight. Expected, non-actionable.
    Aborted,
    /// Any other platform error code.
    Other(String),
}

/// Events delivered by the platform recognizer.
#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    /// A live, ephemeral partial hypothesis.
    Partial(String),
    /// A finalized chunk of recognized text.
    Result(String),
    /// A recognizer error.
    Error(RecognizerError),
    /// The recognizer stopped (silence timeout, manual stop, or backend
    /// termination).
    Ended,
}

/// Platform streaming recognizer, configured for continuous + interim
/// results. Events flow on the channel handed over at wiring time; `stop`
/// must eventually cause an [`RecognizerEvent::Ended`].
pub trait RecognizerPort: Send {
    /// Begin streaming recognition.
    ///
    /// # Errors
    ///
    /// Returns an error if the recognizer cannot start (e.g. the device is
    /// in use).
    fn start(&mut self) -> Result<()>;

    /// Request the recognizer to stop.
    fn stop(&mut self);
}

/// A user-visible capture problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureNotice {
    /// Message to display.
    pub message: String,
    /// Terminal notices block further capture for the session.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapturePhase {
    Idle,
    Listening,
    /// Stop requested (silence timeout or manual); waiting for `Ended`.
    Finalizing,
}

/// Silence-endpointed speech capture.
pub struct SpeechCapture {
    recognizer: Box<dyn RecognizerPort>,
    events: mpsc::UnboundedReceiver<RecognizerEvent>,
    phase: CapturePhase,
    silence_timeout: Duration,
    /// Armed after the first result of a session; reset on every result.
    silence_deadline: Option<Instant>,
    accumulated: String,
    interim: String,
    final_transcript: Option<String>,
    notice: Option<CaptureNotice>,
}

impl SpeechCapture {
    /// Wire a capture engine to a recognizer and its event stream.
    pub fn new(
        recognizer: Box<dyn RecognizerPort>,
        events: mpsc::UnboundedReceiver<RecognizerEvent>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            recognizer,
            events,
            phase: CapturePhase::Idle,
            silence_timeout: Duration::from_millis(config.silence_timeout_ms),
            silence_deadline: None,
            accumulated: String::new(),
            interim: String::new(),
            final_transcript: None,
            notice: None,
        }
    }

    /// Begin a capture session. Starting while already listening is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a terminal notice is pending (permission denied /
    /// unsupported platform) or the recognizer fails to start.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != CapturePhase::Idle {
            return Ok(());
        }
        if let Some(notice) = &self.notice
            && notice.terminal
        {
            return Err(EngineError::Capture(notice.message.clone()));
        }
        self.notice = None;
        self.accumulated.clear();
        self.interim.clear();
        self.final_transcript = None;
        self.silence_deadline = None;
        self.recognizer.start()?;
        self.phase = CapturePhase::Listening;
        info!("capture started");
        Ok(())
    }

    /// Manually stop capture, forcing immediate finalization of whatever has
    /// been recognized. Stopping while not listening is a no-op.
    pub fn stop(&mut self) {
        if self.phase != CapturePhase::Listening {
            return;
        }
        self.phase = CapturePhase::Finalizing;
        self.silence_deadline = None;
        self.recognizer.stop();
    }

    /// Whether a capture session is active.
    pub fn is_listening(&self) -> bool {
        self.phase == CapturePhase::Listening
    }

    /// The live partial hypothesis, if any.
    pub fn interim_transcript(&self) -> &str {
        &self.interim
    }

    /// The pending user-visible notice, if any.
    pub fn notice(&self) -> Option<&CaptureNotice> {
        self.notice.as_ref()
    }

    /// Consume the finalized utterance. Yields the transcript exactly once
    /// per capture session; subsequent calls return `None` until a new
    /// session finalizes.
    pub fn take_final_transcript(&mut self) -> Option<String> {
        self.final_transcript.take()
    }

    /// Drive the current capture session until it returns to idle.
    ///
    /// Waits on recognizer events and the silence timer; returns once the
    /// session has finalized (or immediately when idle). After this returns,
    /// [`Self::take_final_transcript`] yields the utterance, if any.
    pub async fn drive(&mut self) {
        while self.phase != CapturePhase::Idle {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.apply(event),
                    None => {
                        // Recognizer went away entirely.
                        self.finalize();
                    }
                },
                () = sleep_until_deadline(self.silence_deadline) => {
                    debug!("silence window elapsed — force-stopping recognizer");
                    self.silence_deadline = None;
                    self.phase = CapturePhase::Finalizing;
                    self.recognizer.stop();
                }
            }
        }
    }

    fn apply(&mut self, event: RecognizerEvent) {
        match event {
            RecognizerEvent::Partial(text) => {
                self.interim = text;
                self.arm_silence_timer();
            }
            RecognizerEvent::Result(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !self.accumulated.is_empty() {
                        self.accumulated.push(' ');
                    }
                    self.accumulated.push_str(text);
                }
                self.interim.clear();
                self.arm_silence_timer();
            }
            RecognizerEvent::Error(error) => self.apply_error(error),
            RecognizerEvent::Ended => self.finalize(),
        }
    }

    fn apply_error(&mut self, error: RecognizerError) {
        match error {
            RecognizerError::PermissionDenied => {
                self.notice = Some(CaptureNotice {
                    message: "Microphone access denied. Please enable it in your browser settings."
                        .to_owned(),
                    terminal: true,
                });
                warn!("capture permission denied");
                self.finalize();
            }
            RecognizerError::Unsupported => {
                self.notice = Some(CaptureNotice {
                    message: "Speech recognition is not supported on this platform.".to_owned(),
                    terminal: true,
                });
                warn!("speech recognition unsupported");
                self.finalize();
            }
            // Expected, non-actionable: suppress and let the session end.
            RecognizerError::NoSpeech | RecognizerError::Aborted => {
                debug!(?error, "suppressed recognizer error");
            }
            RecognizerError::Other(code) => {
                self.notice = Some(CaptureNotice {
                    message: format!("Speech recognition error: {code}"),
                    terminal: false,
                });
                warn!(code = code.as_str(), "recognizer error");
            }
        }
    }

    /// Finalize whatever text was accumulated and return to idle.
    fn finalize(&mut self) {
        if self.phase == CapturePhase::Idle {
            return;
        }
        self.phase = CapturePhase::Idle;
        self.silence_deadline = None;
        self.interim.clear();
        let text = std::mem::take(&mut self.accumulated);
        let text = text.trim();
        if !text.is_empty() {
            info!(transcript = text, "utterance finalized");
            self.final_transcript = Some(text.to_owned());
        }
    }

    fn arm_silence_timer(&mut self) {
        // Results may still trickle in after a stop request; they must not
        // re-arm the timer once finalization is underway.
        if self.phase == CapturePhase::Listening {
            self.silence_deadline = Some(Instant::now() + self.silence_timeout);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
