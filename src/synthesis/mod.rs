//! Speech output engine: voice selection and serialized playback over a
//! platform synthesizer.
//!
//! The underlying synthesis queue is a single process-wide resource. All
//! speaking goes through [`SpeechOutput`], which unconditionally cancels any
//! in-flight utterance before starting the next one — a later request always
//! wins; nothing is ever queued.

use crate::config::SynthesisConfig;
use crate::dialogue::state::{Message, MessageId, Sender};
use crate::error::Result;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A voice offered by the platform synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Platform voice name.
    pub name: String,
    /// BCP-47 language tag.
    pub language: String,
    /// Whether the voice is locally hosted (vs. network-backed).
    pub local: bool,
}

/// One utterance handed to the platform synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    /// Text to speak.
    pub text: String,
    /// Selected voice name; `None` leaves the choice to the platform.
    pub voice: Option<String>,
    /// Target language tag (always set, even when no voice matched).
    pub language: String,
    /// Playback rate multiplier.
    pub rate: f32,
    /// Pitch.
    pub pitch: f32,
    /// Volume.
    pub volume: f32,
}

/// Platform text-to-speech synthesizer.
pub trait SynthesizerPort: Send {
    /// Enumerate the currently available voices. The inventory may change
    /// between calls (voices load lazily on some platforms), so selection
    /// re-runs on every speak request.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Begin speaking. Returns immediately; playback is asynchronous.
    ///
    /// # Errors
    ///
    /// Returns an error if the utterance cannot be started.
    fn speak(&mut self, request: UtteranceRequest) -> Result<()>;

    /// Cancel any in-flight utterance. No-op when nothing is playing.
    fn cancel(&mut self);
}

/// Serialized speech output with voice preference and autoplay gating.
pub struct SpeechOutput {
    synthesizer: Box<dyn SynthesizerPort>,
    config: SynthesisConfig,
    rate: f32,
    autoplay_unlocked: bool,
    /// Ids already auto-spoken this session. The message log is append-only,
    /// so growth is bounded by the conversation length.
    announced: HashSet<MessageId>,
}

impl SpeechOutput {
    /// Create a speech output engine.
    ///
    /// `rate` and `autoplay_unlocked` come from the preference store; the
    /// rate is clamped to the supported 0.5–2.0 range.
    pub fn new(
        synthesizer: Box<dyn SynthesizerPort>,
        config: SynthesisConfig,
        rate: f32,
        autoplay_unlocked: bool,
    ) -> Self {
        Self {
            synthesizer,
            config,
            rate: rate.clamp(0.5, 2.0),
            autoplay_unlocked,
            announced: HashSet::new(),
        }
    }

    /// Update the playback rate preference.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(0.5, 2.0);
    }

    /// Record that the user has interacted with the page, opening the
    /// autoplay gate for the rest of the session. The caller persists the
    /// flag so the gate stays open across sessions.
    pub fn mark_user_interaction(&mut self) {
        self.autoplay_unlocked = true;
    }

    /// Whether automatic speech is currently allowed.
    pub fn autoplay_unlocked(&self) -> bool {
        self.autoplay_unlocked
    }

    /// Automatically speak a newly-rendered AI message.
    ///
    /// Fires at most once per message identity: re-renders of the log,
    /// including full re-renders of earlier messages, never re-trigger
    /// speech. Suppressed entirely until the user has interacted at least
    /// once.
    pub fn announce(&mut self, message: &Message) {
        if message.sender != Sender::Ai || message.english_text.is_empty() {
            return;
        }
        if !self.autoplay_unlocked {
            debug!(id = %message.id, "autoplay gated — skipping announcement");
            return;
        }
        if !self.announced.insert(message.id.clone()) {
            return;
        }
        self.speak(&message.english_text);
    }

    /// Speak `text`, cancelling any in-flight utterance first. Used for
    /// manual replay and by [`Self::announce`].
    ///
    /// Synthesis problems are logged and swallowed: speech never blocks
    /// message display.
    pub fn speak(&mut self, text: &str) {
        self.synthesizer.cancel();

        let voices = self.synthesizer.voices();
        let voice = select_voice(&voices, &self.config);
        let request = UtteranceRequest {
            text: text.to_owned(),
            voice,
            language: self.config.language.clone(),
            rate: self.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
        };
        if let Err(e) = self.synthesizer.speak(request) {
            warn!(error = %e, "synthesis failed — continuing without speech");
        }
    }
}

/// Pick the best available voice for the configured language.
///
/// Preference order: a named allow-list of known high-quality local voices,
/// then any local voice for the language, then any voice matching the
/// language tag, then none (language tag only).
fn select_voice(voices: &[VoiceInfo], config: &SynthesisConfig) -> Option<String> {
    let primary = primary_subtag(&config.language);

    for preferred in &config.preferred_voices {
        if let Some(voice) = voices.iter().find(|v| {
            v.local
                && v.name.eq_ignore_ascii_case(preferred)
                && primary_subtag(&v.language) == primary
        }) {
            return Some(voice.name.clone());
        }
    }

    if let Some(voice) = voices
        .iter()
        .find(|v| v.local && primary_subtag(&v.language) == primary)
    {
        return Some(voice.name.clone());
    }

    voices
        .iter()
        .find(|v| primary_subtag(&v.language) == primary)
        .map(|v| v.name.clone())
}

fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::dialogue::state::ConversationState;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Cancel,
        Speak(UtteranceRequest),
    }

    struct FakeSynthesizer {
        voices: Vec<VoiceInfo>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl SynthesizerPort for FakeSynthesizer {
        fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }

        fn speak(&mut self, request: UtteranceRequest) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Speak(request));
            Ok(())
        }

        fn cancel(&mut self) {
            self.calls.lock().unwrap().push(Call::Cancel);
        }
    }

    fn voice(name: &str, language: &str, local: bool) -> VoiceInfo {
        VoiceInfo {
            name: name.to_owned(),
            language: language.to_owned(),
            local,
        }
    }

    fn output_with(
        voices: Vec<VoiceInfo>,
        unlocked: bool,
    ) -> (SpeechOutput, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let synth = FakeSynthesizer {
            voices,
            calls: Arc::clone(&calls),
        };
        let output = SpeechOutput::new(
            Box::new(synth),
            SynthesisConfig::default(),
            0.9,
            unlocked,
        );
        (output, calls)
    }

    fn ai_message(text: &str) -> Message {
        let mut state = ConversationState::new("standard", "business");
        state.push_ai_message(text, "訳", Vec::new(), None);
        state.messages.pop().unwrap()
    }

    /// Mint several AI messages from one log, so ids are distinct even
    /// within the same millisecond.
    fn ai_messages(texts: &[&str]) -> Vec<Message> {
        let mut state = ConversationState::new("standard", "business");
        for text in texts {
            state.push_ai_message(*text, "訳", Vec::new(), None);
        }
        state.messages
    }

    #[test]
    fn allow_listed_local_voice_wins_case_insensitively() {
        let voices = vec![
            voice("Kyoko", "ja-JP", true),
            voice("Generic English", "en-GB", true),
            voice("SAMANTHA", "en-US", true),
        ];
        let selected = select_voice(&voices, &SynthesisConfig::default());
        assert_eq!(selected.as_deref(), Some("SAMANTHA"));
    }

    #[test]
    fn remote_allow_listed_voice_is_skipped_for_local_english() {
        let voices = vec![
            voice("Samantha", "en-US", false),
            voice("Plain Local", "en-AU", true),
        ];
        let selected = select_voice(&voices, &SynthesisConfig::default());
        assert_eq!(selected.as_deref(), Some("Plain Local"));
    }

    #[test]
    fn any_language_match_is_the_last_resort_before_none() {
        let voices = vec![
            voice("Kyoko", "ja-JP", true),
            voice("Cloud English", "en-US", false),
        ];
        let selected = select_voice(&voices, &SynthesisConfig::default());
        assert_eq!(selected.as_deref(), Some("Cloud English"));

        let none = select_voice(&[voice("Kyoko", "ja-JP", true)], &SynthesisConfig::default());
        assert_eq!(none, None);
    }

    #[test]
    fn speak_always_cancels_first() {
        let (mut output, calls) = output_with(vec![], true);
        output.speak("One.");
        output.speak("Two.");

        let calls = calls.lock().unwrap();
        // cancel, speak, cancel, speak — a later request always wins.
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], Call::Cancel);
        assert!(matches!(&calls[1], Call::Speak(r) if r.text == "One."));
        assert_eq!(calls[2], Call::Cancel);
        assert!(matches!(&calls[3], Call::Speak(r) if r.text == "Two."));
    }

    #[test]
    fn announce_fires_at_most_once_per_message() {
        let (mut output, calls) = output_with(vec![], true);
        let message = ai_message("Hello there!");

        output.announce(&message);
        output.announce(&message);

        let spoken: Vec<_> = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Speak(_)))
            .cloned()
            .collect();
        assert_eq!(spoken.len(), 1);
    }

    #[test]
    fn full_log_re_render_never_re_speaks_earlier_messages() {
        let (mut output, calls) = output_with(vec![], true);
        let log = ai_messages(&["First message.", "Second message."]);

        // Initial render, then a full-log re-render — the pattern a
        // snapshot-based presentation layer produces on every change.
        for message in &log {
            output.announce(message);
        }
        for message in &log {
            output.announce(message);
        }

        let spoken: Vec<String> = calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Speak(r) => Some(r.text.clone()),
                Call::Cancel => None,
            })
            .collect();
        assert_eq!(spoken, vec!["First message.", "Second message."]);
    }

    #[test]
    fn announce_is_gated_until_interaction() {
        let (mut output, calls) = output_with(vec![], false);
        let message = ai_message("Hello there!");

        output.announce(&message);
        assert!(calls.lock().unwrap().is_empty());

        output.mark_user_interaction();
        output.announce(&message);
        assert!(!calls.lock().unwrap().is_empty());
    }

    #[test]
    fn rate_and_fixed_parameters_are_applied() {
        let (mut output, calls) = output_with(vec![], true);
        output.set_rate(5.0); // clamped
        output.speak("Check.");

        let calls = calls.lock().unwrap();
        let Call::Speak(request) = &calls[1] else {
            panic!("expected speak");
        };
        assert!((request.rate - 2.0).abs() < f32::EPSILON);
        assert!((request.pitch - 1.0).abs() < f32::EPSILON);
        assert!((request.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(request.language, "en-US");
        assert_eq!(request.voice, None);
    }
}
