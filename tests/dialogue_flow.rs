//! End-to-end dialogue engine tests against a scripted backend.
//!
//! These exercise the full orchestration loop: greeting, turn sequencing,
//! degraded fallbacks, asynchronous translation patching, and the two
//! content-injection paths (topical headlines and triggered web search).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use eikaiwa::backend::offline::OfflineBackend;
use eikaiwa::backend::{
    ContentGreeting, Direction, GreetingReply, LanguageBackend, TurnReply, fallback,
};
use eikaiwa::dialogue::DialogueEngine;
use eikaiwa::dialogue::events::{UiEvent, UiIntent};
use eikaiwa::dialogue::state::{ContentItem, ContentSource, Message, ReplySuggestion, Sender};
use eikaiwa::error::{EngineError, Result};
use eikaiwa::{AssistantConfig, PreferenceStore};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

// ────────────────────────────────────────────────────────────────────────────
// Scripted backend
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic backend for engine tests. Replies echo the utterance,
/// headline batches are tagged with the requested topic label, and delays
/// run on (paused) tokio time.
#[derive(Default)]
struct ScriptedBackend {
    fail_greeting: bool,
    fail_replies: bool,
    trigger_search: bool,
    headlines_per_topic: usize,
    search_results: Vec<ContentItem>,
    user_translation: Option<String>,
    reply_delay_ms: u64,
    search_delay_ms: u64,
    active_replies: AtomicUsize,
    overlapped: AtomicBool,
    headline_topics: Mutex<Vec<String>>,
}

fn item(title: &str) -> ContentItem {
    ContentItem {
        title: title.to_owned(),
        summary: format!("Summary of {title}."),
        uri: format!("https://example.com/{}", title.replace(' ', "-")),
        japanese_title: format!("{title} (ja)"),
        japanese_summary: "要約".to_owned(),
    }
}

#[async_trait::async_trait]
impl LanguageBackend for ScriptedBackend {
    async fn initial_greeting(&self, _persona_instruction: &str) -> Result<GreetingReply> {
        if self.fail_greeting {
            return Err(EngineError::Backend("scripted greeting failure".into()));
        }
        Ok(GreetingReply {
            english: "Hello! Ready to practice?".into(),
            japanese: "こんにちは！練習しましょう。".into(),
            suggestions: vec![ReplySuggestion {
                english: "Yes, let's go!".into(),
                japanese: "はい、始めましょう！".into(),
            }],
        })
    }

    async fn per_turn_reply(
        &self,
        _history: &[Message],
        utterance: &str,
        _persona_instruction: &str,
        _topic_instruction: &str,
    ) -> Result<TurnReply> {
        if self.active_replies.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(self.reply_delay_ms)).await;
        self.active_replies.fetch_sub(1, Ordering::SeqCst);

        if self.fail_replies {
            return Err(EngineError::Backend("scripted reply failure".into()));
        }
        Ok(TurnReply {
            english: format!("You said: {utterance}"),
            japanese: "返事".into(),
            suggestions: Vec::new(),
            trigger_search: self.trigger_search,
        })
    }

    async fn topical_headlines(&self, topic_label: &str) -> Result<Vec<ContentItem>> {
        self.headline_topics
            .lock()
            .unwrap()
            .push(topic_label.to_owned());
        Ok((0..self.headlines_per_topic)
            .map(|i| item(&format!("{topic_label} story {i}")))
            .collect())
    }

    async fn greeting_for_content(
        &self,
        item: &ContentItem,
        _persona_instruction: &str,
    ) -> Result<ContentGreeting> {
        Ok(ContentGreeting {
            english: format!("Let's talk about \"{}\".", item.title),
            japanese: "この記事について話しましょう。".into(),
            suggestions: Vec::new(),
            source: ContentSource {
                uri: item.uri.clone(),
                title: item.title.clone(),
            },
        })
    }

    async fn web_search(&self, _query: &str) -> Result<Vec<ContentItem>> {
        tokio::time::sleep(Duration::from_millis(self.search_delay_ms)).await;
        Ok(self.search_results.clone())
    }

    async fn translate(&self, text: &str, direction: Direction) -> Result<String> {
        match direction {
            Direction::EnglishToJapanese => Ok(self
                .user_translation
                .clone()
                .unwrap_or_default()),
            Direction::JapaneseToEnglish => Ok(format!("English for: {text}")),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

struct Harness {
    handle: eikaiwa::DialogueHandle,
    events: broadcast::Receiver<UiEvent>,
}

fn spawn_engine(backend: impl LanguageBackend + 'static) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let prefs = PreferenceStore::open(dir.path().join("prefs.toml"));
    let (engine, handle) = DialogueEngine::new(
        AssistantConfig::default(),
        std::sync::Arc::new(backend),
        prefs,
    );
    let events = handle.subscribe();
    tokio::spawn(engine.run());
    Harness { handle, events }
}

impl Harness {
    async fn next_event(&mut self) -> UiEvent {
        tokio::time::timeout(Duration::from_secs(30), self.events.recv())
            .await
            .expect("timed out waiting for an engine event")
            .expect("engine closed its event channel")
    }

    /// Consume events until `pred` matches, returning the matching event.
    async fn wait_for(&mut self, mut pred: impl FnMut(&UiEvent) -> bool) -> UiEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Wait for the startup greeting to fully land.
    async fn wait_for_greeting(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        self.wait_for(|e| {
            if let UiEvent::ConversationChanged(m) = e {
                messages = m.clone();
                true
            } else {
                false
            }
        })
        .await;
        self.wait_for(|e| matches!(e, UiEvent::LoadingChanged(false)))
            .await;
        messages
    }

    /// Submit an utterance and run the turn to completion, returning the
    /// final message log of the turn.
    async fn run_turn(&mut self, text: &str) -> Vec<Message> {
        self.handle
            .dispatch(UiIntent::SubmitUtterance(text.to_owned()))
            .unwrap();
        let mut messages = Vec::new();
        loop {
            match self.next_event().await {
                UiEvent::ConversationChanged(m) => messages = m,
                UiEvent::LoadingChanged(false) => return messages,
                _ => {}
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Greeting and degraded modes
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn greeting_opens_the_conversation() {
    let mut h = spawn_engine(ScriptedBackend::default());
    let messages = h.wait_for_greeting().await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::Ai);
    assert_eq!(messages[0].english_text, "Hello! Ready to practice?");
    assert!(messages[0].japanese_text.is_some());
    assert_eq!(messages[0].reply_suggestions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn greeting_failure_degrades_to_fixed_text() {
    let mut h = spawn_engine(ScriptedBackend {
        fail_greeting: true,
        ..Default::default()
    });
    let messages = h.wait_for_greeting().await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].english_text, "Hello! How are you doing today?");
    assert_eq!(messages[0].reply_suggestions.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn offline_backend_runs_the_whole_demo_flow() {
    let mut h = spawn_engine(OfflineBackend);
    let messages = h.wait_for_greeting().await;
    assert!(messages[0].english_text.contains("demo mode"));

    let messages = h.run_turn("Hello there").await;
    assert_eq!(messages.len(), 3);
    assert!(messages[2].english_text.contains("demo mode"));

    // Draft translation degrades to the fixed marker.
    let draft = h.handle.translate_draft("おはようございます").await;
    assert_eq!(draft, fallback::TRANSLATION_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn reply_failure_appends_apology_and_recovers() {
    let mut h = spawn_engine(ScriptedBackend {
        fail_replies: true,
        ..Default::default()
    });
    h.wait_for_greeting().await;

    let messages = h.run_turn("This will fail").await;
    assert_eq!(messages.len(), 3);
    let apology = &messages[2];
    assert!(apology.english_text.contains("I'm sorry, I encountered an error"));
    assert!(apology.reply_suggestions.is_empty());

    // The engine is back to idle: the next turn is accepted and appends in
    // order after the apology.
    let messages = h.run_turn("Still talking").await;
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[3].english_text, "Still talking");
}

// ────────────────────────────────────────────────────────────────────────────
// Turn sequencing and ordering
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rapid_submits_run_strictly_sequentially() {
    let backend = std::sync::Arc::new(ScriptedBackend {
        reply_delay_ms: 200,
        ..Default::default()
    });
    let dir = tempfile::tempdir().expect("tempdir");
    let prefs = PreferenceStore::open(dir.path().join("prefs.toml"));
    let (engine, handle) = DialogueEngine::new(
        AssistantConfig::default(),
        std::sync::Arc::clone(&backend) as std::sync::Arc<dyn LanguageBackend>,
        prefs,
    );
    let events = handle.subscribe();
    tokio::spawn(engine.run());
    let mut h = Harness {
        handle: handle.clone(),
        events,
    };

    h.wait_for_greeting().await;
    handle
        .dispatch(UiIntent::SubmitUtterance("first".into()))
        .unwrap();
    handle
        .dispatch(UiIntent::SubmitUtterance("second".into()))
        .unwrap();

    // Run both turns to completion.
    let mut messages = Vec::new();
    let mut turns_done = 0;
    while turns_done < 2 {
        match h.next_event().await {
            UiEvent::ConversationChanged(m) => messages = m,
            UiEvent::LoadingChanged(false) => turns_done += 1,
            _ => {}
        }
    }

    assert!(!backend.overlapped.load(Ordering::SeqCst));
    let texts: Vec<&str> = messages.iter().map(|m| m.english_text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Hello! Ready to practice?",
            "first",
            "You said: first",
            "second",
            "You said: second",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn blank_utterances_are_ignored() {
    let mut h = spawn_engine(ScriptedBackend::default());
    h.wait_for_greeting().await;

    h.handle
        .dispatch(UiIntent::SubmitUtterance("   ".into()))
        .unwrap();
    let messages = h.run_turn("real one").await;

    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].english_text, "real one");
}

#[tokio::test(start_paused = true)]
async fn user_translation_patches_in_place_without_reordering() {
    let mut h = spawn_engine(ScriptedBackend {
        user_translation: Some("こんにちは、世界".into()),
        ..Default::default()
    });
    h.wait_for_greeting().await;

    let messages = h.run_turn("Hello world").await;
    let ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();

    // The detached translation lands after the turn and patches the user
    // message in place.
    let patched = h
        .wait_for(|e| {
            matches!(e, UiEvent::ConversationChanged(m)
                if m[1].japanese_text.is_some())
        })
        .await;
    let UiEvent::ConversationChanged(patched) = patched else {
        unreachable!()
    };
    assert_eq!(patched[1].japanese_text.as_deref(), Some("こんにちは、世界"));
    let patched_ids: Vec<_> = patched.iter().map(|m| m.id.clone()).collect();
    assert_eq!(patched_ids, ids);
}

// ────────────────────────────────────────────────────────────────────────────
// Topical content injection
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn topical_selector_is_offered_exactly_at_the_trigger_length() {
    let mut h = spawn_engine(ScriptedBackend {
        headlines_per_topic: 3,
        ..Default::default()
    });
    h.wait_for_greeting().await;

    // Turns 1 and 2: no offer yet.
    h.run_turn("one").await;
    h.run_turn("two").await;

    // Turn 3 brings the pre-reply history to the trigger length.
    h.handle
        .dispatch(UiIntent::SubmitUtterance("three".into()))
        .unwrap();
    let offered = h
        .wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: true, .. }))
        .await;
    let UiEvent::TopicalSelectorChanged { items, .. } = offered else {
        unreachable!()
    };
    assert_eq!(items.len(), 3);
    // Default topic is business.
    assert!(items[0].title.starts_with("Business & Economy"));
}

#[tokio::test(start_paused = true)]
async fn submitting_past_the_offer_consumes_the_batch() {
    let mut h = spawn_engine(ScriptedBackend {
        headlines_per_topic: 2,
        ..Default::default()
    });
    h.wait_for_greeting().await;
    h.run_turn("one").await;
    h.run_turn("two").await;
    h.run_turn("three").await;

    // Ignoring the offer dismisses it for good.
    h.handle
        .dispatch(UiIntent::SubmitUtterance("four".into()))
        .unwrap();
    h.wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: false, .. }))
        .await;
    h.wait_for(|e| matches!(e, UiEvent::LoadingChanged(false)))
        .await;

    // Nothing re-offers it on later turns.
    h.run_turn("five").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, UiEvent::TopicalSelectorChanged { visible: true, .. }),
            "topical selector must not be re-offered after dismissal"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn selecting_a_headline_injects_a_sourced_greeting() {
    let mut h = spawn_engine(ScriptedBackend {
        headlines_per_topic: 1,
        ..Default::default()
    });
    h.wait_for_greeting().await;
    h.run_turn("one").await;
    h.run_turn("two").await;

    h.handle
        .dispatch(UiIntent::SubmitUtterance("three".into()))
        .unwrap();
    let offered = h
        .wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: true, .. }))
        .await;
    let UiEvent::TopicalSelectorChanged { items, .. } = offered else {
        unreachable!()
    };
    h.wait_for(|e| matches!(e, UiEvent::LoadingChanged(false)))
        .await;

    h.handle
        .dispatch(UiIntent::SelectContentItem(items[0].clone()))
        .unwrap();
    h.wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: false, .. }))
        .await;
    let mut messages = Vec::new();
    loop {
        match h.next_event().await {
            UiEvent::ConversationChanged(m) => messages = m,
            UiEvent::LoadingChanged(false) => break,
            _ => {}
        }
    }

    let injected = messages.last().unwrap();
    assert_eq!(injected.sender, Sender::Ai);
    assert!(injected.english_text.contains(&items[0].title));
    assert_eq!(
        injected.content_source.as_ref().map(|s| s.uri.as_str()),
        Some(items[0].uri.as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn one_batch_yields_at_most_one_injection() {
    let mut h = spawn_engine(ScriptedBackend {
        headlines_per_topic: 2,
        ..Default::default()
    });
    h.wait_for_greeting().await;
    h.run_turn("one").await;
    h.run_turn("two").await;

    h.handle
        .dispatch(UiIntent::SubmitUtterance("three".into()))
        .unwrap();
    let offered = h
        .wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: true, .. }))
        .await;
    let UiEvent::TopicalSelectorChanged { items, .. } = offered else {
        unreachable!()
    };
    h.wait_for(|e| matches!(e, UiEvent::LoadingChanged(false)))
        .await;

    // Two selections queued back to back: the second arrives after the
    // batch was consumed and must inject nothing.
    h.handle
        .dispatch(UiIntent::SelectContentItem(items[0].clone()))
        .unwrap();
    h.handle
        .dispatch(UiIntent::SelectContentItem(items[1].clone()))
        .unwrap();
    let mut messages = Vec::new();
    loop {
        match h.next_event().await {
            UiEvent::ConversationChanged(m) => messages = m,
            UiEvent::LoadingChanged(false) => break,
            _ => {}
        }
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    while let Ok(event) = h.events.try_recv() {
        if let UiEvent::ConversationChanged(m) = event {
            messages = m;
        }
    }

    let injected: Vec<_> = messages
        .iter()
        .filter(|m| m.content_source.is_some())
        .collect();
    assert_eq!(injected.len(), 1);
    assert!(injected[0].english_text.contains(&items[0].title));
}

#[tokio::test(start_paused = true)]
async fn topic_change_discards_stale_headline_batches() {
    let backend = std::sync::Arc::new(ScriptedBackend {
        headlines_per_topic: 2,
        ..Default::default()
    });
    let dir = tempfile::tempdir().expect("tempdir");
    let prefs = PreferenceStore::open(dir.path().join("prefs.toml"));
    let (engine, handle) = DialogueEngine::new(
        AssistantConfig::default(),
        std::sync::Arc::clone(&backend) as std::sync::Arc<dyn LanguageBackend>,
        prefs,
    );
    let events = handle.subscribe();
    tokio::spawn(engine.run());
    let mut h = Harness {
        handle: handle.clone(),
        events,
    };
    h.wait_for_greeting().await;

    // Two rapid topic changes: the science batch arrives for a topic the
    // user has already left and must be dropped.
    handle.dispatch(UiIntent::SetTopic("science".into())).unwrap();
    handle.dispatch(UiIntent::SetTopic("culture".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.run_turn("one").await;
    h.run_turn("two").await;
    h.handle
        .dispatch(UiIntent::SubmitUtterance("three".into()))
        .unwrap();
    let offered = h
        .wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: true, .. }))
        .await;
    let UiEvent::TopicalSelectorChanged { items, .. } = offered else {
        unreachable!()
    };
    assert!(items[0].title.starts_with("Culture & Lifestyle"));

    let topics = backend.headline_topics.lock().unwrap().clone();
    assert_eq!(
        topics,
        vec!["Business & Economy", "Science & Technology", "Culture & Lifestyle"]
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Triggered web search
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn triggered_search_offers_results_without_blocking_the_turn() {
    let mut h = spawn_engine(ScriptedBackend {
        trigger_search: true,
        search_delay_ms: 300,
        search_results: vec![item("Deep dive")],
        ..Default::default()
    });
    h.wait_for_greeting().await;

    h.handle
        .dispatch(UiIntent::SubmitUtterance("tell me about rust".into()))
        .unwrap();

    // The turn completes while the search is still in flight.
    let mut saw_searching = false;
    loop {
        match h.next_event().await {
            UiEvent::SearchingChanged(true) => saw_searching = true,
            UiEvent::LoadingChanged(false) => break,
            _ => {}
        }
    }
    assert!(saw_searching);

    h.wait_for(|e| matches!(e, UiEvent::SearchingChanged(false)))
        .await;
    let offered = h
        .wait_for(|e| matches!(e, UiEvent::SearchSelectorChanged { visible: true, .. }))
        .await;
    let UiEvent::SearchSelectorChanged { items, .. } = offered else {
        unreachable!()
    };
    assert_eq!(items[0].title, "Deep dive");
}

#[tokio::test(start_paused = true)]
async fn empty_search_results_never_offer_a_selector() {
    let mut h = spawn_engine(ScriptedBackend {
        trigger_search: true,
        search_results: Vec::new(),
        ..Default::default()
    });
    h.wait_for_greeting().await;
    h.run_turn("anything").await;

    h.wait_for(|e| matches!(e, UiEvent::SearchingChanged(false)))
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(
            event,
            UiEvent::SearchSelectorChanged { visible: true, .. }
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn search_results_are_discarded_while_the_topical_offer_is_up() {
    let mut h = spawn_engine(ScriptedBackend {
        headlines_per_topic: 2,
        trigger_search: true,
        search_delay_ms: 300,
        search_results: vec![item("Late arrival")],
        ..Default::default()
    });
    h.wait_for_greeting().await;
    h.run_turn("one").await;
    h.run_turn("two").await;

    // Turn 3 both triggers a search and puts the topical offer on screen;
    // the late search completion must not stack a second selector.
    h.handle
        .dispatch(UiIntent::SubmitUtterance("three".into()))
        .unwrap();
    h.wait_for(|e| matches!(e, UiEvent::TopicalSelectorChanged { visible: true, .. }))
        .await;
    h.wait_for(|e| matches!(e, UiEvent::LoadingChanged(false)))
        .await;
    h.wait_for(|e| matches!(e, UiEvent::SearchingChanged(false)))
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(
            event,
            UiEvent::SearchSelectorChanged { visible: true, .. }
        ));
    }
}
