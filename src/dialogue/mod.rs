//! The dialogue engine: conversation state, turn sequencing, and content
//! injection.
//!
//! The engine is an actor. Presentation code dispatches [`UiIntent`]s
//! through a [`DialogueHandle`] and re-renders from the [`UiEvent`]
//! broadcast. Per-turn reply generation is strictly sequential — the loop
//! awaits the backend inline, so a second turn can never start while one is
//! outstanding — while user-message translation and triggered web searches
//! run as detached tasks that post their completions back into the loop.

pub mod events;
pub mod persona;
pub mod state;

use crate::backend::{Direction, LanguageBackend, fallback};
use crate::config::AssistantConfig;
use crate::dialogue::events::{UiEvent, UiIntent};
use crate::dialogue::persona::OptionKind;
use crate::dialogue::state::{ContentItem, ConversationState, MessageId};
use crate::error::{EngineError, Result};
use crate::prefs::PreferenceStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broadcast buffer for UI events.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Completions posted back into the engine loop by detached tasks.
#[derive(Debug)]
enum TaskEvent {
    /// Best-effort translation for a user message resolved.
    TranslationReady { id: MessageId, japanese: String },
    /// A topical headline fetch finished (empty on failure).
    HeadlinesFetched { topic: String, items: Vec<ContentItem> },
    /// A triggered background search finished (empty on failure).
    SearchFinished { items: Vec<ContentItem> },
}

/// Cheap handle for dispatching intents and subscribing to events.
#[derive(Clone)]
pub struct DialogueHandle {
    intents: mpsc::UnboundedSender<UiIntent>,
    events: broadcast::Sender<UiEvent>,
    backend: Arc<dyn LanguageBackend>,
}

impl DialogueHandle {
    /// Dispatch a user intent to the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has shut down.
    pub fn dispatch(&self, intent: UiIntent) -> Result<()> {
        self.intents
            .send(intent)
            .map_err(|_| EngineError::Channel("dialogue engine has shut down".to_owned()))
    }

    /// Subscribe to state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Translate a Japanese draft into a sendable English phrase
    /// (compose-assist glue; not part of the turn sequence).
    ///
    /// Failures degrade to the fixed unavailable marker.
    pub async fn translate_draft(&self, japanese: &str) -> String {
        if japanese.trim().is_empty() {
            return String::new();
        }
        match self
            .backend
            .translate(japanese, Direction::JapaneseToEnglish)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "draft translation failed");
                fallback::TRANSLATION_UNAVAILABLE.to_owned()
            }
        }
    }
}

/// Owns the conversation and orchestrates all backend calls.
pub struct DialogueEngine {
    backend: Arc<dyn LanguageBackend>,
    prefs: PreferenceStore,
    config: AssistantConfig,
    state: ConversationState,
    intents: mpsc::UnboundedReceiver<UiIntent>,
    tasks_tx: mpsc::UnboundedSender<TaskEvent>,
    tasks_rx: mpsc::UnboundedReceiver<TaskEvent>,
    events: broadcast::Sender<UiEvent>,
    cancel: CancellationToken,
}

impl DialogueEngine {
    /// Build an engine and its handle.
    ///
    /// The initial persona is `standard` and the initial topic `business`,
    /// matching the product defaults.
    pub fn new(
        config: AssistantConfig,
        backend: Arc<dyn LanguageBackend>,
        prefs: PreferenceStore,
    ) -> (Self, DialogueHandle) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let handle = DialogueHandle {
            intents: intent_tx,
            events: event_tx.clone(),
            backend: Arc::clone(&backend),
        };
        let engine = Self {
            backend,
            prefs,
            config,
            state: ConversationState::new("standard", "business"),
            intents: intent_rx,
            tasks_tx,
            tasks_rx,
            events: event_tx,
            cancel: CancellationToken::new(),
        };
        (engine, handle)
    }

    /// Token that stops the engine loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the engine: greet, then process intents and task completions
    /// until all handles are dropped or the token is cancelled.
    pub async fn run(mut self) {
        self.fetch_headlines(self.state.topic.clone());
        self.greet().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("dialogue engine cancelled");
                    break;
                }
                intent = self.intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent).await,
                    None => break,
                },
                task = self.tasks_rx.recv() => {
                    // tasks_tx is held by the engine itself, so this arm
                    // never sees a closed channel while the loop runs.
                    if let Some(task) = task {
                        self.handle_task(task);
                    }
                }
            }
        }
    }

    /// INIT → AWAITING_GREETING → IDLE: open the conversation with one AI
    /// message, falling back to the fixed greeting on failure.
    async fn greet(&mut self) {
        self.emit(UiEvent::LoadingChanged(true));
        let persona = self.persona_instruction();
        let greeting = match self.backend.initial_greeting(&persona).await {
            Ok(greeting) => greeting,
            Err(e) => {
                warn!(error = %e, "greeting request failed — using fallback");
                fallback::failed_greeting()
            }
        };
        self.state.push_ai_message(
            greeting.english,
            greeting.japanese,
            greeting.suggestions,
            None,
        );
        self.emit_conversation();
        self.emit(UiEvent::LoadingChanged(false));
    }

    async fn handle_intent(&mut self, intent: UiIntent) {
        match intent {
            UiIntent::SubmitUtterance(text) => self.submit_utterance(text).await,
            UiIntent::SelectContentItem(item) => self.select_content_item(item).await,
            UiIntent::SetPersona(value) => {
                debug!(persona = value.as_str(), "persona changed");
                self.state.persona = value;
            }
            UiIntent::SetTopic(value) => self.set_topic(value),
            UiIntent::AddCustomOption { kind, label } => {
                if let Err(e) = self.prefs.add_custom_option(kind, &label) {
                    warn!(error = %e, "failed to add custom option");
                }
            }
            UiIntent::DeleteCustomOption { kind, id } => {
                if let Err(e) = self.prefs.delete_custom_option(kind, &id) {
                    warn!(error = %e, "failed to delete custom option");
                }
            }
        }
    }

    /// IDLE → AWAITING_REPLY → IDLE. One full turn: optimistic user append,
    /// detached translation, sequential reply call, trigger evaluation.
    async fn submit_utterance(&mut self, text: String) {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }

        // A new message supersedes any offered content. The topical batch
        // gets its one offer only.
        if self.state.topical_selector_visible {
            self.state.topical_selector_visible = false;
            self.state.headlines.clear();
            self.state.topical_batch_consumed = true;
            self.emit(UiEvent::TopicalSelectorChanged {
                visible: false,
                items: Vec::new(),
            });
        }
        if self.state.search_selector_visible {
            self.state.search_selector_visible = false;
            self.state.search_results.clear();
            self.emit(UiEvent::SearchSelectorChanged {
                visible: false,
                items: Vec::new(),
            });
        }

        let user_id = self.state.push_user_message(text.clone());
        self.emit_conversation();
        self.state.awaiting_reply = true;
        self.emit(UiEvent::LoadingChanged(true));

        // Best-effort gloss of the user's utterance; applied when/if it
        // resolves, without blocking the turn.
        self.translate_user_message(user_id, text.clone());

        // History snapshot taken at issue time: includes the just-appended
        // user message, excludes anything appended later.
        let history = self.state.messages.clone();
        let persona = self.persona_instruction();
        let topic = self.topic_instruction();

        let reply = match self
            .backend
            .per_turn_reply(&history, &text, &persona, &topic)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply request failed — using apology fallback");
                fallback::apology_reply()
            }
        };

        self.state
            .push_ai_message(reply.english, reply.japanese, reply.suggestions, None);
        self.state.awaiting_reply = false;
        self.emit_conversation();

        // Offer the topical selector exactly when this turn brought the
        // conversation to the trigger length (greeting + 3 user turns).
        if history.len() == self.config.conversation.topical_trigger_count
            && !self.state.headlines.is_empty()
            && !self.state.topical_batch_consumed
            && !self.state.search_selector_visible
        {
            self.state.topical_selector_visible = true;
            self.emit(UiEvent::TopicalSelectorChanged {
                visible: true,
                items: self.state.headlines.clone(),
            });
        }

        if reply.trigger_search && !self.state.awaiting_search {
            self.start_background_search(text);
        }

        self.emit(UiEvent::LoadingChanged(false));
    }

    /// Content selection: one dedicated request, one appended AI message.
    async fn select_content_item(&mut self, item: ContentItem) {
        // A selection queued behind another one arrives after its batch was
        // consumed; one batch gets one injection.
        if !self.state.headlines.contains(&item) && !self.state.search_results.contains(&item) {
            debug!(title = item.title.as_str(), "ignoring selection from a consumed batch");
            return;
        }

        // Consume the candidate lists before the call so a stale selector
        // can never be re-offered.
        let topical_was_visible = self.state.topical_selector_visible;
        let search_was_visible = self.state.search_selector_visible;
        self.state.topical_selector_visible = false;
        self.state.search_selector_visible = false;
        self.state.headlines.clear();
        self.state.search_results.clear();
        self.state.topical_batch_consumed = true;
        if topical_was_visible {
            self.emit(UiEvent::TopicalSelectorChanged {
                visible: false,
                items: Vec::new(),
            });
        }
        if search_was_visible {
            self.emit(UiEvent::SearchSelectorChanged {
                visible: false,
                items: Vec::new(),
            });
        }

        self.state.awaiting_reply = true;
        self.emit(UiEvent::LoadingChanged(true));

        let persona = self.persona_instruction();
        let greeting = match self.backend.greeting_for_content(&item, &persona).await {
            Ok(greeting) => greeting,
            Err(e) => {
                warn!(error = %e, "content greeting failed — using fallback");
                fallback::content_greeting_fallback(&item)
            }
        };

        self.state.push_ai_message(
            greeting.english,
            greeting.japanese,
            greeting.suggestions,
            Some(greeting.source),
        );
        self.state.awaiting_reply = false;
        self.emit_conversation();
        self.emit(UiEvent::LoadingChanged(false));
    }

    /// Topic changes invalidate the candidate list and re-fetch it. Past
    /// messages are untouched.
    fn set_topic(&mut self, value: String) {
        if value == self.state.topic {
            return;
        }
        info!(topic = value.as_str(), "topic changed");
        self.state.topic = value.clone();
        self.state.headlines.clear();
        self.state.topical_batch_consumed = false;
        if self.state.topical_selector_visible {
            self.state.topical_selector_visible = false;
            self.emit(UiEvent::TopicalSelectorChanged {
                visible: false,
                items: Vec::new(),
            });
        }
        self.fetch_headlines(value);
    }

    /// Detached headline fetch; failures yield an empty batch.
    fn fetch_headlines(&self, topic: String) {
        let backend = Arc::clone(&self.backend);
        let tasks = self.tasks_tx.clone();
        let label = persona::topic_label(
            &topic,
            self.prefs.get().custom_options(OptionKind::Topic),
        )
        .to_owned();
        tokio::spawn(async move {
            let items = match backend.topical_headlines(&label).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "headline fetch failed");
                    Vec::new()
                }
            };
            tasks.send(TaskEvent::HeadlinesFetched { topic, items }).ok();
        });
    }

    /// Detached background search. Runs concurrently with the next turn;
    /// failures are swallowed and simply produce no selector.
    fn start_background_search(&mut self, query: String) {
        self.state.awaiting_search = true;
        self.emit(UiEvent::SearchingChanged(true));
        let backend = Arc::clone(&self.backend);
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            let items = match backend.web_search(&query).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "background search failed");
                    Vec::new()
                }
            };
            tasks.send(TaskEvent::SearchFinished { items }).ok();
        });
    }

    /// Detached best-effort translation of a user message.
    fn translate_user_message(&self, id: MessageId, text: String) {
        let backend = Arc::clone(&self.backend);
        let tasks = self.tasks_tx.clone();
        tokio::spawn(async move {
            match backend.translate(&text, Direction::EnglishToJapanese).await {
                Ok(japanese)
                    if !japanese.trim().is_empty()
                        && japanese != fallback::TRANSLATION_UNAVAILABLE =>
                {
                    tasks.send(TaskEvent::TranslationReady { id, japanese }).ok();
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "user message translation failed"),
            }
        });
    }

    fn handle_task(&mut self, task: TaskEvent) {
        match task {
            TaskEvent::TranslationReady { id, japanese } => {
                self.state = self.state.with_translation(&id, &japanese);
                self.emit_conversation();
            }
            TaskEvent::HeadlinesFetched { topic, items } => {
                // Discard fetches for a topic the user has already left.
                if topic != self.state.topic {
                    debug!(topic = topic.as_str(), "discarding stale headline batch");
                    return;
                }
                info!(count = items.len(), "headline batch ready");
                self.state.headlines = items;
            }
            TaskEvent::SearchFinished { items } => {
                self.state.awaiting_search = false;
                self.emit(UiEvent::SearchingChanged(false));
                // Current-state gate only: results are applied as long as no
                // reply is pending and no topical offer is on screen.
                if !items.is_empty()
                    && !self.state.awaiting_reply
                    && !self.state.topical_selector_visible
                {
                    self.state.search_results = items.clone();
                    self.state.search_selector_visible = true;
                    self.emit(UiEvent::SearchSelectorChanged {
                        visible: true,
                        items,
                    });
                }
            }
        }
    }

    fn persona_instruction(&self) -> String {
        persona::persona_instruction(
            &self.state.persona,
            self.prefs.get().custom_options(OptionKind::Persona),
        )
        .to_owned()
    }

    fn topic_instruction(&self) -> String {
        persona::topic_instruction(
            &self.state.topic,
            self.prefs.get().custom_options(OptionKind::Topic),
        )
    }

    fn emit_conversation(&self) {
        self.emit(UiEvent::ConversationChanged(self.state.messages.clone()));
    }

    fn emit(&self, event: UiEvent) {
        // No receivers is fine; events are advisory.
        self.events.send(event).ok();
    }
}
