//! Events emitted by the dialogue engine and intents consumed by it.
//!
//! The presentation layer never touches conversation state directly: it
//! dispatches [`UiIntent`]s and re-renders from [`UiEvent`] snapshots.

use crate::dialogue::persona::OptionKind;
use crate::dialogue::state::{ContentItem, Message};

/// User intents forwarded by the presentation layer.
#[derive(Debug, Clone)]
pub enum UiIntent {
    /// The user submitted an utterance (typed or finalized speech).
    SubmitUtterance(String),
    /// The user picked an offered content item.
    SelectContentItem(ContentItem),
    /// Change the active persona. Honored only while idle.
    SetPersona(String),
    /// Change the active topic. Honored only while idle; invalidates and
    /// re-fetches the topical candidate list.
    SetTopic(String),
    /// Add a user-defined persona/topic option.
    AddCustomOption {
        /// Which selector the option belongs to.
        kind: OptionKind,
        /// Free-form label text.
        label: String,
    },
    /// Delete a user-defined option by id.
    DeleteCustomOption {
        /// Which selector the option belongs to.
        kind: OptionKind,
        /// Id of the option to remove.
        id: String,
    },
}

/// State-change notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// The message log changed; payload is the full ordered log.
    ConversationChanged(Vec<Message>),
    /// Whether a per-turn reply (or greeting) is outstanding.
    LoadingChanged(bool),
    /// Whether a background web search is outstanding.
    SearchingChanged(bool),
    /// Topical (news) selector visibility and candidates.
    TopicalSelectorChanged {
        /// Selector visibility.
        visible: bool,
        /// Candidate items (empty when hidden).
        items: Vec<ContentItem>,
    },
    /// Web-search selector visibility and candidates.
    SearchSelectorChanged {
        /// Selector visibility.
        visible: bool,
        /// Candidate items (empty when hidden).
        items: Vec<ContentItem>,
    },
}
