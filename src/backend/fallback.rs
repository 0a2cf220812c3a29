//! Fixed bilingual texts for the two degraded modes.
//!
//! Demo-mode texts are returned when no backend is configured; failure
//! texts replace individual calls that error against a configured backend.
//! Either way the user always sees a plausible bilingual message, never an
//! error screen.

use crate::backend::{ContentGreeting, GreetingReply, TurnReply};
use crate::dialogue::state::{ContentItem, ContentSource, ReplySuggestion};

fn suggestion(english: &str, japanese: &str) -> ReplySuggestion {
    ReplySuggestion {
        english: english.to_owned(),
        japanese: japanese.to_owned(),
    }
}

/// Demo-mode greeting (no API key configured). Always exactly 3 suggestions.
pub fn demo_greeting() -> GreetingReply {
    GreetingReply {
        english: "Hello! I'm working in demo mode. Please set up your API key to unlock full \
                  conversation features. How are you today?"
            .to_owned(),
        japanese: "こんにちは！現在デモモードで動作しています。完全な会話機能を利用するには、\
                   APIキーを設定してください。今日の調子はどうですか？"
            .to_owned(),
        suggestions: vec![
            suggestion("I'm doing great!", "元気です！"),
            suggestion("How do I set up the API key?", "APIキーの設定方法は？"),
            suggestion("Tell me more about this app.", "このアプリについて教えて。"),
        ],
    }
}

/// Demo-mode per-turn reply (no API key configured).
pub fn demo_turn_reply() -> TurnReply {
    TurnReply {
        english: "I'm in demo mode. To have real conversations, please configure your API key."
            .to_owned(),
        japanese: "デモモードです。実際の会話を楽しむには、APIキーを設定してください。".to_owned(),
        suggestions: vec![
            suggestion("I understand.", "わかりました。"),
            suggestion("Where can I get an API key?", "APIキーはどこで入手できますか？"),
            suggestion("Is there a guide?", "ガイドはありますか？"),
        ],
        trigger_search: false,
    }
}

/// Greeting used when the greeting request fails against a configured backend.
pub fn failed_greeting() -> GreetingReply {
    GreetingReply {
        english: "Hello! How are you doing today?".to_owned(),
        japanese: "こんにちは！今日の調子はどうですか？".to_owned(),
        suggestions: vec![
            suggestion("I'm doing great!", "元気です！"),
            suggestion("Not too bad.", "まあまあです。"),
            suggestion("A little tired.", "少し疲れています。"),
        ],
    }
}

/// Generic bilingual apology used when reply generation fails. Suggestions
/// are intentionally empty.
pub fn apology_reply() -> TurnReply {
    TurnReply {
        english: "I'm sorry, I encountered an error. Please try again.".to_owned(),
        japanese: "申し訳ありませんが、エラーが発生しました。もう一度お試しください。".to_owned(),
        suggestions: Vec::new(),
        trigger_search: false,
    }
}

/// Greeting used when content-based greeting generation is unavailable or
/// fails. Keeps the conversation moving by asking about the topic at large.
pub fn content_greeting_fallback(item: &ContentItem) -> ContentGreeting {
    ContentGreeting {
        english: format!(
            "I was just looking at an article titled \"{}\", but I'm having a little trouble \
             formulating my thoughts. What do you think about this topic in general?",
            item.title
        ),
        japanese: format!(
            "「{}」という記事を見ていたのですが、ちょっと考えがまとまりません。\
             このトピック全般についてどう思いますか？",
            item.title
        ),
        suggestions: vec![
            suggestion("It's an interesting topic.", "面白いトピックですね。"),
            suggestion("I don't know much about it.", "それについてはあまり知りません。"),
            suggestion("Can you tell me more?", "もっと詳しく教えてくれますか？"),
        ],
        source: ContentSource {
            uri: item.uri.clone(),
            title: item.title.clone(),
        },
    }
}

/// Marker text returned when translation is unavailable.
pub const TRANSLATION_UNAVAILABLE: &str = "Translation failed.";
