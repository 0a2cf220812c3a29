//! Headless REPL for the conversation engine.
//!
//! A thin presentation layer over [`DialogueEngine`]: plain input lines are
//! submitted as utterances, slash commands drive the selectors, and engine
//! events render as text. Useful for exercising the orchestration core
//! without a UI.

use clap::Parser;
use eikaiwa::dialogue::events::{UiEvent, UiIntent};
use eikaiwa::dialogue::persona::OptionKind;
use eikaiwa::dialogue::state::{ContentItem, Message, Sender};
use eikaiwa::dialogue::{DialogueEngine, DialogueHandle};
use eikaiwa::synthesis::{SpeechOutput, SynthesizerPort, UtteranceRequest, VoiceInfo};
use eikaiwa::{AssistantConfig, PreferenceStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Eikaiwa: bilingual English-conversation practice, in a terminal.
#[derive(Parser)]
#[command(name = "eikaiwa", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Content items currently on offer, shared between the render task and the
/// input loop so `/pick` can resolve an index.
type Offered = Arc<Mutex<Vec<ContentItem>>>;

/// Synthesizer that prints instead of speaking. A terminal has no speech
/// queue, so the voice inventory is empty and cancel is a no-op.
struct LogSynthesizer;

impl SynthesizerPort for LogSynthesizer {
    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn speak(&mut self, request: UtteranceRequest) -> eikaiwa::Result<()> {
        println!("      (speaking at {:.1}x) {}", request.rate, request.text);
        Ok(())
    }

    fn cancel(&mut self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eikaiwa=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = if let Some(ref path) = cli.config {
        AssistantConfig::from_file(path)?
    } else {
        AssistantConfig::from_file(&AssistantConfig::default_config_path())
            .unwrap_or_else(|_| AssistantConfig::default())
    };

    println!("Eikaiwa v{}", env!("CARGO_PKG_VERSION"));
    println!("Type to talk. Commands: /topic <value>, /persona <value>, /pick <n>,");
    println!("/translate <japanese>, /addtopic <label>, /quit");

    let backend = eikaiwa::backend::from_config(&config.backend);
    let prefs = PreferenceStore::open_default();

    // Launching the REPL is itself the user interaction that opens the
    // autoplay gate in a windowed embedding.
    let mut speech = SpeechOutput::new(
        Box::new(LogSynthesizer),
        config.synthesis.clone(),
        prefs.get().speech_rate,
        prefs.get().user_interacted,
    );
    speech.mark_user_interaction();

    let (engine, handle) = DialogueEngine::new(config, backend, prefs);
    let cancel = engine.cancellation_token();

    let offered: Offered = Arc::new(Mutex::new(Vec::new()));
    let render = tokio::spawn(render_events(handle.clone(), Arc::clone(&offered), speech));
    let engine_task = tokio::spawn(engine.run());

    let cancel_on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_on_interrupt.cancel();
        }
    });

    input_loop(&handle, &offered).await?;

    cancel.cancel();
    engine_task.await?;
    render.abort();
    Ok(())
}

/// Read stdin lines and translate them into intents.
async fn input_loop(handle: &DialogueHandle, offered: &Offered) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('/') {
            let (command, arg) = rest.split_once(' ').unwrap_or((rest, ""));
            let arg = arg.trim();
            match command {
                "quit" | "exit" => break,
                "topic" => handle.dispatch(UiIntent::SetTopic(arg.to_owned()))?,
                "persona" => handle.dispatch(UiIntent::SetPersona(arg.to_owned()))?,
                "addtopic" => handle.dispatch(UiIntent::AddCustomOption {
                    kind: OptionKind::Topic,
                    label: arg.to_owned(),
                })?,
                "addpersona" => handle.dispatch(UiIntent::AddCustomOption {
                    kind: OptionKind::Persona,
                    label: arg.to_owned(),
                })?,
                "translate" => {
                    let english = handle.translate_draft(arg).await;
                    println!("  → {english}");
                }
                "pick" => {
                    let item = arg.parse::<usize>().ok().and_then(|n| {
                        offered.lock().ok()?.get(n.checked_sub(1)?).cloned()
                    });
                    match item {
                        Some(item) => handle.dispatch(UiIntent::SelectContentItem(item))?,
                        None => println!("nothing to pick"),
                    }
                }
                other => println!("unknown command: /{other}"),
            }
        } else {
            handle.dispatch(UiIntent::SubmitUtterance(line.to_owned()))?;
        }
    }
    Ok(())
}

/// Render engine events to the terminal until the engine shuts down.
async fn render_events(handle: DialogueHandle, offered: Offered, mut speech: SpeechOutput) {
    let mut events = handle.subscribe();
    let mut rendered = 0usize;
    while let Ok(event) = events.recv().await {
        match event {
            UiEvent::ConversationChanged(messages) => {
                // The payload is the full log; print only what is new.
                // Async translations patch earlier messages in place, which
                // this append-only view deliberately skips.
                for message in messages.iter().skip(rendered) {
                    print_message(message);
                    speech.announce(message);
                }
                rendered = messages.len();
            }
            UiEvent::LoadingChanged(true) => println!("  …"),
            UiEvent::LoadingChanged(false) => {}
            UiEvent::SearchingChanged(true) => println!("  (searching the web…)"),
            UiEvent::SearchingChanged(false) => {}
            UiEvent::TopicalSelectorChanged { visible, items }
            | UiEvent::SearchSelectorChanged { visible, items } => {
                if visible {
                    println!("  — want to talk about one of these? (/pick <n>)");
                    for (i, item) in items.iter().enumerate() {
                        println!("    {}. {} / {}", i + 1, item.title, item.japanese_title);
                    }
                }
                if let Ok(mut offered) = offered.lock() {
                    *offered = if visible { items } else { Vec::new() };
                }
            }
        }
    }
}

fn print_message(message: &Message) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Ai => "ai ",
    };
    println!("[{who}] {}", message.english_text);
    if message.sender == Sender::Ai {
        if let Some(japanese) = &message.japanese_text {
            println!("      {japanese}");
        }
        for suggestion in &message.reply_suggestions {
            println!("      ◦ {} ({})", suggestion.english, suggestion.japanese);
        }
        if let Some(source) = &message.content_source {
            println!("      via {}", source.uri);
        }
    }
}
