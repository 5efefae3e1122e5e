//! Line-oriented terminal front end

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chatgusto::config::AppConfig;
use chatgusto::llm::{GeminiApi, GeminiProvider, GeminiSpeech, ImagenClient, GEMINI_API_URL};
use chatgusto::modes::Mode;
use chatgusto::orchestrator::{Orchestrator, SubmitError};
use chatgusto::playback::{PlaybackController, PlaybackOutcome, ProcessSink};
use chatgusto::session::ProviderSessionFactory;
use chatgusto::tools::{RepositoryClient, ReqwestFetch, ToolDispatcher};
use chatgusto::view::{ChatMessage, MessageRole, ViewEvent, ViewState};

const HELP: &str = "\
Commands:
  /mode [name]     show or switch mode (normal, image, search, developer, repository)
  /think on|off    toggle extended reasoning for the next turns
  /speak [n]       read message n aloud (default: last reply)
  /messages        list the conversation
  /help            show this help
  /quit            exit
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Mode(Option<Mode>),
    Think(Option<bool>),
    Speak(Option<usize>),
    Messages,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();

    match name {
        "mode" => match arg {
            None => Ok(Command::Mode(None)),
            Some(a) => a.parse().map(|m| Command::Mode(Some(m))).map_err(|e| e.to_string()),
        },
        "think" => match arg {
            None => Ok(Command::Think(None)),
            Some("on") => Ok(Command::Think(Some(true))),
            Some("off") => Ok(Command::Think(Some(false))),
            Some(other) => Err(format!("Expected on or off, got '{}'", other)),
        },
        "speak" => match arg {
            None => Ok(Command::Speak(None)),
            Some(n) => n
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| Command::Speak(Some(n)))
                .ok_or_else(|| format!("Not a message number: '{}'", n)),
        },
        "messages" => Ok(Command::Messages),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command '/{}'. Try /help", other)),
    }
}

/// Plain-text rendering of one message
pub fn render(message: &ChatMessage) -> String {
    let speaker = match message.role {
        MessageRole::User => "you",
        MessageRole::Model => "gusto",
    };

    let mut out = format!("{}> ", speaker);
    if let Some(ref image) = message.image {
        let kind = image
            .strip_prefix("data:")
            .and_then(|s| s.split(';').next())
            .unwrap_or("image");
        out.push_str(&format!("[{} image, {} bytes encoded]", kind, image.len()));
        if !message.content.is_empty() {
            out.push(' ');
        }
    }
    out.push_str(&message.content);
    if message.is_loading {
        out.push_str(" ...");
    }
    for (i, citation) in message.citations.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {} <{}>", i + 1, citation.title, citation.url));
    }
    out
}

pub struct Repl {
    orchestrator: Arc<Orchestrator>,
    playback: Arc<PlaybackController>,
    view: Arc<ViewState>,
    view_rx: Option<mpsc::UnboundedReceiver<ViewEvent>>,
}

impl Repl {
    pub fn build(config: &AppConfig, api_key: String, mode: Mode, thinking: bool) -> Result<Self> {
        let (view_tx, view_rx) = mpsc::unbounded_channel();
        let view = Arc::new(ViewState::with_events(view_tx));

        let api_base = config.models.api_base.as_deref().unwrap_or(GEMINI_API_URL);
        let api = GeminiApi::with_base_url(api_key, api_base)?;

        let images = ImagenClient::new(api.clone(), &config.models.image_model)
            .with_aspect_ratio(&config.models.image_aspect_ratio)
            .with_mime_type(&config.models.image_mime_type);
        let repository = RepositoryClient::new(Arc::new(ReqwestFetch::new(
            &config.repository.user_agent,
        )?))
        .with_bases(&config.repository.api_base, &config.repository.raw_base)
        .with_max_file_chars(config.repository.max_file_chars);
        let tools = ToolDispatcher::new(Arc::new(images), repository, view.clone());

        let provider = Arc::new(GeminiProvider::new(api.clone(), &config.models.chat_model));
        let factory = Arc::new(ProviderSessionFactory::new(provider, &config.models.chat_model));

        let orchestrator = Orchestrator::new(view.clone(), tools, factory, mode)
            .with_thinking_budget(config.models.thinking_budget);
        orchestrator.set_thinking(thinking);

        let speech = GeminiSpeech::new(api, &config.models.speech_model, &config.models.voice);
        let sink = ProcessSink::new(&config.audio.player_command, config.audio.player_args.clone());
        let playback = PlaybackController::new(view.clone(), Arc::new(speech), Arc::new(sink));

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            playback: Arc::new(playback),
            view,
            view_rx: Some(view_rx),
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut view_rx = self
            .view_rx
            .take()
            .ok_or_else(|| eyre!("View events already consumed"))?;

        // Greeting was emitted before anyone listened
        for message in self.view.messages() {
            println!("{}", render(&message));
        }
        while view_rx.try_recv().is_ok() {}

        let printer = tokio::spawn(async move {
            while let Some(event) = view_rx.recv().await {
                print_event(&event);
            }
        });

        println!("Mode: {}. Type /help for commands.", self.orchestrator.mode());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(message) => {
                    eprintln!("{}", message);
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            self.dispatch(command).await;
        }

        printer.abort();
        Ok(())
    }

    async fn dispatch(&self, command: Command) {
        match command {
            Command::Say(text) => match self.orchestrator.submit(&text).await {
                Ok(summary) => tracing::debug!(?summary, "Turn finished"),
                Err(SubmitError::BlankInput) => {}
                Err(e) => eprintln!("{}", e),
            },
            Command::Mode(None) => println!("Mode: {}", self.orchestrator.mode()),
            Command::Mode(Some(mode)) => {
                if !self.orchestrator.set_mode(mode) {
                    println!("Already in {} mode", mode);
                }
            }
            Command::Think(None) => println!(
                "Extended reasoning is {}",
                if self.orchestrator.thinking() { "on" } else { "off" }
            ),
            Command::Think(Some(enabled)) => {
                self.orchestrator.set_thinking(enabled);
                println!("Extended reasoning {}", if enabled { "on" } else { "off" });
            }
            Command::Speak(index) => self.speak(index),
            Command::Messages => {
                for (i, message) in self.view.messages().iter().enumerate() {
                    println!("{:>3}. {}", i + 1, render(message));
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    fn speak(&self, index: Option<usize>) {
        let messages = self.view.messages();
        let target = match index {
            Some(n) => messages.get(n - 1),
            None => messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Model && !m.content.is_empty()),
        };
        let Some(message) = target else {
            eprintln!("No such message");
            return;
        };
        if message.content.is_empty() {
            eprintln!("That message has no text to read");
            return;
        }

        spawn_speak(
            self.playback.clone(),
            message.id().to_string(),
            message.content.clone(),
        );
    }
}

/// Play in the background so input keeps flowing; the outcome is reported
/// when playback ends
fn spawn_speak(
    playback: Arc<PlaybackController>,
    id: String,
    text: String,
) -> JoinHandle<PlaybackOutcome> {
    tokio::spawn(async move {
        let outcome = playback.speak(&id, &text).await;
        match outcome {
            PlaybackOutcome::Played => {}
            PlaybackOutcome::Busy => eprintln!("Already playing"),
            PlaybackOutcome::Failed => eprintln!("Could not play audio (see log)"),
        }
        outcome
    })
}

fn print_event(event: &ViewEvent) {
    match event {
        ViewEvent::Reset(messages) => {
            println!();
            for message in messages {
                println!("{}", render(message));
            }
        }
        ViewEvent::Appended(message) if message.role == MessageRole::Model => {
            println!("{}", render(message));
        }
        ViewEvent::Updated(message) => println!("{}", render(message)),
        _ => {}
    }
}

/// Pick the starting mode: command line, then config
pub fn initial_mode(cli_mode: Option<Mode>, config: &AppConfig) -> Mode {
    cli_mode.unwrap_or(config.session.initial_mode)
}

pub fn require_api_key(key: Option<String>) -> Result<String> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| eyre!(chatgusto::GustoError::MissingApiKey))
}
