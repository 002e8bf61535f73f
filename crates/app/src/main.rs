use anyhow::Result;
use providers::OllamaClient;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::format;
use shared::settings::ChatSettings;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod conversation;
mod history;

use conversation::{Conversation, SendDecision, GREETING};
use history::HistoryStore;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Reset,
    Summary,
    Tokens,
    Help,
    Message(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => Command::Quit,
            "/reset" => Command::Reset,
            "/summary" => Command::Summary,
            "/tokens" => Command::Tokens,
            "/help" => Command::Help,
            _ => Command::Message(line),
        }
    }
}

const HELP: &str = "Commands: /reset  /summary  /tokens  /help  /quit";

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

fn print_message(role: &str, content: &str) {
    println!("[{}] {}: {}\n", timestamp(), format::role_label(role), content);
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}

/// Outcome of streaming one reply.
struct Reply {
    text: String,
    /// Transport error, if the stream broke or never started
    error: Option<String>,
    /// Ctrl-C arrived before the stream ended; `text` holds what was shown
    interrupted: bool,
}

/// Write and flush, logging failures instead of aborting the stream. Returns
/// whether the text reached `out`.
fn write_flushed(out: &mut impl Write, text: &str) -> bool {
    match out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("stdout write failed: {}", e);
            false
        }
    }
}

fn write_stdout(text: &str) {
    write_flushed(&mut std::io::stdout().lock(), text);
}

/// Stream one reply to stdout until it ends or the user hits Ctrl-C.
async fn stream_reply(client: &OllamaClient, messages: &[ChatMessage]) -> Reply {
    let (tx, mut rx) = mpsc::unbounded_channel();

    write_stdout(&format!("[{}] {}: ", timestamp(), format::role_label("assistant")));

    let mut streamed = String::new();
    let request = client.generate_stream(messages, tx);
    let render = async {
        let mut stream_error = None;
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Incremental(text) => {
                    write_stdout(&text);
                    streamed.push_str(&text);
                }
                StreamChunk::Complete(_) => {}
                StreamChunk::Error(msg) => stream_error = Some(msg),
            }
        }
        stream_error
    };

    let finished = tokio::select! {
        outcome = async { tokio::join!(request, render) } => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    println!("\n");

    match finished {
        Some((Ok(full), stream_error)) => {
            if let Some(err) = &stream_error {
                eprintln!("Network error: {}", err);
            }
            Reply {
                text: full,
                error: stream_error,
                interrupted: false,
            }
        }
        Some((Err(e), _)) => {
            tracing::error!("chat request failed: {}", e);
            eprintln!("Error: {}", e);
            Reply {
                text: String::new(),
                error: Some(e.to_string()),
                interrupted: false,
            }
        }
        None => {
            tracing::info!("reply interrupted after {} characters", streamed.chars().count());
            Reply {
                text: streamed,
                error: None,
                interrupted: true,
            }
        }
    }
}

fn save_history(store: &HistoryStore, conv: &Conversation) {
    if let Err(e) = store.save(conv.history()) {
        tracing::error!("failed to save history to {}: {}", store.path().display(), e);
    }
}

/// Record the assistant reply and persist the history right away, so an
/// abrupt exit loses at most the exchange in flight.
fn record_reply(
    conv: &mut Conversation,
    store: &HistoryStore,
    response: &str,
    error: Option<&str>,
) -> ChatMessage {
    let reply = conv.complete(response, error).clone();
    save_history(store, conv);
    reply
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = ChatSettings::load();
    let client = OllamaClient::new(&settings)?;
    let store = HistoryStore::open_default();
    let mut conv = Conversation::new(store.load(), settings.token_limit);

    println!("DeepChat | model: {} | {}", client.model(), settings.base_url);
    println!("{}\n", HELP);
    for msg in conv.history() {
        print_message(&msg.role, &format::strip_reasoning(&msg.content));
    }
    print_message("assistant", GREETING);
    println!("{}", conv.token_line());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Tokens => println!("{}", conv.token_line()),
            Command::Summary => println!("{}", conv.summary()),
            Command::Reset => {
                conv.reset();
                save_history(&store, &conv);
                println!("Conversation reset.\n");
                print_message("assistant", GREETING);
                println!("{}", conv.token_line());
            }
            Command::Message(text) => match conv.submit(text) {
                SendDecision::Ignore => {}
                SendDecision::TokenLimitReached => {
                    println!("Token limit reached, please /reset the conversation.");
                    println!("{}", conv.token_line());
                }
                SendDecision::Send(messages) => {
                    let outcome = stream_reply(&client, &messages).await;
                    let reply =
                        record_reply(&mut conv, &store, &outcome.text, outcome.error.as_deref());
                    if outcome.interrupted {
                        break;
                    }
                    let shown = format::strip_reasoning(&reply.content);
                    if shown != reply.content.trim() {
                        // The streamed text included reasoning; repeat the answer alone.
                        print_message("assistant", &shown);
                    } else if outcome.text.is_empty() {
                        print_message("assistant", &reply.content);
                    }
                    println!("{}", conv.token_line());
                }
            },
        }
    }

    save_history(&store, &conv);
    Ok(())
}
