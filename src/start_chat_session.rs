//! Startup helpers for the `chat-session` binary.
//!
//! Loads configuration, takes the store lock, and runs a line-oriented REPL over the
//! session controller. Streamed fragments go to stdout; logs go to stderr.

use std::process::ExitCode;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::session::core::message::render_transcript;
use crate::session::{
    ChatConfig, ChatError, ChatResult, SessionBackends, SessionController, SessionEvent,
    StoreLock,
};

/// Printed when another process holds the store.
pub const ALREADY_RUNNING_MESSAGE: &str = "Another process is already running.";

const HELP: &str = "Type a message to chat. Commands: /new, /list, /search <query>, \
/open <title>, /rename <old> => <new>, /delete <title>, /show, /help, /quit";

/// Run the chat session (used by the `chat-session` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on quit or when another process is running, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting chat-session v{}", env!("CARGO_PKG_VERSION"));

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(run_session(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(ChatError::AlreadyRunning) => {
            eprintln!("{ALREADY_RUNNING_MESSAGE}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Session error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Take the store lock, open the history, and serve stdin until `/quit` or end of input.
///
/// # Errors
/// Returns [`ChatError::AlreadyRunning`] if the store is locked, or any unrecoverable error.
pub async fn run_session(config: ChatConfig) -> ChatResult<()> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.storage.db_path();
    let _lock = StoreLock::acquire(
        &db_path,
        config.storage.lock_timeout(),
        config.storage.lock_retry(),
    )
    .await?;
    tracing::info!("History: {}", db_path.display());

    let backends = SessionBackends::sqlite(&config).await?;
    let (mut controller, mut events) = SessionController::new(config, backends).await?;
    repl(&mut controller, &mut events).await
}

/// One line of operator input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Command<'a> {
    Submit(&'a str),
    New,
    List,
    Search(&'a str),
    Open(&'a str),
    Rename(&'a str, &'a str),
    Delete(&'a str),
    Show,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Submit(line);
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, arg)| (name, arg.trim()));

    match name {
        "new" => Command::New,
        "list" => Command::List,
        "search" => Command::Search(arg),
        "open" if !arg.is_empty() => Command::Open(arg),
        "rename" => match arg.split_once("=>") {
            Some((old, new)) if !old.trim().is_empty() => Command::Rename(old.trim(), new.trim()),
            _ => Command::Unknown(line),
        },
        "delete" if !arg.is_empty() => Command::Delete(arg),
        "show" => Command::Show,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line),
    }
}

struct Console {
    out: Stdout,
}

impl Console {
    fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }

    async fn write(&mut self, text: &str) -> ChatResult<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn line(&mut self, text: &str) -> ChatResult<()> {
        self.write(text).await?;
        self.write("\n").await
    }

    async fn render(&mut self, event: SessionEvent) -> ChatResult<()> {
        match event {
            SessionEvent::Fragment(text) => self.write(&text).await,
            SessionEvent::TranscriptCleared => self.line("--- new transcript ---").await,
            SessionEvent::Committed { title } => self.line(&format!("\n[saved as {title}]")).await,
            SessionEvent::Failed(reason) => self.line(&format!("\nerror: {reason}")).await,
            SessionEvent::StateChanged(state) => {
                tracing::debug!("State: {state}");
                Ok(())
            }
            SessionEvent::UserMessage(_) => Ok(()),
        }
    }
}

async fn repl(
    controller: &mut SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
) -> ChatResult<()> {
    let mut console = Console::new();
    console.line(HELP).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        console.write("> ").await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let mut show_transcript = false;
        let outcome = match parse_command(&line) {
            Command::Quit => break,
            Command::Submit("") => Ok(()),
            Command::Submit(text) => submit(controller, events, &mut console, text).await,
            Command::New => {
                controller.new_chat();
                Ok(())
            }
            Command::List => {
                for (title, conversation) in controller.history().list_descending_by_time() {
                    let when = DateTime::<Utc>::from_timestamp(conversation.created_at, 0)
                        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    console.line(&format!("{when}  {title}")).await?;
                }
                Ok(())
            }
            Command::Search(query) => {
                for title in controller.search(query) {
                    console.line(&title).await?;
                }
                Ok(())
            }
            Command::Open(title) => {
                let opened = controller.open(title);
                show_transcript = opened.is_ok();
                opened
            }
            Command::Rename(old, new) => controller.rename(old, new).await,
            Command::Delete(title) => controller.delete(title).await,
            Command::Show => {
                console.line(&render_transcript(controller.transcript())).await?;
                Ok(())
            }
            Command::Help => console.line(HELP).await,
            Command::Unknown(input) => console.line(&format!("unknown command: {input}")).await,
        };

        while let Ok(event) = events.try_recv() {
            console.render(event).await?;
        }
        if show_transcript {
            console.line(&render_transcript(controller.transcript())).await?;
        }

        match outcome {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => console.line(&format!("error: {err}")).await?,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

async fn submit(
    controller: &mut SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
    console: &mut Console,
    text: &str,
) -> ChatResult<()> {
    let exchange = controller.submit(text);
    tokio::pin!(exchange);

    let result = loop {
        tokio::select! {
            result = &mut exchange => break result,
            Some(event) = events.recv() => console.render(event).await?,
        }
    };
    while let Ok(event) = events.try_recv() {
        console.render(event).await?;
    }

    match result {
        // Aborted exchanges were already shown through their `Failed` event.
        Err(err) if !err.is_recoverable() => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_submits() {
        assert_eq!(parse_command("  Hello there \n"), Command::Submit("Hello there"));
        assert_eq!(parse_command(""), Command::Submit(""));
    }

    #[test]
    fn test_commands_parse_arguments() {
        assert_eq!(parse_command("/new"), Command::New);
        assert_eq!(parse_command("/list"), Command::List);
        assert_eq!(parse_command("/search  rust  "), Command::Search("rust"));
        assert_eq!(parse_command("/open Chat A - 2"), Command::Open("Chat A - 2"));
        assert_eq!(parse_command("/delete Chat A"), Command::Delete("Chat A"));
        assert_eq!(
            parse_command("/rename Chat A => Chat B"),
            Command::Rename("Chat A", "Chat B")
        );
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit"), Command::Quit);
    }

    #[test]
    fn test_malformed_commands_are_unknown() {
        assert_eq!(parse_command("/rename Chat A"), Command::Unknown("/rename Chat A"));
        assert_eq!(parse_command("/rename => B"), Command::Unknown("/rename => B"));
        assert_eq!(parse_command("/open"), Command::Unknown("/open"));
        assert_eq!(parse_command("/frobnicate"), Command::Unknown("/frobnicate"));
    }
}
