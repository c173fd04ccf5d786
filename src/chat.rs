// Interactive terminal front end. Each line typed on stdin is one submission.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::SendRejected;
use crate::llm_interaction::InferenceClient;
use crate::locale::{Locale, UiStrings};
use crate::session::{run_turn, EngineStatus, GatekeeperSession, SessionEvent};

const QUIT_COMMAND: &str = "/quit";

/// Turns successive redacted buffers into terminal writes.
///
/// Usually only the new suffix is printed. When redaction rewrites text that
/// is already on screen, the buffer is printed again on a fresh line.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    shown: String,
}

impl TerminalRenderer {
    pub fn is_idle(&self) -> bool {
        self.shown.is_empty()
    }

    pub fn render(&mut self, display: &str) -> String {
        let out = match display.strip_prefix(self.shown.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{}", display),
        };
        self.shown = display.to_string();
        out
    }

    /// Text that closes the current reply once `content` is committed.
    pub fn finish(&mut self, content: &str) -> String {
        let out = if self.shown.is_empty() {
            format!("{}\n", content)
        } else if self.shown.trim() == content {
            "\n".to_string()
        } else {
            format!("\n{}\n", content)
        };
        self.shown.clear();
        out
    }
}

/// Line shown for a refused submission. Turns run one at a time here, so
/// `Busy` never reaches the terminal.
fn rejection_notice(reason: SendRejected, strings: &UiStrings) -> Option<&str> {
    match reason {
        SendRejected::AlreadyWon => Some(strings.input_won),
        SendRejected::NotReady => Some(strings.input_loading),
        SendRejected::Busy | SendRejected::EmptyInput | SendRejected::Closed => None,
    }
}

async fn print_events(mut rx: mpsc::Receiver<SessionEvent>, strings: &'static UiStrings) {
    let mut renderer = TerminalRenderer::default();
    let mut out = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let text = match event {
            SessionEvent::Increment { text } => {
                let prefix = if renderer.is_idle() {
                    format!("{}: ", strings.title)
                } else {
                    String::new()
                };
                format!("{}{}", prefix, renderer.render(&text))
            }
            SessionEvent::Committed { turn } => {
                let prefix = if renderer.is_idle() {
                    format!("{}: ", strings.title)
                } else {
                    String::new()
                };
                format!("{}{}", prefix, renderer.finish(&turn.content))
            }
            SessionEvent::Won { turn, banner } => {
                format!("{}: {}\n{}\n", strings.title, turn.content, banner)
            }
            SessionEvent::Rejected { reason } => match rejection_notice(reason, strings) {
                Some(notice) => format!("{}\n", notice),
                None => continue,
            },
            SessionEvent::UserTurn { .. } | SessionEvent::Status { .. } => continue,
        };
        if write!(out, "{}", text).and_then(|_| out.flush()).is_err() {
            break;
        }
    }
}

/// Runs a Gatekeeper game on stdin/stdout until EOF or `/quit`.
pub async fn run_terminal_chat(
    client: Arc<dyn InferenceClient>,
    locale: Locale,
    temperature: f32,
) -> Result<()> {
    let mut session = GatekeeperSession::new(locale).with_temperature(temperature);
    let strings = session.strings();

    println!("{}: {}", strings.title, strings.subtitle);
    println!("{}: {}", strings.status_label, strings.init_loading);

    let progress = |line: String| eprintln!("  {}", line);
    match client.initialize(&progress).await {
        Ok(()) => session.set_engine_status(EngineStatus::Ready),
        Err(e) => {
            error!(error = %e, "Failed to initialize inference engine");
            session.set_engine_status(EngineStatus::Failed(e.to_string()));
        }
    }
    println!(
        "{}: {}",
        strings.status_label,
        session.status().display_text(strings)
    );
    if !session.status().is_ready() {
        // Input stays disabled without a model; nothing left to do.
        return Ok(());
    }

    println!();
    println!("{}", strings.intro);
    println!("{}: {}", strings.title, strings.gatekeeper_intro);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        if line.trim() == QUIT_COMMAND {
            break;
        }

        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_events(rx, strings));
        let outcome = run_turn(&mut session, client.as_ref(), &line, &tx).await;
        drop(tx);
        printer.await.context("Event printer task failed")?;

        match outcome {
            Ok(outcome) => debug!(outcome = outcome.kind(), chars = outcome.reply_chars(), "Turn finished"),
            Err(reason) => debug!(%reason, "Turn rejected"),
        }
    }

    session.teardown();
    info!(turns = session.messages().len(), "Terminal chat ended");
    Ok(())
}
