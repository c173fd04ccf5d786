//! Session controller for one game of Gatekeeper.
//!
//! All mutable state (history, stream buffer, win flag, engine status) lives in
//! [`GatekeeperSession`] and only changes through its transition methods.
//! [`run_turn`] drives one send against an [`InferenceClient`].

use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::DEFAULT_TEMPERATURE;
use crate::error::SendRejected;
use crate::llm_interaction::{ChatMessage, ChatRequest, InferenceClient, Role};
use crate::locale::{Locale, LocaleProfile, UiStrings};
use crate::normalize::normalize;
use crate::redact::Redactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A committed entry of the conversation. Never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        ChatMessage {
            role,
            content: turn.content.clone(),
        }
    }
}

/// Readiness of the inference engine as seen by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail")]
pub enum EngineStatus {
    Loading(String),
    Ready,
    Failed(String),
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineStatus::Ready)
    }

    pub fn display_text(&self, strings: &UiStrings) -> String {
        match self {
            EngineStatus::Loading(progress) if !progress.is_empty() => progress.clone(),
            EngineStatus::Loading(_) => strings.init_loading.to_string(),
            EngineStatus::Ready => strings.status_ready.to_string(),
            EngineStatus::Failed(_) => strings.status_error.to_string(),
        }
    }
}

/// Teardown flag shared between a session and whoever drives or displays it.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What an accepted submission turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The guess matched. Both turns are already committed.
    Won {
        user: ConversationTurn,
        reply: ConversationTurn,
    },
    /// The user turn is committed and a reply must be streamed for `request`.
    Infer {
        user: ConversationTurn,
        request: ChatRequest,
    },
}

/// Events published while a turn runs, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message_type", content = "payload")]
pub enum SessionEvent {
    Status {
        text: String,
        ready: bool,
        input_enabled: bool,
        placeholder: String,
        button: String,
        won: bool,
    },
    UserTurn {
        turn: ConversationTurn,
    },
    /// The whole redacted stream buffer after the latest increment.
    Increment {
        text: String,
    },
    Committed {
        turn: ConversationTurn,
    },
    Won {
        turn: ConversationTurn,
        banner: String,
    },
    Rejected {
        reason: SendRejected,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Won(ConversationTurn),
    Replied(ConversationTurn),
    Failed(ConversationTurn),
    /// The session was torn down before the reply could be committed.
    Cancelled,
}

impl TurnOutcome {
    /// Variant name, for logs that must not carry reply text.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnOutcome::Won(_) => "won",
            TurnOutcome::Replied(_) => "replied",
            TurnOutcome::Failed(_) => "failed",
            TurnOutcome::Cancelled => "cancelled",
        }
    }

    pub fn reply_chars(&self) -> usize {
        match self {
            TurnOutcome::Won(turn) | TurnOutcome::Replied(turn) | TurnOutcome::Failed(turn) => {
                turn.content.chars().count()
            }
            TurnOutcome::Cancelled => 0,
        }
    }
}

pub struct GatekeeperSession {
    profile: LocaleProfile,
    redactor: Redactor,
    normalized_secret: String,
    temperature: f32,
    messages: Vec<ConversationTurn>,
    stream_buffer: Option<String>,
    has_won: bool,
    status: EngineStatus,
    liveness: Liveness,
}

impl GatekeeperSession {
    pub fn new(locale: Locale) -> Self {
        let profile = locale.profile();
        Self {
            redactor: Redactor::new(profile.secret, profile.strings.redacted),
            normalized_secret: normalize(profile.secret),
            temperature: DEFAULT_TEMPERATURE,
            messages: vec![ConversationTurn::assistant(profile.strings.gatekeeper_intro)],
            stream_buffer: None,
            has_won: false,
            status: EngineStatus::Loading(String::new()),
            liveness: Liveness::new(),
            profile,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn locale(&self) -> Locale {
        self.profile.locale
    }

    pub fn strings(&self) -> &'static UiStrings {
        self.profile.strings
    }

    pub fn messages(&self) -> &[ConversationTurn] {
        &self.messages
    }

    /// The in-flight assistant reply, already redacted.
    pub fn stream_buffer(&self) -> Option<&str> {
        self.stream_buffer.as_deref()
    }

    pub fn has_won(&self) -> bool {
        self.has_won
    }

    pub fn is_sending(&self) -> bool {
        self.stream_buffer.is_some()
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn is_input_enabled(&self) -> bool {
        self.liveness.is_alive() && self.status.is_ready() && !self.is_sending() && !self.has_won
    }

    pub fn input_placeholder(&self) -> &'static str {
        let strings = self.strings();
        if !self.status.is_ready() {
            strings.input_loading
        } else if self.has_won {
            strings.input_won
        } else {
            strings.input_default
        }
    }

    pub fn status_event(&self) -> SessionEvent {
        let strings = self.strings();
        let button = if self.is_sending() {
            strings.button_sending
        } else {
            strings.button_send
        };
        SessionEvent::Status {
            text: self.status.display_text(strings),
            ready: self.status.is_ready(),
            input_enabled: self.is_input_enabled(),
            placeholder: self.input_placeholder().to_string(),
            button: button.to_string(),
            won: self.has_won,
        }
    }

    pub fn set_engine_status(&mut self, status: EngineStatus) {
        if !self.liveness.is_alive() {
            return;
        }
        debug!(?status, "Engine status changed");
        self.status = status;
    }

    /// Accepts one user submission.
    ///
    /// A guess whose normalized form equals the normalized secret wins
    /// immediately and never reaches the model.
    pub fn submit(&mut self, text: &str) -> Result<Submission, SendRejected> {
        if !self.liveness.is_alive() {
            return Err(SendRejected::Closed);
        }
        if self.has_won {
            return Err(SendRejected::AlreadyWon);
        }
        if !self.status.is_ready() {
            return Err(SendRejected::NotReady);
        }
        if self.is_sending() {
            return Err(SendRejected::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SendRejected::EmptyInput);
        }

        let user = ConversationTurn::user(text);
        self.messages.push(user.clone());

        if normalize(text) == self.normalized_secret {
            let reply = ConversationTurn::assistant(self.strings().win_message);
            self.messages.push(reply.clone());
            self.has_won = true;
            info!(locale = %self.locale(), "Secret guessed, session frozen");
            return Ok(Submission::Won { user, reply });
        }

        self.stream_buffer = Some(String::new());
        let request = ChatRequest {
            messages: std::iter::once(ChatMessage::system(self.profile.system_prompt))
                .chain(self.messages.iter().map(ChatMessage::from))
                .collect(),
            temperature: self.temperature,
            stream: true,
        };
        debug!(history = self.messages.len(), "Submission forwarded to inference");
        Ok(Submission::Infer { user, request })
    }

    /// Appends one increment and returns the redacted buffer to display.
    ///
    /// A secret split across increments is only redacted once all of it has
    /// arrived, so a prefix may be displayed in between.
    pub fn receive_increment(&mut self, delta: &str) -> Option<String> {
        if !self.liveness.is_alive() || delta.is_empty() {
            return None;
        }
        let buffer = self.stream_buffer.as_mut()?;
        buffer.push_str(delta);
        if self.redactor.redact_in_place(buffer) {
            debug!("Redacted secret from streamed reply");
        }
        Some(buffer.clone())
    }

    /// Commits the streamed reply, or the silent placeholder if it was empty.
    pub fn complete(&mut self) -> Option<ConversationTurn> {
        let buffer = self.stream_buffer.take()?;
        if !self.liveness.is_alive() {
            return None;
        }
        let reply = self.redactor.redact(buffer.trim());
        let content = if reply.is_empty() {
            self.strings().silent.to_string()
        } else {
            reply
        };
        let turn = ConversationTurn::assistant(content);
        self.messages.push(turn.clone());
        Some(turn)
    }

    /// Drops the in-flight reply and commits the localized error reply.
    pub fn fail(&mut self) -> Option<ConversationTurn> {
        self.stream_buffer.take()?;
        if !self.liveness.is_alive() {
            return None;
        }
        let turn = ConversationTurn::assistant(self.strings().error);
        self.messages.push(turn.clone());
        Some(turn)
    }

    /// Ends the session. Anything still streaming is discarded.
    pub fn teardown(&mut self) {
        self.liveness.cancel();
        self.stream_buffer = None;
    }
}

async fn publish(events: &mpsc::Sender<SessionEvent>, liveness: &Liveness, event: SessionEvent) {
    if events.send(event).await.is_err() {
        // Nobody is displaying this session any more.
        warn!("Session event receiver dropped, tearing session down");
        liveness.cancel();
    }
}

async fn finish_failed(
    session: &mut GatekeeperSession,
    events: &mpsc::Sender<SessionEvent>,
) -> TurnOutcome {
    let liveness = session.liveness();
    match session.fail() {
        Some(turn) => {
            publish(events, &liveness, SessionEvent::Committed { turn: turn.clone() }).await;
            publish(events, &liveness, session.status_event()).await;
            TurnOutcome::Failed(turn)
        }
        None => TurnOutcome::Cancelled,
    }
}

/// Runs one send end to end: submit, stream, redact, commit.
///
/// Rejections are published as [`SessionEvent::Rejected`] and returned as
/// `Err`. Inference failures are not errors: they commit the localized error
/// reply and the session stays usable.
#[instrument(skip_all, fields(locale = %session.locale()))]
pub async fn run_turn<C>(
    session: &mut GatekeeperSession,
    client: &C,
    text: &str,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<TurnOutcome, SendRejected>
where
    C: InferenceClient + ?Sized,
{
    let liveness = session.liveness();

    let submission = match session.submit(text) {
        Ok(submission) => submission,
        Err(reason) => {
            debug!(%reason, "Submission rejected");
            publish(events, &liveness, SessionEvent::Rejected { reason }).await;
            publish(events, &liveness, session.status_event()).await;
            return Err(reason);
        }
    };

    let request = match submission {
        Submission::Won { user, reply } => {
            publish(events, &liveness, SessionEvent::UserTurn { turn: user }).await;
            publish(
                events,
                &liveness,
                SessionEvent::Won {
                    turn: reply.clone(),
                    banner: session.strings().win_banner.to_string(),
                },
            )
            .await;
            publish(events, &liveness, session.status_event()).await;
            return Ok(TurnOutcome::Won(reply));
        }
        Submission::Infer { user, request } => {
            publish(events, &liveness, SessionEvent::UserTurn { turn: user }).await;
            publish(events, &liveness, session.status_event()).await;
            request
        }
    };

    let mut stream = match client.stream_completion(request).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Error during chat completion");
            return Ok(finish_failed(session, events).await);
        }
    };

    let mut increments = 0usize;
    while let Some(item) = stream.next().await {
        if !liveness.is_alive() {
            debug!(increments, "Session torn down mid-stream, ignoring remaining output");
            session.teardown();
            return Ok(TurnOutcome::Cancelled);
        }
        match item {
            Ok(delta) => {
                if let Some(display) = session.receive_increment(&delta) {
                    increments += 1;
                    publish(events, &liveness, SessionEvent::Increment { text: display }).await;
                }
            }
            Err(e) => {
                error!(error = %e, increments, "Error during chat completion");
                return Ok(finish_failed(session, events).await);
            }
        }
    }

    match session.complete() {
        Some(turn) => {
            debug!(increments, chars = turn.content.chars().count(), "Reply committed");
            publish(events, &liveness, SessionEvent::Committed { turn: turn.clone() }).await;
            publish(events, &liveness, session.status_event()).await;
            Ok(TurnOutcome::Replied(turn))
        }
        None => Ok(TurnOutcome::Cancelled),
    }
}
