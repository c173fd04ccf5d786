pub mod chat;
pub mod constants;
pub mod error;
pub mod llm_interaction;
pub mod locale;
pub mod normalize;
pub mod prompts;
pub mod redact;
pub mod session;
pub mod web_server;

pub use error::{InferenceError, SendRejected};
pub use llm_interaction::{ChatMessage, ChatRequest, CompletionStream, InferenceClient, OllamaClient, Role};
pub use locale::{Locale, LocaleProfile, UiStrings};
pub use normalize::{matches_secret, normalize};
pub use redact::{redact, Redactor};
pub use session::{
    run_turn, ConversationTurn, EngineStatus, GatekeeperSession, Liveness, SessionEvent,
    Submission, TurnOutcome, TurnRole,
};
