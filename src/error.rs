use thiserror::Error;

/// Failures reported by an [`crate::llm_interaction::InferenceClient`].
#[derive(Error, Debug)]
pub enum InferenceError {
    /// `stream_completion` was called before `initialize` succeeded.
    #[error("inference engine is not ready")]
    NotReady,

    #[error("failed to initialize model {model}: {reason}")]
    InitFailed { model: String, reason: String },

    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion stream failed: {0}")]
    StreamFailed(String),
}

/// Why a submission was refused without touching the session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SendRejected {
    #[error("input is empty")]
    EmptyInput,
    #[error("model is not ready")]
    NotReady,
    #[error("a reply is still streaming")]
    Busy,
    #[error("the secret has already been guessed")]
    AlreadyWon,
    #[error("session has been closed")]
    Closed,
}
