// Runtime defaults, overridable from the environment or a .env file.

use std::env;

/// Sampling temperature used for every Gatekeeper reply.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Default port for the web widget.
pub const DEFAULT_PORT: u16 = 9900;

lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    // Small instruct model; anything Ollama can pull works.
    pub static ref GATEKEEPER_MODEL: String = env::var("GATEKEEPER_MODEL").unwrap_or_else(|_| "qwen2:1.5b".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("GATEKEEPER_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("GATEKEEPER_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}
