//! Chat-completions client used as the reply generator backend.
//!
//! Pure HTTP client; knows nothing about chat protocols or conversation state.

mod client;
mod error;
mod openai;
mod types;

pub use client::{DEFAULT_BASE_URL, LlmClient};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatResponse, Role, Usage};
