//! Black-box text completion for Nimbus.
//!
//! The language model is optional everywhere it is used: the model-backed
//! query router and narrative-producing agents call [`complete_prompt`] with a
//! bounded timeout and must parse whatever text comes back defensively.

pub mod client;
pub mod completion;
pub mod config;
pub mod openai;
pub mod retry;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role};
pub use completion::{complete_prompt, extract_json_object};
pub use config::{LlmConfig, SemaphoredClient, build_llm_client};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
