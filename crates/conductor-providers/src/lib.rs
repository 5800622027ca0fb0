//! LLM provider adapters for the "opaque oracle" layer.
//!
//! Every adapter implements [`traits::LlmProvider`] against the
//! provider-agnostic [`conductor_domain::tool::Message`]/[`ChatRequest`]
//! shapes. The orchestrator never depends on a specific provider directly —
//! it resolves one through [`registry::ProviderRegistry`] by role.

mod anthropic;
mod openai_compat;
mod registry;
mod sse;
mod traits;
mod util;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderInitError, ProviderRegistry};
pub use traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
pub use util::resolve_api_key;
