//! Propagator-LLM: model provider boundary for spec-propagator
//!
//! This crate owns the single network interaction of the propagation
//! pipeline: sending one prompt to a code-editing model and getting text back.
//!
//! - [`ModelProvider`]: async trait implemented by real and fake providers
//! - [`AnthropicProvider`]: Anthropic Messages API over `reqwest`
//! - [`ProviderError`] / [`ErrorClass`]: enumerated transient/permanent classification
//! - [`fakes::ScriptedProvider`]: deterministic provider for tests

pub mod anthropic;
pub mod error;
pub mod fakes;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use error::{ErrorClass, ProviderError, ProviderResult};

/// Default model used for edit passes.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default output token budget for one edit pass.
pub const DEFAULT_MAX_TOKENS: u32 = 16_384;

/// One completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Text returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: Option<String>,
}

impl Completion {
    /// Completion carrying only text, for providers without usage data.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
        }
    }
}

/// A code-editing model reachable over some transport.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller, which uses [`ProviderError::class`] to decide.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<Completion>;
}
