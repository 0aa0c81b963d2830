//! In-memory provider fakes (testing only)
//!
//! [`ScriptedProvider`] replays a fixed queue of results and records every
//! request it receives, so pipeline tests run without a live model.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ProviderError, ProviderResult};
use crate::{Completion, CompletionRequest, ModelProvider};

/// Provider that answers from a script.
///
/// Each call pops the next scripted result. When the script runs out, the
/// `fallback` result (if any) is returned for every further call.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResult<String>>>,
    fallback: Option<ProviderResult<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always answers with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(Ok(text.into())),
            ..Self::default()
        }
    }

    /// Provider that always fails with `err`.
    pub fn always_failing(err: ProviderError) -> Self {
        Self {
            fallback: Some(Err(err)),
            ..Self::default()
        }
    }

    /// Queue a successful response.
    pub fn then_respond(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failure.
    pub fn then_fail(self, err: ProviderError) -> Self {
        self.push(Err(err))
    }

    fn push(self, result: ProviderResult<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
        self
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Copies of all requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<Completion> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let result = match next {
            Some(result) => result,
            None => self.fallback.clone().unwrap_or_else(|| {
                Err(ProviderError::BadRequest {
                    status: 0,
                    message: "scripted provider exhausted".to_string(),
                })
            }),
        };

        result.map(Completion::text)
    }
}
