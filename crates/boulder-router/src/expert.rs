//! Expert call collaborator interface
//!
//! The router never talks to a provider directly; it goes through an
//! [`ExpertCaller`] implementation supplied by the embedding process. Tests
//! substitute a scripted mock.

use boulder_core::Result;

/// One call to make through the router
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub expert: String,
    pub prompt: String,
    pub context: Option<String>,
    /// Bypass the response cache for this call
    pub skip_cache: bool,
    /// Calls carrying an image or attachment are never cached
    pub has_attachment: bool,
}

impl CallRequest {
    pub fn new(expert: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            expert: expert.into(),
            prompt: prompt.into(),
            context: None,
            skip_cache: false,
            has_attachment: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn with_attachment(mut self) -> Self {
        self.has_attachment = true;
        self
    }
}

/// Raw response from the expert collaborator
#[derive(Debug, Clone)]
pub struct ExpertResponse {
    pub response: String,
    pub latency_ms: u64,
    pub cached: bool,
}

/// Final routed response
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub response: String,
    /// Expert that actually produced the response
    pub actual_expert: String,
    pub fell_back: bool,
    pub cached: bool,
    pub latency_ms: u64,
}

/// Collaborator that performs the actual expert call
#[async_trait::async_trait]
pub trait ExpertCaller: Send + Sync {
    async fn call(
        &self,
        expert: &str,
        model: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<ExpertResponse>;
}
