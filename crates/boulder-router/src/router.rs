//! Fallback router
//!
//! One call through the router may touch several experts: the requested one
//! first, then — only for retryable failures — the statically configured
//! fallback chain in order. Errors are classified exactly once, here at the
//! router boundary; downstream code sees the classification, never the raw
//! collaborator error.

use boulder_core::{BoulderError, FailureKind, FallbackConfig, Result};
use boulder_hooks::{HookEngine, HookPayload};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::expert::{CallRequest, ExpertCaller, ExpertResponse, RoutedResponse};

/// Router over a static fallback configuration
pub struct FallbackRouter {
    config: FallbackConfig,
    caller: Arc<dyn ExpertCaller>,
    hooks: Arc<HookEngine>,
    cache: Mutex<HashMap<String, String>>,
}

impl FallbackRouter {
    pub fn new(
        config: FallbackConfig,
        caller: Arc<dyn ExpertCaller>,
        hooks: Arc<HookEngine>,
    ) -> Self {
        Self {
            config,
            caller,
            hooks,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Route one call, walking the fallback chain on retryable failure
    pub async fn call_with_fallback(&self, request: &CallRequest) -> Result<RoutedResponse> {
        let cacheable = !request.skip_cache && !request.has_attachment;
        let cache_key = self.cache_key(request);

        if cacheable {
            if let Some(response) = self
                .cache
                .lock()
                .expect("router cache poisoned")
                .get(&cache_key)
                .cloned()
            {
                debug!(expert = %request.expert, "Returning cached response");
                return Ok(RoutedResponse {
                    response,
                    actual_expert: request.expert.clone(),
                    fell_back: false,
                    cached: true,
                    latency_ms: 0,
                });
            }
        }

        let primary_error = match self.attempt(&request.expert, request).await {
            Ok(response) => {
                if cacheable {
                    self.cache
                        .lock()
                        .expect("router cache poisoned")
                        .insert(cache_key, response.response.clone());
                }
                return Ok(Self::routed(response, &request.expert, false));
            }
            Err(e) => e,
        };

        // Hook blocks and fatal classifications never consult the chain
        if matches!(primary_error, BoulderError::Blocked(_)) {
            return Err(primary_error);
        }
        let primary_kind = FailureKind::classify(&primary_error);
        if !primary_kind.retryable() {
            return Err(primary_error);
        }

        let chain = self
            .config
            .chains
            .get(&request.expert)
            .cloned()
            .unwrap_or_default();
        info!(
            expert = %request.expert,
            kind = %primary_kind,
            fallbacks = chain.len(),
            "Expert call failed retryably, walking fallback chain"
        );

        let retry_after = match &primary_error {
            BoulderError::RateLimit {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        };
        self.hooks
            .dispatch(HookPayload::RateLimit {
                expert: request.expert.clone(),
                retry_after_secs: retry_after,
            })
            .await;

        let mut attempts: Vec<(String, FailureKind)> = vec![(request.expert.clone(), primary_kind)];

        for fallback in &chain {
            match self.attempt(fallback, request).await {
                Ok(response) => {
                    info!(expert = %fallback, "Fallback expert succeeded");
                    return Ok(Self::routed(response, fallback, true));
                }
                Err(e) => {
                    if matches!(e, BoulderError::Blocked(_)) {
                        return Err(e);
                    }
                    let kind = FailureKind::classify(&e);
                    if kind.fatal() {
                        warn!(expert = %fallback, "Fallback failed fatally, stopping chain: {}", e);
                        return Err(e);
                    }
                    warn!(expert = %fallback, kind = %kind, "Fallback failed, continuing chain");
                    attempts.push((fallback.clone(), kind));
                }
            }
        }

        let summary = attempts
            .iter()
            .map(|(expert, kind)| format!("{} ({})", expert, kind))
            .collect::<Vec<_>>()
            .join(", ");
        Err(BoulderError::FallbackExhausted(summary))
    }

    /// One pre-hook + call + post-hook attempt against a single expert
    async fn attempt(&self, expert: &str, request: &CallRequest) -> Result<ExpertResponse> {
        let model = self.config.default_model.clone();

        let outcome = self
            .hooks
            .dispatch(HookPayload::ExpertCall {
                expert: expert.to_string(),
                model: model.clone(),
                prompt: request.prompt.clone(),
            })
            .await;
        if outcome.blocked() {
            return Err(BoulderError::Blocked(
                outcome
                    .reason
                    .unwrap_or_else(|| "expert call blocked".to_string()),
            ));
        }

        let response = self
            .caller
            .call(expert, &model, &request.prompt, request.context.as_deref())
            .await?;

        self.hooks
            .dispatch(HookPayload::ExpertResult {
                expert: expert.to_string(),
                response: response.response.clone(),
                latency_ms: response.latency_ms,
            })
            .await;

        Ok(response)
    }

    fn routed(response: ExpertResponse, expert: &str, fell_back: bool) -> RoutedResponse {
        RoutedResponse {
            response: response.response,
            actual_expert: expert.to_string(),
            fell_back,
            cached: response.cached,
            latency_ms: response.latency_ms,
        }
    }

    fn cache_key(&self, request: &CallRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.expert.as_bytes());
        hasher.update([0]);
        hasher.update(self.config.default_model.as_bytes());
        hasher.update([0]);
        hasher.update(request.prompt.as_bytes());
        hasher.update([0]);
        if let Some(context) = &request.context {
            hasher.update(context.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
