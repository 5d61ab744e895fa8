//! Capability-provider boundary.
//!
//! Model-driven reasoning lives behind this trait: the core hands a role
//! description and an input text to the provider and gets text back.
//! Provider failures are always recoverable — callers fall back to a
//! placeholder so the owning stage still produces a valid delta.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Provider label recorded on agent slots.
    fn name(&self) -> &str {
        "capability"
    }

    async fn complete(&self, role_description: &str, input: &str) -> anyhow::Result<String>;
}

/// Run a completion, degrading to `fallback` on provider failure.
pub async fn complete_or_fallback(
    provider: &dyn CapabilityProvider,
    role_description: &str,
    input: &str,
    fallback: impl FnOnce() -> String + Send,
) -> String {
    match provider.complete(role_description, input).await {
        Ok(text) => text,
        Err(err) => {
            warn!(provider = provider.name(), %err, "capability provider failed, using fallback");
            fallback()
        }
    }
}

/// Provider that always returns the same text. Useful as a stand-in when
/// no model backend is wired up, and in tests.
pub struct StaticProvider {
    name: String,
    reply: String,
}

impl StaticProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            name: "static".to_string(),
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl CapabilityProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _role_description: &str, _input: &str) -> anyhow::Result<String> {
        Ok(self.reply.clone())
    }
}

/// Provider that pops pre-scripted replies in order, erroring once the
/// script runs out.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _role_description: &str, _input: &str) -> anyhow::Result<String> {
        self.replies
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted provider exhausted"))
    }
}

/// Provider that always fails. Exercises the fallback paths.
pub struct FailingProvider;

#[async_trait]
impl CapabilityProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _role_description: &str, _input: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("provider unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_kicks_in_on_provider_error() {
        let provider = FailingProvider;
        let out = complete_or_fallback(&provider, "role", "input", || "placeholder".into()).await;
        assert_eq!(out, "placeholder");
    }

    #[tokio::test]
    async fn scripted_provider_pops_in_order() {
        let provider = ScriptedProvider::new(["one", "two"]);
        assert_eq!(provider.complete("r", "i").await.unwrap(), "one");
        assert_eq!(provider.complete("r", "i").await.unwrap(), "two");
        assert!(provider.complete("r", "i").await.is_err());
    }
}
