//! External collaborator (spec.md §1/§8.4): the fallback LLM intent
//! classifier the Supervisor (C9) defers to when pattern scoring is
//! ambiguous. Disabled by default (spec.md §6 "supervisor LLM enable/disable
//! flag"); when disabled or unreachable the orchestrator routes to the
//! semantic retriever per spec.md §7.

use async_trait::async_trait;

use crate::domain::entities::{AgentName, Intent};

#[derive(Clone, Debug)]
pub struct LlmClassification {
    pub intent: Intent,
    pub agents: Vec<AgentName>,
}

#[async_trait]
pub trait LlmIntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> anyhow::Result<LlmClassification>;
}

/// Always-unavailable stand-in: no real LLM endpoint is wired into this
/// repository. Kept as a named type (rather than `Option<dyn _>`) so a real
/// HTTP-backed classifier can be dropped in without touching the
/// orchestrator's call site.
pub struct DisabledLlmClassifier;

#[async_trait]
impl LlmIntentClassifier for DisabledLlmClassifier {
    async fn classify(&self, _utterance: &str) -> anyhow::Result<LlmClassification> {
        Err(anyhow::anyhow!("LLM supervisor fallback is disabled"))
    }
}
