//! External collaborator (spec.md §1/§6): the LLM synthesis service that
//! turns agent results into a short prose summary. Out of scope per spec.md
//! §1, but the trait boundary and a deterministic fallback are in scope —
//! the orchestrator (C10) always calls through this trait and never talks
//! to an LLM directly.

use async_trait::async_trait;

use crate::domain::entities::{AgentResult, Citation, Intent, TraceEntry};

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &str,
        agent_results: &[AgentResult],
        trace: &[TraceEntry],
        citations: &[Citation],
        intent: Intent,
    ) -> anyhow::Result<String>;
}

/// Deterministic per-agent one-liner summary, used both as the designated
/// spec.md §6 fallback and (in this repository, since no real LLM is wired
/// up) as the only implementation.
pub struct FallbackSynthesizer;

#[async_trait]
impl Synthesizer for FallbackSynthesizer {
    async fn synthesize(
        &self,
        _query: &str,
        agent_results: &[AgentResult],
        _trace: &[TraceEntry],
        _citations: &[Citation],
        _intent: Intent,
    ) -> anyhow::Result<String> {
        Ok(deterministic_summary(agent_results))
    }
}

pub fn deterministic_summary(agent_results: &[AgentResult]) -> String {
    if agent_results.is_empty() {
        return String::new();
    }

    agent_results
        .iter()
        .map(|result| one_liner(result))
        .collect::<Vec<_>>()
        .join(" ")
}

fn one_liner(result: &AgentResult) -> String {
    if result.payload.get("error").is_some() {
        return format!("{} failed for action '{}'.", result.agent_name.as_str(), result.action);
    }

    let count = result
        .payload
        .get("count")
        .and_then(|v| v.as_u64())
        .or_else(|| result.payload.get("facilities").and_then(|v| v.as_array()).map(|a| a.len() as u64));

    match count {
        Some(n) => format!("{} ran '{}' and found {} result(s).", result.agent_name.as_str(), result.action, n),
        None => format!("{} completed '{}'.", result.agent_name.as_str(), result.action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_is_empty_for_no_results() {
        assert_eq!(deterministic_summary(&[]), "");
    }

    #[test]
    fn summary_reports_count_when_present() {
        let result = AgentResult {
            agent_name: crate::domain::entities::AgentName::Tabular,
            action: "count_with_specialty".to_owned(),
            payload: json!({ "count": 3 }),
            duration_ms: 1.0,
            citations: Vec::new(),
        };
        let summary = deterministic_summary(&[result]);
        assert!(summary.contains("found 3 result"));
    }
}
