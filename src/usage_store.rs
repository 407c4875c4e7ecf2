//! C5 — Usage Event Store: append-only persistence for one record per logical call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of a logical call, recorded on its [`UsageEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Ok,
    Error,
    Blocked,
}

/// Where the token counts on a [`UsageEvent`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Provider,
    Estimated,
}

/// The traceability tuple attached to every usage event (§3, §6 glossary).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionContext {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub workspace_id: Option<String>,
    pub session_id: String,
    pub run_id: String,
    pub step_id: String,
    pub parent_step_id: Option<String>,
    pub agent_name: Option<String>,
    pub tool_name: Option<String>,
}

/// One immutable record of a logical provider call (§3, Entity: UsageEvent).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub session_id: String,
    pub run_id: String,
    pub step_id: String,
    pub provider: String,
    pub model: String,
    pub model_version: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub token_breakdown: Option<HashMap<String, u32>>,
    pub cost_usd: rust_decimal::Decimal,
    pub status: UsageStatus,
    pub source: TokenSource,
    pub user_id: Option<String>,
    pub workspace_id: Option<String>,
    pub parent_step_id: Option<String>,
    pub agent_name: Option<String>,
    pub tool_name: Option<String>,
    pub cache_hit: Option<bool>,
    pub retries: Option<u32>,
    pub latency_ms: Option<u64>,
    pub error_code: Option<String>,
    pub redaction_applied: Option<bool>,
    pub prompt_digest: Option<String>,
    pub completion_digest: Option<String>,
}

impl UsageEvent {
    /// Asserts the invariant `total_tokens == prompt_tokens + completion_tokens`.
    pub fn tokens_are_consistent(&self) -> bool {
        self.total_tokens == self.prompt_tokens + self.completion_tokens
    }
}

/// Append-only store with secondary indexes on `(tenant_id, timestamp)`,
/// `(provider, model)`, and `status` (§4.5). No update or delete method
/// exists on this trait at all — the absence is the invariant.
#[async_trait]
pub trait UsageEventStore: Send + Sync {
    /// Commits the row; once this returns, the event is considered persisted
    /// (the durability barrier of the call path).
    async fn append(&self, event: UsageEvent) -> crate::error::GatewayResult<()>;

    async fn by_tenant_range(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<UsageEvent>;

    async fn by_provider_model(&self, provider: &str, model: &str) -> Vec<UsageEvent>;

    async fn by_status(&self, status: UsageStatus) -> Vec<UsageEvent>;
}

#[derive(Debug, Default)]
pub struct InMemoryUsageEventStore {
    events: RwLock<Vec<UsageEvent>>,
}

impl InMemoryUsageEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl UsageEventStore for InMemoryUsageEventStore {
    async fn append(&self, event: UsageEvent) -> crate::error::GatewayResult<()> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn by_tenant_range(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<UsageEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect()
    }

    async fn by_provider_model(&self, provider: &str, model: &str) -> Vec<UsageEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|e| e.provider == provider && e.model == model)
            .cloned()
            .collect()
    }

    async fn by_status(&self, status: UsageStatus) -> Vec<UsageEvent> {
        let events = self.events.read().await;
        events.iter().filter(|e| e.status == status).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_event(status: UsageStatus) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tenant_id: "t1".into(),
            session_id: "s1".into(),
            run_id: "r1".into(),
            step_id: "st1".into(),
            provider: "openai".into(),
            model: "m1".into(),
            model_version: None,
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            token_breakdown: None,
            cost_usd: dec!(0.001),
            status,
            source: TokenSource::Provider,
            user_id: None,
            workspace_id: None,
            parent_step_id: None,
            agent_name: None,
            tool_name: None,
            cache_hit: None,
            retries: None,
            latency_ms: None,
            error_code: None,
            redaction_applied: Some(false),
            prompt_digest: None,
            completion_digest: None,
        }
    }

    #[tokio::test]
    async fn append_then_query_by_status() {
        let store = InMemoryUsageEventStore::new();
        store.append(sample_event(UsageStatus::Ok)).await.unwrap();
        store
            .append(sample_event(UsageStatus::Blocked))
            .await
            .unwrap();

        assert_eq!(store.by_status(UsageStatus::Ok).await.len(), 1);
        assert_eq!(store.by_status(UsageStatus::Blocked).await.len(), 1);
    }

    #[tokio::test]
    async fn query_by_provider_model() {
        let store = InMemoryUsageEventStore::new();
        store.append(sample_event(UsageStatus::Ok)).await.unwrap();
        assert_eq!(store.by_provider_model("openai", "m1").await.len(), 1);
        assert_eq!(store.by_provider_model("openai", "m2").await.len(), 0);
    }

    #[test]
    fn token_consistency_invariant() {
        let event = sample_event(UsageStatus::Ok);
        assert!(event.tokens_are_consistent());
    }
}
