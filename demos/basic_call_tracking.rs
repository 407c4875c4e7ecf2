//! Wires up an in-memory gateway and runs one tracked call end to end.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream};
use llm_control_plane::{
    CallRequest, GatewayClient, GatewayConfig, GatewayResult, InMemoryBudgetGuard,
    InMemoryPriceTable, InMemoryUsageEventStore, LoggingAlerter, NoopTracer, Period,
    ProviderCallable, ProviderChunk, ProviderResponse, ReportedUsage, SessionContext,
    UnifiedMessage,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

struct DemoProvider;

#[async_trait]
impl ProviderCallable for DemoProvider {
    async fn call(&self, _messages: &[UnifiedMessage]) -> GatewayResult<ProviderResponse> {
        Ok(ProviderResponse {
            text: "The answer is 42.".to_string(),
            usage: Some(ReportedUsage {
                prompt_tokens: Some(120),
                completion_tokens: Some(18),
                total_tokens: Some(138),
                reasoning_tokens: None,
            }),
        })
    }

    async fn call_stream(
        &self,
        _messages: &[UnifiedMessage],
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ProviderChunk>>> {
        Ok(Box::pin(stream::empty()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let price_table = Arc::new(InMemoryPriceTable::new());
    price_table.seed_defaults().await?;

    let budget_guard = Arc::new(InMemoryBudgetGuard::new(Period::Monthly, Utc::now()));
    budget_guard.configure("acme-corp", dec!(50.00), dec!(100.00));

    let usage_store = Arc::new(InMemoryUsageEventStore::new());

    let client = GatewayClient::new(
        GatewayConfig::default(),
        price_table,
        usage_store,
        budget_guard,
        Arc::new(NoopTracer),
        Arc::new(LoggingAlerter),
    );

    let messages = vec![UnifiedMessage::user("What is the answer to everything?")];
    let ctx = SessionContext {
        tenant_id: "acme-corp".to_string(),
        user_id: Some("user-1".to_string()),
        workspace_id: None,
        session_id: "session-1".to_string(),
        run_id: "run-1".to_string(),
        step_id: "step-1".to_string(),
        parent_step_id: None,
        agent_name: Some("demo-agent".to_string()),
        tool_name: None,
    };

    let req = CallRequest {
        provider: "openai".to_string(),
        model: "m1".to_string(),
        model_version: None,
        messages: &messages,
        ctx,
        stream: false,
        attempt_n: 1,
        cache_hit: false,
    };

    let response = client.call(req, &DemoProvider).await?;
    println!("provider said: {}", response.text);

    Ok(())
}
