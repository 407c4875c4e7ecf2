//! End-to-end scenarios (S1-S7) exercised through the crate's public API.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream};
use llm_control_plane::{
    BillingTier, CallRequest, ChargeResult, FractionalLedger, GatewayClient, GatewayConfig,
    GatewayError, GatewayResult, InMemoryBudgetGuard, InMemoryPriceTable, InMemoryUsageEventStore,
    LoggingAlerter, NoopTracer, Period, ProviderCallable, ProviderChunk, ProviderResponse,
    ReportedUsage, SessionContext, SubmitResult, TaskScheduler, Tier, UnifiedMessage,
    UsageEventStore, UsageStatus,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

struct ScriptedProvider {
    response: Option<ProviderResponse>,
}

#[async_trait]
impl ProviderCallable for ScriptedProvider {
    async fn call(&self, _messages: &[UnifiedMessage]) -> GatewayResult<ProviderResponse> {
        self.response
            .clone()
            .ok_or_else(|| GatewayError::provider_error("scripted_failure", "no response configured", None))
    }

    async fn call_stream(
        &self,
        _messages: &[UnifiedMessage],
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ProviderChunk>>> {
        Ok(Box::pin(stream::empty()))
    }
}

fn ctx(tenant_id: &str) -> SessionContext {
    SessionContext {
        tenant_id: tenant_id.to_string(),
        user_id: None,
        workspace_id: None,
        session_id: "s1".to_string(),
        run_id: "r1".to_string(),
        step_id: "st1".to_string(),
        parent_step_id: None,
        agent_name: None,
        tool_name: None,
    }
}

async fn gateway() -> (
    GatewayClient,
    Arc<InMemoryUsageEventStore>,
    Arc<InMemoryBudgetGuard>,
) {
    let price_table = Arc::new(InMemoryPriceTable::new());
    price_table.seed_defaults().await.unwrap();
    let usage_store = Arc::new(InMemoryUsageEventStore::new());
    let budget_guard = Arc::new(InMemoryBudgetGuard::new(Period::Monthly, Utc::now()));

    let client = GatewayClient::new(
        GatewayConfig::default(),
        price_table,
        usage_store.clone(),
        budget_guard.clone(),
        Arc::new(NoopTracer),
        Arc::new(LoggingAlerter),
    );
    (client, usage_store, budget_guard)
}

#[tokio::test]
async fn s1_normal_call_provider_reports_usage() {
    let (client, usage_store, budget) = gateway().await;
    budget.configure("t1", dec!(100), dec!(200));

    let provider = ScriptedProvider {
        response: Some(ProviderResponse {
            text: "hi there".to_string(),
            usage: Some(ReportedUsage {
                prompt_tokens: Some(1000),
                completion_tokens: Some(2000),
                total_tokens: Some(3000),
                reasoning_tokens: None,
            }),
        }),
    };
    let messages = vec![UnifiedMessage::user("hello")];

    let result = client
        .call(
            CallRequest {
                provider: "openai".into(),
                model: "m1".into(),
                model_version: None,
                messages: &messages,
                ctx: ctx("t1"),
                stream: false,
                attempt_n: 1,
                cache_hit: false,
            },
            &provider,
        )
        .await
        .unwrap();

    assert_eq!(result.text, "hi there");

    let events = usage_store.by_status(UsageStatus::Ok).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].prompt_tokens, 1000);
    assert_eq!(events[0].completion_tokens, 2000);
    assert_eq!(events[0].total_tokens, 3000);
    assert_eq!(events[0].cost_usd, dec!(0.350000));
}

#[tokio::test]
async fn s3_hard_limit_block_skips_provider() {
    let (client, usage_store, budget) = gateway().await;
    budget.configure("t3", dec!(10), dec!(10));
    budget.commit("t3", dec!(9.99)).await.unwrap();

    let provider = ScriptedProvider { response: None };
    let messages = vec![UnifiedMessage::user("hello")];

    let result = client
        .call(
            CallRequest {
                provider: "openai".into(),
                model: "m1".into(),
                model_version: None,
                messages: &messages,
                ctx: ctx("t3"),
                stream: false,
                attempt_n: 1,
                cache_hit: false,
            },
            &provider,
        )
        .await;

    assert!(matches!(result, Err(GatewayError::BudgetBlocked { .. })));
    let blocked = usage_store.by_status(UsageStatus::Blocked).await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].cost_usd, dec!(0));
    assert_eq!(blocked[0].total_tokens, 0);
}

#[tokio::test]
async fn s4_soft_limit_crossing_alerts_once() {
    let (client, _usage_store, budget) = gateway().await;
    budget.configure("t4", dec!(10), dec!(20));
    budget.commit("t4", dec!(7.9)).await.unwrap();

    let first = budget.evaluate("t4", dec!(0.5)).await.unwrap();
    assert!(first.notify);
    budget.note_notified("t4").await;
    budget.commit("t4", dec!(0.5)).await.unwrap();

    let second = budget.evaluate("t4", dec!(0.1)).await.unwrap();
    assert!(!second.notify);

    let _ = client; // gateway wiring exercised elsewhere; this scenario targets the guard directly
}

#[tokio::test]
async fn s6_free_tier_then_paid_access() {
    let ledger = FractionalLedger::new(1);
    ledger.init_tenant("t6", BillingTier::Demo);

    let free_quote = ledger.quote("t6", "x", dec!(5.00)).await;
    assert_eq!(free_quote.pricing_rule_used, "free_tier");
    let ChargeResult::Success { .. } = ledger.charge("t6", free_quote).await.unwrap() else {
        panic!("expected free tier charge to succeed");
    };

    let paid_quote = ledger.quote("t6", "x", dec!(5.00)).await;
    assert_eq!(paid_quote.pricing_rule_used, "default_fractional");
    assert_eq!(
        paid_quote.fractional_amount + paid_quote.cost_savings,
        paid_quote.original_cost
    );
}

#[tokio::test]
async fn s7_scheduler_session_serialization() {
    let scheduler = TaskScheduler::new(Default::default(), 60);

    let r1 = scheduler
        .submit("t7", "u1", "session-x", "op", 1, Tier::Standard)
        .await
        .unwrap();
    assert!(matches!(r1, SubmitResult::Accepted { .. }));

    let r2 = scheduler
        .submit("t7", "u1", "session-x", "op", 1, Tier::Standard)
        .await
        .unwrap();
    assert!(matches!(r2, SubmitResult::Rejected { .. }));

    let r3 = scheduler
        .submit("t7", "u1", "session-x", "op", 1, Tier::Premium)
        .await
        .unwrap();
    assert!(matches!(r3, SubmitResult::Accepted { .. }));
}
