//! C8 — LLM Call Wrapper: orchestrates C1–C7 around an injected provider callable.
//!
//! Grounded on `original_source/.../llm_wrapper.py::call_llm_and_track` and
//! `embed_and_track`, implementing the ten-step algorithm of spec.md §4.8.

use crate::alerts::{dispatch_alert, Alert, Alerter};
use crate::budget::BudgetGuard;
use crate::config::GatewayConfig;
use crate::cost::compute_cost;
use crate::error::{GatewayError, GatewayResult};
use crate::internals::retry::{RetryExecutor, RetryPolicy};
use crate::messages::{concat_text, UnifiedMessage};
use crate::pricing::PriceTable;
use crate::provider::{EmbedCallable, ProviderCallable, ProviderResponse};
use crate::redaction::redact;
use crate::tokens::{estimate_prompt_tokens, estimate_text_tokens};
use crate::tracer::{record_call_outcome, SpanAttributes, SpanStatus, Tracer};
use crate::usage_store::{SessionContext, TokenSource, UsageEvent, UsageEventStore, UsageStatus};
use chrono::Utc;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Inputs for one call through the wrapper (§4.8 "Inputs (per call)").
pub struct CallRequest<'a> {
    pub provider: String,
    pub model: String,
    pub model_version: Option<String>,
    pub messages: &'a [UnifiedMessage],
    pub ctx: SessionContext,
    pub stream: bool,
    pub attempt_n: u32,
    pub cache_hit: bool,
}

/// The assembled control plane, wiring C1–C7 and the alert dispatcher
/// together behind the wrapper's ten-step algorithm.
pub struct GatewayClient {
    config: GatewayConfig,
    price_table: Arc<dyn PriceTable>,
    usage_store: Arc<dyn UsageEventStore>,
    budget_guard: Arc<dyn BudgetGuard>,
    tracer: Arc<dyn Tracer>,
    alerter: Arc<dyn Alerter>,
}

impl GatewayClient {
    pub fn new(
        config: GatewayConfig,
        price_table: Arc<dyn PriceTable>,
        usage_store: Arc<dyn UsageEventStore>,
        budget_guard: Arc<dyn BudgetGuard>,
        tracer: Arc<dyn Tracer>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        Self {
            config,
            price_table,
            usage_store,
            budget_guard,
            tracer,
            alerter,
        }
    }

    /// Runs the ten-step algorithm of spec.md §4.8 for a non-streaming or
    /// streaming chat call.
    pub async fn call(
        &self,
        req: CallRequest<'_>,
        provider_callable: &dyn ProviderCallable,
    ) -> GatewayResult<ProviderResponse> {
        let call_start = Instant::now();

        // Step 1: estimate phase.
        let prompt_text = concat_text(req.messages);
        let est_prompt_tokens = estimate_prompt_tokens(req.messages);

        // Step 2: pre-check phase.
        let price = self
            .price_table
            .get_latest(&req.provider, &req.model, Utc::now())
            .await;
        let projected_cost = match &price {
            Some(price) => compute_cost(
                price,
                est_prompt_tokens,
                self.config.default_output_token_estimate,
                0,
                req.cache_hit,
            ),
            None => Decimal::ZERO,
        };

        let decision = self
            .budget_guard
            .evaluate(&req.ctx.tenant_id, projected_cost)
            .await?;

        if decision.notify {
            dispatch_alert(
                self.alerter.as_ref(),
                Alert {
                    tenant_id: req.ctx.tenant_id.clone(),
                    subject: format!("budget alert: {:?}", decision.state),
                    body: decision.message.clone(),
                },
            )
            .await;
            self.budget_guard.note_notified(&req.ctx.tenant_id).await;
        }

        if decision.should_block {
            self.persist_blocked_event(&req, &prompt_text).await?;
            return Err(GatewayError::budget_blocked(decision.message));
        }

        // Step 3: span open.
        let mut span = self.tracer.start_span(SpanAttributes {
            provider: Some(req.provider.clone()),
            model: Some(req.model.clone()),
            tenant_id: Some(req.ctx.tenant_id.clone()),
            session_id: Some(req.ctx.session_id.clone()),
            run_id: Some(req.ctx.run_id.clone()),
            step_id: Some(req.ctx.step_id.clone()),
            extra: Default::default(),
        });

        // Step 4-6: dispatch, reconciliation, cost compute.
        let dispatch_result = if req.stream {
            self.dispatch_streaming(provider_callable, &req).await
        } else {
            self.dispatch_non_streaming(provider_callable, &req).await
        };

        match dispatch_result {
            Ok(outcome) => {
                let final_cost = match &price {
                    Some(price) => compute_cost(
                        price,
                        outcome.prompt_tokens,
                        outcome.completion_tokens,
                        outcome.reasoning_tokens,
                        req.cache_hit,
                    ),
                    None => Decimal::ZERO,
                };

                // Step 7: persist.
                let redaction = redact(&prompt_text);
                let event = UsageEvent {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    tenant_id: req.ctx.tenant_id.clone(),
                    session_id: req.ctx.session_id.clone(),
                    run_id: req.ctx.run_id.clone(),
                    step_id: req.ctx.step_id.clone(),
                    provider: req.provider.clone(),
                    model: req.model.clone(),
                    model_version: req.model_version.clone(),
                    prompt_tokens: outcome.prompt_tokens,
                    completion_tokens: outcome.completion_tokens,
                    total_tokens: outcome.prompt_tokens + outcome.completion_tokens,
                    token_breakdown: None,
                    cost_usd: final_cost,
                    status: UsageStatus::Ok,
                    source: outcome.source,
                    user_id: req.ctx.user_id.clone(),
                    workspace_id: req.ctx.workspace_id.clone(),
                    parent_step_id: req.ctx.parent_step_id.clone(),
                    agent_name: req.ctx.agent_name.clone(),
                    tool_name: req.ctx.tool_name.clone(),
                    cache_hit: Some(req.cache_hit),
                    retries: Some(outcome.retries),
                    latency_ms: Some(call_start.elapsed().as_millis() as u64),
                    error_code: None,
                    redaction_applied: Some(redaction.was_redacted),
                    prompt_digest: Some(redaction.digest),
                    completion_digest: Some(crate::redaction::redact(&outcome.text).digest),
                };
                self.usage_store.append(event).await?;

                // Step 8: commit budget.
                self.budget_guard.commit(&req.ctx.tenant_id, final_cost).await?;

                // Step 9: span close.
                record_call_outcome(
                    span.as_mut(),
                    outcome.prompt_tokens,
                    outcome.completion_tokens,
                    outcome.prompt_tokens + outcome.completion_tokens,
                    final_cost,
                    req.cache_hit,
                    outcome.retries,
                );
                span.close(SpanStatus::Ok);

                // Step 10: return.
                Ok(ProviderResponse {
                    text: outcome.text,
                    usage: None,
                })
            }
            Err((error, observed_prompt, observed_completion, retries)) => {
                let final_cost = match &price {
                    Some(price) => {
                        compute_cost(price, observed_prompt, observed_completion, 0, req.cache_hit)
                    }
                    None => Decimal::ZERO,
                };
                let redaction = redact(&prompt_text);

                let error_code = if matches!(error, GatewayError::Cancelled) {
                    "cancelled".to_string()
                } else {
                    error_code_of(&error)
                };

                let event = UsageEvent {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    tenant_id: req.ctx.tenant_id.clone(),
                    session_id: req.ctx.session_id.clone(),
                    run_id: req.ctx.run_id.clone(),
                    step_id: req.ctx.step_id.clone(),
                    provider: req.provider.clone(),
                    model: req.model.clone(),
                    model_version: req.model_version.clone(),
                    prompt_tokens: observed_prompt,
                    completion_tokens: observed_completion,
                    total_tokens: observed_prompt + observed_completion,
                    token_breakdown: None,
                    cost_usd: final_cost,
                    status: UsageStatus::Error,
                    source: TokenSource::Estimated,
                    user_id: req.ctx.user_id.clone(),
                    workspace_id: req.ctx.workspace_id.clone(),
                    parent_step_id: req.ctx.parent_step_id.clone(),
                    agent_name: req.ctx.agent_name.clone(),
                    tool_name: req.ctx.tool_name.clone(),
                    cache_hit: Some(req.cache_hit),
                    retries: Some(retries),
                    latency_ms: Some(call_start.elapsed().as_millis() as u64),
                    error_code: Some(error_code),
                    redaction_applied: Some(redaction.was_redacted),
                    prompt_digest: Some(redaction.digest),
                    completion_digest: None,
                };
                self.usage_store.append(event).await?;
                self.budget_guard.commit(&req.ctx.tenant_id, final_cost).await?;

                record_call_outcome(
                    span.as_mut(),
                    observed_prompt,
                    observed_completion,
                    observed_prompt + observed_completion,
                    final_cost,
                    req.cache_hit,
                    retries,
                );
                span.close(SpanStatus::Error);

                Err(error)
            }
        }
    }

    /// Embedding variant (§4.8): `completion_tokens=0` fixed, a single string
    /// input, the provider callable returning a vector plus optional usage.
    pub async fn embed(
        &self,
        provider: &str,
        model: &str,
        text: &str,
        ctx: SessionContext,
        embed_callable: &dyn EmbedCallable,
    ) -> GatewayResult<Vec<f32>> {
        let est_prompt_tokens = estimate_text_tokens(text);

        let price = self.price_table.get_latest(provider, model, Utc::now()).await;
        let projected_cost = match &price {
            Some(price) => compute_cost(price, est_prompt_tokens, 0, 0, false),
            None => Decimal::ZERO,
        };

        let decision = self.budget_guard.evaluate(&ctx.tenant_id, projected_cost).await?;
        if decision.notify {
            dispatch_alert(
                self.alerter.as_ref(),
                Alert {
                    tenant_id: ctx.tenant_id.clone(),
                    subject: format!("budget alert: {:?}", decision.state),
                    body: decision.message.clone(),
                },
            )
            .await;
            self.budget_guard.note_notified(&ctx.tenant_id).await;
        }

        if decision.should_block {
            let redaction = redact(text);
            let event = blocked_embed_event(provider, model, &ctx, &redaction);
            self.usage_store.append(event).await?;
            return Err(GatewayError::budget_blocked(decision.message));
        }

        let call_start = Instant::now();
        let result = embed_callable.embed(text).await;

        let redaction = redact(text);

        match result {
            Ok(response) => {
                let prompt_tokens = response
                    .usage
                    .and_then(|u| u.prompt_tokens)
                    .unwrap_or(est_prompt_tokens);
                let source = if response
                    .usage
                    .map(|u| u.prompt_tokens.is_some())
                    .unwrap_or(false)
                {
                    TokenSource::Provider
                } else {
                    TokenSource::Estimated
                };

                let final_cost = match &price {
                    Some(price) => compute_cost(price, prompt_tokens, 0, 0, false),
                    None => Decimal::ZERO,
                };

                let event = UsageEvent {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    tenant_id: ctx.tenant_id.clone(),
                    session_id: ctx.session_id.clone(),
                    run_id: ctx.run_id.clone(),
                    step_id: ctx.step_id.clone(),
                    provider: provider.to_string(),
                    model: model.to_string(),
                    model_version: None,
                    prompt_tokens,
                    completion_tokens: 0,
                    total_tokens: prompt_tokens,
                    token_breakdown: None,
                    cost_usd: final_cost,
                    status: UsageStatus::Ok,
                    source,
                    user_id: ctx.user_id.clone(),
                    workspace_id: ctx.workspace_id.clone(),
                    parent_step_id: ctx.parent_step_id.clone(),
                    agent_name: ctx.agent_name.clone(),
                    tool_name: ctx.tool_name.clone(),
                    cache_hit: Some(false),
                    retries: Some(0),
                    latency_ms: Some(call_start.elapsed().as_millis() as u64),
                    error_code: None,
                    redaction_applied: Some(redaction.was_redacted),
                    prompt_digest: Some(redaction.digest),
                    completion_digest: None,
                };
                self.usage_store.append(event).await?;
                self.budget_guard.commit(&ctx.tenant_id, final_cost).await?;

                Ok(response.vector)
            }
            Err(error) => {
                let event = UsageEvent {
                    id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    tenant_id: ctx.tenant_id.clone(),
                    session_id: ctx.session_id.clone(),
                    run_id: ctx.run_id.clone(),
                    step_id: ctx.step_id.clone(),
                    provider: provider.to_string(),
                    model: model.to_string(),
                    model_version: None,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                    token_breakdown: None,
                    cost_usd: Decimal::ZERO,
                    status: UsageStatus::Error,
                    source: TokenSource::Estimated,
                    user_id: ctx.user_id.clone(),
                    workspace_id: ctx.workspace_id.clone(),
                    parent_step_id: ctx.parent_step_id.clone(),
                    agent_name: ctx.agent_name.clone(),
                    tool_name: ctx.tool_name.clone(),
                    cache_hit: Some(false),
                    retries: Some(0),
                    latency_ms: Some(call_start.elapsed().as_millis() as u64),
                    error_code: Some(error_code_of(&error)),
                    redaction_applied: Some(redaction.was_redacted),
                    prompt_digest: Some(redaction.digest),
                    completion_digest: None,
                };
                self.usage_store.append(event).await?;
                self.budget_guard.commit(&ctx.tenant_id, Decimal::ZERO).await?;
                Err(error)
            }
        }
    }

    async fn persist_blocked_event(
        &self,
        req: &CallRequest<'_>,
        prompt_text: &str,
    ) -> GatewayResult<()> {
        let redaction = redact(prompt_text);
        let event = UsageEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tenant_id: req.ctx.tenant_id.clone(),
            session_id: req.ctx.session_id.clone(),
            run_id: req.ctx.run_id.clone(),
            step_id: req.ctx.step_id.clone(),
            provider: req.provider.clone(),
            model: req.model.clone(),
            model_version: req.model_version.clone(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            token_breakdown: None,
            cost_usd: Decimal::ZERO,
            status: UsageStatus::Blocked,
            source: TokenSource::Estimated,
            user_id: req.ctx.user_id.clone(),
            workspace_id: req.ctx.workspace_id.clone(),
            parent_step_id: req.ctx.parent_step_id.clone(),
            agent_name: req.ctx.agent_name.clone(),
            tool_name: req.ctx.tool_name.clone(),
            cache_hit: Some(req.cache_hit),
            retries: Some(0),
            latency_ms: None,
            error_code: None,
            redaction_applied: Some(redaction.was_redacted),
            prompt_digest: Some(redaction.digest),
            completion_digest: None,
        };
        self.usage_store.append(event).await
    }

    /// Non-streaming dispatch with retry/circuit-breaking via
    /// `internals::retry::RetryExecutor`.
    async fn dispatch_non_streaming(
        &self,
        provider_callable: &dyn ProviderCallable,
        req: &CallRequest<'_>,
    ) -> Result<DispatchOutcome, (GatewayError, u32, u32, u32)> {
        let mut executor = RetryExecutor::new(RetryPolicy::default());
        let messages = req.messages;

        let result = executor
            .execute(|| async { provider_callable.call(messages).await })
            .await;

        match result {
            Ok((response, attempts)) => {
                let (prompt_tokens, completion_tokens, reasoning_tokens, source) =
                    reconcile_usage(req, &response);
                Ok(DispatchOutcome {
                    text: response.text,
                    prompt_tokens,
                    completion_tokens,
                    reasoning_tokens,
                    source,
                    retries: attempts.saturating_sub(1),
                })
            }
            Err((error, attempts)) => Err((
                error,
                estimate_prompt_tokens(req.messages),
                0,
                attempts.saturating_sub(1),
            )),
        }
    }

    /// Streaming dispatch: consumes chunks in order, aggregating text and
    /// completion token counts without reordering (§4.8 step 4).
    async fn dispatch_streaming(
        &self,
        provider_callable: &dyn ProviderCallable,
        req: &CallRequest<'_>,
    ) -> Result<DispatchOutcome, (GatewayError, u32, u32, u32)> {
        let mut stream = match provider_callable.call_stream(req.messages).await {
            Ok(stream) => stream,
            Err(error) => return Err((error, estimate_prompt_tokens(req.messages), 0, 0)),
        };

        let mut text = String::new();
        let mut completion_tokens: u32 = 0;
        let mut reasoning_tokens: u32 = 0;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(delta) = chunk.delta_text {
                        text.push_str(&delta);
                    }
                    completion_tokens += chunk.delta_tokens.unwrap_or(0);
                    reasoning_tokens += chunk.delta_reasoning_tokens.unwrap_or(0);
                }
                Err(error) => {
                    return Err((
                        error,
                        estimate_prompt_tokens(req.messages),
                        completion_tokens,
                        0,
                    ));
                }
            }
        }

        Ok(DispatchOutcome {
            text,
            prompt_tokens: estimate_prompt_tokens(req.messages),
            completion_tokens,
            reasoning_tokens,
            source: TokenSource::Estimated,
            retries: 0,
        })
    }
}

struct DispatchOutcome {
    text: String,
    prompt_tokens: u32,
    completion_tokens: u32,
    reasoning_tokens: u32,
    source: TokenSource,
    retries: u32,
}

/// If the provider reports usage, trusts its `total_tokens` over
/// `prompt+completion` when they disagree, adjusting completion to hold the
/// invariant (§4.8 step 4).
fn reconcile_usage(req: &CallRequest<'_>, response: &ProviderResponse) -> (u32, u32, u32, TokenSource) {
    let est_prompt = estimate_prompt_tokens(req.messages);

    let Some(usage) = response.usage else {
        let est_completion = estimate_text_tokens(&response.text);
        return (est_prompt, est_completion, 0, TokenSource::Estimated);
    };

    let prompt = usage.prompt_tokens.unwrap_or(est_prompt);
    let mut completion = usage.completion_tokens.unwrap_or(0);
    let reasoning = usage.reasoning_tokens.unwrap_or(0);

    if let Some(total) = usage.total_tokens {
        if total != prompt + completion {
            completion = total.saturating_sub(prompt);
        }
    }

    (prompt, completion, reasoning, TokenSource::Provider)
}

/// Symbolic error code recorded on the usage event; never the raw payload (§7).
fn error_code_of(error: &GatewayError) -> String {
    match error {
        GatewayError::BudgetBlocked { .. } => "budget_blocked".to_string(),
        GatewayError::ProviderError { error_code, .. } => error_code.clone(),
        GatewayError::Cancelled => "cancelled".to_string(),
        GatewayError::ResponseParsingError { .. } => "response_parsing_error".to_string(),
        GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded".to_string(),
        GatewayError::Timeout { .. } => "timeout".to_string(),
        GatewayError::ConfigurationError { .. } => "configuration_error".to_string(),
        GatewayError::InsufficientBalance { .. } => "insufficient_balance".to_string(),
    }
}

fn blocked_embed_event(
    provider: &str,
    model: &str,
    ctx: &SessionContext,
    redaction: &crate::redaction::Redaction,
) -> UsageEvent {
    UsageEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        tenant_id: ctx.tenant_id.clone(),
        session_id: ctx.session_id.clone(),
        run_id: ctx.run_id.clone(),
        step_id: ctx.step_id.clone(),
        provider: provider.to_string(),
        model: model.to_string(),
        model_version: None,
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        token_breakdown: None,
        cost_usd: Decimal::ZERO,
        status: UsageStatus::Blocked,
        source: TokenSource::Estimated,
        user_id: ctx.user_id.clone(),
        workspace_id: ctx.workspace_id.clone(),
        parent_step_id: ctx.parent_step_id.clone(),
        agent_name: ctx.agent_name.clone(),
        tool_name: ctx.tool_name.clone(),
        cache_hit: Some(false),
        retries: Some(0),
        latency_ms: None,
        error_code: None,
        redaction_applied: Some(redaction.was_redacted),
        prompt_digest: Some(redaction.digest.clone()),
        completion_digest: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{InMemoryBudgetGuard, Period};
    use crate::pricing::InMemoryPriceTable;
    use crate::provider::fakes::FakeProvider;
    use crate::provider::ReportedUsage;
    use crate::alerts::LoggingAlerter;
    use crate::tracer::NoopTracer;
    use crate::usage_store::InMemoryUsageEventStore;
    use rust_decimal_macros::dec;

    fn ctx() -> SessionContext {
        SessionContext {
            tenant_id: "t1".into(),
            user_id: None,
            workspace_id: None,
            session_id: "s1".into(),
            run_id: "r1".into(),
            step_id: "st1".into(),
            parent_step_id: None,
            agent_name: None,
            tool_name: None,
        }
    }

    async fn client() -> (GatewayClient, Arc<InMemoryUsageEventStore>, Arc<InMemoryBudgetGuard>) {
        let price_table = Arc::new(InMemoryPriceTable::new());
        price_table.seed_defaults().await.unwrap();
        let usage_store = Arc::new(InMemoryUsageEventStore::new());
        let budget_guard = Arc::new(InMemoryBudgetGuard::new(Period::Monthly, Utc::now()));
        budget_guard.configure("t1", dec!(100), dec!(200));

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
    async fn s1_normal_call_persists_one_event_and_commits_budget() {
        let (client, usage_store, _budget) = client().await;
        let provider = FakeProvider::ok(
            "hello",
            Some(ReportedUsage {
                prompt_tokens: Some(1000),
                completion_tokens: Some(2000),
                total_tokens: Some(3000),
                reasoning_tokens: None,
            }),
        );
        let messages = vec![UnifiedMessage::user("hi")];

        let req = CallRequest {
            provider: "openai".into(),
            model: "m1".into(),
            model_version: None,
            messages: &messages,
            ctx: ctx(),
            stream: false,
            attempt_n: 1,
            cache_hit: false,
        };

        let result = client.call(req, &provider).await.unwrap();
        assert_eq!(result.text, "hello");

        let events = usage_store.by_status(UsageStatus::Ok).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cost_usd, dec!(0.350000));
        assert_eq!(events[0].total_tokens, 3000);
    }

    #[tokio::test]
    async fn s3_hard_block_skips_provider_and_writes_blocked_event() {
        let (client, usage_store, budget) = client().await;
        budget.configure("t2", dec!(10), dec!(10));
        budget.commit("t2", dec!(9.99)).await.unwrap();

        let provider = FakeProvider::failing("should never be called");
        let messages = vec![UnifiedMessage::user("hi")];
        let mut session = ctx();
        session.tenant_id = "t2".into();

        let req = CallRequest {
            provider: "openai".into(),
            model: "m1".into(),
            model_version: None,
            messages: &messages,
            ctx: session,
            stream: false,
            attempt_n: 1,
            cache_hit: false,
        };

        let result = client.call(req, &provider).await;
        assert!(matches!(result, Err(GatewayError::BudgetBlocked { .. })));

        let blocked = usage_store.by_status(UsageStatus::Blocked).await;
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].cost_usd, dec!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn error_path_persists_error_event_and_commits_partial_cost() {
        let (client, usage_store, _budget) = client().await;
        let provider = FakeProvider::failing("connection_reset");
        let messages = vec![UnifiedMessage::user("hi")];

        let req = CallRequest {
            provider: "openai".into(),
            model: "m1".into(),
            model_version: None,
            messages: &messages,
            ctx: ctx(),
            stream: false,
            attempt_n: 1,
            cache_hit: false,
        };

        // A `ProviderError` is retryable, so this exhausts the default retry
        // policy's full backoff schedule (1s/2s/4s/8s between 5 attempts)
        // before the call finally fails. The paused clock auto-advances
        // since this task is the only one parked on a timer.
        let result = client.call(req, &provider).await;
        assert!(result.is_err());

        let errors = usage_store.by_status(UsageStatus::Error).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].error_code.is_some());
        assert_eq!(errors[0].retries, Some(4));
    }

    #[tokio::test]
    async fn s5_streaming_reconciliation_sums_deltas_in_order() {
        use crate::provider::ProviderChunk;

        let (client, usage_store, _budget) = client().await;
        let provider = FakeProvider::streaming(vec![
            ProviderChunk {
                delta_text: Some("a".into()),
                delta_tokens: Some(10),
                delta_reasoning_tokens: None,
            },
            ProviderChunk {
                delta_text: Some("b".into()),
                delta_tokens: Some(15),
                delta_reasoning_tokens: None,
            },
            ProviderChunk {
                delta_text: Some("c".into()),
                delta_tokens: Some(20),
                delta_reasoning_tokens: None,
            },
        ]);
        let messages = vec![UnifiedMessage::user("hi")];

        let req = CallRequest {
            provider: "openai".into(),
            model: "m1".into(),
            model_version: None,
            messages: &messages,
            ctx: ctx(),
            stream: true,
            attempt_n: 1,
            cache_hit: false,
        };

        let result = client.call(req, &provider).await.unwrap();
        assert_eq!(result.text, "abc");

        let events = usage_store.by_status(UsageStatus::Ok).await;
        assert_eq!(events[0].completion_tokens, 45);
        assert_eq!(events[0].source, TokenSource::Estimated);
    }
}
