//! # llm-control-plane
//!
//! A multi-tenant control plane that sits in front of third-party LLM and
//! embedding providers. For every call it enforces per-tenant budgets before
//! dispatch, tracks tokens/latency/cost, persists one immutable usage event
//! per call, charges the tenant's running budget, and emits alerts when
//! soft/hard thresholds are crossed. On top of that it offers a fractional
//! billing ledger for cached/shared artifacts and a tiered task scheduler for
//! long-running processing jobs.
//!
//! ## Key Features
//!
//! - **Budget enforcement**: soft/hard per-tenant thresholds with debounced alerts
//! - **Cost accounting**: fixed-decimal cost computation from a versioned price table
//! - **Usage tracking**: append-only, redacted usage events for every call
//! - **Fractional billing**: per-tenant credit balances and shared-artifact pricing
//! - **Task scheduling**: tier-weighted admission, serialization, and progress streaming
//!
//! ## Example
//!
//! ```rust,no_run
//! use llm_control_plane::{
//!     GatewayClient, GatewayConfig, InMemoryBudgetGuard, InMemoryPriceTable,
//!     InMemoryUsageEventStore, LoggingAlerter, NoopTracer, Period,
//! };
//! use std::sync::Arc;
//! use chrono::Utc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let price_table = Arc::new(InMemoryPriceTable::new());
//! price_table.seed_defaults().await?;
//! let budget_guard = Arc::new(InMemoryBudgetGuard::new(Period::Monthly, Utc::now()));
//!
//! let client = GatewayClient::new(
//!     GatewayConfig::default(),
//!     price_table,
//!     Arc::new(InMemoryUsageEventStore::new()),
//!     budget_guard,
//!     Arc::new(NoopTracer),
//!     Arc::new(LoggingAlerter),
//! );
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::missing_errors_doc)]

// =============================================================================
// Module declarations
// =============================================================================

// Public modules - flattened structure matching DESIGN.md
pub mod alerts;
pub mod budget;
pub mod config;
pub mod cost;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod pricing;
pub mod provider;
pub mod redaction;
pub mod scheduler;
pub mod tokens;
pub mod tracer;
pub mod usage_store;
pub mod wrapper;

// Internal modules
pub(crate) mod internals;
pub(crate) mod logging;

// =============================================================================
// Public API re-exports
// =============================================================================

pub use alerts::{Alert, Alerter, LoggingAlerter};
pub use budget::{
    BudgetDecision, BudgetGuard, BudgetState, InMemoryBudgetGuard, Period, TenantBudget,
};
pub use config::{GatewayConfig, ResourceMultipliers, Tier};
pub use cost::compute_cost;
pub use error::{ErrorCategory, ErrorSeverity, GatewayError, GatewayResult};
pub use ledger::{
    AccessType, BillingSummary, BillingTier, ChargeResult, FractionalBillingEvent,
    FractionalLedger, PaymentStatus, PricingContext, PricingRule, Quote, TenantBalance,
};
pub use messages::{MessageRole, UnifiedMessage};
pub use pricing::{InMemoryPriceTable, PriceRow, PriceTable};
pub use provider::{
    EmbedCallable, EmbeddingResponse, ProviderCallable, ProviderChunk, ProviderResponse,
    ReportedUsage,
};
pub use redaction::{redact, Redaction};
pub use scheduler::{
    ProcessingTask, ProgressFrame, ProgressFrameType, SubmitResult, TaskScheduler, TaskStatus,
};
pub use tokens::{estimate_prompt_tokens, estimate_text_tokens};
pub use tracer::{NoopTracer, SpanAttributes, SpanHandle, SpanStatus, Tracer, TracingSpanTracer};
pub use usage_store::{
    InMemoryUsageEventStore, SessionContext, TokenSource, UsageEvent, UsageEventStore, UsageStatus,
};
pub use wrapper::{CallRequest, GatewayClient};
