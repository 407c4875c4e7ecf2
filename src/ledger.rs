//! C9 — Fractional Billing Ledger: per-tenant balances and fractional charges.
//!
//! Grounded on `original_source/.../fractional_billing.py`.

use crate::error::GatewayResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Billing tier, affecting initial credit and free-tier treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingTier {
    Demo,
    Starter,
    Pro,
    Enterprise,
}

impl BillingTier {
    /// Monthly credit granted when a tenant is first initialized.
    pub fn monthly_credit(self) -> Decimal {
        match self {
            BillingTier::Demo => dec!(5.00),
            BillingTier::Starter => dec!(25.00),
            BillingTier::Pro => dec!(100.00),
            BillingTier::Enterprise => dec!(1000.00),
        }
    }
}

/// How a fractional charge was accessed (§3, Entity: FractionalBillingEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    OneTime,
    Subscription,
    PayPerUse,
    FreeTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// A single fractional billing transaction, append-only (§3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FractionalBillingEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub api_name: String,
    pub access_type: AccessType,
    pub original_cost: Decimal,
    pub fractional_amount: Decimal,
    pub cost_savings: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub pricing_rule_used: String,
}

/// Per-tenant running balance (§3, Entity: TenantBalance).
#[derive(Debug, Clone)]
pub struct TenantBalance {
    pub tenant_id: String,
    pub credit_balance: Decimal,
    pub total_spent: Decimal,
    pub total_saved: Decimal,
    pub apis_accessed: u32,
    pub tier: BillingTier,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl TenantBalance {
    fn new(tenant_id: impl Into<String>, tier: BillingTier) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            credit_balance: tier.monthly_credit(),
            total_spent: Decimal::ZERO,
            total_saved: Decimal::ZERO,
            apis_accessed: 0,
            tier,
            last_transaction_at: None,
        }
    }
}

/// A priced access, ready to be charged via [`FractionalLedger::charge`].
#[derive(Debug, Clone)]
pub struct Quote {
    pub api_name: String,
    pub original_cost: Decimal,
    pub fractional_amount: Decimal,
    pub cost_savings: Decimal,
    pub access_type: AccessType,
    pub pricing_rule_used: String,
}

/// Inputs a [`PricingRule`] needs to decide whether it applies, and to what amount.
pub struct PricingContext<'a> {
    pub tenant_id: &'a str,
    pub api_name: &'a str,
    pub original_cost: Decimal,
    pub apis_accessed: u32,
    pub free_tier_limit: u32,
}

/// One pricing rule in [`FractionalLedger`]'s priority-ordered rule chain
/// (§4.9). Returns `None` when the rule doesn't apply, letting the next rule
/// in the chain try.
pub trait PricingRule: Send + Sync {
    fn apply(&self, ctx: &PricingContext) -> Option<Quote>;
}

/// Grants a free access while the tenant is still within its free-tier quota.
struct FreeTierRule;

impl PricingRule for FreeTierRule {
    fn apply(&self, ctx: &PricingContext) -> Option<Quote> {
        if ctx.apis_accessed >= ctx.free_tier_limit {
            return None;
        }
        Some(Quote {
            api_name: ctx.api_name.to_string(),
            original_cost: ctx.original_cost,
            fractional_amount: Decimal::ZERO,
            cost_savings: ctx.original_cost,
            access_type: AccessType::FreeTier,
            pricing_rule_used: "free_tier".to_string(),
        })
    }
}

/// Falls back to `max(0.20, 1% of cost)`, capped at the original cost.
/// Always applies, so it belongs last in the rule chain.
struct DefaultFractionalRule;

impl PricingRule for DefaultFractionalRule {
    fn apply(&self, ctx: &PricingContext) -> Option<Quote> {
        let fractional_amount = dec!(0.20)
            .max(ctx.original_cost * dec!(0.01))
            .min(ctx.original_cost);
        let cost_savings = ctx.original_cost - fractional_amount;

        Some(Quote {
            api_name: ctx.api_name.to_string(),
            original_cost: ctx.original_cost,
            fractional_amount,
            cost_savings,
            access_type: AccessType::PayPerUse,
            pricing_rule_used: "default_fractional".to_string(),
        })
    }
}

/// Summary returned by [`FractionalLedger::summary`].
#[derive(Debug, Clone)]
pub struct BillingSummary {
    pub balance: TenantBalance,
    pub recent_events: Vec<FractionalBillingEvent>,
}

/// Outcome of [`FractionalLedger::charge`]. `InsufficientBalance` is not a
/// hard error — callers inspect the result rather than a propagated error (§7).
#[derive(Clone)]
pub enum ChargeResult {
    Success { event: FractionalBillingEvent },
    InsufficientBalance { message: String },
}

/// C9's full operation set: init, quote, charge, summary (§4.9).
pub struct FractionalLedger {
    balances: DashMap<String, Arc<Mutex<TenantBalance>>>,
    events: Arc<Mutex<Vec<FractionalBillingEvent>>>,
    free_tier_limit: u32,
    rules: Vec<Box<dyn PricingRule>>,
}

impl FractionalLedger {
    /// Builds the ledger with the default priority-ordered rule chain:
    /// free tier first, then the default fractional rule as a catch-all.
    pub fn new(free_tier_limit: u32) -> Self {
        Self {
            balances: DashMap::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            free_tier_limit,
            rules: vec![Box::new(FreeTierRule), Box::new(DefaultFractionalRule)],
        }
    }

    /// Creates a `TenantBalance` with the tier's monthly credit if absent.
    pub fn init_tenant(&self, tenant_id: &str, tier: BillingTier) {
        self.balances
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TenantBalance::new(tenant_id, tier))));
    }

    fn balance_handle(&self, tenant_id: &str) -> Arc<Mutex<TenantBalance>> {
        self.balances
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TenantBalance::new(tenant_id, BillingTier::Demo))))
            .clone()
    }

    /// Evaluates the rule chain in priority order, returning the first
    /// quote a rule produces (§4.9). `DefaultFractionalRule` always matches,
    /// so it must be the chain's last entry.
    pub async fn quote(&self, tenant_id: &str, api_name: &str, original_cost: Decimal) -> Quote {
        let balance = self.balance_handle(tenant_id);
        let apis_accessed = balance.lock().await.apis_accessed;

        let ctx = PricingContext {
            tenant_id,
            api_name,
            original_cost,
            apis_accessed,
            free_tier_limit: self.free_tier_limit,
        };

        self.rules
            .iter()
            .find_map(|rule| rule.apply(&ctx))
            .expect("DefaultFractionalRule always matches")
    }

    /// Atomically charges a tenant for a prior [`Quote`], serializing
    /// concurrent charges for the same tenant behind a per-tenant mutex so
    /// the balance never double-spends (§4.9, invariant 6).
    pub async fn charge(&self, tenant_id: &str, quote: Quote) -> GatewayResult<ChargeResult> {
        let balance = self.balance_handle(tenant_id);
        let mut balance = balance.lock().await;

        if quote.fractional_amount > Decimal::ZERO && balance.credit_balance < quote.fractional_amount
        {
            return Ok(ChargeResult::InsufficientBalance {
                message: format!(
                    "insufficient balance: need {}, have {}",
                    quote.fractional_amount, balance.credit_balance
                ),
            });
        }

        balance.credit_balance -= quote.fractional_amount;
        balance.total_spent += quote.fractional_amount;
        balance.total_saved += quote.cost_savings;
        balance.apis_accessed += 1;
        balance.last_transaction_at = Some(Utc::now());

        let event = FractionalBillingEvent {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            user_id: None,
            api_name: quote.api_name,
            access_type: quote.access_type,
            original_cost: quote.original_cost,
            fractional_amount: quote.fractional_amount,
            cost_savings: quote.cost_savings,
            currency: "USD".to_string(),
            timestamp: Utc::now(),
            expires_at: None,
            payment_status: PaymentStatus::Completed,
            pricing_rule_used: quote.pricing_rule_used,
        };

        self.events.lock().await.push(event.clone());

        Ok(ChargeResult::Success { event })
    }

    pub async fn summary(&self, tenant_id: &str) -> BillingSummary {
        let balance = self.balance_handle(tenant_id);
        let balance = balance.lock().await.clone();
        let events = self.events.lock().await;
        let recent_events = events
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect();

        BillingSummary {
            balance,
            recent_events,
        }
    }
}


impl std::fmt::Debug for ChargeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeResult::Success { event } => {
                write!(f, "Success({})", event.id)
            }
            ChargeResult::InsufficientBalance { message } => {
                write!(f, "InsufficientBalance({message})")
            }
        }
    }
}
