//! C6 — Budget Guard: per-tenant, per-period rolling spend with soft/hard thresholds.

use crate::error::GatewayResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Billing period granularity for a [`TenantBudget`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Monthly,
}

/// Current classification of a tenant's spending within a period (§3, §6 glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    Ok,
    SoftExceeded,
    HardBlocked,
}

/// Alert debounce band, advanced only by [`InMemoryBudgetGuard::note_notified`],
/// never by `evaluate` itself (spec §9 open question: evaluate stays pure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AlertBand {
    None,
    EarlyWarning,
    SoftExceeded,
    HardBlocked,
}

/// One row of tenant spend tracking for a `(tenant_id, period, period_start)` key.
#[derive(Debug, Clone)]
pub struct TenantBudget {
    pub tenant_id: String,
    pub period: Period,
    pub period_start: DateTime<Utc>,
    pub soft_limit_usd: Decimal,
    pub hard_limit_usd: Decimal,
    pub usage_to_date_usd: Decimal,
    pub state: BudgetState,
    last_notified_band: AlertBand,
}

impl TenantBudget {
    pub fn new(
        tenant_id: impl Into<String>,
        period: Period,
        period_start: DateTime<Utc>,
        soft_limit_usd: Decimal,
        hard_limit_usd: Decimal,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            period,
            period_start,
            soft_limit_usd,
            hard_limit_usd,
            usage_to_date_usd: Decimal::ZERO,
            state: BudgetState::Ok,
            last_notified_band: AlertBand::None,
        }
    }

    fn band_for(&self, total: Decimal) -> AlertBand {
        if total >= self.hard_limit_usd {
            AlertBand::HardBlocked
        } else if total >= self.soft_limit_usd {
            AlertBand::SoftExceeded
        } else if total >= self.soft_limit_usd * Decimal::new(8, 1) {
            AlertBand::EarlyWarning
        } else {
            AlertBand::None
        }
    }

    fn recompute_state(&mut self) {
        self.state = if self.usage_to_date_usd >= self.hard_limit_usd {
            BudgetState::HardBlocked
        } else if self.usage_to_date_usd >= self.soft_limit_usd {
            BudgetState::SoftExceeded
        } else {
            BudgetState::Ok
        };
    }
}

/// Result of [`BudgetGuard::evaluate`] (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetDecision {
    pub state: BudgetState,
    pub should_block: bool,
    pub notify: bool,
    pub message: String,
}

#[async_trait]
pub trait BudgetGuard: Send + Sync {
    /// Pure, side-effect-free pre-check: does not mutate counters (§9).
    async fn evaluate(
        &self,
        tenant_id: &str,
        projected_cost: Decimal,
    ) -> GatewayResult<BudgetDecision>;

    /// Atomically adds `actual_cost` to `usage_to_date_usd` and recomputes state.
    async fn commit(&self, tenant_id: &str, actual_cost: Decimal) -> GatewayResult<()>;

    /// Advances the per-row alert high-water-mark after an alert has actually
    /// been dispatched, so debouncing happens without `evaluate` mutating state.
    async fn note_notified(&self, tenant_id: &str);
}

/// In-process budget guard keyed on `(tenant_id, period, period_start)`,
/// one row per key behind a per-row mutex via a sharded `DashMap`.
pub struct InMemoryBudgetGuard {
    rows: DashMap<String, Arc<Mutex<TenantBudget>>>,
    default_period: Period,
    default_period_start: DateTime<Utc>,
}

impl InMemoryBudgetGuard {
    pub fn new(default_period: Period, default_period_start: DateTime<Utc>) -> Self {
        Self {
            rows: DashMap::new(),
            default_period,
            default_period_start,
        }
    }

    /// Registers budget limits for a tenant; a no-op if already configured
    /// for this period.
    pub fn configure(&self, tenant_id: &str, soft_limit_usd: Decimal, hard_limit_usd: Decimal) {
        self.rows.entry(tenant_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(TenantBudget::new(
                tenant_id,
                self.default_period,
                self.default_period_start,
                soft_limit_usd,
                hard_limit_usd,
            )))
        });
    }

    fn row_for(&self, tenant_id: &str) -> Option<Arc<Mutex<TenantBudget>>> {
        self.rows.get(tenant_id).map(|r| r.clone())
    }
}

#[async_trait]
impl BudgetGuard for InMemoryBudgetGuard {
    async fn evaluate(
        &self,
        tenant_id: &str,
        projected_cost: Decimal,
    ) -> GatewayResult<BudgetDecision> {
        let Some(row) = self.row_for(tenant_id) else {
            return Ok(BudgetDecision {
                state: BudgetState::Ok,
                should_block: false,
                notify: false,
                message: "no budget".to_string(),
            });
        };

        let row = row.lock().await;
        let new_total = row.usage_to_date_usd + projected_cost;
        let band = row.band_for(new_total);

        // First-match-wins decision table (§4.6); notify debounces against the
        // row's high-water-mark, which evaluate reads but never advances.
        let (state, should_block, message) = if new_total >= row.hard_limit_usd {
            (BudgetState::HardBlocked, true, "hard limit would be exceeded")
        } else if new_total >= row.soft_limit_usd {
            (BudgetState::SoftExceeded, false, "soft limit exceeded")
        } else if new_total >= row.soft_limit_usd * Decimal::new(8, 1) {
            (BudgetState::Ok, false, "approaching soft limit")
        } else {
            (BudgetState::Ok, false, "within budget")
        };

        let notify = band != AlertBand::None && band > row.last_notified_band;

        Ok(BudgetDecision {
            state,
            should_block,
            notify,
            message: message.to_string(),
        })
    }

    async fn commit(&self, tenant_id: &str, actual_cost: Decimal) -> GatewayResult<()> {
        let Some(row) = self.row_for(tenant_id) else {
            return Ok(());
        };
        let mut row = row.lock().await;
        row.usage_to_date_usd += actual_cost;
        row.recompute_state();
        Ok(())
    }

    async fn note_notified(&self, tenant_id: &str) {
        let Some(row) = self.row_for(tenant_id) else {
            return;
        };
        let mut row = row.lock().await;
        let band = row.band_for(row.usage_to_date_usd);
        if band > row.last_notified_band {
            row.last_notified_band = band;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn guard() -> InMemoryBudgetGuard {
        InMemoryBudgetGuard::new(Period::Monthly, Utc::now())
    }

    #[tokio::test]
    async fn no_budget_configured_is_ok_and_non_blocking() {
        let guard = guard();
        let decision = guard.evaluate("unknown", dec!(5)).await.unwrap();
        assert_eq!(decision.state, BudgetState::Ok);
        assert!(!decision.should_block);
        assert!(!decision.notify);
    }

    #[tokio::test]
    async fn s3_hard_limit_blocks() {
        let guard = guard();
        guard.configure("t1", dec!(10), dec!(10));
        guard.commit("t1", dec!(9.99)).await.unwrap();

        let decision = guard.evaluate("t1", dec!(0.05)).await.unwrap();
        assert_eq!(decision.state, BudgetState::HardBlocked);
        assert!(decision.should_block);
        assert!(decision.notify);
    }

    #[tokio::test]
    async fn s4_soft_crossing_alerts_once() {
        let guard = guard();
        guard.configure("t1", dec!(10), dec!(20));
        guard.commit("t1", dec!(7.9)).await.unwrap();

        let first = guard.evaluate("t1", dec!(0.5)).await.unwrap();
        assert!(first.notify);
        guard.note_notified("t1").await;
        guard.commit("t1", dec!(0.5)).await.unwrap();

        let second = guard.evaluate("t1", dec!(0.1)).await.unwrap();
        assert!(!second.notify, "must not re-alert within the same band");
    }

    #[tokio::test]
    async fn evaluate_is_pure_and_idempotent() {
        let guard = guard();
        guard.configure("t1", dec!(10), dec!(20));
        let a = guard.evaluate("t1", dec!(0)).await.unwrap();
        let b = guard.evaluate("t1", dec!(0)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn commit_accumulates_and_recomputes_state() {
        let guard = guard();
        guard.configure("t1", dec!(10), dec!(20));
        guard.commit("t1", dec!(5)).await.unwrap();
        guard.commit("t1", dec!(6)).await.unwrap();

        let row = guard.row_for("t1").unwrap();
        let row = row.lock().await;
        assert_eq!(row.usage_to_date_usd, dec!(11));
        assert_eq!(row.state, BudgetState::SoftExceeded);
    }
}
