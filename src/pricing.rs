//! C1 — Price Table: versioned provider/model pricing lookups.

use crate::error::{GatewayError, GatewayResult};
use crate::logging::log_debug;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

/// One versioned price, effective from a given timestamp onward.
///
/// Identity is the composite key `(provider, model, effective_from)`; rows
/// are immutable once written, per spec §3.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub provider: String,
    pub model: String,
    pub effective_from: DateTime<Utc>,
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
    pub reasoning_per_1k: Option<Decimal>,
    /// `d` in `[0, 1]`: cached input is billed at `(1 − d) × input_per_1k`.
    pub cache_discount: Option<Decimal>,
}

impl PriceRow {
    fn same_key(&self, provider: &str, model: &str, effective_from: DateTime<Utc>) -> bool {
        self.provider == provider && self.model == model && self.effective_from == effective_from
    }
}

/// C1's two operations: lookup the current price, and append a new version.
#[async_trait]
pub trait PriceTable: Send + Sync {
    /// Returns the row with the greatest `effective_from <= at` for the key, if any.
    async fn get_latest(&self, provider: &str, model: &str, at: DateTime<Utc>) -> Option<PriceRow>;

    /// Idempotent upsert keyed on `(provider, model, effective_from)`. Must not
    /// mutate an existing row with the same key.
    async fn ingest(&self, row: PriceRow) -> GatewayResult<()>;
}

/// In-process price table. No other component writes to it (§4.1).
#[derive(Debug, Default)]
pub struct InMemoryPriceTable {
    rows: RwLock<Vec<PriceRow>>,
}

impl InMemoryPriceTable {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Convenience seed used by tests and doc examples, not a production
    /// path — the real sync job that populates C1 lives outside this crate.
    pub async fn seed_defaults(&self) -> GatewayResult<()> {
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        self.ingest(PriceRow {
            provider: "openai".into(),
            model: "m1".into(),
            effective_from: now,
            input_per_1k: dec!(0.05),
            output_per_1k: dec!(0.15),
            reasoning_per_1k: None,
            cache_discount: None,
        })
        .await?;
        self.ingest(PriceRow {
            provider: "groq".into(),
            model: "llama-3.1-70b".into(),
            effective_from: now,
            input_per_1k: dec!(0.00059),
            output_per_1k: dec!(0.00079),
            reasoning_per_1k: None,
            cache_discount: None,
        })
        .await
    }
}

#[async_trait]
impl PriceTable for InMemoryPriceTable {
    async fn get_latest(
        &self,
        provider: &str,
        model: &str,
        at: DateTime<Utc>,
    ) -> Option<PriceRow> {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|r| r.provider == provider && r.model == model && r.effective_from <= at)
            .max_by_key(|r| r.effective_from)
            .cloned()
    }

    async fn ingest(&self, row: PriceRow) -> GatewayResult<()> {
        let mut rows = self.rows.write().await;
        if rows
            .iter()
            .any(|r| r.same_key(&row.provider, &row.model, row.effective_from))
        {
            log_debug!(
                provider = %row.provider,
                model = %row.model,
                "Ignoring duplicate price ingest for existing key"
            );
            return Ok(());
        }
        rows.push(row);
        Ok(())
    }
}

/// No price row exists for `(provider, model)`. Not a caller-visible error —
/// the wrapper treats this as `cost = 0, source = estimated` (§4.2, §7).
pub fn price_missing(provider: &str, model: &str) -> GatewayError {
    GatewayError::configuration_error(format!("no price row for {provider}/{model}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn get_latest_picks_greatest_effective_from_leq_at() {
        let table = InMemoryPriceTable::new();
        table
            .ingest(PriceRow {
                provider: "openai".into(),
                model: "m1".into(),
                effective_from: ts(100),
                input_per_1k: dec!(0.01),
                output_per_1k: dec!(0.02),
                reasoning_per_1k: None,
                cache_discount: None,
            })
            .await
            .unwrap();
        table
            .ingest(PriceRow {
                provider: "openai".into(),
                model: "m1".into(),
                effective_from: ts(200),
                input_per_1k: dec!(0.03),
                output_per_1k: dec!(0.04),
                reasoning_per_1k: None,
                cache_discount: None,
            })
            .await
            .unwrap();

        let latest = table.get_latest("openai", "m1", ts(150)).await.unwrap();
        assert_eq!(latest.input_per_1k, dec!(0.01));

        let latest = table.get_latest("openai", "m1", ts(250)).await.unwrap();
        assert_eq!(latest.input_per_1k, dec!(0.03));

        assert!(table.get_latest("openai", "m1", ts(50)).await.is_none());
    }

    #[tokio::test]
    async fn ingest_does_not_mutate_existing_row() {
        let table = InMemoryPriceTable::new();
        let row = PriceRow {
            provider: "openai".into(),
            model: "m1".into(),
            effective_from: ts(100),
            input_per_1k: dec!(0.01),
            output_per_1k: dec!(0.02),
            reasoning_per_1k: None,
            cache_discount: None,
        };
        table.ingest(row.clone()).await.unwrap();
        let mut changed = row;
        changed.input_per_1k = dec!(99.0);
        table.ingest(changed).await.unwrap();

        let stored = table.get_latest("openai", "m1", ts(100)).await.unwrap();
        assert_eq!(stored.input_per_1k, dec!(0.01));
    }
}
