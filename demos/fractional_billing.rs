//! Demonstrates the fractional billing ledger: free-tier access followed by
//! paid fractional charges against a tenant's credit balance.

use llm_control_plane::{BillingTier, ChargeResult, FractionalLedger};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() {
    let ledger = FractionalLedger::new(3);
    ledger.init_tenant("startup-co", BillingTier::Demo);

    for i in 1..=5 {
        let quote = ledger
            .quote("startup-co", "summarize-document", dec!(5.00))
            .await;
        println!(
            "access #{i}: rule={}, fractional=${}, savings=${}",
            quote.pricing_rule_used, quote.fractional_amount, quote.cost_savings
        );

        match ledger.charge("startup-co", quote).await.unwrap() {
            ChargeResult::Success { event } => {
                println!("  charged: ${} ({:?})", event.fractional_amount, event.access_type);
            }
            ChargeResult::InsufficientBalance { message } => {
                println!("  charge rejected: {message}");
            }
        }
    }

    let summary = ledger.summary("startup-co").await;
    println!(
        "final balance=${}, total_spent=${}, total_saved=${}, apis_accessed={}",
        summary.balance.credit_balance,
        summary.balance.total_spent,
        summary.balance.total_saved,
        summary.balance.apis_accessed
    );
}
