//! Fire-and-forget alert dispatch (spec.md §4.6, §4.7, §9).
//!
//! Not an explicit C-numbered component, but named throughout spec.md as
//! "dispatch alert". Alerter failures and timeouts must never propagate into
//! the call path.

use crate::logging::log_warn;
use async_trait::async_trait;
use std::time::Duration;

/// Bound on how long the wrapper waits for an alert dispatch before giving up.
const ALERT_TIMEOUT: Duration = Duration::from_secs(3);

/// Plain-text alert payload handed to an [`Alerter`] (§6: "Alert payloads are
/// plain text").
#[derive(Debug, Clone)]
pub struct Alert {
    pub tenant_id: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, alert: Alert) -> crate::error::GatewayResult<()>;
}

/// Default test double: logs the alert instead of delivering it. Email/SMS
/// delivery is an external collaborator's concern per spec.md §1, out of
/// scope for this crate.
pub struct LoggingAlerter;

#[async_trait]
impl Alerter for LoggingAlerter {
    async fn notify(&self, alert: Alert) -> crate::error::GatewayResult<()> {
        tracing::info!(
            tenant_id = %alert.tenant_id,
            subject = %alert.subject,
            "alert dispatched"
        );
        Ok(())
    }
}

/// Dispatches an alert with a bounded timeout, swallowing both errors and
/// timeouts so the call path never blocks on or fails because of alerting.
pub async fn dispatch_alert(alerter: &dyn Alerter, alert: Alert) {
    let tenant_id = alert.tenant_id.clone();
    match tokio::time::timeout(ALERT_TIMEOUT, alerter.notify(alert)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log_warn!(tenant_id = %tenant_id, error = %e, "alert dispatch failed, continuing");
        }
        Err(_) => {
            log_warn!(tenant_id = %tenant_id, "alert dispatch timed out, continuing");
        }
    }
}
