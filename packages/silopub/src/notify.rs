//! Operator alert port. Delivery (email, chat, whatever the deployment
//! wires up) happens elsewhere; callers fire and forget.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort notification; implementations must swallow their own
    /// failures.
    async fn notify(&self, subject: &str, body: &str);
}

/// Logs notifications instead of delivering them
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, subject: &str, body: &str) {
        tracing::warn!(subject = %subject, body = %body, "Operator notification");
    }
}
