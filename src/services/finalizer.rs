//! Order finalization seam
//!
//! Fulfillment is an external collaborator: the reconciliation loop invokes
//! it at most once per reference, only on the terminal `Success` transition.
//! `Failed` and `TimedOut` never finalize.

use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedOrder {
    pub order_id: String,
    pub reference: String,
    pub transaction_id: Option<String>,
}

#[async_trait]
pub trait OrderFinalizer: Send + Sync {
    async fn finalize(&self, order: FinalizedOrder) -> anyhow::Result<()>;
}

/// Placeholder finalizer that records the hand-off in the logs. Deployments
/// wire the real fulfillment service here.
pub struct LoggingFinalizer;

#[async_trait]
impl OrderFinalizer for LoggingFinalizer {
    async fn finalize(&self, order: FinalizedOrder) -> anyhow::Result<()> {
        info!(
            order_id = %order.order_id,
            reference = %order.reference,
            transaction_id = order.transaction_id.as_deref().unwrap_or(""),
            "order marked as paid, fulfillment triggered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_finalizer_accepts_orders() {
        let finalizer = LoggingFinalizer;
        finalizer
            .finalize(FinalizedOrder {
                order_id: "ORD-100".to_string(),
                reference: "ORD-100-171234".to_string(),
                transaction_id: Some("TXN-9".to_string()),
            })
            .await
            .expect("finalize should succeed");
    }
}
