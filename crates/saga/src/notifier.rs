//! Customer notification sent when a shipment leaves.
//!
//! Delivery is simulated: the notice is written to the log, nothing is sent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::ShipmentStatus;
use tokio::sync::RwLock;

/// Content of the shipping notice.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentNotice {
    pub order_id: OrderId,
    pub recipient: String,
    pub shipped_at: DateTime<Utc>,
    pub status: ShipmentStatus,
    pub delivery_address: String,
}

impl ShipmentNotice {
    pub fn subject(&self) -> String {
        format!("Your shipment details - Order #{}", self.order_id)
    }

    pub fn body(&self) -> String {
        format!(
            "Hello,\n\nYour order #{} has been shipped.\n\
             Shipment details:\n\
             - Dispatch date: {}\n\
             - Status: {}\n\
             - Delivery address: {}\n\
             - Contact email: {}\n\n\
             Thank you for your purchase!",
            self.order_id,
            self.shipped_at.to_rfc3339(),
            self.status,
            self.delivery_address,
            self.recipient
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn shipment_sent(&self, notice: &ShipmentNotice);
}

/// Writes notices to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn shipment_sent(&self, notice: &ShipmentNotice) {
        tracing::info!(
            recipient = %notice.recipient,
            subject = %notice.subject(),
            body = %notice.body(),
            "simulated email sent"
        );
    }
}

/// Keeps notices in memory so tests can inspect them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<ShipmentNotice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<ShipmentNotice> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn shipment_sent(&self, notice: &ShipmentNotice) {
        self.sent.write().await.push(notice.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_lists_the_shipment_details() {
        let notice = ShipmentNotice {
            order_id: OrderId::new(),
            recipient: "ana@example.com".to_string(),
            shipped_at: Utc::now(),
            status: ShipmentStatus::Shipped,
            delivery_address: "123 Main St".to_string(),
        };

        let body = notice.body();
        assert!(body.contains(&notice.order_id.to_string()));
        assert!(body.contains("123 Main St"));
        assert!(body.contains("ana@example.com"));
        assert!(body.contains("shipped"));
        assert!(notice.subject().starts_with("Your shipment details"));
    }

    #[tokio::test]
    async fn recording_notifier_keeps_notices() {
        let notifier = RecordingNotifier::new();
        let notice = ShipmentNotice {
            order_id: OrderId::new(),
            recipient: "ana@example.com".to_string(),
            shipped_at: Utc::now(),
            status: ShipmentStatus::Shipped,
            delivery_address: "123 Main St".to_string(),
        };

        notifier.shipment_sent(&notice).await;
        LogNotifier.shipment_sent(&notice).await;

        assert_eq!(notifier.sent().await, vec![notice]);
    }
}
