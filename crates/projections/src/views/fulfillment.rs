//! Fulfillment read model: how far each order has travelled through the saga.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DispatchId, Money, OrderId};
use domain::{IntegrationEvent, OrderStatus};
use messaging::Envelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Furthest milestone an order has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
    Created,
    StockReserved,
    Paid,
    Scheduled,
    Shipped,
    Cancelled,
}

impl FulfillmentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStage::Created => "created",
            FulfillmentStage::StockReserved => "stock_reserved",
            FulfillmentStage::Paid => "paid",
            FulfillmentStage::Scheduled => "scheduled",
            FulfillmentStage::Shipped => "shipped",
            FulfillmentStage::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FulfillmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Milestones of one saga instance, keyed by the order id every message
/// carries as its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFulfillment {
    pub order_id: OrderId,
    pub stage: FulfillmentStage,
    pub created_at: Option<DateTime<Utc>>,
    pub stock_reserved_at: Option<DateTime<Utc>>,
    pub stock_released_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_cost: Option<Money>,
    pub total_amount: Option<Money>,
    pub delivery_address: Option<String>,
    pub dispatch_id: Option<DispatchId>,
    pub contact_email: Option<String>,

    /// Dispatch date assigned by the dispatch service.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,

    /// Messages seen for this order, duplicates included.
    pub message_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl OrderFulfillment {
    fn new(order_id: OrderId, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            stage: FulfillmentStage::Created,
            created_at: None,
            stock_reserved_at: None,
            stock_released_at: None,
            paid_at: None,
            shipping_cost: None,
            total_amount: None,
            delivery_address: None,
            dispatch_id: None,
            contact_email: None,
            scheduled_for: None,
            shipped_at: None,
            message_count: 0,
            updated_at: at,
        }
    }

    fn recalculate_stage(&mut self) {
        self.stage = if self.stock_released_at.is_some() && self.paid_at.is_none() {
            FulfillmentStage::Cancelled
        } else if self.shipped_at.is_some() {
            FulfillmentStage::Shipped
        } else if self.scheduled_for.is_some() {
            FulfillmentStage::Scheduled
        } else if self.paid_at.is_some() {
            FulfillmentStage::Paid
        } else if self.stock_reserved_at.is_some() {
            FulfillmentStage::StockReserved
        } else {
            FulfillmentStage::Created
        };
    }

    /// Folds one contract into the record. Replays leave it unchanged
    /// because every milestone keeps its first timestamp.
    fn apply(&mut self, event: &IntegrationEvent, at: DateTime<Utc>) {
        match event {
            IntegrationEvent::OrderCreated(_) => {
                self.created_at.get_or_insert(at);
            }
            IntegrationEvent::StockAdjustment(adjustment) => {
                let releases = adjustment.lines.iter().all(|l| l.quantity_delta > 0);
                if releases {
                    self.stock_released_at.get_or_insert(at);
                } else {
                    self.stock_reserved_at.get_or_insert(at);
                }
            }
            IntegrationEvent::OrderStatusChanged(changed) => match changed.status {
                OrderStatus::Paid => {
                    self.paid_at.get_or_insert(at);
                }
                OrderStatus::Cancelled => {
                    self.stock_released_at.get_or_insert(at);
                }
                OrderStatus::Created | OrderStatus::PendingPayment => {}
            },
            IntegrationEvent::PaymentReady(ready) => {
                self.paid_at.get_or_insert(at);
                self.shipping_cost = Some(ready.shipping_cost);
                self.delivery_address = Some(ready.delivery_address.clone());
                if ready.total_amount.is_some() {
                    self.total_amount = ready.total_amount;
                }
            }
            IntegrationEvent::DispatchScheduled(scheduled) => {
                self.dispatch_id = Some(scheduled.dispatch_id);
                self.scheduled_for = Some(scheduled.scheduled_at);
                self.contact_email = Some(scheduled.contact_email.clone());
                self.delivery_address = Some(scheduled.delivery_address.clone());
            }
            IntegrationEvent::DispatchStatusChanged(changed) => {
                self.dispatch_id.get_or_insert(changed.dispatch_id);
                self.shipped_at.get_or_insert(changed.shipped_at);
            }
        }
        self.message_count += 1;
        self.updated_at = at;
        self.recalculate_stage();
    }
}

/// Per-order fulfillment progress for operators.
#[derive(Clone)]
pub struct FulfillmentView {
    orders: Arc<RwLock<HashMap<OrderId, OrderFulfillment>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl FulfillmentView {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
        }
    }

    pub async fn get(&self, order_id: OrderId) -> Option<OrderFulfillment> {
        self.orders.read().await.get(&order_id).cloned()
    }

    /// Every tracked order, most recently updated first.
    pub async fn all(&self) -> Vec<OrderFulfillment> {
        let mut orders: Vec<_> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        orders
    }

    pub async fn by_stage(&self, stage: FulfillmentStage) -> Vec<OrderFulfillment> {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| o.stage == stage)
            .cloned()
            .collect()
    }

    /// Orders that are neither shipped nor cancelled.
    pub async fn in_flight(&self) -> Vec<OrderFulfillment> {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| {
                !matches!(
                    o.stage,
                    FulfillmentStage::Shipped | FulfillmentStage::Cancelled
                )
            })
            .cloned()
            .collect()
    }
}

impl Default for FulfillmentView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for FulfillmentView {
    fn name(&self) -> &'static str {
        "FulfillmentView"
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        match IntegrationEvent::from_envelope(envelope) {
            Ok(event) => {
                let order_id = OrderId::from_uuid(envelope.correlation_id);
                let mut orders = self.orders.write().await;
                orders
                    .entry(order_id)
                    .or_insert_with(|| OrderFulfillment::new(order_id, envelope.occurred_at))
                    .apply(&event, envelope.occurred_at);
            }
            Err(error) => {
                // Not a saga contract; the position still moves past it.
                tracing::debug!(
                    message_id = %envelope.message_id,
                    event_type = %envelope.event_type,
                    %error,
                    "skipping message"
                );
            }
        }

        let mut pos = self.position.write().await;
        *pos = pos.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.orders.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for FulfillmentView {
    fn name(&self) -> &'static str {
        "FulfillmentView"
    }

    fn count(&self) -> usize {
        self.orders.try_read().map(|o| o.len()).unwrap_or(0)
    }
}
