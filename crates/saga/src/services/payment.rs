//! Payment (cobro) service and the simulated payment gateway.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ChargeId, Money, OrderId};
use domain::charge::shipping::UNSPECIFIED_ADDRESS;
use domain::{
    Aggregate, Charge, ChargeStatus, ChargeTerms, CommandHandler, DomainError, IntegrationEvent,
    OrderStatus, OrderStatusChanged, PaymentReady, RepositoryError, shipping_cost,
};
use messaging::MessageBus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::announce;
use crate::collaborators::{ClientDirectory, CollaboratorError, DispatchLookup, OrderLookup};
use crate::error::{Result, SagaError};
use crate::outbound::OutboundPolicy;

/// A payment request from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub method: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Authorizes card or wallet payments.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the gateway's transaction id.
    async fn authorize(
        &self,
        order_id: OrderId,
        total: Money,
        method: &str,
    ) -> std::result::Result<String, GatewayError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    decline: bool,
    unavailable: bool,
    authorized: Vec<(OrderId, Money)>,
}

/// Gateway that approves everything unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_decline(&self, decline: bool) {
        self.state.write().await.decline = decline;
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Number of payments authorized so far.
    pub async fn authorized_count(&self) -> usize {
        self.state.read().await.authorized.len()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(
        &self,
        order_id: OrderId,
        total: Money,
        method: &str,
    ) -> std::result::Result<String, GatewayError> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if state.decline {
            return Err(GatewayError::Declined(format!("{method} rejected")));
        }
        state.authorized.push((order_id, total));
        Ok(format!("TXN-{}", Utc::now().timestamp_millis()))
    }
}

/// Owns charges.
///
/// At most one charge per order can be pending or completed; the charge
/// repository enforces that when the pending charge is inserted. The dispatch
/// lookup before it only rejects obvious duplicates early.
pub struct PaymentService {
    charges: CommandHandler<Charge>,
    orders: Arc<dyn OrderLookup>,
    dispatches: Arc<dyn DispatchLookup>,
    clients: Arc<dyn ClientDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    bus: Arc<dyn MessageBus>,
    policy: OutboundPolicy,
}

impl PaymentService {
    /// Lookups are attempted once under `policy`'s timeout: a charge is never
    /// recorded against state that could not be verified.
    pub fn new(
        charges: CommandHandler<Charge>,
        orders: Arc<dyn OrderLookup>,
        dispatches: Arc<dyn DispatchLookup>,
        clients: Arc<dyn ClientDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        bus: Arc<dyn MessageBus>,
        policy: &OutboundPolicy,
    ) -> Self {
        Self {
            charges,
            orders,
            dispatches,
            clients,
            gateway,
            bus,
            policy: policy.single_attempt(),
        }
    }

    /// Charges an order.
    ///
    /// On success the order is announced paid and ready for dispatch. A
    /// declined or unannounced payment leaves a failed charge behind and
    /// frees the order for another attempt.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn charge(&self, request: ChargeRequest) -> Result<Charge> {
        let order_id = request.order_id;
        if !request.amount.is_positive() {
            return Err(SagaError::InvalidArgument(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        if request.method.trim().is_empty() {
            return Err(SagaError::InvalidArgument("payment method is required".to_string()));
        }

        match self
            .policy
            .call("dispatches", || self.dispatches.get_dispatch_by_order(order_id))
            .await
        {
            Ok(dispatch) if dispatch.status.is_paid() => {
                self.reject("already_paid");
                return Err(SagaError::Conflict(format!("order {order_id} is already paid")));
            }
            Ok(_) | Err(CollaboratorError::NotFound { .. }) => {}
            Err(error) => return Err(error.into()),
        }

        let order = self
            .policy
            .call("orders", || self.orders.get_order(order_id))
            .await?;
        if order.status == OrderStatus::Cancelled {
            self.reject("order_cancelled");
            return Err(SagaError::Conflict(format!("order {order_id} is cancelled")));
        }

        let address = match self
            .policy
            .call("clients", || self.clients.get_client(order.client_id))
            .await
        {
            Ok(client) => client.address.filter(|a| !a.trim().is_empty()),
            Err(CollaboratorError::NotFound { .. }) => None,
            Err(error) => return Err(error.into()),
        }
        .unwrap_or_else(|| UNSPECIFIED_ADDRESS.to_string());

        let terms = ChargeTerms {
            order_id,
            amount: request.amount,
            shipping_cost: shipping_cost(order.total_quantity(), &address),
            method: request.method,
        };
        let charge_id = ChargeId::new();
        let charge = self
            .charges
            .create(|c| c.initiate(charge_id, &terms))
            .await
            .map_err(|e| match e {
                DomainError::Repository(RepositoryError::UniqueViolation { .. }) => {
                    self.reject("duplicate");
                    SagaError::Conflict(format!("order {order_id} already has an active charge"))
                }
                other => other.into(),
            })?
            .aggregate;

        let transaction_id = match self
            .gateway
            .authorize(order_id, charge.total_amount(), charge.method())
            .await
        {
            Ok(transaction_id) => transaction_id,
            Err(error) => {
                self.fail(charge, &error.to_string()).await?;
                return Err(match error {
                    GatewayError::Declined(_) => {
                        self.reject("declined");
                        SagaError::InvalidArgument("payment declined".to_string())
                    }
                    GatewayError::Unavailable(_) => {
                        self.reject("gateway_unavailable");
                        SagaError::UpstreamUnavailable(error.to_string())
                    }
                });
            }
        };

        let events = [
            IntegrationEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                status: OrderStatus::Paid,
            }),
            IntegrationEvent::PaymentReady(PaymentReady {
                order_id,
                delivery_address: address,
                shipping_cost: charge.shipping_cost(),
                total_amount: Some(charge.total_amount()),
            }),
        ];
        if let Err(error) = announce(self.bus.as_ref(), order_id, &events).await {
            self.fail(charge, "payment could not be announced").await?;
            self.reject("publish_failed");
            return Err(SagaError::UpstreamUnavailable(error.to_string()));
        }

        // The order is already announced paid; the charge must follow.
        let charge = self
            .charges
            .execute_on_latest(charge, |c| c.complete(transaction_id.as_str()))
            .await
            .inspect_err(|error| {
                tracing::error!(%order_id, %error, "announced charge could not be completed");
            })?
            .aggregate;

        metrics::counter!("charges_completed_total").increment(1);
        tracing::info!(
            %order_id,
            charge_id = ?charge.id(),
            total = %charge.total_amount(),
            "charge completed"
        );
        Ok(charge)
    }

    /// Corrects the shipping cost of a charge. Nothing is announced.
    #[tracing::instrument(skip(self))]
    pub async fn amend(&self, id: ChargeId, shipping_cost: Money) -> Result<Charge> {
        let result = self
            .charges
            .execute(id, |c| c.amend_shipping_cost(shipping_cost))
            .await?;
        Ok(result.aggregate)
    }

    pub async fn get(&self, id: ChargeId) -> Result<Charge> {
        Ok(self.charges.load_existing(id).await?)
    }

    pub async fn list_by_order(&self, order_id: OrderId) -> Result<Vec<Charge>> {
        let mut charges = self.charges.repository().list().await?;
        charges.retain(|c| c.order_id() == Some(order_id));
        Ok(charges)
    }

    /// Returns the completed charge of an order, if any.
    pub async fn completed_for_order(&self, order_id: OrderId) -> Result<Option<Charge>> {
        Ok(self
            .charges
            .find_by_unique_key(&Charge::order_key(order_id))
            .await?
            .filter(|c| c.status() == ChargeStatus::Completed))
    }

    /// Records the failure, which releases the order for another charge.
    async fn fail(&self, charge: Charge, reason: &str) -> Result<()> {
        self.charges
            .execute_on_latest(charge, |c| c.fail(reason))
            .await
            .inspect_err(|error| tracing::error!(%error, "recording failed charge failed"))?;
        Ok(())
    }

    fn reject(&self, reason: &'static str) {
        metrics::counter!("charges_rejected_total", "reason" => reason).increment(1);
        tracing::warn!(reason, "charge rejected");
    }
}
