//! Order service: creation, partial updates, cancellation and payment.

use std::sync::Arc;

use common::{ClientId, OrderId};
use domain::charge::shipping::UNSPECIFIED_ADDRESS;
use domain::order::merge_lines;
use domain::{
    Aggregate, CommandHandler, IntegrationEvent, NewOrder, Order, OrderCreated, OrderLine,
    OrderRevision, OrderStatus, PaymentReady, StatusRequest, StockAdjustment, shipping_cost,
};
use messaging::{MessageBus, MessageId};

use super::{announce, announce_once};
use crate::collaborators::{ClientDirectory, ProductCatalog};
use crate::error::{Result, SagaError};
use crate::outbound::OutboundPolicy;

const PAYMENT_READY_OCCASION: &str = "order-charged";
const STOCK_RELEASE_OCCASION: &str = "stock-release";

/// Owns orders. Validates against client and product data, reserves stock
/// through the bus and reacts to completed payments.
pub struct OrderService {
    orders: CommandHandler<Order>,
    clients: Arc<dyn ClientDirectory>,
    products: Arc<dyn ProductCatalog>,
    bus: Arc<dyn MessageBus>,
    policy: OutboundPolicy,
}

impl OrderService {
    pub fn new(
        orders: CommandHandler<Order>,
        clients: Arc<dyn ClientDirectory>,
        products: Arc<dyn ProductCatalog>,
        bus: Arc<dyn MessageBus>,
        policy: OutboundPolicy,
    ) -> Self {
        Self {
            orders,
            clients,
            products,
            bus,
            policy,
        }
    }

    /// Places an order and reserves its stock.
    ///
    /// If the announcement cannot be published the order is cancelled again,
    /// so no order exists without its reservation request.
    #[tracing::instrument(skip(self, request), fields(client_id = ?request.client_id))]
    pub async fn create(&self, request: NewOrder) -> Result<Order> {
        let client_id = request
            .client_id
            .ok_or_else(|| SagaError::InvalidArgument("client id is required".to_string()))?;
        if request.lines.is_empty() {
            return Err(SagaError::InvalidArgument(
                "an order needs at least one line".to_string(),
            ));
        }

        self.verify_client(client_id).await?;
        let lines = self.verify_lines(&request.lines).await?;

        let order_id = OrderId::new();
        let order = self
            .orders
            .create(|o| o.place(order_id, Some(client_id), &lines))
            .await?
            .aggregate;

        let events = [
            IntegrationEvent::OrderCreated(OrderCreated {
                order_id,
                initial_status: order.status(),
            }),
            IntegrationEvent::StockAdjustment(StockAdjustment::reserve(order_id, order.lines())),
        ];
        if let Err(error) = announce(self.bus.as_ref(), order_id, &events).await {
            tracing::error!(%order_id, %error, "order announcement failed, cancelling");
            if let Err(cancel_error) = self
                .orders
                .execute_on(order, |o| o.cancel("order announcement failed"))
                .await
            {
                tracing::error!(%order_id, error = %cancel_error, "cancelling unannounced order failed");
            }
            return Err(SagaError::UpstreamUnavailable(format!(
                "order {order_id} could not be announced: {error}"
            )));
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(%order_id, lines = order.lines().len(), "order created");
        Ok(order)
    }

    pub async fn get(&self, id: OrderId) -> Result<Order> {
        Ok(self.orders.load_existing(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.orders.repository().list().await?)
    }

    pub async fn list_by_client(&self, client_id: ClientId) -> Result<Vec<Order>> {
        let mut orders = self.list().await?;
        orders.retain(|o| o.client_id() == Some(client_id));
        Ok(orders)
    }

    pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let mut orders = self.list().await?;
        orders.retain(|o| o.status() == status);
        Ok(orders)
    }

    pub async fn count_by_client(&self, client_id: ClientId) -> Result<usize> {
        Ok(self.list_by_client(client_id).await?.len())
    }

    /// Applies a partial update.
    ///
    /// A status of "charged" marks the order paid and announces it ready for
    /// dispatch with a shipping cost computed from the client's address.
    #[tracing::instrument(skip(self, revision), fields(order_id = %id))]
    pub async fn update(&self, id: OrderId, mut revision: OrderRevision) -> Result<Order> {
        if revision.is_empty() {
            return Err(SagaError::InvalidArgument("nothing to update".to_string()));
        }
        let order = self.orders.load_existing(id).await?;

        if let Some(client_id) = revision.client_id {
            self.verify_client(client_id).await?;
        }
        if let Some(lines) = revision.lines.take() {
            revision.lines = Some(self.verify_lines(&lines).await?);
        }

        // Dry run: nothing is looked up or announced for an update that
        // cannot apply, and the announcements describe the revised order.
        let mut revised = order.clone();
        revised.apply_events(order.revise(&revision)?);
        let charged = revision.status == Some(StatusRequest::Charged)
            && order.status() != OrderStatus::Paid;
        let cancelled = order.status() != OrderStatus::Cancelled
            && revised.status() == OrderStatus::Cancelled;

        if charged {
            let ready = self.settlement_terms(id, revised.client_id(), &revised).await?;
            announce_once(
                self.bus.as_ref(),
                id,
                IntegrationEvent::PaymentReady(ready),
                MessageId::derived(id.as_uuid(), PAYMENT_READY_OCCASION),
            )
            .await?;
        }
        if cancelled {
            self.release_stock(&revised).await?;
        }

        let result = self
            .orders
            .execute_on_latest(order, |o| o.revise(&revision))
            .await?;

        if charged {
            metrics::counter!("orders_paid_total").increment(1);
            tracing::info!(order_id = %id, "order charged outside the payment service");
        }
        if cancelled {
            metrics::counter!("orders_cancelled_total").increment(1);
            tracing::info!(order_id = %id, "order cancelled");
        }
        Ok(result.aggregate)
    }

    /// Cancels the order and releases its reserved stock.
    #[tracing::instrument(skip(self, reason), fields(order_id = %id))]
    pub async fn cancel(&self, id: OrderId, reason: &str) -> Result<Order> {
        let order = self.orders.load_existing(id).await?;
        if order.status() == OrderStatus::Paid {
            return Err(SagaError::Conflict(format!(
                "order {id} is paid and can no longer be cancelled"
            )));
        }

        let changes = order.cancel(reason)?;
        if changes.is_empty() {
            return Ok(order);
        }
        let mut cancelled = order.clone();
        cancelled.apply_events(changes);
        self.release_stock(&cancelled).await?;

        let result = self
            .orders
            .execute_on_latest(order, |o| o.cancel(reason))
            .await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %id, "order cancelled");
        Ok(result.aggregate)
    }

    /// Marks the order paid. Returns false if it already was.
    #[tracing::instrument(skip(self))]
    pub async fn on_payment_completed(&self, order_id: OrderId) -> Result<bool> {
        let result = self.orders.execute(order_id, |o| o.mark_paid()).await?;
        if result.is_noop() {
            tracing::debug!(%order_id, "order already paid");
            return Ok(false);
        }
        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(%order_id, "order paid");
        Ok(true)
    }

    /// Announces the release of an order's reserved stock. An order is
    /// cancelled at most once, so the release has one id per order.
    async fn release_stock(&self, order: &Order) -> Result<()> {
        let Some(order_id) = order.id() else {
            return Ok(());
        };
        let release = StockAdjustment::release(order_id, order.lines());
        announce_once(
            self.bus.as_ref(),
            order_id,
            IntegrationEvent::StockAdjustment(release),
            MessageId::derived(order_id.as_uuid(), STOCK_RELEASE_OCCASION),
        )
        .await?;
        tracing::info!(%order_id, "stock release announced");
        Ok(())
    }

    async fn settlement_terms(
        &self,
        order_id: OrderId,
        client_id: Option<ClientId>,
        order: &Order,
    ) -> Result<PaymentReady> {
        let address = match client_id {
            Some(client_id) => {
                let client = self
                    .policy
                    .call("clients", || self.clients.get_client(client_id))
                    .await?;
                client.address.filter(|a| !a.trim().is_empty())
            }
            None => None,
        }
        .unwrap_or_else(|| UNSPECIFIED_ADDRESS.to_string());

        Ok(PaymentReady {
            order_id,
            shipping_cost: shipping_cost(order.total_quantity(), &address),
            delivery_address: address,
            total_amount: None,
        })
    }

    async fn verify_client(&self, client_id: ClientId) -> Result<()> {
        self.policy
            .call("clients", || self.clients.get_client(client_id))
            .await?;
        Ok(())
    }

    /// Merges duplicate products and checks each line against the catalog.
    async fn verify_lines(&self, lines: &[OrderLine]) -> Result<Vec<OrderLine>> {
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(SagaError::InvalidArgument(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        let lines = merge_lines(lines)?;
        for line in &lines {
            let product = self
                .policy
                .call("products", || self.products.get_product(line.product_id))
                .await?;
            if product.stock < i64::from(line.quantity) {
                return Err(SagaError::InsufficientStock {
                    product_id: line.product_id,
                    requested: u64::from(line.quantity),
                    available: product.stock,
                });
            }
        }
        Ok(lines)
    }
}
