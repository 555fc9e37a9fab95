//! Integration tests for the choreographed fulfillment saga.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{ClientId, Money, OrderId, ProductId};
use domain::{
    Aggregate, ChargeStatus, DispatchStatus, IntegrationEvent, NewOrder, OrderCreated, OrderLine,
    OrderStatus, PaymentReady, ScheduleRequest, ShipmentStatus, StockAdjustment, StockDelta,
};
use messaging::{InMemoryLedger, MessageBus, MessageBusExt};
use saga::topology;
use saga::{
    ChargeRequest, ClientRecord, OutboundPolicy, Platform, RecordingNotifier, Repositories,
    SagaError, SagaSettings,
};

struct TestHarness {
    platform: Platform,
    notifier: RecordingNotifier,
}

impl TestHarness {
    async fn new() -> Self {
        let notifier = RecordingNotifier::new();
        let settings = SagaSettings {
            outbound: OutboundPolicy::new(Duration::from_millis(100), 2, Duration::from_millis(1)),
            max_deliveries: 3,
        };
        let platform = Platform::new(
            Repositories::in_memory(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(notifier.clone()),
            settings,
        )
        .await
        .unwrap();

        platform
            .clients
            .insert(ClientRecord {
                id: ClientId::new(7),
                name: "Ana".to_string(),
                address: Some("123 Main St".to_string()),
                contact_email: Some("ana@example.com".to_string()),
            })
            .await;
        platform
            .inventory
            .insert_product(ProductId::new(10), 10, Money::from_cents(2000))
            .await;

        Self { platform, notifier }
    }

    async fn place_order(&self, quantity: u32) -> OrderId {
        let order = self
            .platform
            .orders
            .create(NewOrder {
                client_id: Some(ClientId::new(7)),
                lines: vec![OrderLine::new(10, quantity)],
            })
            .await
            .unwrap();
        self.platform.settle().await.unwrap();
        order.id().unwrap()
    }

    async fn charge(&self, order_id: OrderId, cents: i64) -> Result<domain::Charge, SagaError> {
        self.platform
            .payments
            .charge(ChargeRequest {
                order_id,
                amount: Money::from_cents(cents),
                method: "card".to_string(),
            })
            .await
    }

    async fn publish(&self, order_id: OrderId, event: IntegrationEvent) {
        self.platform
            .bus
            .publish(event.to_envelope(order_id).unwrap())
            .await
            .unwrap();
    }

    async fn stock(&self) -> i64 {
        self.platform
            .inventory
            .stock_of(ProductId::new(10))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_full_fulfillment_happy_path() {
    let h = TestHarness::new().await;

    // Order for client 7 with 2 x product 10
    let order_id = h.place_order(2).await;
    let dispatch = h.platform.dispatches.get_by_order(order_id).await.unwrap();
    assert_eq!(dispatch.status(), DispatchStatus::Pending);
    assert_eq!(h.stock().await, 8);

    // Charge
    let charge = h.charge(order_id, 4000).await.unwrap();
    h.platform.settle().await.unwrap();
    assert_eq!(charge.status(), ChargeStatus::Completed);

    let order = h.platform.orders.get(order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    let dispatch = h.platform.dispatches.get_by_order(order_id).await.unwrap();
    assert_eq!(dispatch.status(), DispatchStatus::ReadyToShip);
    assert_eq!(dispatch.shipping_cost(), charge.shipping_cost());
    assert_eq!(dispatch.total_amount(), Some(charge.total_amount()));

    // Schedule for now
    let dispatch_id = dispatch.id().unwrap();
    h.platform
        .dispatches
        .schedule(
            dispatch_id,
            ScheduleRequest {
                scheduled_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.platform.settle().await.unwrap();

    let shipment = h
        .platform
        .shipments
        .find_by_dispatch(dispatch_id)
        .await
        .unwrap();
    assert_eq!(shipment.status(), ShipmentStatus::Shipped);
    assert_eq!(shipment.contact_email(), "ana@example.com");
    assert_eq!(
        h.platform.dispatches.get(dispatch_id).await.unwrap().status(),
        DispatchStatus::Shipped
    );
    assert_eq!(h.notifier.sent().await.len(), 1);
    assert!(h.platform.bus.all_dead_letters().await.is_empty());
    assert!(h.platform.bus.is_idle().await);
}

#[tokio::test]
async fn test_replayed_order_created_yields_one_dispatch() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(1).await;

    let created = h.platform.bus.published_of_type("OrderCreated").await;
    for _ in 0..5 {
        h.platform
            .bus
            .redeliver(topology::DISPATCH_ORDER_CREATED, created[0].clone())
            .await
            .unwrap();
    }
    // Same payload under fresh message ids, so the ledger cannot help.
    for _ in 0..3 {
        h.publish(
            order_id,
            IntegrationEvent::OrderCreated(OrderCreated {
                order_id,
                initial_status: OrderStatus::PendingPayment,
            }),
        )
        .await;
    }
    h.platform.settle().await.unwrap();

    assert_eq!(h.platform.dispatches.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_charges_complete_once() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(2).await;

    let (first, second) = tokio::join!(h.charge(order_id, 4000), h.charge(order_id, 4000));

    let outcomes = [first, second];
    let completed = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(SagaError::Conflict(_))))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(conflicts, 1);

    let charges = h.platform.payments.list_by_order(order_id).await.unwrap();
    assert_eq!(
        charges
            .iter()
            .filter(|c| c.status() == ChargeStatus::Completed)
            .count(),
        1
    );
    assert_eq!(h.platform.gateway.authorized_count().await, 1);
}

#[tokio::test]
async fn test_charge_after_dispatch_paid_conflicts() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(1).await;

    h.charge(order_id, 4000).await.unwrap();
    h.platform.settle().await.unwrap();

    let again = h.charge(order_id, 4000).await;
    assert!(matches!(again, Err(SagaError::Conflict(msg)) if msg.contains("already paid")));
}

#[tokio::test]
async fn test_shipping_cost_is_deterministic() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(3).await;

    let charge = h.charge(order_id, 10000).await.unwrap();

    // 5.0 * 3 + 0.5 * len("123 Main St")
    assert_eq!(charge.shipping_cost(), Money::from_cents(1500 + 50 * 11));
    assert_eq!(charge.total_amount(), Money::from_cents(12050));
}

#[tokio::test]
async fn test_payment_ready_before_order_created() {
    let h = TestHarness::new().await;
    let order_id = OrderId::new();

    h.publish(
        order_id,
        IntegrationEvent::PaymentReady(PaymentReady {
            order_id,
            delivery_address: "123 Main St".to_string(),
            shipping_cost: Money::from_cents(2050),
            total_amount: Some(Money::from_cents(6050)),
        }),
    )
    .await;
    for worker in h.platform.workers() {
        if worker.queue() == topology::DISPATCH_PAYMENT_READY {
            worker.drain().await.unwrap();
        }
    }
    h.publish(
        order_id,
        IntegrationEvent::OrderCreated(OrderCreated {
            order_id,
            initial_status: OrderStatus::PendingPayment,
        }),
    )
    .await;
    h.platform.settle().await.unwrap();

    let dispatches = h.platform.dispatches.list().await.unwrap();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].status(), DispatchStatus::ReadyToShip);
    assert_eq!(dispatches[0].shipping_cost(), Money::from_cents(2050));
}

#[tokio::test]
async fn test_duplicate_dispatch_scheduled_ships_once() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(1).await;
    h.charge(order_id, 4000).await.unwrap();
    h.platform.settle().await.unwrap();
    let dispatch_id = h
        .platform
        .dispatches
        .get_by_order(order_id)
        .await
        .unwrap()
        .id()
        .unwrap();
    h.platform
        .dispatches
        .schedule(
            dispatch_id,
            ScheduleRequest {
                scheduled_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let scheduled = h.platform.bus.published_of_type("DispatchScheduled").await;
    h.platform
        .bus
        .redeliver(topology::SHIPMENT_DISPATCH_SCHEDULED, scheduled[0].clone())
        .await
        .unwrap();
    // A re-publication under a new message id is caught by the shipment itself.
    h.platform
        .bus
        .publish(
            IntegrationEvent::from_envelope(&scheduled[0])
                .unwrap()
                .to_envelope(order_id)
                .unwrap(),
        )
        .await
        .unwrap();
    h.platform.settle().await.unwrap();

    assert_eq!(
        h.platform
            .bus
            .published_of_type("DispatchStatusChanged")
            .await
            .len(),
        1
    );
    assert_eq!(h.notifier.sent().await.len(), 1);
    assert_eq!(
        h.platform.dispatches.get(dispatch_id).await.unwrap().status(),
        DispatchStatus::Shipped
    );
}

#[tokio::test]
async fn test_future_dispatch_is_released_by_sweep() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(1).await;
    h.charge(order_id, 4000).await.unwrap();
    h.platform.settle().await.unwrap();
    let dispatch_id = h
        .platform
        .dispatches
        .get_by_order(order_id)
        .await
        .unwrap()
        .id()
        .unwrap();
    let at = Utc::now() + chrono::Duration::hours(1);

    h.platform
        .dispatches
        .schedule(
            dispatch_id,
            ScheduleRequest {
                scheduled_at: Some(at),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.platform.settle().await.unwrap();
    assert_eq!(
        h.platform.dispatches.get(dispatch_id).await.unwrap().status(),
        DispatchStatus::Scheduled
    );

    let released = h
        .platform
        .shipments
        .release_due(at + chrono::Duration::minutes(1))
        .await
        .unwrap();
    h.platform.settle().await.unwrap();

    assert_eq!(released, 1);
    assert_eq!(
        h.platform.dispatches.get(dispatch_id).await.unwrap().status(),
        DispatchStatus::Shipped
    );
}

#[tokio::test]
async fn test_cancel_releases_reserved_stock() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(4).await;
    assert_eq!(h.stock().await, 6);

    h.platform
        .orders
        .cancel(order_id, "customer request")
        .await
        .unwrap();
    h.platform.settle().await.unwrap();

    assert_eq!(h.stock().await, 10);
    let charge = h.charge(order_id, 4000).await;
    assert!(matches!(charge, Err(SagaError::Conflict(_))));
}

#[tokio::test]
async fn test_failed_publication_compensates_order() {
    let h = TestHarness::new().await;
    h.platform.bus.set_fail_on_publish(true).await;

    let result = h
        .platform
        .orders
        .create(NewOrder {
            client_id: Some(ClientId::new(7)),
            lines: vec![OrderLine::new(10, 2)],
        })
        .await;

    assert!(matches!(result, Err(SagaError::UpstreamUnavailable(_))));
    let orders = h.platform.orders.list().await.unwrap();
    assert_eq!(orders[0].status(), OrderStatus::Cancelled);
    assert_eq!(h.stock().await, 10);
}

#[tokio::test]
async fn test_unsatisfiable_adjustment_is_dead_lettered() {
    let h = TestHarness::new().await;
    let order_id = OrderId::new();

    h.publish(
        order_id,
        IntegrationEvent::StockAdjustment(StockAdjustment {
            order_id,
            lines: vec![StockDelta {
                product_id: ProductId::new(10),
                quantity_delta: -50,
            }],
        }),
    )
    .await;
    h.platform.settle().await.unwrap();

    let dead = h
        .platform
        .bus
        .dead_letters(topology::INVENTORY_STOCK_ADJUSTMENT)
        .await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].delivery_count, 1);
    assert!(dead[0].reason.starts_with("insufficient_stock"));
    assert_eq!(h.stock().await, 10);
}

#[tokio::test]
async fn test_report_for_unknown_dispatch_is_retried_then_parked() {
    let h = TestHarness::new().await;
    let order_id = OrderId::new();

    h.publish(
        order_id,
        IntegrationEvent::DispatchStatusChanged(domain::DispatchStatusChanged {
            dispatch_id: common::DispatchId::new(),
            status: DispatchStatus::Shipped,
            shipped_at: Utc::now(),
        }),
    )
    .await;
    h.platform.settle().await.unwrap();

    let dead = h
        .platform
        .bus
        .dead_letters(topology::DISPATCH_STATUS_CHANGED)
        .await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].delivery_count, 3);
}

#[tokio::test]
async fn test_unacked_messages_survive_a_consumer_crash() {
    let h = TestHarness::new().await;
    h.platform
        .orders
        .create(NewOrder {
            client_id: Some(ClientId::new(7)),
            lines: vec![OrderLine::new(10, 2)],
        })
        .await
        .unwrap();

    // Take the adjustment and drop it without settling.
    let taken = h
        .platform
        .bus
        .receive(topology::INVENTORY_STOCK_ADJUSTMENT)
        .await
        .unwrap();
    assert!(taken.is_some());
    assert_eq!(
        h.platform
            .bus
            .recover(topology::INVENTORY_STOCK_ADJUSTMENT)
            .await
            .unwrap(),
        1
    );
    h.platform.settle().await.unwrap();

    assert_eq!(h.stock().await, 8);
}

#[tokio::test]
async fn test_collaborator_outage_fails_closed() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(1).await;
    h.platform.order_lookup.set_unavailable(true).await;

    let result = h.charge(order_id, 4000).await;

    assert!(matches!(result, Err(SagaError::UpstreamUnavailable(_))));
    assert!(h.platform.payments.list_by_order(order_id).await.unwrap().is_empty());
    assert!(h.platform.bus.published_of_type("PaymentReady").await.is_empty());
}

#[tokio::test]
async fn test_charged_order_update_drives_dispatch() {
    let h = TestHarness::new().await;
    let order_id = h.place_order(2).await;

    h.platform
        .orders
        .update(
            order_id,
            domain::OrderRevision {
                status: Some(domain::StatusRequest::Charged),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.platform.settle().await.unwrap();

    let dispatch = h.platform.dispatches.get_by_order(order_id).await.unwrap();
    assert_eq!(dispatch.status(), DispatchStatus::ReadyToShip);
    assert_eq!(dispatch.total_amount(), None);
    assert_eq!(
        h.platform.orders.get(order_id).await.unwrap().status(),
        OrderStatus::Paid
    );
}
