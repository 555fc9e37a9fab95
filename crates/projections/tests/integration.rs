//! Integration tests: saga services → published-message log → FulfillmentView.

use chrono::Utc;
use common::{ClientId, Money, OrderId};
use domain::{Aggregate, NewOrder, OrderLine, ScheduleRequest};
use messaging::InMemoryBus;
use projections::{FulfillmentStage, FulfillmentView, ProjectionProcessor, ReadModel};
use saga::{ChargeRequest, Platform, SagaSettings};

/// Wires a demo platform and a processor over its bus.
async fn setup() -> (Platform, ProjectionProcessor<InMemoryBus>, FulfillmentView) {
    let platform = Platform::in_memory(SagaSettings::default()).await.unwrap();
    platform.seed_demo_catalog().await;

    let view = FulfillmentView::new();
    let mut processor = ProjectionProcessor::new(platform.bus.clone());
    processor.register(Box::new(view.clone()));

    (platform, processor, view)
}

async fn place_order(platform: &Platform, quantity: u32) -> OrderId {
    let order = platform
        .orders
        .create(NewOrder {
            client_id: Some(ClientId::new(7)),
            lines: vec![OrderLine::new(10, quantity)],
        })
        .await
        .unwrap();
    platform.settle().await.unwrap();
    order.id().unwrap()
}

#[tokio::test]
async fn test_order_progress_follows_the_saga() {
    let (platform, processor, view) = setup().await;

    let order_id = place_order(&platform, 2).await;
    processor.run_catch_up().await.unwrap();
    assert_eq!(
        view.get(order_id).await.unwrap().stage,
        FulfillmentStage::StockReserved
    );

    platform
        .payments
        .charge(ChargeRequest {
            order_id,
            amount: Money::from_cents(4000),
            method: "card".to_string(),
        })
        .await
        .unwrap();
    platform.settle().await.unwrap();
    processor.run_catch_up().await.unwrap();

    let record = view.get(order_id).await.unwrap();
    assert_eq!(record.stage, FulfillmentStage::Paid);
    assert_eq!(record.delivery_address.as_deref(), Some("123 Main St"));
    assert!(record.total_amount.is_some());

    let dispatch = platform.dispatches.get_by_order(order_id).await.unwrap();
    let dispatch_id = dispatch.id().unwrap();
    platform
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
    platform.settle().await.unwrap();
    processor.run_catch_up().await.unwrap();

    let record = view.get(order_id).await.unwrap();
    assert_eq!(record.stage, FulfillmentStage::Shipped);
    assert_eq!(record.dispatch_id, Some(dispatch_id));
    assert_eq!(record.contact_email.as_deref(), Some("client7@example.com"));
    assert!(record.shipped_at.is_some());
}

#[tokio::test]
async fn test_cancelled_order_is_reported() {
    let (platform, processor, view) = setup().await;

    let order_id = place_order(&platform, 1).await;
    platform
        .orders
        .cancel(order_id, "changed mind")
        .await
        .unwrap();
    platform.settle().await.unwrap();
    processor.run_catch_up().await.unwrap();

    assert_eq!(
        view.get(order_id).await.unwrap().stage,
        FulfillmentStage::Cancelled
    );
    assert!(view.in_flight().await.is_empty());
}

#[tokio::test]
async fn test_rebuild_matches_incremental_view() {
    let (platform, processor, view) = setup().await;

    let first = place_order(&platform, 1).await;
    let second = place_order(&platform, 3).await;
    processor.run_catch_up().await.unwrap();
    let mut before = view.all().await;
    before.sort_by_key(|o| o.order_id);

    processor.rebuild_all().await.unwrap();

    let mut after = view.all().await;
    after.sort_by_key(|o| o.order_id);
    assert_eq!(after, before);
    assert_eq!(view.count(), 2);
    assert!(view.get(first).await.is_some());
    assert!(view.get(second).await.is_some());
}
