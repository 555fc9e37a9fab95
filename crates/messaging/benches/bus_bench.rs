use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{Envelope, InMemoryBus, MessageBus, MessageBusExt, routing_matches};
use uuid::Uuid;

fn make_envelope(routing_key: &str) -> Envelope {
    let order_id = Uuid::new_v4();
    Envelope::builder()
        .event_type("OrderCreated")
        .routing_key(routing_key)
        .aggregate_id(order_id)
        .payload_raw(serde_json::json!({
            "type": "OrderCreated",
            "data": { "orderId": order_id, "initialStatus": "pending_payment" }
        }))
        .build()
        .unwrap()
}

fn bench_publish_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("bus/publish_fan_out_3_queues", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = InMemoryBus::new();
                bus.declare_queue("dispatch.order-created", &["order.created"])
                    .await
                    .unwrap();
                bus.declare_queue("inventory.order-created", &["order.created"])
                    .await
                    .unwrap();
                bus.declare_queue("projections.fulfillment", &["#"])
                    .await
                    .unwrap();
                bus.publish(make_envelope("order.created")).await.unwrap();
            });
        });
    });
}

fn bench_receive_ack_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("bus/receive_ack_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = InMemoryBus::new();
                bus.declare_queue("q", &["order.created"]).await.unwrap();
                let batch = (0..100).map(|_| make_envelope("order.created")).collect();
                bus.publish_batch(batch).await.unwrap();
                while let Some(delivery) = bus.receive("q").await.unwrap() {
                    bus.ack(&delivery).await.unwrap();
                }
            });
        });
    });
}

fn bench_routing_match(c: &mut Criterion) {
    c.bench_function("bus/routing_match_wildcard", |b| {
        b.iter(|| {
            routing_matches("dispatch.#", "dispatch.status-changed")
                && routing_matches("*.created", "order.created")
        });
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_receive_ack_100,
    bench_routing_match
);
criterion_main!(benches);
