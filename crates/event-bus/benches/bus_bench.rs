use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Event;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use event_bus::{InMemoryEventBus, Message, MessageBus, MessageBusExt, handler_fn};

fn make_event() -> Event {
    Event::new(
        "order.created",
        "order-service",
        serde_json::json!({
            "order_id": "00000000-0000-0000-0000-000000000001",
            "user_id": "user-1",
            "total": 25.0
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    )
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new();
    let event = make_event();

    c.bench_function("bus/publish_no_subscribers", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish_event(&event).await.unwrap();
            });
        });
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("bus/fan_out");

    for subscribers in [1usize, 4, 16] {
        let bus = InMemoryEventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        let _subscriptions: Vec<_> = rt.block_on(async {
            let mut subs = Vec::new();
            for _ in 0..subscribers {
                let delivered = Arc::clone(&delivered);
                let handler = handler_fn(move |_message: Message| {
                    let delivered = Arc::clone(&delivered);
                    async move {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                });
                subs.push(bus.subscribe("order.created", handler).await.unwrap());
            }
            subs
        });
        let event = make_event();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.iter(|| {
                    rt.block_on(async {
                        let target = delivered.load(Ordering::Relaxed) + subscribers;
                        bus.publish_event(&event).await.unwrap();
                        while delivered.load(Ordering::Relaxed) < target {
                            tokio::task::yield_now().await;
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_request_reply(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new();
    let _subscription = rt.block_on(async {
        bus.subscribe(
            "stock.check",
            handler_fn(|message: Message| async move {
                message.respond(br#"{"available":true,"current_stock":10}"#.to_vec());
            }),
        )
        .await
        .unwrap()
    });

    c.bench_function("bus/request_reply", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.request(
                    "stock.check",
                    br#"{"product_id":"SKU-1","quantity":1}"#.to_vec(),
                    Duration::from_secs(1),
                )
                .await
                .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_publish_no_subscribers,
    bench_fan_out,
    bench_request_reply,
);
criterion_main!(benches);
