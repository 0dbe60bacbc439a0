//! Integration tests for the in-memory bus under concurrent load.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Event;
use event_bus::{
    BusError, InMemoryEventBus, Message, MessageBus, MessageBusExt, ProcessedEvents, handler_fn,
};
use futures_util::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_each_get_their_own_reply() {
    let bus = InMemoryEventBus::new();
    let _sub = bus
        .subscribe(
            "double",
            handler_fn(|message: Message| async move {
                let n: u64 = message.decode().unwrap_or(0);
                message.respond(serde_json::to_vec(&(n * 2)).unwrap_or_default());
            }),
        )
        .await
        .unwrap();

    let requests = (0..50u64).map(|n| {
        let bus = bus.clone();
        async move {
            let reply = bus
                .request_json("double", &n, Duration::from_secs(2))
                .await
                .unwrap();
            let doubled: u64 = serde_json::from_slice(&reply).unwrap();
            (n, doubled)
        }
    });

    for (n, doubled) in join_all(requests).await {
        assert_eq!(doubled, n * 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redelivered_events_are_handled_once_per_consumer() {
    let bus = InMemoryEventBus::new();
    let processed = ProcessedEvents::new();
    let handled = Arc::new(AtomicUsize::new(0));

    let handler = {
        let processed = processed.clone();
        let handled = Arc::clone(&handled);
        handler_fn(move |message: Message| {
            let processed = processed.clone();
            let handled = Arc::clone(&handled);
            async move {
                let Ok(event) = message.event() else { return };
                if processed.claim("counter", &event.id).await {
                    handled.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };
    let _sub = bus.subscribe("order.cancelled", handler).await.unwrap();

    let event = Event::new("order.cancelled", "order-service", Default::default());
    for _ in 0..5 {
        bus.publish_event(&event).await.unwrap();
    }

    assert!(
        bus.wait_for_messages("order.cancelled", 5, Duration::from_secs(1))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_subscriber_misses_earlier_messages() {
    let bus = InMemoryEventBus::new();
    bus.publish("order.created", b"{}".to_vec()).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let _sub = bus
        .subscribe(
            "order.created",
            handler_fn(move |_m| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn request_after_responder_unsubscribes_has_no_responders() {
    let bus = InMemoryEventBus::new();
    let sub = bus
        .subscribe(
            "stock.check",
            handler_fn(|message: Message| async move {
                message.respond(b"ok".to_vec());
            }),
        )
        .await
        .unwrap();

    sub.unsubscribe();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = bus
        .request("stock.check", Vec::new(), Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(BusError::NoResponders(_))));
}
