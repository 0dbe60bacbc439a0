use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::Event;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::bus::{MessageBus, MessageHandler, Subscription};
use crate::message::ReplyHandle;
use crate::{BusError, Message, Result};

/// A message recorded by [`InMemoryEventBus`] at publish time.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn event(&self) -> Option<Event> {
        Event::from_bytes(&self.payload).ok()
    }
}

const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

struct SubscriberEntry {
    sender: mpsc::UnboundedSender<Message>,
}

struct Inner {
    subjects: RwLock<HashMap<String, Vec<SubscriberEntry>>>,
    history: RwLock<VecDeque<PublishedMessage>>,
    history_capacity: usize,
    paused: RwLock<HashMap<String, Vec<Message>>>,
    next_id: AtomicU64,
    fail_on_publish: AtomicBool,
    closed: AtomicBool,
}

/// In-process message bus.
///
/// Every subscription gets its own unbounded queue drained by a dispatcher
/// task, and each delivered message is handled on a freshly spawned task.
/// The most recent published messages are kept in a bounded history so
/// tests can assert on what went over the wire.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl InMemoryEventBus {
    /// Creates a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that keeps at most `capacity` published messages.
    ///
    /// A capacity of zero disables the history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subjects: RwLock::default(),
                history: RwLock::default(),
                history_capacity: capacity,
                paused: RwLock::default(),
                next_id: AtomicU64::new(0),
                fail_on_publish: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the retained published messages in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.inner.history.read().await.iter().cloned().collect()
    }

    /// Returns the events published on a subject, skipping non-event payloads.
    pub async fn events_on(&self, subject: &str) -> Vec<Event> {
        self.inner
            .history
            .read()
            .await
            .iter()
            .filter(|m| m.subject == subject)
            .filter_map(PublishedMessage::event)
            .collect()
    }

    /// Returns every published event carrying the given correlation id.
    pub async fn correlated_events(&self, correlation_id: &str) -> Vec<Event> {
        self.inner
            .history
            .read()
            .await
            .iter()
            .filter_map(PublishedMessage::event)
            .filter(|e| e.correlation_id.as_deref() == Some(correlation_id))
            .collect()
    }

    /// Returns the number of live subscriptions on a subject.
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .subjects
            .read()
            .await
            .get(subject)
            .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Makes subsequent publishes fail with `Unavailable`.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Holds back delivery on a subject until [`resume_subject`] is called.
    ///
    /// Held messages are still recorded in the history when published.
    ///
    /// [`resume_subject`]: InMemoryEventBus::resume_subject
    pub async fn pause_subject(&self, subject: &str) {
        self.inner
            .paused
            .write()
            .await
            .entry(subject.to_string())
            .or_default();
    }

    /// Delivers everything held on a subject and resumes normal delivery.
    pub async fn resume_subject(&self, subject: &str) {
        let held = self
            .inner
            .paused
            .write()
            .await
            .remove(subject)
            .unwrap_or_default();
        for message in held {
            self.deliver(message).await;
        }
    }

    /// Waits until the history holds at least `count` messages published on
    /// `subject`.
    ///
    /// Returns false if the deadline passed first.
    pub async fn wait_for_messages(&self, subject: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let seen = self
                .inner
                .history
                .read()
                .await
                .iter()
                .filter(|m| m.subject == subject)
                .count();
            if seen >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stops every subscription and rejects further traffic.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subjects.write().await.clear();
        self.inner.paused.write().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Sends a message to every live subscriber of its subject, pruning
    /// subscriptions whose dispatcher has stopped. Returns the number of
    /// subscribers reached.
    async fn deliver(&self, message: Message) -> usize {
        let mut subjects = self.inner.subjects.write().await;
        let Some(subscribers) = subjects.get_mut(&message.subject) else {
            return 0;
        };
        subscribers.retain(|s| s.sender.send(message.clone()).is_ok());
        tracing::trace!(
            subject = %message.subject,
            subscribers = subscribers.len(),
            "Delivered message"
        );
        subscribers.len()
    }

    async fn record(&self, subject: &str, payload: &[u8]) {
        let capacity = self.inner.history_capacity;
        if capacity == 0 {
            return;
        }
        let mut history = self.inner.history.write().await;
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(PublishedMessage {
            subject: subject.to_string(),
            payload: payload.to_vec(),
        });
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryEventBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        if self.inner.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable(format!(
                "publish on '{subject}' rejected"
            )));
        }

        self.record(subject, &payload).await;
        metrics::counter!("bus_messages_published_total", "subject" => subject.to_string())
            .increment(1);

        let message = Message::new(subject, payload);
        {
            let mut paused = self.inner.paused.write().await;
            if let Some(held) = paused.get_mut(subject) {
                held.push(message);
                return Ok(());
            }
        }
        self.deliver(message).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        self.ensure_open()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

        self.inner
            .subjects
            .write()
            .await
            .entry(subject.to_string())
            .or_default()
            .push(SubscriberEntry { sender });

        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle(message).await;
                });
            }
        });

        tracing::debug!(subject, subscription_id = id, "Subscribed");
        Ok(Subscription::new(subject, id, task))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = Message::new(subject, payload).with_reply(ReplyHandle::new(reply_tx));

        if self.deliver(message).await == 0 {
            return Err(BusError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Every handler finished without replying.
            Ok(Err(_)) => Err(BusError::NoResponders(subject.to_string())),
            Err(_) => Err(BusError::Timeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBusExt, handler_fn};
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn MessageHandler> {
        handler_fn(move |_message| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_every_subscriber() {
        let bus = InMemoryEventBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let _a = bus
            .subscribe("order.created", counting_handler(Arc::clone(&first)))
            .await
            .unwrap();
        let _b = bus
            .subscribe("order.created", counting_handler(Arc::clone(&second)))
            .await
            .unwrap();

        bus.publish("order.created", b"{}".to_vec()).await.unwrap();
        bus.publish("order.updated", b"{}".to_vec()).await.unwrap();

        wait_for(&first, 1).await;
        wait_for(&second, 1).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new();
        bus.publish("nobody.listens", Vec::new()).await.unwrap();
        assert_eq!(bus.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = bus
            .subscribe("x", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();
        assert_eq!(subscription.subject(), "x");
        subscription.unsubscribe();
        tokio::task::yield_now().await;

        bus.publish("x", Vec::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("x").await, 0);
    }

    #[tokio::test]
    async fn test_request_gets_reply() {
        let bus = InMemoryEventBus::new();
        let _sub = bus
            .subscribe(
                "echo",
                handler_fn(|message: Message| async move {
                    let mut reply = b"re:".to_vec();
                    reply.extend_from_slice(&message.payload);
                    message.respond(reply);
                }),
            )
            .await
            .unwrap();

        let reply = bus
            .request("echo", b"ping".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"re:ping".to_vec());
    }

    #[tokio::test]
    async fn test_request_without_subscribers_fails_fast() {
        let bus = InMemoryEventBus::new();
        let result = bus
            .request("stock.check", Vec::new(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(BusError::NoResponders(_))));
    }

    #[tokio::test]
    async fn test_request_handler_that_never_replies_is_no_responders() {
        let bus = InMemoryEventBus::new();
        let _sub = bus
            .subscribe("silent", handler_fn(|_message| async {}))
            .await
            .unwrap();

        let result = bus
            .request("silent", Vec::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(BusError::NoResponders(_))));
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let bus = InMemoryEventBus::new();
        let _sub = bus
            .subscribe(
                "slow",
                handler_fn(|message: Message| async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    message.respond(Vec::new());
                }),
            )
            .await
            .unwrap();

        let result = bus
            .request("slow", Vec::new(), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(BusError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);
        let result = bus.publish("x", Vec::new()).await;
        assert!(matches!(result, Err(BusError::Unavailable(_))));
        assert!(bus.published().await.is_empty());

        bus.set_fail_on_publish(false);
        bus.publish("x", Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_paused_subject_holds_messages_until_resumed() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _sub = bus
            .subscribe("stock.reserve", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();

        bus.pause_subject("stock.reserve").await;
        bus.publish("stock.reserve", Vec::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(
            bus.wait_for_messages("stock.reserve", 1, Duration::from_millis(10))
                .await
        );

        bus.resume_subject("stock.reserve").await;
        wait_for(&counter, 1).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_traffic() {
        let bus = InMemoryEventBus::new();
        bus.close().await;
        assert!(matches!(
            bus.publish("x", Vec::new()).await,
            Err(BusError::Closed)
        ));
        assert!(matches!(
            bus.subscribe("x", handler_fn(|_m| async {})).await,
            Err(BusError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_history_keeps_only_the_most_recent_messages() {
        let bus = InMemoryEventBus::with_history_capacity(3);
        for i in 0..10u8 {
            bus.publish("x", vec![i]).await.unwrap();
        }

        let published = bus.published().await;
        assert_eq!(published.len(), 3);
        let payloads: Vec<u8> = published.iter().map(|m| m.payload[0]).collect();
        assert_eq!(payloads, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_zero_history_capacity_still_delivers() {
        let bus = InMemoryEventBus::with_history_capacity(0);
        let counter = Arc::new(AtomicUsize::new(0));
        let _sub = bus
            .subscribe("x", counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();

        bus.publish("x", Vec::new()).await.unwrap();
        wait_for(&counter, 1).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_filters_by_correlation_id() {
        let bus = InMemoryEventBus::new();
        let tagged = Event::new("order.created", "order-service", Default::default())
            .with_correlation_id(Some("saga-1"));
        let untagged = Event::new("order.created", "order-service", Default::default());
        bus.publish_event(&tagged).await.unwrap();
        bus.publish_event(&untagged).await.unwrap();
        bus.publish("order.created", b"garbage".to_vec())
            .await
            .unwrap();

        assert_eq!(bus.events_on("order.created").await.len(), 2);
        let correlated = bus.correlated_events("saga-1").await;
        assert_eq!(correlated.len(), 1);
        assert_eq!(correlated[0].id, tagged.id);
    }
}
