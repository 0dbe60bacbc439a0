use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Event;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{Message, Result};

/// Callback invoked for every message delivered on a subscribed subject.
///
/// Each delivery runs on its own task, so a handler may be invoked
/// concurrently with itself.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        (self.0)(message).await
    }
}

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Core trait for message bus transports.
///
/// Publishing is fire-and-forget and returns once the message is queued.
/// A subject may have any number of subscribers; each receives every
/// message published after it subscribed.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes raw bytes on a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Registers a handler for a subject.
    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    /// Sends a request and waits up to `timeout` for the first reply.
    ///
    /// Fails with `Timeout` when no reply arrives in time and with
    /// `NoResponders` when nobody is listening on the subject.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration)
    -> Result<Vec<u8>>;
}

/// Extension trait providing JSON conveniences on top of [`MessageBus`].
#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Publishes an event on the subject equal to its type.
    async fn publish_event(&self, event: &Event) -> Result<()> {
        let bytes = event.to_bytes()?;
        self.publish(&event.event_type, bytes).await
    }

    /// Sends a JSON request and returns the raw reply.
    async fn request_json<Req>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Vec<u8>>
    where
        Req: Serialize + Sync,
    {
        let payload = serde_json::to_vec(request)?;
        self.request(subject, payload, timeout).await
    }
}

// Blanket implementation for all MessageBus implementations
impl<T: MessageBus + ?Sized> MessageBusExt for T {}

/// Handle to an active subscription.
///
/// Dropping the handle leaves the subscription running;
/// call [`Subscription::unsubscribe`] to stop it.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    id: u64,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(subject: impl Into<String>, id: u64, task: JoinHandle<()>) -> Self {
        Self {
            subject: subject.into(),
            id,
            task,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops delivery to this subscription's handler.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}
