use std::sync::{Arc, Mutex};

use common::Event;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::Result;

/// Reply channel attached to a request.
///
/// Shared by every subscriber that receives the request; the first one to
/// respond wins and later responses are discarded.
#[derive(Clone)]
pub struct ReplyHandle(Arc<Mutex<Option<oneshot::Sender<Vec<u8>>>>>);

impl ReplyHandle {
    pub(crate) fn new(sender: oneshot::Sender<Vec<u8>>) -> Self {
        Self(Arc::new(Mutex::new(Some(sender))))
    }

    fn send(&self, payload: Vec<u8>) -> bool {
        let sender = self.0.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplyHandle")
    }
}

/// A message as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
    reply: Option<ReplyHandle>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            reply: None,
        }
    }

    pub(crate) fn with_reply(mut self, reply: ReplyHandle) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Returns true if the sender is waiting for a reply.
    pub fn is_request(&self) -> bool {
        self.reply.is_some()
    }

    /// Sends a reply. Returns false if this is not a request, another
    /// subscriber already replied, or the requester stopped waiting.
    pub fn respond(&self, payload: Vec<u8>) -> bool {
        self.reply
            .as_ref()
            .map(|reply| reply.send(payload))
            .unwrap_or(false)
    }

    /// Decodes the raw payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Decodes the payload as an event envelope.
    pub fn event(&self) -> Result<Event> {
        Ok(Event::from_bytes(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_cannot_respond() {
        let message = Message::new("order.created", b"{}".to_vec());
        assert!(!message.is_request());
        assert!(!message.respond(b"ignored".to_vec()));
    }

    #[tokio::test]
    async fn test_first_responder_wins() {
        let (tx, rx) = oneshot::channel();
        let message = Message::new("stock.check", Vec::new()).with_reply(ReplyHandle::new(tx));
        let copy = message.clone();

        assert!(message.respond(b"first".to_vec()));
        assert!(!copy.respond(b"second".to_vec()));
        assert_eq!(rx.await.unwrap(), b"first".to_vec());
    }

    #[test]
    fn test_decode_reports_malformed_payload() {
        let message = Message::new("stock.check", b"not json".to_vec());
        assert!(message.decode::<serde_json::Value>().is_err());
        assert!(message.event().is_err());
    }
}
