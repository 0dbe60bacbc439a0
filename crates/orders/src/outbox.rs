//! Transactional outbox: events stored with the order change that produced
//! them and published afterwards.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::Event;
use event_bus::{MessageBus, MessageBusExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};

use crate::error::Result;
use crate::repository::OrderRepository;

/// One event waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Same as the event id, so a redelivered record deduplicates downstream.
    pub id: String,
    pub event: Event,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn new(event: Event, created_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id.clone(),
            event,
            attempts: 0,
            last_error: None,
            created_at,
            dispatched_at: None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: usize,
}

/// Publishes pending outbox records in write order.
///
/// A pass stops at the first failed publish so later events never overtake
/// an earlier one; the failed record is retried on the next pass.
pub struct OutboxDispatcher<R: OrderRepository, B: MessageBus> {
    repo: R,
    bus: B,
    batch_size: usize,
    flush_lock: Mutex<()>,
}

impl<R: OrderRepository, B: MessageBus> OutboxDispatcher<R, B> {
    pub fn new(repo: R, bus: B, batch_size: usize) -> Self {
        Self {
            repo,
            bus,
            batch_size: batch_size.max(1),
            flush_lock: Mutex::new(()),
        }
    }

    /// Runs one pass over the outbox.
    pub async fn dispatch_pending(&self) -> Result<DispatchReport> {
        let _guard = self.flush_lock.lock().await;
        let mut report = DispatchReport::default();

        loop {
            let batch = self.repo.pending_outbox(self.batch_size).await?;
            let full_batch = batch.len() == self.batch_size;

            for record in batch {
                match self.bus.publish_event(&record.event).await {
                    Ok(()) => {
                        self.repo.mark_outbox_dispatched(&record.id).await?;
                        report.dispatched += 1;
                    }
                    Err(e) => {
                        metrics::counter!(
                            "outbox_dispatch_failures_total",
                            "subject" => record.event.event_type.clone()
                        )
                        .increment(1);
                        tracing::warn!(
                            record_id = %record.id,
                            subject = %record.event.event_type,
                            attempts = record.attempts + 1,
                            error = %e,
                            "Outbox publish failed, will retry"
                        );
                        self.repo
                            .record_outbox_failure(&record.id, e.to_string())
                            .await?;
                        report.failed += 1;
                        return Ok(report);
                    }
                }
            }

            if !full_batch {
                break;
            }
        }

        if report.dispatched > 0 {
            tracing::debug!(dispatched = report.dispatched, "Outbox flushed");
        }
        Ok(report)
    }

    /// Dispatches on a fixed interval until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_ms = interval.as_millis() as u64, "Outbox dispatcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_pending().await {
                        tracing::error!(error = %e, "Outbox dispatch pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Final pass so nothing written before shutdown is left behind.
        if let Err(e) = self.dispatch_pending().await {
            tracing::error!(error = %e, "Final outbox dispatch failed");
        }
        tracing::info!("Outbox dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryOrderRepository;
    use common::subjects;
    use event_bus::InMemoryEventBus;
    use std::sync::Arc;

    fn event(subject: &str) -> Event {
        Event::new(subject, subjects::ORDER_SERVICE, serde_json::Map::new())
    }

    fn setup(
        batch_size: usize,
    ) -> (
        OutboxDispatcher<InMemoryOrderRepository, InMemoryEventBus>,
        InMemoryOrderRepository,
        InMemoryEventBus,
    ) {
        let repo = InMemoryOrderRepository::new();
        let bus = InMemoryEventBus::new();
        let dispatcher = OutboxDispatcher::new(repo.clone(), bus.clone(), batch_size);
        (dispatcher, repo, bus)
    }

    #[tokio::test]
    async fn test_dispatch_publishes_in_write_order() {
        let (dispatcher, repo, bus) = setup(2);
        repo.append_outbox(vec![
            event(subjects::STOCK_RESERVE),
            event(subjects::STOCK_RESERVE),
            event(subjects::ORDER_CREATED),
        ])
        .await
        .unwrap();

        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(
            report,
            DispatchReport {
                dispatched: 3,
                failed: 0
            }
        );
        let subjects_seen: Vec<_> = bus
            .published()
            .await
            .into_iter()
            .map(|m| m.subject)
            .collect();
        assert_eq!(
            subjects_seen,
            vec![
                subjects::STOCK_RESERVE,
                subjects::STOCK_RESERVE,
                subjects::ORDER_CREATED
            ]
        );
        assert_eq!(repo.pending_outbox_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried_on_next_pass() {
        let (dispatcher, repo, bus) = setup(10);
        repo.append_outbox(vec![event(subjects::ORDER_CANCELLED)])
            .await
            .unwrap();

        bus.set_fail_on_publish(true);
        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(repo.pending_outbox_count().await, 1);
        let record = &repo.outbox_records().await[0];
        assert_eq!(record.attempts, 1);
        assert!(record.last_error.is_some());

        bus.set_fail_on_publish(false);
        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(bus.events_on(subjects::ORDER_CANCELLED).await.len(), 1);
        assert_eq!(repo.pending_outbox_count().await, 0);
    }

    #[tokio::test]
    async fn test_redelivered_record_keeps_event_id() {
        let (dispatcher, repo, bus) = setup(10);
        let original = event(subjects::ORDER_CREATED);
        repo.append_outbox(vec![original.clone()]).await.unwrap();

        bus.set_fail_on_publish(true);
        dispatcher.dispatch_pending().await.unwrap();
        bus.set_fail_on_publish(false);
        dispatcher.dispatch_pending().await.unwrap();

        let delivered = bus.events_on(subjects::ORDER_CREATED).await;
        assert_eq!(delivered[0].id, original.id);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let (dispatcher, repo, _bus) = setup(10);
        repo.set_unavailable(true);
        assert!(dispatcher.dispatch_pending().await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_flushes() {
        let (dispatcher, repo, bus) = setup(10);
        let dispatcher = Arc::new(dispatcher);
        let (tx, rx) = watch::channel(false);

        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(Duration::from_secs(3600), rx).await })
        };

        // The first tick fires immediately; give it time to pass.
        tokio::time::sleep(Duration::from_millis(20)).await;
        repo.append_outbox(vec![event(subjects::ORDER_UPDATED)])
            .await
            .unwrap();
        tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(bus.events_on(subjects::ORDER_UPDATED).await.len(), 1);
    }
}
