use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cache::BoundedCache;
use crate::domain::order::{self, PayloadError, ValidationError};
use crate::messaging::{InboundMessage, MessageSource, SourceError};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Ingestion Loop
// ============================================================================
//
// Per message: Received → Decoded → Validated → Persisted → Cached →
// Acknowledged. Decode and validation failures drop the message without
// acknowledging it. A transient store failure releases the message back to
// the source, which hands it out again after the backoff; a later commit on
// the same partition can therefore never cover it. Acknowledgement only
// ever happens after the store has committed the order, which is what makes
// delivery at-least-once; the store's idempotent upsert absorbs duplicates.
//
// Messages are handled strictly one at a time. Cancellation is observed only
// while waiting for the next message, so a dequeued message always runs to
// completion.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStage {
    Received,
    Decoded,
    Validated,
    Persisted,
    Cached,
    Acknowledged,
}

impl fmt::Display for MessageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStage::Received => "received",
            MessageStage::Decoded => "decoded",
            MessageStage::Validated => "validated",
            MessageStage::Persisted => "persisted",
            MessageStage::Cached => "cached",
            MessageStage::Acknowledged => "acknowledged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Validation(ValidationError),

    #[error("failed to persist order {order_uid}: {source}")]
    Persist {
        order_uid: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to acknowledge order {order_uid}: {source}")]
    Acknowledge {
        order_uid: String,
        #[source]
        source: SourceError,
    },
}

impl From<PayloadError> for IngestError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Decode(e) => IngestError::Decode(e),
            PayloadError::Invalid(e) => IngestError::Validation(e),
        }
    }
}

impl IngestError {
    /// Last stage the message reached before the failure.
    pub fn reached(&self) -> MessageStage {
        match self {
            IngestError::Decode(_) => MessageStage::Received,
            IngestError::Validation(_) => MessageStage::Decoded,
            IngestError::Persist { .. } => MessageStage::Validated,
            IngestError::Acknowledge { .. } => MessageStage::Cached,
        }
    }

    /// Whether the message should be handed out again by the source.
    pub fn should_release(&self) -> bool {
        matches!(self, IngestError::Persist { source, .. } if source.is_transient())
    }

    /// Whether the order is already durable despite the error.
    pub fn is_durable(&self) -> bool {
        matches!(self, IngestError::Acknowledge { .. })
    }

    /// Metrics label.
    pub fn outcome(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode_error",
            IngestError::Validation(_) => "invalid",
            IngestError::Persist { .. } => "persist_error",
            IngestError::Acknowledge { .. } => "ack_error",
        }
    }
}

/// Counters returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub acknowledged: u64,
    pub dropped: u64,
    pub released: u64,
    pub ack_failures: u64,
}

pub struct IngestionLoop<S: MessageSource> {
    source: S,
    store: Arc<dyn OrderStore>,
    cache: Arc<BoundedCache>,
    metrics: Arc<Metrics>,
    receive_backoff: Duration,
}

impl<S: MessageSource> IngestionLoop<S> {
    pub fn new(source: S, store: Arc<dyn OrderStore>, cache: Arc<BoundedCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            source,
            store,
            cache,
            metrics,
            receive_backoff: Duration::from_secs(1),
        }
    }

    /// Pause after a failed receive before polling the source again.
    pub fn with_receive_backoff(mut self, backoff: Duration) -> Self {
        self.receive_backoff = backoff;
        self
    }

    /// Consume until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> IngestStats {
        tracing::info!("📥 Ingestion loop started");
        let mut stats = IngestStats::default();

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.source.receive() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        backoff_ms = self.receive_backoff.as_millis() as u64,
                        "Failed to receive message"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.receive_backoff) => continue,
                    }
                }
            };

            stats.received += 1;
            self.metrics.messages_received.inc();
            let started = Instant::now();

            match self.process(&message).await {
                Ok(order_uid) => {
                    stats.acknowledged += 1;
                    self.metrics.record_message("acknowledged", started.elapsed().as_secs_f64());
                    tracing::info!(
                        order_uid = %order_uid,
                        position = %message.handle,
                        "✅ Order processed"
                    );
                }
                Err(e) => {
                    if e.is_durable() {
                        stats.ack_failures += 1;
                    } else if !e.should_release() {
                        stats.dropped += 1;
                    }
                    self.metrics.record_message(e.outcome(), started.elapsed().as_secs_f64());
                    self.log_failure(&message, &e);

                    if e.should_release() {
                        match self.source.release(&message.handle).await {
                            Ok(()) => stats.released += 1,
                            Err(release_err) => tracing::error!(
                                position = %message.handle,
                                error = %release_err,
                                "Failed to rewind source; later commits may cover this message"
                            ),
                        }
                        // The released message comes straight back.
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(self.receive_backoff) => {}
                        }
                    }
                }
            }
        }

        tracing::info!(
            received = stats.received,
            acknowledged = stats.acknowledged,
            dropped = stats.dropped,
            released = stats.released,
            "Ingestion loop stopped"
        );
        stats
    }

    /// Take one message through the whole pipeline.
    ///
    /// Returns the order_uid once the message is acknowledged.
    pub async fn process(&self, message: &InboundMessage<S::Handle>) -> Result<String, IngestError> {
        let order = order::validate(&message.payload)?;
        let order_uid = order.order_uid.clone();

        if let Err(source) = self.store.save(&order).await {
            return Err(IngestError::Persist { order_uid, source });
        }

        let evicted = self.cache.put(order);
        self.metrics.record_cache_put(evicted.is_some(), self.cache.len());
        if let Some(evicted) = evicted {
            tracing::debug!(evicted = %evicted, "Evicted oldest cached order");
        }

        if let Err(source) = self.source.acknowledge(&message.handle).await {
            return Err(IngestError::Acknowledge { order_uid, source });
        }

        Ok(order_uid)
    }

    fn log_failure(&self, message: &InboundMessage<S::Handle>, error: &IngestError) {
        let position = &message.handle;
        let stage = error.reached();

        match error {
            IngestError::Decode(e) => {
                tracing::warn!(
                    position = %position,
                    stage = %stage,
                    error = %e,
                    payload = %payload_preview(&message.payload),
                    "Dropping undecodable message"
                );
            }
            IngestError::Validation(e) => {
                for violation in &e.violations {
                    tracing::warn!(
                        position = %position,
                        field = %violation.field,
                        code = %violation.code,
                        detail = %violation.detail,
                        "Order field failed validation"
                    );
                }
                tracing::warn!(
                    position = %position,
                    stage = %stage,
                    violations = e.violations.len(),
                    "Dropping invalid order"
                );
            }
            IngestError::Persist { order_uid, source } if source.is_transient() => {
                tracing::error!(
                    position = %position,
                    order_uid = %order_uid,
                    stage = %stage,
                    error = %source,
                    "Order could not be persisted; releasing for redelivery"
                );
            }
            IngestError::Persist { order_uid, source } => {
                tracing::error!(
                    position = %position,
                    order_uid = %order_uid,
                    stage = %stage,
                    error = %source,
                    "Dropping order the store rejected"
                );
            }
            IngestError::Acknowledge { order_uid, source } => {
                tracing::error!(
                    position = %position,
                    order_uid = %order_uid,
                    stage = %stage,
                    error = %source,
                    "Order persisted but acknowledgement failed; a redelivery will be reapplied"
                );
            }
        }
    }
}

fn payload_preview(payload: &[u8]) -> String {
    const LIMIT: usize = 256;
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into_owned(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
