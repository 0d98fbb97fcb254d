use async_trait::async_trait;
use std::fmt;

// ============================================================================
// Messaging Module
// ============================================================================
//
// `MessageSource` is the seam between the ingestion loop and the broker.
// Delivery is at-least-once: a message is only acknowledged after the loop
// has made its effects durable. A message whose effects could not be made
// durable for a transient reason is released, which makes the source hand it
// out again before anything after it on the same partition.
//
// ============================================================================

mod redpanda;

pub use redpanda::{KafkaOffset, RedpandaSource};

/// One message pulled from the broker.
#[derive(Debug, Clone)]
pub struct InboundMessage<H> {
    pub payload: Vec<u8>,
    pub handle: H,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("acknowledgement task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Opaque token identifying a received message for acknowledgement.
    type Handle: fmt::Display + Send + Sync;

    /// Wait for the next message. Must be cancel-safe: dropping the future
    /// before it resolves must not lose a message.
    async fn receive(&self) -> Result<InboundMessage<Self::Handle>, SourceError>;

    /// Mark the message as processed so the broker will not redeliver it.
    async fn acknowledge(&self, handle: &Self::Handle) -> Result<(), SourceError>;

    /// Rewind to the message so the next `receive` returns it again.
    async fn release(&self, handle: &Self::Handle) -> Result<(), SourceError>;
}
