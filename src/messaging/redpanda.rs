use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message,
    Offset, TopicPartitionList,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{InboundMessage, MessageSource, SourceError};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Position of a consumed record, enough to commit past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for KafkaOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Redpanda/Kafka consumer with manual offset commits.
///
/// Auto-commit is disabled; an offset is committed only through
/// [`MessageSource::acknowledge`].
pub struct RedpandaSource {
    consumer: Arc<StreamConsumer>,
}

impl RedpandaSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[topic])?;

        tracing::info!(
            brokers = %brokers,
            group_id = %group_id,
            topic = %topic,
            "Subscribed to Redpanda topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl MessageSource for RedpandaSource {
    type Handle = KafkaOffset;

    async fn receive(&self) -> Result<InboundMessage<KafkaOffset>, SourceError> {
        let message = self.consumer.recv().await?;

        let handle = KafkaOffset {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        };

        tracing::debug!(
            position = %handle,
            timestamp = ?message.timestamp().to_millis(),
            "Received message"
        );

        Ok(InboundMessage {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            handle,
        })
    }

    async fn acknowledge(&self, handle: &KafkaOffset) -> Result<(), SourceError> {
        let mut positions = TopicPartitionList::new();
        positions.add_partition_offset(&handle.topic, handle.partition, Offset::Offset(handle.offset + 1))?;

        // Synchronous commit blocks on a broker round-trip.
        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || consumer.commit(&positions, CommitMode::Sync)).await??;

        tracing::debug!(position = %handle, "Committed offset");
        Ok(())
    }

    async fn release(&self, handle: &KafkaOffset) -> Result<(), SourceError> {
        // The fetch position has already moved past this record. Without the
        // seek, the next commit on the partition would cover it.
        let consumer = self.consumer.clone();
        let target = handle.clone();
        tokio::task::spawn_blocking(move || {
            consumer.seek(&target.topic, target.partition, Offset::Offset(target.offset), SEEK_TIMEOUT)
        })
        .await??;

        tracing::debug!(position = %handle, "Rewound to uncommitted record");
        Ok(())
    }
}
