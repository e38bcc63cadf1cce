//! Broker plumbing: the work-topic consumer, the dead-letter producer and
//! idempotent topology setup.
//!
//! The hub consumes one message at a time with manual acknowledgment. An
//! offset is stored only once the pipeline has decided the message's fate:
//! storing it directly acknowledges the message, while a negative outcome
//! first publishes the original payload and properties onto the durable
//! dead-letter topic and stores the offset afterwards. Messages are never
//! requeued onto the work topic.

use std::collections::HashMap;
use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use tracing::{debug, info};

use crate::envelope::{InboundMessage, PROPERTY_EVENT_ID};

#[derive(Envconfig, Clone)]
pub struct BrokerConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "event-hub")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "epcis_events")]
    pub kafka_work_topic: String,

    #[envconfig(default = "epcis_events_dead_letter")]
    pub kafka_dead_letter_topic: String,

    #[envconfig(default = "1")]
    pub kafka_topic_partitions: i32,

    #[envconfig(default = "1")]
    pub kafka_topic_replication: i32,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32,

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,
}

fn client_config(config: &BrokerConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.kafka_hosts);

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

/// Create the work and dead-letter topics if they do not exist yet.
/// "Already exists" is not an error: setup is idempotent across restarts
/// and competing consumer instances.
pub async fn ensure_topology(config: &BrokerConfig) -> Result<(), KafkaError> {
    let admin: AdminClient<DefaultClientContext> = client_config(config).create()?;

    let replication = TopicReplication::Fixed(config.kafka_topic_replication);
    let topics = [
        NewTopic::new(
            &config.kafka_work_topic,
            config.kafka_topic_partitions,
            replication,
        ),
        NewTopic::new(
            &config.kafka_dead_letter_topic,
            config.kafka_topic_partitions,
            TopicReplication::Fixed(config.kafka_topic_replication),
        ),
    ];

    let results = admin.create_topics(&topics, &AdminOptions::new()).await?;
    for result in results {
        match result {
            Ok(topic) => info!(topic, "created topic"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(topic, "topic already exists")
            }
            Err((_, code)) => return Err(KafkaError::AdminOp(code)),
        }
    }

    Ok(())
}

/// Position of a received message, handed back to [`WorkQueueConsumer::ack`]
/// once the pipeline has decided what to do with the message.
#[derive(Debug, Clone, Copy)]
pub struct MessageOffset {
    partition: i32,
    offset: i64,
}

impl MessageOffset {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }
}

/// Single-topic consumer with manual offset storing.
pub struct WorkQueueConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl WorkQueueConsumer {
    pub fn connect(config: &BrokerConfig) -> Result<Self, KafkaError> {
        let mut client_config = client_config(config);
        client_config
            .set("group.id", &config.kafka_consumer_group)
            .set("statistics.interval.ms", "10000")
            .set("enable.auto.offset.store", "false");

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.kafka_work_topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: config.kafka_work_topic.clone(),
        })
    }

    /// Wait for the next message. The returned offset must be passed to
    /// [`ack`](Self::ack) once processing has finished; until then the
    /// message counts as unhandled.
    pub async fn recv(&self) -> Result<(InboundMessage, MessageOffset), KafkaError> {
        let message = self.consumer.recv().await?;

        let mut properties = HashMap::new();
        if let Some(headers) = message.headers() {
            for header in headers.iter() {
                if let Some(value) = header.value {
                    properties.insert(
                        header.key.to_owned(),
                        String::from_utf8_lossy(value).into_owned(),
                    );
                }
            }
        }

        let inbound = InboundMessage {
            properties,
            body: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        };
        let offset = MessageOffset {
            partition: message.partition(),
            offset: message.offset(),
        };

        Ok((inbound, offset))
    }

    /// Store the offset, marking the message handled.
    pub fn ack(&self, offset: MessageOffset) -> Result<(), KafkaError> {
        self.consumer
            .store_offset(&self.topic, offset.partition, offset.offset)
    }
}

/// Producer that forwards negatively acknowledged messages, payload and
/// properties intact, onto the dead-letter topic.
pub struct DeadLetterProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl DeadLetterProducer {
    pub fn new(config: &BrokerConfig) -> Result<Self, KafkaError> {
        let mut client_config = client_config(config);
        client_config
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            );

        let producer: FutureProducer = client_config.create()?;

        Ok(Self {
            producer,
            topic: config.kafka_dead_letter_topic.clone(),
            timeout: Duration::from_millis(config.kafka_message_timeout_ms.into()),
        })
    }

    pub async fn publish(&self, message: &InboundMessage) -> Result<(), KafkaError> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &message.properties {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_bytes()),
            });
        }

        let key = message.property(PROPERTY_EVENT_ID).unwrap_or_default();
        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(&message.body)
            .headers(headers);

        self.producer
            .send(record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(error, _)| error)
    }
}
