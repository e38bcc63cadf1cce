//! The per-message pipeline and the consumer run loop that drives it.
//!
//! Step order is fixed: validate envelope, parse body, resolve routing,
//! dispatch, then ack or dead-letter. Message-level problems are terminal
//! for that message (dead-letter, never requeued); broker-level problems
//! are retried indefinitely with a fixed backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hub_common::envelope::{Envelope, InboundMessage, PROPERTY_EVENT_ID};
use hub_common::health::HealthHandle;
use hub_common::kafka::{ensure_topology, DeadLetterProducer, MessageOffset, WorkQueueConsumer};
use hub_common::metrics::{
    MESSAGES_ACKED, MESSAGES_DEAD_LETTERED, MESSAGES_RECEIVED, MESSAGE_PROCESSING_TIME,
};
use hub_common::report::{self, DiagnosticCode};
use serde_json::Value;
use tracing::info;

use crate::alert::AlertClient;
use crate::config::Config;
use crate::dispatch::DeliveryDispatcher;
use crate::routing::RoutingResolver;
use crate::search::{SearchIndexNotifier, NO_ROUTE_DESTINATION};
use crate::status::StatusStore;

/// Acknowledgment decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Ack,
    DeadLetter,
}

pub struct Pipeline<S> {
    resolver: RoutingResolver,
    dispatcher: DeliveryDispatcher<S>,
    status: Arc<S>,
    search: SearchIndexNotifier,
    alerts: AlertClient,
}

impl<S: StatusStore> Pipeline<S> {
    pub fn new(
        resolver: RoutingResolver,
        dispatcher: DeliveryDispatcher<S>,
        status: Arc<S>,
        search: SearchIndexNotifier,
        alerts: AlertClient,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            status,
            search,
            alerts,
        }
    }

    /// Process one message end to end and decide its fate.
    pub async fn process(&self, message: &InboundMessage) -> MessageOutcome {
        metrics::counter!(MESSAGES_RECEIVED).increment(1);

        let event_id = message.property(PROPERTY_EVENT_ID);
        let validation = Envelope::validate(message);
        for diagnostic in &validation.diagnostics {
            report::emit_diagnostic(diagnostic, event_id);
        }
        let Some(envelope) = validation.envelope else {
            return MessageOutcome::DeadLetter;
        };

        let document: Value = match serde_json::from_slice(&envelope.body) {
            Ok(document) => document,
            Err(error) => {
                report::emit(
                    DiagnosticCode::MalformedBody,
                    Some(&envelope.event_id),
                    &format!("body failed to parse as JSON: {error}"),
                );
                self.mark_unroutable(&envelope.event_id).await;
                return MessageOutcome::DeadLetter;
            }
        };

        let destinations = match self
            .resolver
            .resolve(&envelope.organization_id, &document)
            .await
        {
            Ok(destinations) => destinations,
            Err(error) => {
                let detail = report::emit(error.code(), Some(&envelope.event_id), &error.to_string());
                self.mark_unroutable(&envelope.event_id).await;
                if error.is_no_route() {
                    if let Err(alert_error) = self
                        .alerts
                        .no_route_found(&envelope.organization_id, &envelope.event_id, &detail)
                        .await
                    {
                        report::emit(
                            DiagnosticCode::AlertSendFailed,
                            Some(&envelope.event_id),
                            &alert_error.to_string(),
                        );
                    }
                }
                return MessageOutcome::DeadLetter;
            }
        };

        let outcomes = self
            .dispatcher
            .dispatch(&envelope, &document, &destinations)
            .await;

        if outcomes.iter().all(|outcome| outcome.succeeded) {
            MessageOutcome::Ack
        } else {
            MessageOutcome::DeadLetter
        }
    }

    /// Compensating writes for a message that never reached dispatch: mark
    /// the event failed and mirror a "No Route Found" failure into the
    /// search index. Both are best-effort and individually reported.
    async fn mark_unroutable(&self, event_id: &str) {
        if let Err(error) = self.status.record_failure(event_id).await {
            report::emit(
                DiagnosticCode::StatusWriteFailed,
                Some(event_id),
                &error.to_string(),
            );
        }

        if let Err(error) = self
            .search
            .record_failed(event_id, NO_ROUTE_DESTINATION)
            .await
        {
            report::emit(
                DiagnosticCode::SearchUpdateFailed,
                Some(event_id),
                &error.to_string(),
            );
        }
    }
}

/// Upper bound on one recv wait, so the loop keeps reporting liveness
/// through quiet periods. Not a per-message processing timeout.
const RECV_WAIT: Duration = Duration::from_secs(30);

/// Consume the work topic forever, one message at a time.
///
/// Broker-level failures (topology setup, connect, recv) trigger the fixed
/// reconnect backoff and a full reconnect-and-resubscribe; they never fail
/// an individual message.
pub async fn run<S: StatusStore>(config: &Config, pipeline: &Pipeline<S>, liveness: &HealthHandle) {
    let backoff = config.reconnect_backoff.0;

    loop {
        if let Err(error) = ensure_topology(&config.broker).await {
            report::emit(
                DiagnosticCode::BrokerUnavailable,
                None,
                &format!("topology setup failed: {error}"),
            );
            tokio::time::sleep(backoff).await;
            continue;
        }

        let consumer = match WorkQueueConsumer::connect(&config.broker) {
            Ok(consumer) => consumer,
            Err(error) => {
                report::emit(
                    DiagnosticCode::BrokerUnavailable,
                    None,
                    &format!("consumer connect failed: {error}"),
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
        };

        let dead_letters = match DeadLetterProducer::new(&config.broker) {
            Ok(producer) => producer,
            Err(error) => {
                report::emit(
                    DiagnosticCode::BrokerUnavailable,
                    None,
                    &format!("dead letter producer setup failed: {error}"),
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
        };

        info!(
            topic = config.broker.kafka_work_topic,
            "subscribed to work topic"
        );

        loop {
            liveness.report_healthy();

            let received = match tokio::time::timeout(RECV_WAIT, consumer.recv()).await {
                Ok(received) => received,
                Err(_elapsed) => continue,
            };
            let (message, offset) = match received {
                Ok(received) => received,
                Err(error) => {
                    report::emit(
                        DiagnosticCode::BrokerUnavailable,
                        None,
                        &format!("receive failed, reconnecting: {error}"),
                    );
                    break;
                }
            };

            let started = Instant::now();
            let outcome = pipeline.process(&message).await;
            metrics::histogram!(MESSAGE_PROCESSING_TIME).record(started.elapsed().as_secs_f64());

            match settle(&consumer, &dead_letters, &message, offset, outcome).await {
                LoopFlow::NextMessage => {}
                LoopFlow::Reconnect => break,
            }
        }

        tokio::time::sleep(backoff).await;
    }
}

/// What the consume loop does after settling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopFlow {
    NextMessage,
    Reconnect,
}

/// Store the offset of an acked message; for a dead-lettered one, publish
/// the copy first and only then store. A failed publish must leave the
/// offset unstored AND tear the session down: storing any later offset on
/// the same partition would commit past the unhandled message and lose it,
/// so the loop reconnects and resumes from the last committed offset,
/// redelivering the message instead.
async fn settle(
    consumer: &WorkQueueConsumer,
    dead_letters: &DeadLetterProducer,
    message: &InboundMessage,
    offset: MessageOffset,
    outcome: MessageOutcome,
) -> LoopFlow {
    match outcome {
        MessageOutcome::Ack => {
            metrics::counter!(MESSAGES_ACKED).increment(1);
            if let Err(error) = consumer.ack(offset) {
                report::emit(
                    DiagnosticCode::BrokerUnavailable,
                    message.property(PROPERTY_EVENT_ID),
                    &format!("offset store failed: {error}"),
                );
            }
            LoopFlow::NextMessage
        }
        MessageOutcome::DeadLetter => {
            metrics::counter!(MESSAGES_DEAD_LETTERED).increment(1);
            match dead_letters.publish(message).await {
                Ok(()) => {
                    if let Err(error) = consumer.ack(offset) {
                        report::emit(
                            DiagnosticCode::BrokerUnavailable,
                            message.property(PROPERTY_EVENT_ID),
                            &format!("offset store failed: {error}"),
                        );
                    }
                    LoopFlow::NextMessage
                }
                Err(error) => {
                    report::emit(
                        DiagnosticCode::DeadLetterPublishFailed,
                        message.property(PROPERTY_EVENT_ID),
                        &error.to_string(),
                    );
                    LoopFlow::Reconnect
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_common::kafka::BrokerConfig;
    use rdkafka::mocking::MockCluster;
    use std::collections::HashMap;

    fn broker_config(hosts: String) -> BrokerConfig {
        BrokerConfig {
            kafka_hosts: hosts,
            kafka_tls: false,
            kafka_consumer_group: "event-hub-test".to_owned(),
            kafka_work_topic: "epcis_events".to_owned(),
            kafka_dead_letter_topic: "epcis_events_dead_letter".to_owned(),
            kafka_topic_partitions: 1,
            kafka_topic_replication: 1,
            kafka_producer_linger_ms: 0,
            kafka_message_timeout_ms: 500,
        }
    }

    fn dead_lettered_message() -> InboundMessage {
        let mut properties = HashMap::new();
        properties.insert(PROPERTY_EVENT_ID.to_owned(), "E1".to_owned());
        InboundMessage {
            properties,
            body: br#"{"a":1}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_failed_dead_letter_publish_forces_a_reconnect() {
        let cluster = MockCluster::new(1).expect("failed to create mock brokers");
        cluster
            .create_topic("epcis_events", 1, 1)
            .expect("failed to create topic");

        let consumer = WorkQueueConsumer::connect(&broker_config(cluster.bootstrap_servers()))
            .expect("failed to create consumer");
        // Unreachable broker: every publish fails once the message timeout
        // elapses.
        let dead_letters = DeadLetterProducer::new(&broker_config("localhost:9".to_owned()))
            .expect("failed to create producer");

        let flow = settle(
            &consumer,
            &dead_letters,
            &dead_lettered_message(),
            MessageOffset::new(0, 0),
            MessageOutcome::DeadLetter,
        )
        .await;

        // The offset must not be stored and the session must be torn down;
        // continuing to the next message would commit past this one and
        // lose it.
        assert_eq!(flow, LoopFlow::Reconnect);
    }

    #[tokio::test]
    async fn test_successful_dead_letter_publish_moves_on() {
        let cluster = MockCluster::new(1).expect("failed to create mock brokers");
        cluster
            .create_topic("epcis_events", 1, 1)
            .expect("failed to create topic");
        cluster
            .create_topic("epcis_events_dead_letter", 1, 1)
            .expect("failed to create topic");

        let config = broker_config(cluster.bootstrap_servers());
        let consumer = WorkQueueConsumer::connect(&config).expect("failed to create consumer");
        let dead_letters = DeadLetterProducer::new(&config).expect("failed to create producer");

        let flow = settle(
            &consumer,
            &dead_letters,
            &dead_lettered_message(),
            MessageOffset::new(0, 0),
            MessageOutcome::DeadLetter,
        )
        .await;

        assert_eq!(flow, LoopFlow::NextMessage);
    }
}
