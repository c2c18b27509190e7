use skyhold_shared::LifecycleEvent;

/// Topic an event is forwarded to, e.g. `skyhold.bookings`.
pub fn topic_for(prefix: &str, event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::SeatStatusChanged(_) => format!("{}.seats", prefix),
        LifecycleEvent::BookingTransitioned(_) => format!("{}.bookings", prefix),
    }
}

#[cfg(feature = "kafka")]
pub use producer::EventProducer;

#[cfg(feature = "kafka")]
mod producer {
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use skyhold_shared::LifecycleEvent;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;
    use tracing::{debug, error, warn};

    use super::topic_for;

    #[derive(Clone)]
    pub struct EventProducer {
        producer: FutureProducer,
    }

    impl EventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }

        pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
            let record = FutureRecord::to(topic).key(key).payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    debug!(
                        topic,
                        key,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "Event delivered"
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(e)
                }
            }
        }

        /// Forward every lifecycle event to Kafka until the bus closes.
        pub fn forward(self, mut events: broadcast::Receiver<LifecycleEvent>, topic_prefix: String) -> JoinHandle<()> {
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            let payload = match serde_json::to_string(&event) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    error!("Failed to encode lifecycle event: {}", e);
                                    continue;
                                }
                            };
                            let topic = topic_for(&topic_prefix, &event);
                            // Delivery failures are logged in publish; the bus keeps flowing
                            let _ = self.publish(&topic, &event.key().to_string(), &payload).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Kafka forwarder fell behind; events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyhold_shared::SeatStatusChanged;
    use uuid::Uuid;

    #[test]
    fn test_topic_per_event_kind() {
        let event = LifecycleEvent::SeatStatusChanged(SeatStatusChanged {
            flight_id: Uuid::new_v4(),
            seat_id: Uuid::new_v4(),
            seat_number: "3C".to_string(),
            status: "SOLD".to_string(),
            booking_id: Uuid::new_v4(),
            at: 0,
        });
        assert_eq!(topic_for("skyhold", &event), "skyhold.seats");
    }
}
