//! AMQP 0.9.1 (RabbitMQ) subscription via `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::BrokerConfig;
use crate::error::ConsumerError;
use crate::ports::{Delivery, DeliveryQueue, DeliveryTag};

impl BrokerConfig {
    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.user.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            ..Default::default()
        }
    }
}

/// Manual-ack consumer on one queue.
pub struct AmqpDeliveryQueue {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl AmqpDeliveryQueue {
    pub async fn connect(config: &BrokerConfig, queue: &str) -> Result<Self, ConsumerError> {
        let connection = Connection::connect_uri(
            config.amqp_uri(),
            ConnectionProperties::default().with_connection_name("taskmq-consumer".into()),
        )
        .await
        .map_err(|e| ConsumerError::Broker(format!("connection failed: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ConsumerError::Broker(format!("channel creation failed: {e}")))?;

        if config.prefetch > 0 {
            channel
                .basic_qos(config.prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| ConsumerError::Broker(format!("failed to set QoS: {e}")))?;
        }

        if config.declare_topology {
            declare_with_dead_letter(&channel, queue).await?;
        }

        let consumer_tag = format!("taskmq-{}", Ulid::new());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::Broker(format!("basic_consume on {queue} failed: {e}")))?;

        info!(
            host = %config.host,
            vhost = %config.vhost,
            queue,
            consumer_tag = %consumer_tag,
            prefetch = config.prefetch,
            "subscribed"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
            queue: queue.to_string(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// `<queue>_dlx` (direct) -> `<queue>_dlq`, routed by the queue name, and the
/// queue itself pointing at the exchange.
async fn declare_with_dead_letter(channel: &Channel, queue: &str) -> Result<(), ConsumerError> {
    let dlx = format!("{queue}_dlx");
    let dlq = format!("{queue}_dlq");
    let durable = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    channel
        .exchange_declare(
            &dlx,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| ConsumerError::Broker(format!("declare {dlx} failed: {e}")))?;

    channel
        .queue_declare(&dlq, durable, FieldTable::default())
        .await
        .map_err(|e| ConsumerError::Broker(format!("declare {dlq} failed: {e}")))?;

    channel
        .queue_bind(&dlq, &dlx, queue, QueueBindOptions::default(), FieldTable::default())
        .await
        .map_err(|e| ConsumerError::Broker(format!("bind {dlq} failed: {e}")))?;

    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(dlx.clone().into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(queue.into()),
    );
    channel
        .queue_declare(queue, durable, args)
        .await
        .map_err(|e| ConsumerError::Broker(format!("declare {queue} failed: {e}")))?;

    Ok(())
}

#[async_trait]
impl DeliveryQueue for AmqpDeliveryQueue {
    async fn recv(&mut self) -> Result<Option<Delivery>, ConsumerError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(
                Delivery::new(DeliveryTag::new(delivery.delivery_tag), delivery.data)
                    .redelivered(delivery.redelivered),
            )),
            Some(Err(e)) => Err(ConsumerError::Broker(format!(
                "consume on {} failed: {e}",
                self.queue
            ))),
            None => Ok(None),
        }
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ConsumerError> {
        self.channel
            .basic_ack(tag.value(), BasicAckOptions::default())
            .await
            .map_err(|e| ConsumerError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ConsumerError> {
        self.channel
            .basic_nack(
                tag.value(),
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsumerError::Reject {
                tag,
                reason: e.to_string(),
            })
    }

    /// Close channel and connection. Unacked deliveries are requeued by the broker.
    async fn close(&mut self) {
        if let Err(e) = self.channel.close(200, "consumer stopped").await {
            warn!(error = %e, queue = %self.queue, "channel close failed");
        }
        if let Err(e) = self.connection.close(200, "consumer stopped").await {
            warn!(error = %e, queue = %self.queue, "connection close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> BrokerConfig {
        BrokerConfig {
            user: "app".to_string(),
            password: "s3cret".to_string(),
            host: "mq.internal".to_string(),
            vhost: "/inventory".to_string(),
            port: 31312,
            prefetch: 1,
            declare_topology: false,
        }
    }

    #[test]
    fn uri_carries_credentials_and_vhost() {
        let uri = broker().amqp_uri();
        assert_eq!(uri.authority.userinfo.username, "app");
        assert_eq!(uri.authority.userinfo.password, "s3cret");
        assert_eq!(uri.authority.host, "mq.internal");
        assert_eq!(uri.authority.port, 31312);
        assert_eq!(uri.vhost, "/inventory");
    }

    // Needs a broker: TASKMQ_TEST_AMQP_HOST=localhost cargo test -- --ignored
    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn subscribes_to_declared_queue() {
        let mut config = broker();
        config.host = std::env::var("TASKMQ_TEST_AMQP_HOST").unwrap_or("localhost".into());
        config.user = "guest".to_string();
        config.password = "guest".to_string();
        config.vhost = "/".to_string();
        config.port = 5672;
        config.declare_topology = true;

        let queue = format!("taskmq_test_{}", Ulid::new());
        let mut consumer = AmqpDeliveryQueue::connect(&config, &queue).await.unwrap();
        assert_eq!(consumer.queue(), queue);
        consumer.close().await;
    }
}
