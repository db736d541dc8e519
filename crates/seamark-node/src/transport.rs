//! Broker transport behind a trait seam.
//!
//! The connectivity supervisor only sees the [`Transport`] trait, so its
//! state machine is testable with a scripted mock. The real implementation
//! is MQTT over `rumqttc`, feature-gated the same way the rest of the
//! hardware seams are.

use std::time::Duration;

use thiserror::Error;

/// Transport-level failures. All recoverable: the supervisor's state
/// machine absorbs every one of them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker rejected or never answered a connect attempt.
    #[error("Broker connect failed: {0}")]
    Connect(String),

    /// The connect attempt exceeded the configured ceiling.
    #[error("Broker connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A publish could not be handed to the session.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// No session is currently open.
    #[error("No active broker session")]
    NotConnected,
}

/// A broker session the supervisor can open, use, and drop.
///
/// `connect` must register the retained `"offline"` last-will on the
/// liveness topic so an unclean session drop is visible to consumers.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Open a session, bounded by `timeout`.
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Whether the session is still believed healthy. Non-blocking.
    fn is_connected(&self) -> bool;

    /// Send one payload. Non-blocking: hands the message to the session
    /// or fails immediately.
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Drop the session, if any.
    async fn disconnect(&mut self);
}

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

#[cfg(feature = "mqtt")]
mod mqtt {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
    use tracing::debug;

    use super::{Transport, TransportError};

    /// MQTT v4 transport over `rumqttc`.
    pub struct MqttTransport {
        broker_host: String,
        broker_port: u16,
        client_id: String,
        will_topic: String,
        session: Option<Session>,
    }

    struct Session {
        client: AsyncClient,
        alive: Arc<AtomicBool>,
        driver: tokio::task::JoinHandle<()>,
    }

    impl MqttTransport {
        /// Create a transport for the given broker.
        ///
        /// `will_topic` is the per-device liveness topic; the broker will
        /// publish a retained `"offline"` there if the session drops
        /// uncleanly.
        #[must_use]
        pub fn new(
            broker_host: impl Into<String>,
            broker_port: u16,
            client_id: impl Into<String>,
            will_topic: impl Into<String>,
        ) -> Self {
            Self {
                broker_host: broker_host.into(),
                broker_port,
                client_id: client_id.into(),
                will_topic: will_topic.into(),
                session: None,
            }
        }
    }

    impl Transport for MqttTransport {
        async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
            self.disconnect().await;

            let mut options =
                MqttOptions::new(&self.client_id, &self.broker_host, self.broker_port);
            options.set_keep_alive(Duration::from_secs(30));
            options.set_last_will(LastWill::new(
                &self.will_topic,
                "offline",
                QoS::AtMostOnce,
                true,
            ));

            let (client, mut event_loop) = AsyncClient::new(options, 16);

            // Wait for the broker's acknowledgement, bounded.
            let acked = tokio::time::timeout(timeout, async {
                loop {
                    match event_loop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                        Ok(_) => {}
                        Err(e) => return Err(TransportError::Connect(e.to_string())),
                    }
                }
            })
            .await;

            match acked {
                Err(_) => return Err(TransportError::ConnectTimeout(timeout)),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(())) => {}
            }

            // Keep the session alive from a background task; the flag is
            // the supervisor's health signal.
            let alive = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&alive);
            let driver = tokio::spawn(async move {
                loop {
                    if let Err(e) = event_loop.poll().await {
                        debug!("Broker session dropped: {e}");
                        flag.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            });

            self.session = Some(Session {
                client,
                alive,
                driver,
            });
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.session
                .as_ref()
                .is_some_and(|s| s.alive.load(Ordering::SeqCst))
        }

        async fn publish(
            &mut self,
            topic: &str,
            payload: Vec<u8>,
            retain: bool,
        ) -> Result<(), TransportError> {
            let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
            if !session.alive.load(Ordering::SeqCst) {
                return Err(TransportError::Publish("session dropped".to_string()));
            }
            session
                .client
                .try_publish(topic, QoS::AtMostOnce, retain, payload)
                .map_err(|e| TransportError::Publish(e.to_string()))
        }

        async fn disconnect(&mut self) {
            if let Some(session) = self.session.take() {
                let _ = session.client.try_disconnect();
                session.driver.abort();
            }
        }
    }
}

#[cfg(all(test, feature = "mqtt"))]
mod mqtt_tests {
    use super::{MqttTransport, Transport, TransportError};
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_gives_up_at_the_ceiling_without_connack() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accepts the TCP connection but never answers the handshake.
        let silent_broker = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let mut transport = MqttTransport::new(
            "127.0.0.1",
            port,
            "seamark-test",
            "sensors/beacon/T1/status",
        );
        let ceiling = Duration::from_millis(200);
        let started = std::time::Instant::now();
        let result = transport.connect(ceiling).await;

        assert!(matches!(result, Err(TransportError::ConnectTimeout(t)) if t == ceiling));
        // The bound is the configured ceiling, not some inner retry loop.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!transport.is_connected());
        silent_broker.abort();
    }
}
