//! Broker session supervision: reconnect backoff, publish, liveness.
//!
//! The supervisor owns the transport session and is driven by the control
//! loop through [`ConnectivitySupervisor::tick`]. Every failure it sees is
//! recoverable by construction: a failed connect schedules an exponential
//! retry, a failed publish forces an immediate-reconnect disconnect, and a
//! dropped session is picked up by the health check on the next tick.
//! Nothing here ever surfaces as fatal.

use std::time::{Duration, Instant};

use seamark_core::{PublishEvent, TelemetryPayload};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::transport::{Transport, TransportError};

/// Fixed topic carrying observation events for the whole fleet.
pub const EVENTS_TOPIC: &str = "sensors/beacon";

/// Per-device retained liveness topic.
#[must_use]
pub fn liveness_topic(device_label: &str) -> String {
    format!("{EVENTS_TOPIC}/{device_label}/status")
}

/// Broker connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session, no attempt in flight.
    Disconnected,
    /// Attempting (or scheduled to attempt) a connect.
    Connecting,
    /// Session open and believed healthy.
    Connected,
}

/// Exponential reconnect backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Ceiling for the computed delay.
    pub max: Duration,
}

impl BackoffPolicy {
    /// Retry counter cap. `delay(MAX_RETRIES)` saturates the schedule.
    pub const MAX_RETRIES: u32 = 8;

    /// Delay for the given retry counter: `min(max, base * 2^(retries-1))`.
    #[must_use]
    pub fn delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(Self::MAX_RETRIES - 1);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
        }
    }
}

/// Non-mutating snapshot of the supervisor, safe to read from any task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectivityStatus {
    /// Current connection state.
    pub state: ConnectionState,

    /// Consecutive connect failures, capped.
    pub retries: u32,

    /// Milliseconds until the next connect attempt, if one is scheduled.
    pub next_retry_ms: Option<u64>,
}

impl Default for ConnectivityStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            next_retry_ms: None,
        }
    }
}

/// Owns the broker session lifecycle and the publish path.
pub struct ConnectivitySupervisor<T: Transport> {
    transport: T,
    backoff: BackoffPolicy,
    connect_timeout: Duration,
    device_label: String,
    host_address: String,
    liveness_topic: String,
    state: ConnectionState,
    retries: u32,
    next_retry: Option<Instant>,
    status_tx: watch::Sender<ConnectivityStatus>,
}

impl<T: Transport> ConnectivitySupervisor<T> {
    /// Create a supervisor and the status receiver for observers.
    pub fn new(
        transport: T,
        backoff: BackoffPolicy,
        connect_timeout: Duration,
        device_label: impl Into<String>,
        host_address: impl Into<String>,
    ) -> (Self, watch::Receiver<ConnectivityStatus>) {
        let device_label = device_label.into();
        let (status_tx, status_rx) = watch::channel(ConnectivityStatus::default());
        let supervisor = Self {
            transport,
            backoff,
            connect_timeout,
            liveness_topic: liveness_topic(&device_label),
            device_label,
            host_address: host_address.into(),
            state: ConnectionState::Disconnected,
            retries: 0,
            next_retry: None,
            status_tx,
        };
        (supervisor, status_rx)
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a healthy session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// Non-mutating status snapshot.
    #[must_use]
    pub fn status(&self, now: Instant) -> ConnectivityStatus {
        ConnectivityStatus {
            state: self.state,
            retries: self.retries,
            next_retry_ms: self.next_retry.map(|deadline| {
                u64::try_from(deadline.saturating_duration_since(now).as_millis())
                    .unwrap_or(u64::MAX)
            }),
        }
    }

    /// Refresh the host address stamped into outgoing payloads.
    ///
    /// The link address can change between sessions (a DHCP renew usually
    /// drops the broker session too), so the control loop re-reads it
    /// whenever a session is established.
    pub fn set_host_address(&mut self, address: impl Into<String>) {
        self.host_address = address.into();
    }

    /// Drive the session lifecycle one step. Bounded: the only await with
    /// real latency is the connect attempt, which carries its own ceiling.
    ///
    /// No-op while a retry deadline is pending or the link is down.
    pub async fn tick(&mut self, now: Instant, link_ready: bool) {
        if self.is_connected() {
            if !self.transport.is_connected() {
                warn!("Broker session dropped, scheduling immediate reconnect");
                self.transport.disconnect().await;
                self.state = ConnectionState::Disconnected;
                self.next_retry = Some(now);
                self.publish_status(now);
            }
            return;
        }

        if let Some(deadline) = self.next_retry {
            if now < deadline {
                return;
            }
        }
        if !link_ready {
            return;
        }

        self.state = ConnectionState::Connecting;
        self.publish_status(now);

        match self.transport.connect(self.connect_timeout).await {
            Ok(()) => {
                self.retries = 0;
                self.next_retry = None;
                self.state = ConnectionState::Connected;
                info!("Broker connected as {}", self.device_label);
                // Retained liveness marker; the matching "offline" comes
                // from the last-will registered at connect.
                if let Err(e) = self
                    .transport
                    .publish(&self.liveness_topic, b"online".to_vec(), true)
                    .await
                {
                    warn!("Failed to publish liveness marker: {e}");
                }
                self.publish_status(now);
            }
            Err(e) => {
                self.retries = (self.retries + 1).min(BackoffPolicy::MAX_RETRIES);
                let delay = self.backoff.delay(self.retries);
                self.next_retry = Some(now + delay);
                // A failed attempt stays in connecting-flavoured retry.
                warn!(
                    "Broker connect failed ({e}), retry {} in {delay:?}",
                    self.retries
                );
                self.publish_status(now);
            }
        }
    }

    /// Publish one surfaced event on the fleet topic.
    ///
    /// On failure the supervisor transitions to `Disconnected` with the
    /// retry deadline set to *now*: a publish failure means the session is
    /// gone, so the very next tick should retry immediately instead of
    /// waiting out an exponential delay.
    ///
    /// # Errors
    ///
    /// Returns the transport error. Callers need no recovery of their own;
    /// the state machine has already absorbed it.
    pub async fn publish(
        &mut self,
        event: &PublishEvent,
        now: Instant,
    ) -> Result<TelemetryPayload, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let payload = event.payload(&self.device_label, &self.host_address);
        let body = serde_json::to_vec(&payload)
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        match self.transport.publish(EVENTS_TOPIC, body, false).await {
            Ok(()) => Ok(payload),
            Err(e) => {
                warn!("Publish failed ({e}), disconnecting with immediate retry");
                self.transport.disconnect().await;
                self.state = ConnectionState::Disconnected;
                self.next_retry = Some(now);
                self.publish_status(now);
                Err(e)
            }
        }
    }

    /// Drop the session and stop retrying. Used when entering
    /// provisioning; the process restarts before the supervisor is needed
    /// again.
    pub async fn shutdown(&mut self) {
        self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
        self.next_retry = None;
        self.publish_status(Instant::now());
    }

    fn publish_status(&self, now: Instant) {
        let _ = self.status_tx.send(self.status(now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use seamark_core::{BeaconId, DeviceIdentity};

    fn supervisor(
        transport: MockTransport,
    ) -> (
        ConnectivitySupervisor<MockTransport>,
        watch::Receiver<ConnectivityStatus>,
    ) {
        ConnectivitySupervisor::new(
            transport,
            BackoffPolicy::default(),
            Duration::from_secs(15),
            "SM1",
            "192.168.50.21",
        )
    }

    fn event() -> PublishEvent {
        PublishEvent {
            identity: DeviceIdentity::from_bytes([1, 2, 3, 4, 5, 6]),
            beacon: BeaconId::parse("dd:88:00:00:13:07").unwrap(),
            rssi: -60,
            rssi_ema: -61.2,
            ts_unix: 1_735_689_600,
            uptime_ms: 42,
        }
    }

    fn failing(n: usize) -> MockTransport {
        let mut transport = MockTransport::default();
        for _ in 0..n {
            transport
                .connect_results
                .push_back(Err(TransportError::Connect("refused".into())));
        }
        transport
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(2));
        assert_eq!(policy.delay(7), Duration::from_secs(32));
        // 500ms * 2^7 = 64s, capped at 60s.
        assert_eq!(policy.delay(8), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_connect_failure_schedules_exponential_retry() {
        let (mut sup, _rx) = supervisor(failing(3));
        let mut now = Instant::now();

        for k in 1u32..=3 {
            sup.tick(now, true).await;
            let status = sup.status(now);
            assert_eq!(status.state, ConnectionState::Connecting);
            assert_eq!(status.retries, k);
            let expected = BackoffPolicy::default().delay(k);
            assert_eq!(sup.next_retry.unwrap() - now, expected);

            // A tick before the deadline is a no-op.
            let attempts = sup.transport.connect_attempts;
            sup.tick(now + expected / 2, true).await;
            assert_eq!(sup.transport.connect_attempts, attempts);

            now += expected;
        }
        assert_eq!(sup.transport.connect_attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_counter_caps_at_eight() {
        let (mut sup, _rx) = supervisor(failing(20));
        let mut now = Instant::now();
        for _ in 0..12 {
            sup.tick(now, true).await;
            now = sup.next_retry.unwrap();
        }
        assert_eq!(sup.status(now).retries, BackoffPolicy::MAX_RETRIES);
        assert_eq!(
            BackoffPolicy::default().delay(BackoffPolicy::MAX_RETRIES),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_successful_connect_resets_counter_and_marks_online() {
        let (mut sup, _rx) = supervisor(failing(2));
        let mut now = Instant::now();
        sup.tick(now, true).await;
        now = sup.next_retry.unwrap();
        sup.tick(now, true).await;
        now = sup.next_retry.unwrap();

        // Third attempt succeeds.
        sup.tick(now, true).await;
        let status = sup.status(now);
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.retries, 0);
        assert_eq!(status.next_retry_ms, None);

        let (topic, payload, retain) = &sup.transport.published[0];
        assert_eq!(topic, "sensors/beacon/SM1/status");
        assert_eq!(payload, b"online");
        assert!(*retain);

        // The next failure starts again from base delay.
        sup.transport.alive = false;
        sup.tick(now, true).await; // health check forces disconnect
        sup.transport
            .connect_results
            .push_back(Err(TransportError::Connect("refused".into())));
        sup.tick(now, true).await;
        assert_eq!(sup.next_retry.unwrap() - now, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_publish_failure_forces_immediate_retry_deadline() {
        let mut transport = MockTransport::default();
        // First publish is the liveness marker, second is the event.
        transport.publish_results.push_back(Ok(()));
        transport
            .publish_results
            .push_back(Err(TransportError::Publish("broken pipe".into())));
        let (mut sup, _rx) = supervisor(transport);

        let t0 = Instant::now();
        sup.tick(t0, true).await;
        assert!(sup.is_connected());

        let t1 = t0 + Duration::from_millis(10);
        let result = sup.publish(&event(), t1).await;
        assert!(result.is_err());

        // Fast-fail: deadline is now, not the exponential value.
        let status = sup.status(t1);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.next_retry_ms, Some(0));

        // The very next tick retries immediately.
        sup.tick(t1, true).await;
        assert!(sup.is_connected());
    }

    #[tokio::test]
    async fn test_successful_publish_carries_wire_payload() {
        let (mut sup, _rx) = supervisor(MockTransport::default());
        let t0 = Instant::now();
        sup.tick(t0, true).await;

        let payload = sup.publish(&event(), t0).await.unwrap();
        assert_eq!(payload.sensor_id, "SM1");
        assert_eq!(payload.ip, "192.168.50.21");

        let (topic, body, retain) = sup.transport.published.last().unwrap();
        assert_eq!(topic, EVENTS_TOPIC);
        assert!(!*retain);
        let wire: TelemetryPayload = serde_json::from_slice(body).unwrap();
        assert_eq!(wire.beacon_mac, "dd:88:00:00:13:07");
        assert_eq!(wire.rssi, -60);
    }

    #[tokio::test]
    async fn test_host_address_refresh_reaches_the_payload() {
        let (mut sup, _rx) = supervisor(MockTransport::default());
        let t0 = Instant::now();
        sup.tick(t0, true).await;

        sup.set_host_address("192.168.50.77");
        let payload = sup.publish(&event(), t0).await.unwrap();
        assert_eq!(payload.ip, "192.168.50.77");
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_rejected() {
        let (mut sup, _rx) = supervisor(MockTransport::default());
        let result = sup.publish(&event(), Instant::now()).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_tick_noop_while_link_down() {
        let (mut sup, _rx) = supervisor(MockTransport::default());
        sup.tick(Instant::now(), false).await;
        assert_eq!(sup.transport.connect_attempts, 0);
        assert_eq!(sup.status(Instant::now()).state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_session_drop_detected_by_health_check() {
        let (mut sup, mut rx) = supervisor(MockTransport::default());
        let t0 = Instant::now();
        sup.tick(t0, true).await;
        assert!(sup.is_connected());

        sup.transport.alive = false;
        let t1 = t0 + Duration::from_millis(100);
        sup.tick(t1, true).await;

        assert!(!sup.is_connected());
        // Dropped sessions also retry immediately.
        assert_eq!(sup.status(t1).next_retry_ms, Some(0));

        // Observers saw the transition through the watch channel.
        let status = rx.borrow_and_update().clone();
        assert_eq!(status.state, ConnectionState::Disconnected);
    }
}
