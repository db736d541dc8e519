//! Discovery producer glue.
//!
//! The radio driver is an external collaborator; it hands raw
//! [`Discovery`] readings into a bounded channel. The producer task owns
//! the [`ObservationProcessor`] and is the only writer to the event
//! queue. It never publishes and never sees supervisor state.
//!
//! On hardware the `bluetooth` feature compiles in a BlueZ driver that
//! feeds the channel; without it the channel is simply quiet.

use std::sync::Arc;
use std::time::Instant;

use seamark_core::{Observation, ObservationProcessor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::queue::EventQueue;

/// Capacity of the raw discovery channel from the driver.
pub const DISCOVERY_CHANNEL_CAPACITY: usize = 32;

/// One raw reading from the radio.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Beacon address as reported, any casing.
    pub address: String,

    /// Received signal strength in dBm.
    pub rssi: i16,
}

/// Create the bounded channel the driver feeds.
#[must_use]
pub fn discovery_channel() -> (mpsc::Sender<Discovery>, mpsc::Receiver<Discovery>) {
    mpsc::channel(DISCOVERY_CHANNEL_CAPACITY)
}

/// Spawn the producer task: raw discoveries in, surfaced events out.
///
/// `started` anchors the uptime stamp carried in payloads.
pub fn spawn_producer(
    mut source: mpsc::Receiver<Discovery>,
    mut processor: ObservationProcessor,
    queue: Arc<EventQueue>,
    started: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(discovery) = source.recv().await {
            let now = Instant::now();
            let observation = Observation {
                beacon: discovery.address,
                rssi: discovery.rssi,
                at: now,
                ts_unix: u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(0),
                uptime_ms: u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX),
            };
            if let Some(event) = processor.observe(&observation) {
                queue.push(event);
            }
        }
        debug!("Discovery channel closed, producer exiting");
    })
}

#[cfg(feature = "bluetooth")]
pub use bluez::run_driver;

#[cfg(feature = "bluetooth")]
mod bluez {
    use bluer::{Adapter, AdapterEvent, DeviceEvent, DeviceProperty};
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};

    use super::Discovery;

    /// Run the BlueZ discovery driver, forwarding RSSI readings into the
    /// channel until the adapter stream ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the Bluetooth session or adapter cannot be
    /// opened. Per-device failures are logged and skipped.
    pub async fn run_driver(tx: mpsc::Sender<Discovery>) -> bluer::Result<()> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        info!("BLE discovery running on adapter {}", adapter.name());

        let mut events = adapter.discover_devices().await?;
        while let Some(event) = events.next().await {
            if let AdapterEvent::DeviceAdded(addr) = event {
                if let Err(e) = watch_device(&adapter, addr, tx.clone()).await {
                    warn!("Skipping device {addr}: {e}");
                }
            }
        }
        Ok(())
    }

    /// Forward the initial RSSI and every subsequent change for one
    /// device.
    async fn watch_device(
        adapter: &Adapter,
        addr: bluer::Address,
        tx: mpsc::Sender<Discovery>,
    ) -> bluer::Result<()> {
        let device = adapter.device(addr)?;

        if let Some(rssi) = device.rssi().await? {
            forward(&tx, addr, rssi);
        }

        let mut changes = device.events().await?;
        tokio::spawn(async move {
            while let Some(DeviceEvent::PropertyChanged(property)) = changes.next().await {
                if let DeviceProperty::Rssi(rssi) = property {
                    forward(&tx, addr, rssi);
                }
            }
            debug!("Property stream for {addr} ended");
        });
        Ok(())
    }

    fn forward(tx: &mpsc::Sender<Discovery>, addr: bluer::Address, rssi: i16) {
        // try_send: a full channel means the consumer is behind, and a
        // stale reading is worthless anyway.
        let _ = tx.try_send(Discovery {
            address: addr.to_string(),
            rssi,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seamark_core::{BeaconId, DeviceIdentity, NodeConfig};
    use std::time::Duration;

    fn processor() -> ObservationProcessor {
        let config = NodeConfig {
            tracked_beacons: "dd:88:00:00:13:07".to_string(),
            ..NodeConfig::default()
        };
        ObservationProcessor::new(
            DeviceIdentity::from_bytes([1, 2, 3, 4, 5, 6]),
            config.tracked(),
            config.publish_interval(),
            config.ema_alpha,
        )
    }

    #[tokio::test]
    async fn test_producer_filters_and_fills_queue() {
        let (tx, rx) = discovery_channel();
        let queue = Arc::new(EventQueue::new(8));
        let handle = spawn_producer(rx, processor(), Arc::clone(&queue), Instant::now());

        tx.send(Discovery {
            address: "DD:88:00:00:13:07".to_string(),
            rssi: -60,
        })
        .await
        .unwrap();
        tx.send(Discovery {
            address: "11:22:33:44:55:66".to_string(),
            rssi: -40,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(
            drained[0].beacon,
            BeaconId::parse("dd:88:00:00:13:07").unwrap()
        );
        assert_eq!(drained[0].rssi, -60);
    }

    #[tokio::test]
    async fn test_rapid_discoveries_collapse_to_latest() {
        let (tx, rx) = discovery_channel();
        let queue = Arc::new(EventQueue::new(8));

        // Interval of 1h: only the first observation surfaces, the rest
        // are gated, so the queue sees exactly one event.
        let config = NodeConfig {
            tracked_beacons: "dd:88:00:00:13:07".to_string(),
            publish_interval_ms: 3_600_000,
            ..NodeConfig::default()
        };
        let processor = ObservationProcessor::new(
            DeviceIdentity::from_bytes([1, 2, 3, 4, 5, 6]),
            config.tracked(),
            config.publish_interval(),
            config.ema_alpha,
        );
        let handle = spawn_producer(rx, processor, Arc::clone(&queue), Instant::now());

        for rssi in [-60i16, -62, -64] {
            tx.send(Discovery {
                address: "dd:88:00:00:13:07".to_string(),
                rssi,
            })
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(queue.len(), 1);
    }
}
