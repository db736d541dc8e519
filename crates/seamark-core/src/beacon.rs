//! Beacon observation processing: smoothing and publish-rate gating.
//!
//! This module is the pure filtering stage between the radio discovery
//! driver and the broker transport. It:
//! - Drops observations for untracked beacons without creating state
//! - Canonicalizes beacon addresses before any lookup
//! - Smooths raw RSSI with an exponential moving average
//! - Gates emission so at most one event per beacon is surfaced per
//!   configured minimum interval
//!
//! No I/O happens here. Callers supply both the monotonic and the
//! wall-clock timestamps, which keeps every property of this stage
//! testable without a radio or a clock.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;

/// Canonical length of a colon-separated beacon address.
const CANONICAL_ADDRESS_LEN: usize = 17;

/// A canonical beacon identifier.
///
/// Always lowercase, always `aa:bb:cc:dd:ee:ff`. Constructing one is the
/// only way to key beacon state, so identifiers differing only in case or
/// surrounding whitespace collapse to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconId(String);

impl BeaconId {
    /// Parse and canonicalize a raw beacon address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBeaconAddress`] if the trimmed, lowercased
    /// input is not a 17-character colon-separated address.
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical = raw.trim().to_lowercase();
        if canonical.len() != CANONICAL_ADDRESS_LEN {
            return Err(Error::InvalidBeaconAddress(raw.to_string()));
        }
        let well_formed = canonical.char_indices().all(|(i, c)| {
            if matches!(i, 2 | 5 | 8 | 11 | 14) {
                c == ':'
            } else {
                c.is_ascii_hexdigit()
            }
        });
        if !well_formed {
            return Err(Error::InvalidBeaconAddress(raw.to_string()));
        }
        Ok(Self(canonical))
    }

    /// The canonical address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw proximity reading delivered by the discovery driver.
///
/// Transient: observations are consumed by the processor and never stored.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Beacon address as reported by the radio (any casing).
    pub beacon: String,

    /// Raw received signal strength in dBm.
    pub rssi: i16,

    /// Monotonic arrival time, used for interval gating.
    pub at: Instant,

    /// Wall-clock arrival time, UTC seconds.
    pub ts_unix: u32,

    /// Node uptime at arrival, milliseconds.
    pub uptime_ms: u32,
}

/// Per-beacon smoothing and gating state.
///
/// Created lazily on the first matching observation and kept for the
/// process lifetime.
#[derive(Debug, Clone, Default)]
pub struct BeaconState {
    /// Smoothed signal. `None` until the first observation.
    pub ema: Option<f32>,

    /// When the last event for this beacon was surfaced. The gate measures
    /// from here, not from the last raw observation.
    pub last_surfaced: Option<Instant>,
}

/// A filtered, smoothed reading that passed the rate gate.
#[derive(Debug, Clone)]
pub struct PublishEvent {
    /// Identity of the observing node.
    pub identity: DeviceIdentity,

    /// Canonical address of the observed beacon.
    pub beacon: BeaconId,

    /// Raw signal of the observation that surfaced this event.
    pub rssi: i16,

    /// Smoothed signal at the time of surfacing.
    pub rssi_ema: f32,

    /// Wall-clock time of the observation, UTC seconds.
    pub ts_unix: u32,

    /// Node uptime at the observation, milliseconds.
    pub uptime_ms: u32,
}

impl PublishEvent {
    /// Build the wire payload for this event.
    ///
    /// The host address is supplied by the caller because only the
    /// connectivity layer knows it; the processor itself never touches the
    /// network.
    #[must_use]
    pub fn payload(&self, device_label: &str, host_address: &str) -> TelemetryPayload {
        TelemetryPayload {
            sensor_mac: self.identity.as_str().to_string(),
            sensor_id: device_label.to_string(),
            beacon_mac: self.beacon.as_str().to_string(),
            rssi: self.rssi,
            rssi_ema: self.rssi_ema,
            ts_unix: self.ts_unix,
            ts_ms: self.uptime_ms,
            ip: host_address.to_string(),
        }
    }
}

/// The JSON payload published per surfaced observation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "sensor_mac": "DCA632AABBCC",
    "sensor_id": "SM1",
    "beacon_mac": "dd:88:00:00:13:07",
    "rssi": -60,
    "rssi_ema": -61.2,
    "ts_unix": 1735689600,
    "ts_ms": 482000,
    "ip": "192.168.50.21"
}))]
pub struct TelemetryPayload {
    /// Hardware identity of the sensor node.
    pub sensor_mac: String,

    /// Configured device label.
    pub sensor_id: String,

    /// Canonical beacon address.
    pub beacon_mac: String,

    /// Raw signal in dBm.
    pub rssi: i16,

    /// Smoothed signal in dBm.
    pub rssi_ema: f32,

    /// Wall-clock timestamp, UTC seconds.
    pub ts_unix: u32,

    /// Node uptime, milliseconds.
    pub ts_ms: u32,

    /// Host address of the node on its link.
    pub ip: String,
}

/// Pure filtering and gating stage for discovery events.
///
/// Owned by the scan producer task; the rest of the system only ever sees
/// the immutable [`PublishEvent`] values it emits.
#[derive(Debug)]
pub struct ObservationProcessor {
    identity: DeviceIdentity,
    tracked: Vec<BeaconId>,
    min_interval: Duration,
    alpha: f32,
    states: HashMap<BeaconId, BeaconState>,
}

impl ObservationProcessor {
    /// Create a processor for the given tracked set.
    ///
    /// `alpha` is the EMA smoothing factor in `(0, 1]`; `min_interval` is
    /// the minimum spacing between surfaced events per beacon.
    #[must_use]
    pub fn new(
        identity: DeviceIdentity,
        tracked: Vec<BeaconId>,
        min_interval: Duration,
        alpha: f32,
    ) -> Self {
        Self {
            identity,
            tracked,
            min_interval,
            alpha,
            states: HashMap::new(),
        }
    }

    /// Process one raw observation.
    ///
    /// Returns a [`PublishEvent`] only when the observation is for a
    /// tracked beacon *and* the minimum interval since the last surfaced
    /// event has elapsed. The smoothed value updates on every tracked
    /// observation regardless of gating.
    pub fn observe(&mut self, obs: &Observation) -> Option<PublishEvent> {
        let Ok(beacon) = BeaconId::parse(&obs.beacon) else {
            return None;
        };
        if !self.tracked.contains(&beacon) {
            // No state for beacons we don't track.
            return None;
        }

        let state = self.states.entry(beacon.clone()).or_default();

        let ema = match state.ema {
            None => f32::from(obs.rssi),
            Some(prev) => self.alpha * f32::from(obs.rssi) + (1.0 - self.alpha) * prev,
        };
        state.ema = Some(ema);

        let due = match state.last_surfaced {
            None => true,
            Some(last) => obs.at.duration_since(last) >= self.min_interval,
        };
        if !due {
            return None;
        }
        state.last_surfaced = Some(obs.at);

        Some(PublishEvent {
            identity: self.identity.clone(),
            beacon,
            rssi: obs.rssi,
            rssi_ema: ema,
            ts_unix: obs.ts_unix,
            uptime_ms: obs.uptime_ms,
        })
    }

    /// Current smoothed signal for a beacon, if any observation has been
    /// processed for it.
    #[must_use]
    pub fn smoothed(&self, beacon: &BeaconId) -> Option<f32> {
        self.states.get(beacon).and_then(|s| s.ema)
    }

    /// Number of beacons with state. Diagnostic only.
    #[must_use]
    pub fn tracked_with_state(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKED: &str = "aa:bb:cc:dd:ee:ff";

    fn processor(min_interval_ms: u64) -> ObservationProcessor {
        ObservationProcessor::new(
            DeviceIdentity::from_bytes([0xdc, 0xa6, 0x32, 0xaa, 0xbb, 0xcc]),
            vec![BeaconId::parse(TRACKED).unwrap()],
            Duration::from_millis(min_interval_ms),
            0.3,
        )
    }

    fn obs(beacon: &str, rssi: i16, at: Instant) -> Observation {
        Observation {
            beacon: beacon.to_string(),
            rssi,
            at,
            ts_unix: 1_735_689_600,
            uptime_ms: 1000,
        }
    }

    #[test]
    fn test_beacon_id_canonicalizes_case_and_whitespace() {
        let lower = BeaconId::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let upper = BeaconId::parse(" AA:BB:CC:DD:EE:FF ").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_beacon_id_rejects_malformed() {
        assert!(BeaconId::parse("aa:bb:cc:dd:ee").is_err());
        assert!(BeaconId::parse("aabbccddeeff").is_err());
        assert!(BeaconId::parse("zz:bb:cc:dd:ee:ff").is_err());
        assert!(BeaconId::parse("").is_err());
    }

    #[test]
    fn test_first_observation_ema_equals_raw() {
        let mut p = processor(100);
        let event = p.observe(&obs(TRACKED, -60, Instant::now())).unwrap();
        assert!((event.rssi_ema - -60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_ema_follows_recurrence_in_arrival_order() {
        let mut p = processor(0);
        let t = Instant::now();
        let samples = [-60i16, -64, -58, -70];
        let mut expected = f32::from(samples[0]);
        for (i, &rssi) in samples.iter().enumerate() {
            if i > 0 {
                expected = 0.3 * f32::from(rssi) + 0.7 * expected;
            }
            let event = p.observe(&obs(TRACKED, rssi, t)).unwrap();
            assert!((event.rssi_ema - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_untracked_beacon_creates_no_state_and_no_event() {
        let mut p = processor(100);
        assert!(p.observe(&obs("11:22:33:44:55:66", -50, Instant::now())).is_none());
        assert_eq!(p.tracked_with_state(), 0);
    }

    #[test]
    fn test_malformed_address_is_dropped() {
        let mut p = processor(100);
        assert!(p.observe(&obs("not-a-mac", -50, Instant::now())).is_none());
        assert_eq!(p.tracked_with_state(), 0);
    }

    #[test]
    fn test_case_variants_share_one_state_entry() {
        let mut p = processor(0);
        let t = Instant::now();
        p.observe(&obs("AA:BB:CC:DD:EE:FF", -60, t)).unwrap();
        p.observe(&obs("aa:bb:cc:dd:ee:ff", -64, t)).unwrap();
        assert_eq!(p.tracked_with_state(), 1);
    }

    #[test]
    fn test_gate_measures_from_last_surfaced_event() {
        let mut p = processor(100);
        let t0 = Instant::now();

        // t=0: first eligible observation always surfaces, ema == raw.
        let first = p.observe(&obs(TRACKED, -60, t0)).unwrap();
        assert!((first.rssi_ema - -60.0).abs() < f32::EPSILON);

        // t=40: gated, but the smoothed value still updates.
        assert!(p
            .observe(&obs(TRACKED, -64, t0 + Duration::from_millis(40)))
            .is_none());
        let id = BeaconId::parse(TRACKED).unwrap();
        assert!((p.smoothed(&id).unwrap() - -61.2).abs() < 1e-4);

        // t=120: 120ms since the last *surfaced* event, so this surfaces
        // carrying the updated smoothed value.
        let third = p
            .observe(&obs(TRACKED, -58, t0 + Duration::from_millis(120)))
            .unwrap();
        assert!((third.rssi_ema - (0.3 * -58.0 + 0.7 * -61.2)).abs() < 1e-4);
    }

    #[test]
    fn test_no_two_surfaced_events_closer_than_interval() {
        let mut p = processor(100);
        let t0 = Instant::now();
        let mut surfaced_at: Vec<Duration> = Vec::new();
        for ms in (0..500).step_by(30) {
            let at = t0 + Duration::from_millis(ms);
            if p.observe(&obs(TRACKED, -60, at)).is_some() {
                surfaced_at.push(Duration::from_millis(ms));
            }
        }
        assert!(!surfaced_at.is_empty());
        for pair in surfaced_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_payload_carries_original_field_names() {
        let mut p = processor(100);
        let event = p.observe(&obs(TRACKED, -60, Instant::now())).unwrap();
        let payload = event.payload("SM1", "192.168.50.21");
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"sensor_id\":\"SM1\""));
        assert!(json.contains("\"beacon_mac\":\"aa:bb:cc:dd:ee:ff\""));
        assert!(json.contains("\"rssi\":-60"));
        assert!(json.contains("\"ip\":\"192.168.50.21\""));
    }
}
