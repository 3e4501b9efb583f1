//! # Fleet Simulator Module
//!
//! Drives the bus with simulated drone telemetry.
//!
//! This module handles:
//! - A per-drone random-walk state (position, speed, heading, battery decay)
//! - Periodic publication of GPS, altitude and battery payloads on the
//!   original topic layout (`drone/<fleet>/<id>/...`)
//! - Producer lifecycle announcements (`status/online`, `status/mode`) at
//!   startup and clean shutdown; with no broker there is no retention or
//!   last-will delivery, so these are plain one-shot publications
//! - Fault injection (drop and duplicate probabilities) so the delivery
//!   statistics have real channel defects to measure on an in-process bus
//!
//! The physics here are deliberately crude; the simulator exists to exercise
//! the ingestion and statistics paths, not to model flight.

use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::bus::Bus;
use crate::config::SimulatorConfig;

/// Mutable simulated drone state
#[derive(Debug, Clone)]
pub struct DroneState {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub spd: f64,
    pub hdg: f64,
    pub battery: f64,
    pub fix: bool,
    pub seq: u64,
}

impl DroneState {
    /// Initial state near the base coordinate (Seoul city hall, as in the
    /// original fleet)
    pub fn new(id: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            id: id.into(),
            lat: 37.5665 + rng.gen_range(-0.01..0.01),
            lon: 126.9780 + rng.gen_range(-0.01..0.01),
            alt: 80.0,
            spd: 7.5,
            hdg: rng.gen_range(0.0..360.0),
            battery: 100.0,
            fix: true,
            seq: 0,
        }
    }

    /// Advance the state by one tick
    ///
    /// Random walk on position and speed, slow monotone battery decay
    /// clamped at zero, and a strictly incrementing sequence number.
    pub fn step(&mut self) {
        let mut rng = rand::thread_rng();
        self.lat += rng.gen_range(-0.00004..0.00004);
        self.lon += rng.gen_range(-0.00004..0.00004);
        self.alt = (self.alt + rng.gen_range(-0.35..0.35)).max(0.0);
        self.spd = (self.spd + rng.gen_range(-0.1..0.1)).max(0.0);
        self.hdg = (self.hdg + rng.gen_range(-2.0..2.0)).rem_euclid(360.0);
        self.battery = (self.battery - 0.03).max(0.0);
        self.seq += 1;
    }

    /// GPS payload (uses the short field names)
    pub fn gps_payload(&self, ts_ms: i64) -> String {
        serde_json::json!({
            "id": self.id,
            "lat": self.lat,
            "lon": self.lon,
            "spd": self.spd,
            "hdg": self.hdg,
            "fix": self.fix,
            "ts": ts_ms,
            "seq": self.seq,
        })
        .to_string()
    }

    /// Altitude payload
    pub fn alt_payload(&self, ts_ms: i64) -> String {
        serde_json::json!({
            "id": self.id,
            "alt": self.alt,
            "ts": ts_ms,
            "seq": self.seq,
        })
        .to_string()
    }

    /// Battery payload (uses the `bat` alias, as the original producer did)
    pub fn battery_payload(&self, ts_ms: i64) -> String {
        serde_json::json!({
            "id": self.id,
            "bat": self.battery,
            "ts": ts_ms,
            "seq": self.seq,
        })
        .to_string()
    }
}

/// Topic set for one drone
#[derive(Debug, Clone)]
pub struct DroneTopics {
    pub gps: String,
    pub alt: String,
    pub battery: String,
    pub online: String,
    pub mode: String,
}

impl DroneTopics {
    pub fn new(fleet: &str, drone_id: &str) -> Self {
        let base = format!("drone/{}/{}", fleet, drone_id);
        Self {
            gps: format!("{}/telemetry/gps", base),
            alt: format!("{}/telemetry/alt", base),
            battery: format!("{}/status/battery", base),
            online: format!("{}/status/online", base),
            mode: format!("{}/status/mode", base),
        }
    }
}

/// One simulated drone publishing onto the bus
#[derive(Debug)]
pub struct DroneSimulator {
    state: DroneState,
    topics: DroneTopics,
    bus: Bus,
    drop_probability: f64,
    duplicate_probability: f64,
}

impl DroneSimulator {
    pub fn new(bus: Bus, config: &SimulatorConfig, drone_id: &str) -> Self {
        Self {
            state: DroneState::new(drone_id),
            topics: DroneTopics::new(&config.fleet, drone_id),
            bus,
            drop_probability: config.drop_probability,
            duplicate_probability: config.duplicate_probability,
        }
    }

    /// Tick at `rate_hz` for `duration_secs`, or until the shutdown token
    /// flips
    ///
    /// Announces the producer as online before the first tick and as
    /// offline after the last one. Each tick advances the state and
    /// publishes the GPS, altitude and battery payloads, subject to fault
    /// injection.
    pub async fn run(mut self, rate_hz: f64, duration_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs_f64(1.0 / rate_hz);
        let mut tick = interval(period);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);

        info!(
            "Simulator {} publishing at {}Hz for {}s",
            self.state.id, rate_hz, duration_secs
        );
        self.announce_online();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if tokio::time::Instant::now() >= deadline {
                        break;
                    }
                    self.tick_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.announce_offline();
        info!(
            "Simulator {} stopped after {} ticks (battery {:.1}%)",
            self.state.id, self.state.seq, self.state.battery
        );
    }

    /// Publish the startup lifecycle state
    fn announce_online(&self) {
        self.bus.publish(self.topics.online.clone(), "online");
        self.bus.publish(self.topics.mode.clone(), "CRUISE");
    }

    /// Publish the clean-shutdown lifecycle state
    ///
    /// Only reachable on an orderly stop; an abnormal termination would be
    /// a broker-side last-will concern, which is out of scope here.
    fn announce_offline(&self) {
        self.bus.publish(self.topics.online.clone(), "offline");
        self.bus.publish(self.topics.mode.clone(), "IDLE");
    }

    fn tick_once(&mut self) {
        self.state.step();
        let ts_ms = Utc::now().timestamp_millis();

        let publishes = [
            (self.topics.gps.clone(), self.state.gps_payload(ts_ms)),
            (self.topics.alt.clone(), self.state.alt_payload(ts_ms)),
            (self.topics.battery.clone(), self.state.battery_payload(ts_ms)),
        ];

        let mut rng = rand::thread_rng();
        for (topic, payload) in publishes {
            if rng.gen::<f64>() < self.drop_probability {
                debug!("Injected drop on {} (seq {})", topic, self.state.seq);
                continue;
            }
            self.bus.publish(topic.clone(), payload.clone());
            if rng.gen::<f64>() < self.duplicate_probability {
                debug!("Injected duplicate on {} (seq {})", topic, self.state.seq);
                self.bus.publish(topic, payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_step_increments_sequence_and_drains_battery() {
        let mut state = DroneState::new("d01");
        let initial_battery = state.battery;

        for _ in 0..10 {
            state.step();
        }

        assert_eq!(state.seq, 10);
        assert!(state.battery < initial_battery);
        assert!(state.battery >= 0.0);
    }

    #[test]
    fn test_battery_never_goes_negative() {
        let mut state = DroneState::new("d01");
        state.battery = 0.02;
        state.step();
        state.step();
        assert_eq!(state.battery, 0.0);
    }

    #[test]
    fn test_heading_stays_in_range() {
        let mut state = DroneState::new("d01");
        for _ in 0..1000 {
            state.step();
            assert!((0.0..360.0).contains(&state.hdg));
        }
    }

    #[test]
    fn test_payloads_decode_through_the_codec() {
        let mut state = DroneState::new("d01");
        state.step();

        let gps = codec::decode(state.gps_payload(1234).as_bytes(), Utc::now());
        assert_eq!(gps.drone_id.as_deref(), Some("d01"));
        assert!(gps.lat.is_some());
        assert!(gps.spd.is_some());
        assert_eq!(gps.fix, Some(true));
        assert_eq!(gps.sent_at_ms, 1234);
        assert_eq!(gps.seq, Some(1));

        // Battery payload exercises the `bat` alias
        let bat = codec::decode(state.battery_payload(1234).as_bytes(), Utc::now());
        assert!(bat.battery.is_some());

        let alt = codec::decode(state.alt_payload(1234).as_bytes(), Utc::now());
        assert!(alt.alt.is_some());
    }

    #[test]
    fn test_topic_layout() {
        let topics = DroneTopics::new("lab", "d07");
        assert_eq!(topics.gps, "drone/lab/d07/telemetry/gps");
        assert_eq!(topics.alt, "drone/lab/d07/telemetry/alt");
        assert_eq!(topics.battery, "drone/lab/d07/status/battery");
        assert_eq!(topics.online, "drone/lab/d07/status/online");
        assert_eq!(topics.mode, "drone/lab/d07/status/mode");
    }

    #[tokio::test]
    async fn test_run_announces_lifecycle_states() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(&["drone/lab/d01/status/online", "drone/lab/d01/status/mode"]);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let config = SimulatorConfig::default();
        let sim = DroneSimulator::new(bus.clone(), &config, "d01");
        // Zero duration: online/mode at start, offline/idle right after
        sim.run(100.0, 0, shutdown_rx).await;

        let mut payloads = Vec::new();
        for _ in 0..4 {
            let msg = sub.recv().await.unwrap();
            payloads.push((msg.topic, String::from_utf8(msg.payload.to_vec()).unwrap()));
        }
        assert_eq!(payloads[0].1, "online");
        assert_eq!(payloads[1].1, "CRUISE");
        assert_eq!(payloads[2].1, "offline");
        assert_eq!(payloads[3].1, "IDLE");
        assert!(payloads[0].0.ends_with("/status/online"));
        assert!(payloads[1].0.ends_with("/status/mode"));
    }

    #[tokio::test]
    async fn test_tick_once_publishes_all_topics() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(&["drone/lab/d01/#"]);

        let config = SimulatorConfig {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            ..Default::default()
        };
        let mut sim = DroneSimulator::new(bus.clone(), &config, "d01");
        sim.tick_once();

        let mut topics = Vec::new();
        for _ in 0..3 {
            topics.push(sub.recv().await.unwrap().topic);
        }
        assert!(topics.iter().any(|t| t.ends_with("/telemetry/gps")));
        assert!(topics.iter().any(|t| t.ends_with("/telemetry/alt")));
        assert!(topics.iter().any(|t| t.ends_with("/status/battery")));
    }

    #[tokio::test]
    async fn test_drop_probability_one_publishes_nothing() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(&["#"]);

        let config = SimulatorConfig {
            drop_probability: 1.0,
            duplicate_probability: 0.0,
            ..Default::default()
        };
        let mut sim = DroneSimulator::new(bus.clone(), &config, "d01");
        sim.tick_once();

        // Nothing queued from the tick: the marker is the first delivery
        bus.publish("marker", &b""[..]);
        assert_eq!(sub.recv().await.unwrap().topic, "marker");
    }
}
