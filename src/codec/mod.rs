//! # Telemetry Codec Module
//!
//! Decodes inbound telemetry payloads into [`TelemetryRecord`]s.
//!
//! This module handles:
//! - Tolerant JSON decoding (a malformed payload yields an empty record,
//!   never an error)
//! - Field-name aliasing (e.g. `lat`/`latitude`, `battery`/`bat`/`battery_level`)
//! - Send-time substitution when the producer supplied no timestamp
//! - Fixed-column CSV row rendering for the persistence path

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Candidate keys per logical field, in lookup order. First present
/// non-null value wins.
const KEYS_ID: &[&str] = &["id"];
const KEYS_LAT: &[&str] = &["lat", "latitude"];
const KEYS_LON: &[&str] = &["lon", "longitude"];
const KEYS_ALT: &[&str] = &["alt", "altitude"];
const KEYS_SPD: &[&str] = &["spd", "speed"];
const KEYS_HDG: &[&str] = &["hdg", "heading"];
const KEYS_FIX: &[&str] = &["fix", "gps_fix"];
const KEYS_BATTERY: &[&str] = &["battery", "bat", "battery_level"];
const KEYS_TS: &[&str] = &["ts", "timestamp"];
const KEYS_SEQ: &[&str] = &["seq"];

/// CSV header row for persisted telemetry buckets
pub const CSV_HEADER: &str = "ts_iso,ts_ms,lat,lon,alt,spd,hdg,battery,fix";

/// One decoded telemetry observation
///
/// Constructed once per inbound message by [`decode`] and immutable
/// thereafter. Missing optional fields mean "unknown", not zero; downstream
/// consumers must preserve that distinction (empty CSV cells, no defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Wall-clock instant the message was received
    pub received_at: DateTime<Utc>,

    /// Producer-supplied send instant in epoch milliseconds; receipt time
    /// substituted when absent
    pub sent_at_ms: i64,

    /// Producer identifier
    pub drone_id: Option<String>,

    /// Latitude in degrees
    pub lat: Option<f64>,

    /// Longitude in degrees
    pub lon: Option<f64>,

    /// Altitude in meters
    pub alt: Option<f64>,

    /// Ground speed in m/s
    pub spd: Option<f64>,

    /// Heading in degrees
    pub hdg: Option<f64>,

    /// Battery level in percent (domain-validated downstream)
    pub battery: Option<f64>,

    /// GPS fix flag
    pub fix: Option<bool>,

    /// Producer-assigned sequence number
    pub seq: Option<u64>,
}

impl TelemetryRecord {
    /// Render the record as one CSV row in the fixed column order
    /// `[ts_iso, ts_ms, lat, lon, alt, spd, hdg, battery, fix]`
    ///
    /// Absent fields render as empty cells so that "unknown" never reads
    /// back as zero.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.received_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.sent_at_ms,
            fmt_f64(self.lat),
            fmt_f64(self.lon),
            fmt_f64(self.alt),
            fmt_f64(self.spd),
            fmt_f64(self.hdg),
            fmt_f64(self.battery),
            fmt_bool(self.fix),
        )
    }
}

/// Decode a transport payload into a [`TelemetryRecord`]
///
/// Never fails: an undecodable payload is treated as carrying zero usable
/// fields, so the caller always receives a record (which the validator will
/// then reject for its missing battery value).
///
/// # Arguments
///
/// * `payload` - Raw message bytes (expected UTF-8 JSON object)
/// * `received_at` - Wall-clock receipt instant, substituted as send time
///   when the payload carries no `ts`/`timestamp` field
pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> TelemetryRecord {
    let obj = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let sent_at_ms = pick_i64(&obj, KEYS_TS).unwrap_or_else(|| received_at.timestamp_millis());

    TelemetryRecord {
        received_at,
        sent_at_ms,
        drone_id: pick_string(&obj, KEYS_ID),
        lat: pick_f64(&obj, KEYS_LAT),
        lon: pick_f64(&obj, KEYS_LON),
        alt: pick_f64(&obj, KEYS_ALT),
        spd: pick_f64(&obj, KEYS_SPD),
        hdg: pick_f64(&obj, KEYS_HDG),
        battery: pick_f64(&obj, KEYS_BATTERY),
        fix: pick_bool(&obj, KEYS_FIX),
        seq: pick_u64(&obj, KEYS_SEQ),
    }
}

/// Extract only the sequence number from a payload
///
/// Used by the statistics path, which needs nothing else from the message
/// and must tolerate payloads the validator would reject.
pub fn decode_sequence(payload: &[u8]) -> Option<u64> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => pick_u64(&map, KEYS_SEQ),
        _ => None,
    }
}

/// First present non-null value among the candidate keys
fn pick<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn pick_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match pick(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        // Producers occasionally stringify numbers; accept those too
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn pick_i64(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    // Timestamps may arrive as fractional epoch values; truncate
    pick_f64(obj, keys).map(|v| v as i64)
}

fn pick_u64(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    match pick(obj, keys)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn pick_bool(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    match pick(obj, keys)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

fn pick_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match pick(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn fmt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_bool(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
