//! # Record Validator
//!
//! Domain validation for decoded telemetry records.
//!
//! Validation is a pure classification: the only domain constraint is the
//! battery level, which must be present and within [0, 100] inclusive. All
//! other fields are optional and pass through unvalidated. Rejections affect
//! persistence only; the statistics path is independent of validation.

use crate::codec::TelemetryRecord;

/// Why a record was rejected from persistence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Battery field absent or non-numeric (the codec yields "absent" for
    /// unparseable values)
    MissingBattery,

    /// Battery value outside [0, 100]
    BatteryOutOfRange(f64),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBattery => write!(f, "battery missing or non-numeric"),
            Self::BatteryOutOfRange(v) => write!(f, "battery {} outside [0, 100]", v),
        }
    }
}

/// Accept or reject a record against the domain constraints
///
/// # Returns
///
/// * `Ok(())` - record may be persisted
/// * `Err(RejectReason)` - record must be dropped from persistence (the
///   caller logs the offending value)
pub fn validate(record: &TelemetryRecord) -> Result<(), RejectReason> {
    match record.battery {
        None => Err(RejectReason::MissingBattery),
        Some(v) if !(0.0..=100.0).contains(&v) => Err(RejectReason::BatteryOutOfRange(v)),
        Some(_) => Ok(()),
    }
}
