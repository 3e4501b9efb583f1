//! # Drone Ingest Library
//!
//! Ingest periodic telemetry from simulated drones over an in-process
//! publish/subscribe bus.
//!
//! This library provides the core functionality for decoding and validating
//! telemetry records, persisting them to minute-bucketed CSV files under a
//! bounded file budget, and collecting per-topic delivery-quality statistics
//! (duplicates, gaps, loss) on a parallel subscription path.

pub mod config;
pub mod error;
pub mod bus;
pub mod codec;
pub mod ingest;
pub mod stats;
pub mod sim;
