//! Single-flight admission for PDF extraction and the watchdog that backs it.
//!
//! The inference backend runs one extraction at a time. [`ExtractionGate`] turns
//! concurrent requests away instead of queueing them, and [`ExtractionWatchdog`]
//! escalates to the process supervisor if the gate stays closed for too long.
//!
//! Admission is per process. Several gateway instances behind a load balancer each
//! admit their own extraction.

pub mod gate;
pub mod watchdog;

pub use gate::{AdmissionError, ExtractionGate, ExtractionPermit};
pub use watchdog::{ExtractionStatus, ExtractionWatchdog, FatalError, WatchdogConfig};
