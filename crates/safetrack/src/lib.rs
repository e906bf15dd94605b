//! Safety-control assignment, gap analysis, and readiness scoring for workforce compliance.

pub mod compliance;
pub mod config;
pub mod error;
pub mod telemetry;
