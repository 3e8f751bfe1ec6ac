//! Server-side components of the `offload` compute service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI and environment configuration.
//! - [`service`] - HTTP handlers and error mapping.
//! - [`telemetry`] - Console logging and optional OpenTelemetry export.

pub mod config;
pub mod service;
pub mod telemetry;
