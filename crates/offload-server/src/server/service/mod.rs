//! HTTP service: compute handler, error mapping and routes.
//!
//! ## Structure
//!
//! - [`handler`] - `ComputeService`, the bridge between HTTP and the
//!   dispatcher.
//! - [`error`] - `ServiceError` and its status code mapping.
//! - [`routes`] - axum router for `/compute/{n}` and `/health`.

pub mod error;
pub mod handler;
pub mod routes;
