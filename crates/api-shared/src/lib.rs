//! # API Shared
//!
//! Wire types and shared services for the scribe APIs.
//!
//! Contains:
//! - Request/response DTOs with OpenAPI schemas (`dto` module)
//! - `HealthService`
//!
//! Used by `api-rest`; the CLI prints core types directly.

pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
