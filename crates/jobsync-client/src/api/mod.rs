//! # Portal REST API
//!
//! HTTP client for the conversation and notification endpoints the
//! real-time layer depends on.

mod client;
mod error;

pub use client::PortalClient;
pub use error::{ApiError, ApiResult};
