//! Common types used throughout `jobsync`.
//!
//! This crate provides the identity types shared by the real-time core,
//! the REST client and the command-line tool.

mod id;
mod identity;

pub use id::{deserialize_id, deserialize_optional_id};
pub use identity::{ParseRoleError, Role, SessionIdentity};
