//! Shared vocabulary for the Arbor directory and resolution layer.
//!
//! Every other crate in the workspace speaks in these ids, this error type,
//! and this configuration tree.

pub mod config;
pub mod error;
pub mod ids;
pub mod trace;

pub use error::{Error, Result};
pub use ids::{AgentId, CorrelationId, DataKey, SessionAddress, SessionKey};
