//! Arbor gateway: configuration, bootstrap and the HTTP surface over the
//! resolvers and the session directory.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod inbox;
pub mod state;
