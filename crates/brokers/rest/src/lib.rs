//! REST broker adapter.
//!
//! Talks to the remote broker's HTTP API. Production and sandbox expose the
//! same report operations under different scopes; the active credential
//! decides which one a client is bound to.

pub mod client;

pub use client::{RestBroker, RestBrokerConfig, RestBrokerFactory};
