//! Payment-gated JSON-RPC proxy implementing the x402 `exact` payment scheme over
//! `eip155` chains, with credit-token-backed bearer authentication for repeat calls.

pub mod advertisement;
pub mod config;
pub mod counter_store;
pub mod error;
pub mod facilitator;
pub mod middleware;
pub mod network;
pub mod proxy;
pub mod sig_down;
pub mod telemetry;
pub mod token_manager;
pub mod types;
