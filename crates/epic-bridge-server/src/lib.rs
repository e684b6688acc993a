//! # epic-bridge-server
//!
//! HTTP bridge between internal callers and Epic's FHIR APIs. Each inbound
//! route authenticates with SMART Backend Services (see
//! [`epic_bridge_auth`]), makes one FHIR call and answers with a uniform
//! `{success, message, ...}` envelope.

pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod observability;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, EpicBridgeServer, ServerBuilder, build_app};
