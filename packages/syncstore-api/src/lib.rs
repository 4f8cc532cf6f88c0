//! HTTP surface for the sync storage engine.
//!
//! Provides the storage, info and version endpoints, content negotiation,
//! and request routing.

pub mod handlers;
pub mod router;
pub mod server;

pub use router::{AppState, Router, RouterError};
pub use server::Server;
