//! HTTP endpoint implementations for storage, info and version routes.

pub mod info_handlers;
pub mod negotiation;
pub mod request_utils;
pub mod response;
pub mod storage_handlers;

pub use info_handlers::*;
pub use response::*;
pub use storage_handlers::*;
