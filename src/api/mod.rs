//! API Module
//!
//! HTTP handlers and routing.
//!
//! # Endpoints
//! - `GET /proxy?url=` - Relay upstream media through the cache
//! - `DELETE /cache/:namespace` - Invalidate a cached entry
//! - `GET /stats` - Coordinator and backend statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
