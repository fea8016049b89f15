//! API Module
//!
//! HTTP handlers and routing for the query cache REST API.
//!
//! # Endpoints
//! - `PUT /queries` - Merge fetched data into the cached query
//! - `GET /queries/*key` - Read a cached query
//! - `DELETE /queries/*key` - Drop a cached query
//! - `POST /merge` - Merge records without touching the cache
//! - `POST /snapshot` - Flush the cache to durable storage
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
