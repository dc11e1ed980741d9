//! HTTP surface over the document processor.
//!
//! `POST /query` answers a field map for one text, `GET /healthcheck` runs
//! the extractor on a fixed sample.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_server_on, ApiServer};
