//! REST backend client
//!
//! Read-only access to the session list, used to seed the telemetry store.
//!
//! # Endpoints
//!
//! - `GET {base}/sessions` - All sessions
//! - `GET {base}/sessions/{id}` - One session

mod client;
mod error;

pub use client::RestClient;
pub use error::ApiError;
