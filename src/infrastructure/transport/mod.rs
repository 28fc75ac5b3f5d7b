//! Transport adapters for downloading image bytes.

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};
