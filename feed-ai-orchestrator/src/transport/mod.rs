//! Transport abstraction layer.
//!
//! Provides a trait-based request executor for the AI backend group:
//! - HTTP over reqwest, bound to the configured base URL
//! - Mock transport for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpTransport;
pub use mock::MockTransport;
pub use traits::{Method, RawPayload, Transport, TransportError, TransportRequest};
