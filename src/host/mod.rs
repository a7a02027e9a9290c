//! Service Transport
//!
//! Implements the client side of communicating with the orchestration
//! service: the abstract transport contract and its HTTP implementation.

pub mod http;
pub mod transport;

pub use http::{HttpConfig, HttpTransport};
pub use transport::{Method, Transport, TransportError};
