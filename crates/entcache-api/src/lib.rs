//! Transport layer for the entcache workspace.
//!
//! - **[`RequestDescriptor`]** turns a logical cache operation (list, get,
//!   create, update, delete, react) into method, path, query, and body.
//! - **[`Transport`]** is the seam the cache consumes: given a descriptor,
//!   produce a raw JSON payload or an [`Error`].
//! - **[`HttpTransport`]** implements it over `reqwest` with bearer-token
//!   auth and structured error mapping.

pub mod error;
pub mod http;
pub mod request;
pub mod transport;

pub use error::Error;
pub use http::HttpTransport;
pub use request::{Filters, Method, RequestDescriptor};
pub use transport::{TlsMode, Transport, TransportConfig};
