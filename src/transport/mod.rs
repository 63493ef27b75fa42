//! Transport layer
//!
//! The harvesting engine consumes an abstract `fetch(url, auth) -> bytes`
//! operation. This module defines that contract, the `reqwest`
//! implementation used by the binary, and the retry policy wrapped around it.

mod fetcher;
mod retry;

pub use fetcher::{build_http_client, AuthContext, HttpTransport, Transport, TransportError};
pub use retry::RetryPolicy;
