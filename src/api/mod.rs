//! Remote sources of per-child collections.

mod fake;
mod http;
mod source;
mod types;

pub use fake::FakeSource;
pub use http::HttpSource;
pub use source::{Identity, RemoteSource};
pub use types::Child;
