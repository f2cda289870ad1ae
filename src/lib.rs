//! Cache-first, stale-while-revalidate fetching of per-child resources.
//!
//! A [`session::Session`] hands out [`store::LoadState`] snapshots for a child's
//! news (and sibling collections). Behind it, a [`fetch::FetchCoordinator`]
//! serves the persisted copy immediately, revalidates against the remote
//! source, retries a bounded number of times and persists fresh results unless
//! the session is simulated.

pub mod api;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod report;
pub mod session;
pub mod store;
