//! Mirrors a srad.jp user's journal as quoted replies on another account.
//!
//! A run scrapes a public proxy list, fetches the poster's and the target's
//! journal feeds through those proxies, works out which target entries are new
//! from markers in the poster's own feed, and reposts them oldest first through
//! a headless browser, failing over to the next proxy when a session times out.

pub mod browser;
pub mod config;
pub mod feed;
pub mod lock;
pub mod pipeline;
pub mod posting;
pub mod proxy;
pub mod snapshot;
pub mod util;

pub use config::{Config, ConfigError};
pub use pipeline::{run, Pipeline, RunError, RunSummary};
