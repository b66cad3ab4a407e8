//! A background worker that harvests structured records from a directory of
//! append-only log files.
//!
//! Streams are discovered from timestamp-named files
//! (`DD-MM-YY_HH-MM-SS_<streamId>.txt`), tailed incrementally with a byte
//! cursor persisted to SQLite across restarts, and matched line by line
//! against ordered sets of named regex patterns. Matched lines become
//! records; old records can be evicted by age.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_harvester::{Config, Harvester, Store};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     let store = Store::open(&config.paths.database).await?;
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     Harvester::new(store, config, shutdown_rx).run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvester;
pub mod patterns;
pub mod scanner;
pub mod store;
pub mod sweeper;
pub mod tailer;

#[cfg(test)]
mod test_helpers;

pub use config::{Config, PatternDef};
pub use error::{Error, Result};
pub use harvester::Harvester;
pub use patterns::{LineMatch, PatternSet};
pub use scanner::StreamSnapshot;
pub use store::{NewRecord, RecordRow, Store, StreamRow};
