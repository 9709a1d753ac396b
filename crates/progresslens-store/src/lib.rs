//! progresslens-store: record store backends.
//!
//! Implements the `RecordStore` trait over an in-memory dataset and over a
//! JSON snapshot file, and loads the TOML configuration that picks between
//! them.

pub mod config;
pub mod dataset;
pub mod memory;
pub mod snapshot;

pub use config::{create_store, load_config_from, ProgressLensConfig, StoreConfig};
pub use dataset::Dataset;
pub use memory::InMemoryStore;
pub use snapshot::SnapshotStore;
