//! File-based tenant store for RedDisc
//!
//! This crate implements the `ConfigStore` trait over a single YAML, TOML or
//! JSON file holding the tenant map and a `last_modified` stamp.
//!
//! # Example
//! ```no_run
//! # use reddisc_config_file::FileConfigStore;
//! # use reddisc_core::ConfigStore;
//! # async fn example() -> reddisc_core::Result<()> {
//! let store = FileConfigStore::new("~/.reddisc/tenants.yaml").await?;
//! let snapshot = store.read_all().await?;
//! # Ok(())
//! # }
//! ```

mod file_store;

pub use file_store::FileConfigStore;
