//! The Store Manager: intake channels, worker pools, per-stream message
//! stores, cluster bridge glue, and the janitor.
//!
//! [`manager::StoreManager`] is the façade transports talk to. The
//! collaborators it is built from but does not own the implementation of
//! — the durable persistence back-end, the cluster pub/sub transport, and
//! the relational catalog database — are defined as traits in
//! [`eventlog_core::sink`], [`eventlog_core::cluster`], and [`catalog`]
//! respectively.

pub mod catalog;
pub mod chan;
pub mod config;
pub mod janitor;
pub mod manager;

pub use catalog::{CatalogError, CatalogStore, NoopCatalogStore};
pub use chan::SharedReceiver;
pub use config::StoreManagerConfig;
pub use manager::{StoreManager, WsMode};
