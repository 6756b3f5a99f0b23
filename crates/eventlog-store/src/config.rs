//! Store manager configuration. Constructed by the host process (config/CLI
//! loading itself lives outside this crate) and passed into
//! [`crate::manager::StoreManager::new`] — no global statics, explicit
//! constructor injection throughout.

use std::{path::PathBuf, time::Duration};

use eventlog_core::store::StoreConfig;

/// Tuning knobs for the whole store manager.
#[derive(Debug, Clone)]
pub struct StoreManagerConfig {
    /// `format` passed to [`eventlog_core::parser::parse`]; only `"json"`
    /// is currently supported.
    pub message_type: String,
    /// Whether the cluster bridge publishes/ingests.
    pub cluster_mode: bool,
    /// Parallelism of the event-intake worker pool.
    pub handle_message_core_number: usize,
    /// Parallelism of the cluster-inbound worker pool.
    pub handle_sub_message_core_number: usize,
    /// Parallelism of the container-log worker pool.
    pub handle_docker_log_core_number: usize,
    /// Root directory the janitor's log-file GC walks.
    pub log_root: PathBuf,
    /// Janitor tick period. Earlier revisions hard-coded 2 minutes for
    /// local testing while operators expected 24h in production; this
    /// config exposes the interval explicitly and defaults to 24h.
    pub janitor_interval: Duration,
    /// Max age of a log file before the janitor deletes it.
    pub log_file_max_age: Duration,
    /// Per-store tuning, applied identically to all five stores for now.
    pub store: StoreConfig,
}

impl Default for StoreManagerConfig {
    fn default() -> Self {
        Self {
            message_type: "json".to_string(),
            cluster_mode: false,
            handle_message_core_number: 1,
            handle_sub_message_core_number: 1,
            handle_docker_log_core_number: 1,
            log_root: PathBuf::from("/grdata/logs"),
            janitor_interval: Duration::from_secs(24 * 60 * 60),
            log_file_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            store: StoreConfig::default(),
        }
    }
}
