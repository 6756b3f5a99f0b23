//! Two periodic background tasks: log-file GC under a root directory, and
//! catalog-row GC via the external relational database. Each is its own
//! long-lived task with its own timer, observing the shared shutdown
//! signal between ticks.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{Local, NaiveDate};
use tokio::sync::watch;

use crate::catalog::CatalogStore;

/// File name always preserved, regardless of age.
const PRESERVED_FILENAME: &str = "stdout.log";

/// Parse a log file's stem as `YYYY-M-D` (single-digit month/day allowed,
/// local calendar date).
#[must_use]
pub fn parse_log_date(filename: &str) -> Option<NaiveDate> {
    let stem = filename.strip_suffix(".log")?;
    NaiveDate::parse_from_str(stem, "%Y-%-m-%-d").ok()
}

/// Whether `filename` should be deleted given `today` and `max_age`.
/// `stdout.log` is never deleted.
#[must_use]
pub fn should_delete(filename: &str, today: NaiveDate, max_age: Duration) -> bool {
    if filename == PRESERVED_FILENAME {
        return false;
    }
    let Some(date) = parse_log_date(filename) else {
        return false;
    };
    let age_days = (today - date).num_days();
    if age_days < 0 {
        return false;
    }
    age_days as u64 * 24 * 60 * 60 > max_age.as_secs()
}

/// Recursively walk `root`, deleting expired log files. Missing files or
/// directories are not an error — they simply contribute nothing to the
/// walk.
pub async fn sweep_log_files(root: &Path, max_age: Duration) {
    let today = Local::now().date_naive();
    sweep_dir(root, today, max_age).await;
}

async fn sweep_dir(dir: &Path, today: NaiveDate, max_age: Duration) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "janitor: could not read directory");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "janitor: directory iteration failed");
                break;
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            Box::pin(sweep_dir(&path, today, max_age)).await;
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if should_delete(name, today, max_age) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(file = %path.display(), "janitor: deleted expired log file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "janitor: failed to delete log file");
                }
            }
        }
    }
}

/// Spawn the log-file GC task. Exits promptly when `shutdown` fires.
pub fn spawn_log_file_gc(
    root: std::path::PathBuf,
    interval: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        sweep_log_files(&root, max_age).await;
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // consume the immediate first tick, we just swept
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = timer.tick() => {
                    sweep_log_files(&root, max_age).await;
                }
            }
        }
    })
}

/// Spawn the catalog-row GC task. Exits promptly when `shutdown` fires.
/// Query failures are logged; the next tick re-attempts.
pub fn spawn_catalog_gc(
    catalog: Arc<dyn CatalogStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = catalog.delete_service_event_log().await {
            tracing::warn!(error = %e, "janitor: catalog row GC failed");
        }
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // consume the immediate first tick, we just swept
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = timer.tick() => {
                    if let Err(e) = catalog.delete_service_event_log().await {
                        tracing::warn!(error = %e, "janitor: catalog row GC failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_log_always_preserved() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(!should_delete(
            "stdout.log",
            today,
            Duration::from_secs(7 * 24 * 60 * 60)
        ));
    }

    #[test]
    fn deletes_files_older_than_max_age() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(should_delete(
            "2020-1-2.log",
            today,
            Duration::from_secs(7 * 24 * 60 * 60)
        ));
    }

    #[test]
    fn keeps_files_within_max_age() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert!(!should_delete(
            "2025-1-1.log",
            today,
            Duration::from_secs(7 * 24 * 60 * 60)
        ));
    }

    #[test]
    fn parses_single_digit_month_and_day() {
        assert_eq!(
            parse_log_date("2020-1-2.log"),
            NaiveDate::from_ymd_opt(2020, 1, 2)
        );
    }

    #[test]
    fn non_log_filenames_are_not_deleted() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(!should_delete(
            "readme.txt",
            today,
            Duration::from_secs(7 * 24 * 60 * 60)
        ));
    }

    #[tokio::test]
    async fn sweep_missing_root_is_not_an_error() {
        sweep_log_files(Path::new("/nonexistent/path/xyz"), Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn sweep_deletes_expired_and_preserves_stdout() {
        let dir = tempdir();
        tokio::fs::write(dir.join("stdout.log"), b"x").await.unwrap();
        tokio::fs::write(dir.join("2020-1-2.log"), b"x").await.unwrap();
        sweep_log_files(&dir, Duration::from_secs(7 * 24 * 60 * 60)).await;
        assert!(tokio::fs::metadata(dir.join("stdout.log")).await.is_ok());
        assert!(tokio::fs::metadata(dir.join("2020-1-2.log")).await.is_err());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "eventlog-janitor-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
