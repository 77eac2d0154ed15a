//! Operator-facing diagnostic log
//!
//! Diagnostics go to a log file rather than the terminal. The default
//! location is under `/var/log`; when that is not writable the file is
//! placed in the user's local data directory instead.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::DiagnosticsConfig;

pub const LOG_FILE_NAME: &str = "uriwatch.log";
const SYSTEM_LOG_DIR: &str = "/var/log";

/// Candidate log files in order of preference
pub fn candidate_paths(config: &DiagnosticsConfig, home: Option<&Path>) -> Vec<PathBuf> {
    if let Some(explicit) = &config.log_file {
        return vec![explicit.clone()];
    }

    let mut paths = vec![Path::new(SYSTEM_LOG_DIR).join(LOG_FILE_NAME)];
    if let Some(home) = home {
        paths.push(home.join(".local/share").join(LOG_FILE_NAME));
    }
    paths
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Open the first writable candidate
pub fn open_log_file(config: &DiagnosticsConfig, home: Option<&Path>) -> Option<(PathBuf, File)> {
    candidate_paths(config, home)
        .into_iter()
        .find_map(|path| open_append(&path).map(|file| (path, file)))
}

/// Install the global subscriber. Falls back to stderr when no log file can
/// be opened. Returns the file in use, if any.
pub fn init(config: &DiagnosticsConfig) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let home = std::env::var_os("HOME").map(PathBuf::from);

    match open_log_file(config, home.as_deref()) {
        Some((path, file)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
            Some(path)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let config = DiagnosticsConfig {
            log_file: Some(PathBuf::from("/srv/uriwatch/diag.log")),
        };
        assert_eq!(
            candidate_paths(&config, Some(Path::new("/home/ops"))),
            vec![PathBuf::from("/srv/uriwatch/diag.log")]
        );
    }

    #[test]
    fn test_default_candidates() {
        let config = DiagnosticsConfig { log_file: None };
        assert_eq!(
            candidate_paths(&config, Some(Path::new("/home/ops"))),
            vec![
                PathBuf::from("/var/log/uriwatch.log"),
                PathBuf::from("/home/ops/.local/share/uriwatch.log"),
            ]
        );
        assert_eq!(candidate_paths(&config, None).len(), 1);
    }

    #[test]
    fn test_open_log_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/diag.log");
        let config = DiagnosticsConfig {
            log_file: Some(target.clone()),
        };

        let (path, _file) = open_log_file(&config, None).unwrap();
        assert_eq!(path, target);
        assert!(target.exists());
    }
}
