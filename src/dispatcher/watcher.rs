//! Background filesystem watcher
//!
//! A dedicated thread owns the `notify` watcher for the monitored file's
//! directory and posts a [`ChangeEvent`] for every modification of the file
//! itself. The thread touches no pipeline state.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wake-up token: "the monitored file changed"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent;

enum WatchMessage {
    Fs(notify::Result<Event>),
    Stop,
}

/// Handle to the running watcher thread
pub struct FileWatcher {
    control: std_mpsc::Sender<WatchMessage>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Start watching `path`, posting tokens into `events`.
    ///
    /// Fails if the parent directory cannot be watched.
    pub fn spawn(path: &Path, events: mpsc::UnboundedSender<ChangeEvent>) -> Result<Self> {
        let target = absolute_target(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("monitored file {} has no parent directory", target.display()))?;

        let (control, inbox) = std_mpsc::channel::<WatchMessage>();

        let fs_tx = control.clone();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = fs_tx.send(WatchMessage::Fs(res));
            })
            .context("failed to create filesystem watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch directory {}", dir.display()))?;

        let handle = thread::Builder::new()
            .name("uriwatch-watcher".to_string())
            .spawn(move || watch_loop(watcher, target, inbox, events))
            .context("failed to spawn watcher thread")?;

        info!("Observer started on {}", dir.display());
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Stop the watcher thread and wait for it to exit.
    ///
    /// Once this returns no further token will be posted.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.control.send(WatchMessage::Stop);
        if handle.join().is_err() {
            warn!("Watcher thread panicked");
        }
        info!("Observer stopped");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    watcher: RecommendedWatcher,
    target: PathBuf,
    inbox: std_mpsc::Receiver<WatchMessage>,
    events: mpsc::UnboundedSender<ChangeEvent>,
) {
    while let Ok(message) = inbox.recv() {
        match message {
            WatchMessage::Fs(Ok(event)) => {
                if is_modification_of(&event, &target) && events.send(ChangeEvent).is_err() {
                    debug!("Change queue closed, watcher exiting");
                    break;
                }
            }
            WatchMessage::Fs(Err(e)) => warn!("Filesystem watcher error: {}", e),
            WatchMessage::Stop => break,
        }
    }
    // Dropping the notify watcher stops its own backend thread
    drop(watcher);
}

/// Modify events whose path is exactly the monitored file
pub fn is_modification_of(event: &Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_)) && event.paths.iter().any(|p| p == target)
}

/// Resolve the monitored path the way the watcher reports it: canonical
/// directory joined with the file name.
fn absolute_target(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} does not name a file", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot resolve directory of {}", path.display()))?;
    Ok(dir.join(file_name))
}
