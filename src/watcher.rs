use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

/// How often the watch loop wakes up to check for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Signal emitted when the alias file changes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasFileEvent {
    Changed,
}

/// Watches the alias file's parent directory and emits a debounced
/// [`AliasFileEvent::Changed`] when that specific file is created, modified,
/// or removed. Bursts of filesystem events within the debounce window
/// collapse into one signal.
pub struct AliasWatcher {
    path: PathBuf,
    debounce: Duration,
    tx: Option<Sender<AliasFileEvent>>,
    shutdown: Arc<AtomicBool>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl AliasWatcher {
    /// Create a new AliasWatcher for `path`.
    ///
    /// Returns a tuple of (watcher, receiver) where receiver will emit
    /// [`AliasFileEvent`] values once [`start`](Self::start) is called.
    pub fn new(path: PathBuf, debounce: Duration) -> (Self, Receiver<AliasFileEvent>) {
        let (tx, rx) = channel();
        let watcher = AliasWatcher {
            path,
            debounce,
            tx: Some(tx),
            shutdown: Arc::new(AtomicBool::new(false)),
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Start watching the alias file for changes.
    ///
    /// Spawns a background thread that watches the file's parent directory
    /// and sends change signals through the receiver. Calling `start` a
    /// second time fails.
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;

        let path = self.path.clone();
        let debounce = self.debounce;
        let shutdown = self.shutdown.clone();
        let thread_handle = thread::spawn(move || {
            if let Err(e) = Self::watch_loop(path, debounce, shutdown, tx) {
                warn!(error = %e, watcher = "aliases", "Alias watcher error");
            }
        });

        self.watcher_thread = Some(thread_handle);
        Ok(())
    }

    /// Internal watch loop running in background thread
    fn watch_loop(
        path: PathBuf,
        debounce: Duration,
        shutdown: Arc<AtomicBool>,
        tx: Sender<AliasFileEvent>,
    ) -> NotifyResult<()> {
        // Watch the containing directory so the file can appear and vanish.
        let watch_path = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().map(|n| n.to_os_string());

        // Debounce flag shared with the one-shot delay threads.
        let debounce_active = Arc::new(Mutex::new(false));

        // Channel for the file watcher thread
        let (watch_tx, watch_rx) = channel();

        // Create the watcher with a callback
        let mut watcher: Box<dyn Watcher> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let _ = watch_tx.send(res);
            },
        )?);

        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;

        info!(
            path = %watch_path.display(),
            target = ?file_name,
            debounce_ms = debounce.as_millis() as u64,
            "Alias watcher started"
        );

        loop {
            match watch_rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(Ok(event)) => {
                    // Only events touching the alias file itself matter.
                    let is_alias_change = event.paths.iter().any(|p: &PathBuf| {
                        p.file_name()
                            .map(|name| Some(name) == file_name.as_deref())
                            .unwrap_or(false)
                    });

                    // Renames surface as modify or remove/create pairs.
                    let is_relevant_event = matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    );

                    if is_alias_change && is_relevant_event {
                        let mut flag = debounce_active.lock().unwrap();
                        if !*flag {
                            *flag = true;
                            drop(flag); // Release lock before spawning thread

                            let tx_clone = tx.clone();
                            let debounce_flag = debounce_active.clone();

                            // Spawn debounce thread
                            thread::spawn(move || {
                                thread::sleep(debounce);
                                let _ = tx_clone.send(AliasFileEvent::Changed);
                                let mut flag = debounce_flag.lock().unwrap();
                                *flag = false;
                                info!(
                                    watcher = "aliases",
                                    "Alias file changed, emitting reload signal"
                                );
                            });
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, watcher = "aliases", "File watcher error");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!(watcher = "aliases", "Alias watcher shutting down");
                    break;
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                info!(watcher = "aliases", "Alias watcher shutting down");
                break;
            }
        }

        Ok(())
    }
}

impl Drop for AliasWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watcher_thread.take() {
            let _ = handle.join();
        }
    }
}
