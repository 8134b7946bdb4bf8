//! Durable, hot-reloadable alias store with change notifications.
//!
//! The store owns a name -> target mapping persisted as pretty-printed JSON.
//! All reads, mutations, and reloads serialize through one mutex that also
//! covers the persistence write, so a reader never observes a mapping newer
//! than the file and two mutations never interleave their writes. External
//! edits to the backing file are picked up by a debounced directory watcher;
//! the store's own saves are recognized by timestamp and never re-loaded.
//!
//! Each subscriber gets its own channel. Events are emitted under the state
//! lock, so delivery order matches the order operations completed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config;
use crate::error::{CmdbarError, ResultExt};
use crate::watcher::AliasWatcher;

/// Margin beyond the debounce window during which a file event is still
/// attributed to our own save rather than an external edit.
const SELF_WRITE_MARGIN: Duration = Duration::from_millis(150);

// ============================================================================
// Events
// ============================================================================

/// Change notification pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasEvent {
    /// Full snapshot, emitted on initial load and on every reload.
    Loaded { snapshot: BTreeMap<String, String> },
    Added { name: String, target: String },
    Updated { name: String, target: String },
    Removed { name: String },
}

// ============================================================================
// On-disk document
// ============================================================================

/// On-disk document shape: one named collection of alias pairs.
#[derive(Debug, Default, Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

/// Serialize-from-reference twin of [`AliasFile`], avoids cloning the map.
#[derive(Serialize)]
struct AliasFileRef<'a> {
    aliases: &'a BTreeMap<String, String>,
}

/// Read the backing file permissively: missing or unparsable content yields
/// an empty mapping, never an error.
fn read_alias_file(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        info!(path = %path.display(), "Alias file not found, starting empty");
        return BTreeMap::new();
    }

    let content = match std::fs::read_to_string(path).warn_on_err() {
        Some(content) => content,
        None => return BTreeMap::new(),
    };

    match serde_json::from_str::<AliasFile>(&content) {
        Ok(doc) => doc.aliases,
        Err(e) => {
            warn!(
                error = %CmdbarError::MalformedAliases(e),
                path = %path.display(),
                "Unparsable alias file, starting empty"
            );
            BTreeMap::new()
        }
    }
}

// ============================================================================
// Store
// ============================================================================

struct AliasStoreInner {
    path: PathBuf,
    /// Name -> target mapping. Lock covers the persistence write too.
    aliases: Mutex<BTreeMap<String, String>>,
    /// Locked only while `aliases` is held, never the other way around.
    subscribers: Mutex<Vec<std::sync::mpsc::Sender<AliasEvent>>>,
    /// When we last wrote the backing file ourselves.
    last_write: Mutex<Option<Instant>>,
}

impl AliasStoreInner {
    /// Write the full mapping to disk. Called with the alias lock held so a
    /// reader never observes a mapping newer than the file.
    fn persist(&self, aliases: &BTreeMap<String, String>) -> crate::error::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CmdbarError::Persist {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(&AliasFileRef { aliases })?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json).map_err(|e| CmdbarError::Persist {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| CmdbarError::Persist {
            path: self.path.display().to_string(),
            source: e,
        })?;

        *self.last_write.lock() = Some(Instant::now());

        debug!(
            path = %self.path.display(),
            alias_count = aliases.len(),
            bytes = json.len(),
            "Saved aliases (atomic)"
        );
        Ok(())
    }

    /// Send `event` to every live subscriber, pruning closed channels.
    fn emit(&self, event: AliasEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn reload(&self) {
        // The file read happens under the lock: any mutation that completed
        // before we acquired it has already persisted and is in what we
        // read, and one blocked behind us re-persists after.
        let mut aliases = self.aliases.lock();
        *aliases = read_alias_file(&self.path);
        let snapshot = aliases.clone();
        info!(
            path = %self.path.display(),
            alias_count = snapshot.len(),
            "Reloaded aliases from disk"
        );
        self.emit(AliasEvent::Loaded { snapshot });
    }

    fn is_recent_self_write(&self, window: Duration) -> bool {
        let last_write = *self.last_write.lock();
        last_write
            .map(|at| at.elapsed() < window)
            .unwrap_or(false)
    }
}

/// Durable name -> target mapping, safe to share across threads by
/// reference. Holding the store keeps its file watcher alive; dropping it
/// stops the watcher and the reload thread.
pub struct AliasStore {
    inner: Arc<AliasStoreInner>,
    watcher: Option<AliasWatcher>,
    reload_thread: Option<thread::JoinHandle<()>>,
}

impl AliasStore {
    /// Open the store backed by `path` with the default reload debounce.
    ///
    /// Loads the file if present (missing or malformed content yields an
    /// empty mapping), emits an initial [`AliasEvent::Loaded`] on the
    /// returned receiver, and starts watching the file for external changes.
    pub fn open(path: PathBuf) -> (Self, Receiver<AliasEvent>) {
        Self::open_with_debounce(path, Duration::from_millis(config::DEFAULT_DEBOUNCE_MS))
    }

    /// Like [`open`](Self::open) with an explicit debounce window.
    pub fn open_with_debounce(path: PathBuf, debounce: Duration) -> (Self, Receiver<AliasEvent>) {
        let (mut store, events) = Self::open_unwatched(path);
        store.start_watcher(debounce);
        (store, events)
    }

    /// Open without a file watcher. External edits are only picked up via an
    /// explicit [`reload`](Self::reload). Intended for tests and one-shot
    /// tooling.
    pub fn open_unwatched(path: PathBuf) -> (Self, Receiver<AliasEvent>) {
        // The watcher can only register on a directory that exists.
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    error = %e,
                    path = %parent.display(),
                    "Could not create alias directory"
                );
            }
        }

        let aliases = read_alias_file(&path);
        info!(
            path = %path.display(),
            alias_count = aliases.len(),
            "Loaded aliases"
        );

        let store = AliasStore {
            inner: Arc::new(AliasStoreInner {
                path,
                aliases: Mutex::new(aliases),
                subscribers: Mutex::new(Vec::new()),
                last_write: Mutex::new(None),
            }),
            watcher: None,
            reload_thread: None,
        };

        let events = store.subscribe();
        let snapshot = store.snapshot();
        store.inner.emit(AliasEvent::Loaded { snapshot });
        (store, events)
    }

    fn start_watcher(&mut self, debounce: Duration) {
        let (mut watcher, signals) = AliasWatcher::new(self.inner.path.clone(), debounce);
        if watcher
            .start()
            .map_err(|e| CmdbarError::FileWatch(e.to_string()))
            .warn_on_err()
            .is_none()
        {
            // The store still works, it just cannot see external edits.
            return;
        }

        let inner = self.inner.clone();
        let suppress = debounce + SELF_WRITE_MARGIN;
        let handle = thread::spawn(move || {
            // One reload at a time, in signal order.
            for _signal in signals {
                if inner.is_recent_self_write(suppress) {
                    debug!("Ignoring alias file event caused by own save");
                    continue;
                }
                inner.reload();
            }
        });

        self.watcher = Some(watcher);
        self.reload_thread = Some(handle);
    }

    /// Insert or replace `name`, persist, and notify subscribers.
    pub fn add(&self, name: &str, target: &str) {
        let mut aliases = self.inner.aliases.lock();
        aliases.insert(name.to_string(), target.to_string());
        self.inner.persist(&aliases).log_err();
        info!(name = name, target = target, "Alias added");
        self.inner.emit(AliasEvent::Added {
            name: name.to_string(),
            target: target.to_string(),
        });
    }

    /// Change the target of an existing alias. Returns false (no
    /// persistence, no notification) when `name` is absent.
    pub fn update(&self, name: &str, target: &str) -> bool {
        let mut aliases = self.inner.aliases.lock();
        if !aliases.contains_key(name) {
            debug!(name = name, "Update for unknown alias ignored");
            return false;
        }
        aliases.insert(name.to_string(), target.to_string());
        self.inner.persist(&aliases).log_err();
        info!(name = name, target = target, "Alias updated");
        self.inner.emit(AliasEvent::Updated {
            name: name.to_string(),
            target: target.to_string(),
        });
        true
    }

    /// Remove an alias. Returns false (no persistence, no notification)
    /// when `name` is absent.
    pub fn remove(&self, name: &str) -> bool {
        let mut aliases = self.inner.aliases.lock();
        if aliases.remove(name).is_none() {
            debug!(name = name, "Remove for unknown alias ignored");
            return false;
        }
        self.inner.persist(&aliases).log_err();
        info!(name = name, "Alias removed");
        self.inner.emit(AliasEvent::Removed {
            name: name.to_string(),
        });
        true
    }

    /// Look up the target for `name`.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.inner.aliases.lock().get(name).cloned()
    }

    /// Immutable copy of the whole mapping.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.aliases.lock().clone()
    }

    /// All alias names, sorted ascending.
    pub fn names(&self) -> Vec<String> {
        self.inner.aliases.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.aliases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.aliases.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Register a new subscriber. Only events emitted after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> Receiver<AliasEvent> {
        let (tx, rx) = channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Re-read the backing file, replace the mapping wholesale, and notify
    /// subscribers with the fresh snapshot.
    pub fn reload(&self) {
        self.inner.reload();
    }
}

impl Drop for AliasStore {
    fn drop(&mut self) {
        // Stop the watcher first so the signal channel closes and the
        // reload thread can finish.
        drop(self.watcher.take());
        if let Some(handle) = self.reload_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;
    use tempfile::TempDir;

    fn open_in_temp() -> (AliasStore, Receiver<AliasEvent>, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let (store, events) = AliasStore::open_unwatched(dir.path().join("aliases.json"));
        (store, events, dir)
    }

    fn expect_loaded(events: &Receiver<AliasEvent>) -> BTreeMap<String, String> {
        match events.try_recv().expect("initial event") {
            AliasEvent::Loaded { snapshot } => snapshot,
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_load_notification_with_empty_store() {
        let (store, events, _dir) = open_in_temp();
        assert!(expect_loaded(&events).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_resolve_remove_with_exactly_one_notification_each() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        store.add("docs", "C:\\Docs");
        assert_eq!(store.resolve("docs"), Some("C:\\Docs".to_string()));
        assert_eq!(
            events.try_recv().expect("added event"),
            AliasEvent::Added {
                name: "docs".to_string(),
                target: "C:\\Docs".to_string(),
            }
        );

        assert!(store.remove("docs"));
        assert_eq!(store.resolve("docs"), None);
        assert_eq!(
            events.try_recv().expect("removed event"),
            AliasEvent::Removed {
                name: "docs".to_string(),
            }
        );

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_add_is_upsert() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        store.add("docs", "/old");
        store.add("docs", "/new");

        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve("docs"), Some("/new".to_string()));
    }

    #[test]
    fn test_update_present_persists_and_notifies() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        store.add("docs", "/old");
        events.try_recv().expect("added event");

        assert!(store.update("docs", "/new"));
        assert_eq!(store.resolve("docs"), Some("/new".to_string()));
        assert_eq!(
            events.try_recv().expect("updated event"),
            AliasEvent::Updated {
                name: "docs".to_string(),
                target: "/new".to_string(),
            }
        );
    }

    #[test]
    fn test_update_and_remove_absent_are_noops() {
        let (store, events, dir) = open_in_temp();
        expect_loaded(&events);

        assert!(!store.update("ghost", "/nowhere"));
        assert!(!store.remove("ghost"));
        assert!(events.try_recv().is_err());
        // No mutation happened, so nothing was persisted.
        assert!(!dir.path().join("aliases.json").exists());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("aliases.json");

        {
            let (store, _events) = AliasStore::open_unwatched(path.clone());
            store.add("a", "/a");
            store.add("b", "/b");
        }

        let (store, events) = AliasStore::open_unwatched(path.clone());
        let snapshot = expect_loaded(&events);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.resolve("a"), Some("/a".to_string()));
        assert_eq!(store.resolve("b"), Some("/b".to_string()));

        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.contains("\"aliases\""));
    }

    #[test]
    fn test_malformed_file_yields_empty_store_then_recovers() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("aliases.json");
        std::fs::write(&path, "not json at all").expect("write");

        let (store, events) = AliasStore::open_unwatched(path.clone());
        assert!(expect_loaded(&events).is_empty());
        assert!(store.is_empty());

        // The next mutation rewrites a valid document.
        store.add("docs", "/docs");
        let content = std::fs::read_to_string(&path).expect("read");
        let parsed: serde_json::Value = serde_json::from_str(&content).expect("valid json");
        assert_eq!(parsed["aliases"]["docs"], "/docs");
    }

    #[test]
    fn test_concurrent_adds_both_persist() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        thread::scope(|s| {
            s.spawn(|| store.add("left", "/left"));
            s.spawn(|| store.add("right", "/right"));
        });

        assert_eq!(store.resolve("left"), Some("/left".to_string()));
        assert_eq!(store.resolve("right"), Some("/right".to_string()));

        // Both survive a reopen from disk, so neither write was lost.
        let (reopened, _events) = AliasStore::open_unwatched(store.path().to_path_buf());
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let (store, events, dir) = open_in_temp();
        expect_loaded(&events);

        std::fs::write(
            dir.path().join("aliases.json"),
            r#"{"aliases":{"ext":"/ext"}}"#,
        )
        .expect("write");

        store.reload();
        assert_eq!(store.resolve("ext"), Some("/ext".to_string()));

        let snapshot = expect_loaded(&events);
        assert_eq!(snapshot.get("ext"), Some(&"/ext".to_string()));
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        let before = store.snapshot();
        store.add("late", "/late");
        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_subscriber_only_sees_later_events() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        store.add("early", "/early");
        let second = store.subscribe();
        store.add("late", "/late");

        assert_eq!(
            second.try_recv().expect("event"),
            AliasEvent::Added {
                name: "late".to_string(),
                target: "/late".to_string(),
            }
        );
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_names_sorted_ascending() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        store.add("zeta", "/z");
        store.add("alpha", "/a");
        assert_eq!(store.names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_external_change_triggers_reload_notification() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("aliases.json");

        let (store, events) =
            AliasStore::open_with_debounce(path.clone(), Duration::from_millis(30));
        expect_loaded(&events);

        // Give the watch registration a moment to land.
        thread::sleep(Duration::from_millis(300));
        std::fs::write(&path, r#"{"aliases":{"ext":"/ext"}}"#).expect("write");

        match events.recv_timeout(Duration::from_secs(5)).expect("reload") {
            AliasEvent::Loaded { snapshot } => {
                assert_eq!(snapshot.get("ext"), Some(&"/ext".to_string()));
            }
            other => panic!("expected Loaded, got {:?}", other),
        }
        assert_eq!(store.resolve("ext"), Some("/ext".to_string()));
    }

    #[test]
    fn test_own_save_does_not_trigger_reload() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("aliases.json");

        let (store, events) =
            AliasStore::open_with_debounce(path, Duration::from_millis(100));
        expect_loaded(&events);

        thread::sleep(Duration::from_millis(300));
        store.add("docs", "/docs");
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)).expect("added"),
            AliasEvent::Added {
                name: "docs".to_string(),
                target: "/docs".to_string(),
            }
        );

        // The watcher sees our own write but the store must not re-load it.
        match events.recv_timeout(Duration::from_millis(600)) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(event) => panic!("unexpected event after own save: {:?}", event),
            Err(e) => panic!("channel error: {:?}", e),
        }
    }

    #[test]
    fn test_adds_survive_concurrent_reload() {
        let (store, events, _dir) = open_in_temp();
        expect_loaded(&events);

        let store = &store;
        thread::scope(|s| {
            for t in 0..2 {
                s.spawn(move || {
                    for i in 0..25 {
                        store.add(&format!("name-{t}-{i:02}"), "/target");
                    }
                });
            }
            s.spawn(move || {
                for _ in 0..50 {
                    store.reload();
                }
            });
        });

        // Disk is the source of truth once the threads are done.
        store.reload();
        assert_eq!(store.len(), 50);
        for t in 0..2 {
            for i in 0..25 {
                let name = format!("name-{t}-{i:02}");
                assert_eq!(
                    store.resolve(&name).as_deref(),
                    Some("/target"),
                    "missing {name}"
                );
            }
        }
    }

    #[test]
    fn test_open_creates_missing_data_dir_and_watches_it() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("fresh").join("aliases.json");

        let (store, events) =
            AliasStore::open_with_debounce(path.clone(), Duration::from_millis(30));
        expect_loaded(&events);
        assert!(path.parent().expect("parent").exists());

        // Give the watch registration a moment to land.
        thread::sleep(Duration::from_millis(300));
        std::fs::write(&path, r#"{"aliases":{"ext":"/ext"}}"#).expect("write");

        match events.recv_timeout(Duration::from_secs(5)).expect("reload") {
            AliasEvent::Loaded { snapshot } => {
                assert_eq!(snapshot.get("ext"), Some(&"/ext".to_string()));
            }
            other => panic!("expected Loaded, got {:?}", other),
        }
        assert_eq!(store.resolve("ext"), Some("/ext".to_string()));
    }
}
