//! Live-reload state: client registry, watched files and change debouncing.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::livereload::protocol::{ClientCommand, ServerCommand};
use crate::observability::metrics;

/// Live-reload connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, no handshake yet.
    Connecting,
    /// Server `hello` sent; receives broadcasts.
    Open,
    /// Socket gone.
    Closed,
}

/// One browser connected over WebSocket.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: Uuid,
    pub protocols: Vec<String>,
    pub url: Option<String>,
    pub state: ConnectionState,
    tx: mpsc::UnboundedSender<ServerCommand>,
}

#[derive(Debug)]
struct PendingRequest {
    source: String,
    files: Vec<PathBuf>,
}

/// Live-reload hub shared by the HTTP handlers and the file watcher.
pub struct LiveReload {
    clients: DashMap<Uuid, ClientConnection>,
    /// File on disk → source paths the browser should reload.
    mapping: DashMap<PathBuf, BTreeSet<String>>,
    /// Files read so far, per in-flight request id.
    pending: DashMap<String, PendingRequest>,
    watched_dirs: Mutex<HashSet<PathBuf>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    raw_tx: mpsc::UnboundedSender<PathBuf>,
    raw_rx: Mutex<Option<mpsc::UnboundedReceiver<PathBuf>>>,
    changed_tx: broadcast::Sender<Vec<PathBuf>>,
    debounce: Duration,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveReload {
    pub fn new(debounce: Duration) -> Arc<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (changed_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            clients: DashMap::new(),
            mapping: DashMap::new(),
            pending: DashMap::new(),
            watched_dirs: Mutex::new(HashSet::new()),
            watcher: Mutex::new(None),
            raw_tx,
            raw_rx: Mutex::new(Some(raw_rx)),
            changed_tx,
            debounce,
            debounce_task: Mutex::new(None),
        })
    }

    /// Start the filesystem watcher and the debounce task.
    pub fn start(self: &Arc<Self>) -> Result<(), notify::Error> {
        let Some(rx) = lock(&self.raw_rx).take() else {
            tracing::debug!("Live reload already started");
            return Ok(());
        };

        let tx = self.raw_tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;
        *lock(&self.watcher) = Some(watcher);

        // Directories registered before start.
        let dirs: Vec<PathBuf> = lock(&self.watched_dirs).drain().collect();
        for dir in dirs {
            self.watch_dir(&dir);
        }

        let task = tokio::spawn(debounce_loop(Arc::downgrade(self), rx, self.debounce));
        *lock(&self.debounce_task) = Some(task);

        tracing::info!(debounce_ms = self.debounce.as_millis() as u64, "Live reload started");
        Ok(())
    }

    /// Stop watching and drop every client connection.
    pub fn stop(&self) {
        lock(&self.watcher).take();
        if let Some(task) = lock(&self.debounce_task).take() {
            task.abort();
        }
        let count = self.clients.len();
        self.clients.clear();
        metrics::record_live_clients(0);
        tracing::info!(clients = count, "Live reload stopped");
    }

    /// Register a new socket. It stays `Connecting` until it says hello.
    pub fn connect(&self, tx: mpsc::UnboundedSender<ServerCommand>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(
            id,
            ClientConnection {
                id,
                protocols: Vec::new(),
                url: None,
                state: ConnectionState::Connecting,
                tx,
            },
        );
        tracing::debug!(session = %id, "Live reload client connected");
        id
    }

    /// Handle a text frame from a client.
    pub fn handle_message(&self, id: Uuid, text: &str) {
        let command = match serde_json::from_str::<ClientCommand>(text) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "Ignoring live reload message");
                return;
            }
        };
        let Some(mut client) = self.clients.get_mut(&id) else {
            return;
        };
        match command {
            ClientCommand::Hello { protocols } => {
                client.protocols = protocols;
                if client.tx.send(ServerCommand::hello()).is_ok() {
                    client.state = ConnectionState::Open;
                    tracing::debug!(session = %id, "Live reload handshake complete");
                }
            }
            ClientCommand::Info { url, .. } => {
                tracing::debug!(session = %id, url = ?url, "Live reload client info");
                if url.is_some() {
                    client.url = url;
                }
            }
        }
        drop(client);
        metrics::record_live_clients(self.open_clients());
    }

    /// Forget a client after its socket closed.
    pub fn disconnect(&self, id: Uuid) {
        if let Some((_, mut client)) = self.clients.remove(&id) {
            client.state = ConnectionState::Closed;
            tracing::debug!(session = %id, url = ?client.url, "Live reload client closed");
        }
        metrics::record_live_clients(self.open_clients());
    }

    /// State of a connection, `Closed` if unknown.
    pub fn client_state(&self, id: Uuid) -> ConnectionState {
        self.clients
            .get(&id)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Last URL reported by a client via `info`.
    pub fn client_url(&self, id: Uuid) -> Option<String> {
        self.clients.get(&id).and_then(|c| c.url.clone())
    }

    pub fn open_clients(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| c.state == ConnectionState::Open)
            .count()
    }

    /// Open a bucket collecting the files read while serving `request_id`.
    pub fn start_request(&self, request_id: &str, source_path: &str) {
        self.pending.insert(
            request_id.to_string(),
            PendingRequest {
                source: source_path.to_string(),
                files: Vec::new(),
            },
        );
    }

    /// Open a bucket that is closed when the returned guard drops, even if
    /// the request is cancelled half way.
    pub fn track_request(&self, request_id: &str, source_path: &str) -> TrackedRequest<'_> {
        self.start_request(request_id, source_path);
        TrackedRequest {
            hub: self,
            request_id: request_id.to_string(),
        }
    }

    /// Requests with an open file bucket.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Record that serving `request_id` read `file`.
    pub fn register_file(&self, request_id: &str, file: &Path) {
        match self.pending.get_mut(request_id) {
            Some(mut bucket) => bucket.files.push(file.to_path_buf()),
            None => tracing::debug!(request_id = %request_id, file = ?file, "No pending live reload request"),
        }
    }

    /// Close the bucket: watch its files and map them to the request's source.
    pub fn end_request(&self, request_id: &str) {
        let Some((_, bucket)) = self.pending.remove(request_id) else {
            return;
        };
        for file in bucket.files {
            let file = canonical(&file);
            if let Some(dir) = file.parent() {
                self.watch_dir(dir);
            }
            self.mapping
                .entry(file)
                .or_default()
                .insert(bucket.source.clone());
        }
    }

    /// Feed a raw change event, as the filesystem watcher does.
    pub fn report_change(&self, path: PathBuf) {
        let _ = self.raw_tx.send(path);
    }

    /// Receive the debounced list of changed files.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Vec<PathBuf>> {
        self.changed_tx.subscribe()
    }

    /// Source paths affected by `files`, deduplicated and sorted.
    pub fn sources_for(&self, files: &[PathBuf]) -> Vec<String> {
        let mut sources = BTreeSet::new();
        for file in files {
            if let Some(mapped) = self.mapping.get(&canonical(file)) {
                sources.extend(mapped.iter().cloned());
            }
        }
        sources.into_iter().collect()
    }

    /// Push an alert to every open client.
    pub fn alert(&self, message: impl Into<String>) -> usize {
        self.broadcast(ServerCommand::alert(message))
    }

    /// Send `command` to every open client, dropping dead ones.
    pub fn broadcast(&self, command: ServerCommand) -> usize {
        let mut sent = 0;
        let mut dead = Vec::new();
        for client in self.clients.iter() {
            if client.state != ConnectionState::Open {
                continue;
            }
            if client.tx.send(command.clone()).is_ok() {
                sent += 1;
            } else {
                dead.push(client.id);
            }
        }
        for id in dead {
            tracing::debug!(session = %id, "Dropping dead live reload client");
            self.disconnect(id);
        }
        metrics::record_broadcast(command.name(), sent);
        tracing::debug!(command = command.name(), clients = sent, "Live reload broadcast");
        sent
    }

    fn flush(&self, changed: Vec<PathBuf>) {
        let mut files: Vec<PathBuf> = changed.iter().map(|p| canonical(p)).collect();
        files.sort();
        files.dedup();

        let _ = self.changed_tx.send(files.clone());

        let sources = self.sources_for(&files);
        if sources.is_empty() {
            tracing::trace!(files = files.len(), "Changed files not mapped to any page");
            return;
        }
        tracing::info!(paths = ?sources, "Files changed, reloading browsers");
        self.broadcast(ServerCommand::reload(sources));
    }

    fn watch_dir(&self, dir: &Path) {
        let mut dirs = lock(&self.watched_dirs);
        let mut watcher = lock(&self.watcher);
        match watcher.as_mut() {
            Some(w) => {
                if dirs.contains(dir) {
                    return;
                }
                match w.watch(dir, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        tracing::debug!(dir = ?dir, "Watching directory");
                        dirs.insert(dir.to_path_buf());
                    }
                    Err(e) => tracing::warn!(dir = ?dir, error = %e, "Unable to watch directory"),
                }
            }
            // Not started yet; watched on start.
            None => {
                dirs.insert(dir.to_path_buf());
            }
        }
    }
}

/// Closes a request's file bucket on drop.
pub struct TrackedRequest<'a> {
    hub: &'a LiveReload,
    request_id: String,
}

impl Drop for TrackedRequest<'_> {
    fn drop(&mut self) {
        self.hub.end_request(&self.request_id);
    }
}

async fn debounce_loop(
    hub: Weak<LiveReload>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        // Every event restarts the window.
        while let Ok(Some(path)) = tokio::time::timeout(window, rx.recv()).await {
            batch.push(path);
        }
        match hub.upgrade() {
            Some(hub) => hub.flush(batch),
            None => break,
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
