//! Background reload loop driven by file system notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TemplateError};
use crate::event::ChangeEvent;
use crate::store::TemplateStore;

/// Pending changes buffered between the notify thread and the loop.
const EVENT_QUEUE: usize = 128;

/// Deadline used when a debounce window overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A live watch on the store's root.
///
/// The loop owns the notify subscription and releases it when the session's
/// cancellation token fires.
#[derive(Debug)]
pub struct WatchSession {
    root: PathBuf,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Subscribe to changes under the store's root and spawn the reload loop
    /// on the current tokio runtime.
    ///
    /// Only the root is registered, recursively. Subdirectories created later
    /// are covered on backends whose recursive mode follows new directories.
    ///
    /// Cancelling `shutdown` stops the loop. Closing or dropping the session
    /// cancels only a child of it, never `shutdown` itself.
    pub fn start(store: Arc<TemplateStore>, shutdown: CancellationToken) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TemplateError::WatchUnavailable)?;
        let shutdown = shutdown.child_token();
        let root = store.config().root.clone();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let change = ChangeEvent::from(event);
                    if !change.qualifies() {
                        return;
                    }

                    match event_tx.try_send(change) {
                        Ok(()) => {}
                        // A full queue already holds a pending reload.
                        Err(TrySendError::Full(change)) => debug!("Dropped change event: {change}"),
                        Err(TrySendError::Closed(_)) => {}
                    }
                }
                Err(e) => {
                    warn!("Watch error: {e}");
                }
            },
        )?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("Started watching {}", root.display());
        store
            .status()
            .line(format_args!("start watching {}", root.display()));

        let watch_loop = WatchLoop {
            store,
            events: event_rx,
            shutdown: shutdown.clone(),
        };
        let task = runtime.spawn(watch_loop.run(watcher));

        Ok(Self {
            root,
            shutdown,
            task: Some(task),
        })
    }

    /// Stop the loop and wait for it to release the subscription.
    ///
    /// A reload already running finishes first; none starts afterwards.
    pub async fn close(mut self) {
        self.shutdown.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Watch loop for {} ended abnormally: {e}", self.root.display());
            }
        }
    }

    /// Check if the loop is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct WatchLoop {
    store: Arc<TemplateStore>,
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: CancellationToken,
}

impl WatchLoop {
    async fn run(mut self, watcher: RecommendedWatcher) {
        let debounce = self.store.config().debounce();

        loop {
            let change = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                change = self.events.recv() => match change {
                    Some(change) => change,
                    None => break,
                },
            };

            if let Some(window) = debounce {
                if !self.coalesce(window).await {
                    break;
                }
            }

            self.store
                .status()
                .line(format_args!("{change}: reloading..."));
            let store = Arc::clone(&self.store);
            match tokio::task::spawn_blocking(move || store.reload()).await {
                Ok(Ok(generation)) => debug!("Watch reload produced generation {generation}"),
                // Already reported by the store; the old set keeps serving.
                Ok(Err(_)) => {}
                Err(e) => error!("Reload task failed: {e}"),
            }
        }

        drop(watcher);
        let root = &self.store.config().root;
        info!("Stopped watching {}", root.display());
        self.store
            .status()
            .line("shutting down hot templates... done");
    }

    /// Absorb further events for `window`. Returns false on shutdown.
    async fn coalesce(&mut self, window: Duration) -> bool {
        let now = Instant::now();
        let deadline = now.checked_add(window).unwrap_or(now + FAR_FUTURE);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => return true,
                change = self.events.recv() => match change {
                    Some(change) => debug!("Coalesced change event: {change}"),
                    None => return true,
                },
            }
        }
    }
}
