//! The public entry point tying the store and the optional watch together.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::event::ReloadEvent;
use crate::store::TemplateStore;
use crate::watcher::WatchSession;

/// A template store that reloads itself when its source tree changes.
///
/// ```no_run
/// # async fn example() -> hot_templates::Result<()> {
/// use hot_templates::{Config, HotTemplates};
///
/// let config = Config::new("fixtures").with_extensions([".tpl"]).with_watch(true);
/// let mut templates = HotTemplates::new(config)?;
///
/// let mut out = Vec::new();
/// templates.execute(&mut out, "hello.tpl", serde_json::json!({ "Name": "gernest" }))?;
///
/// templates.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HotTemplates {
    store: Arc<TemplateStore>,
    session: Option<WatchSession>,
}

impl HotTemplates {
    /// Load the tree and, if `config.watch` is set, start watching it.
    ///
    /// Watching needs a tokio runtime and is never started when the initial
    /// load fails.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Like [`HotTemplates::new`], with the watch loop also stopping when
    /// `shutdown` fires. Use this to tie watching to process signals.
    /// [`HotTemplates::close`] and drop never cancel `shutdown` itself.
    pub fn with_shutdown(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let store = Arc::new(TemplateStore::load(config)?);

        let session = if store.config().watch {
            Some(WatchSession::start(Arc::clone(&store), shutdown)?)
        } else {
            None
        };

        Ok(Self { store, session })
    }

    /// Render `name` with `data` into `writer`.
    pub fn execute<W, S>(&self, writer: &mut W, name: &str, data: S) -> Result<()>
    where
        W: Write + ?Sized,
        S: Serialize,
    {
        self.store.execute(writer, name, data)
    }

    /// Render `name` with `data` to a string.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String> {
        self.store.render(name, data)
    }

    /// Rebuild the set now. Failures keep the previous set active.
    pub fn reload(&self) -> Result<u64> {
        self.store.reload()
    }

    /// Stop watching. The last loaded set stays servable as a static cache.
    ///
    /// Does nothing when watching was never enabled or was already stopped.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            info!("Closed template watch on {}", self.store.config().root.display());
        }
    }

    /// Check if the background watch loop is running.
    pub fn is_watching(&self) -> bool {
        self.session.as_ref().is_some_and(WatchSession::is_running)
    }

    /// Whether the active set holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    /// Sorted names in the active set.
    pub fn names(&self) -> Vec<String> {
        self.store.names()
    }

    /// Generation of the active set.
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Subscribe to reload outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.store.subscribe()
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        self.store.config()
    }
}
