//! The template store: owns the active set and swaps it on reload.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::compiler::Compiler;
use crate::config::{Config, StatusSink};
use crate::error::{Result, TemplateError};
use crate::event::ReloadEvent;
use crate::scanner::Scanner;
use crate::set::TemplateSet;

const EVENT_CAPACITY: usize = 64;

/// Holds the active [`TemplateSet`] and rebuilds it on demand.
///
/// Renders load the current set once and keep it for the whole call, so a
/// reload that lands mid-render never changes what that render sees.
pub struct TemplateStore {
    config: Config,
    scanner: Scanner,
    compiler: Compiler,

    /// Always holds a fully built set.
    active: ArcSwap<TemplateSet>,

    /// Serializes reloads from the watch loop and manual callers.
    reload_lock: Mutex<()>,

    events: broadcast::Sender<ReloadEvent>,
}

impl TemplateStore {
    /// Build the store and perform the initial load from `config.root`.
    pub fn load(config: Config) -> Result<Self> {
        let compiler = Compiler::new(config.clone())?;
        let scanner = Scanner::new(config.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let set = build(&config, &scanner, &compiler, 1)?;
        info!(
            "Loaded {} templates from {} into {}",
            set.len(),
            config.root.display(),
            set.base_name()
        );

        Ok(Self {
            config,
            scanner,
            compiler,
            active: ArcSwap::from_pointee(set),
            reload_lock: Mutex::new(()),
            events,
        })
    }

    /// Rescan and recompile the tree, then swap in the result.
    ///
    /// On failure the previous set stays active and the error is reported to
    /// the status sink before being returned. Returns the new generation.
    pub fn reload(&self) -> Result<u64> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.active.load().generation();

        match build(&self.config, &self.scanner, &self.compiler, current + 1) {
            Ok(set) => {
                let generation = set.generation();
                let templates = set.len();
                self.active.store(Arc::new(set));

                info!("Reloaded {templates} templates (generation {generation})");
                let _ = self.events.send(ReloadEvent::Loaded {
                    generation,
                    templates,
                    at: Utc::now(),
                });
                Ok(generation)
            }
            Err(err) => {
                error!("Reload failed, keeping generation {current}: {err}");
                self.config.status.line(&err);
                let _ = self.events.send(ReloadEvent::Failed {
                    generation: current,
                    error: err.to_string(),
                    at: Utc::now(),
                });
                Err(err)
            }
        }
    }

    /// Render `name` with `data` into `writer`.
    ///
    /// Output is written only once the render has succeeded.
    pub fn execute<W, S>(&self, writer: &mut W, name: &str, data: S) -> Result<()>
    where
        W: Write + ?Sized,
        S: Serialize,
    {
        let output = self.render(name, data)?;
        writer
            .write_all(output.as_bytes())
            .map_err(TemplateError::Write)
    }

    /// Render `name` with `data` to a string.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String> {
        let set = self.active.load_full();
        set.render(name, data)
    }

    /// Whether the active set contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.active.load().contains(name)
    }

    /// Names in the active set.
    pub fn names(&self) -> Vec<String> {
        self.active.load().names().to_vec()
    }

    /// Generation of the active set.
    pub fn generation(&self) -> u64 {
        self.active.load().generation()
    }

    /// Subscribe to reload outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    /// The configuration the store was loaded with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn status(&self) -> &StatusSink {
        &self.config.status
    }
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("root", &self.config.root)
            .field("generation", &self.generation())
            .finish()
    }
}

fn build(
    config: &Config,
    scanner: &Scanner,
    compiler: &Compiler,
    generation: u64,
) -> Result<TemplateSet> {
    config
        .status
        .line(format_args!("loading... {}", config.root.display()));
    let sources = scanner.scan()?;
    compiler.compile(sources, generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn store_with(root: &Path, status: Captured) -> TemplateStore {
        let config = Config::new(root)
            .with_extensions([".tpl"])
            .with_status_sink(status);
        TemplateStore::load(config).unwrap()
    }

    #[test]
    fn test_load_and_execute() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("hello.tpl"), "hello {{ Name }}").unwrap();
        fs::write(temp_dir.path().join("sub/page.tpl"), "page").unwrap();
        fs::write(temp_dir.path().join("hello.tpl.bak"), "{% broken").unwrap();

        let status = Captured::default();
        let store = store_with(temp_dir.path(), status.clone());

        let mut out = Vec::new();
        store
            .execute(&mut out, "hello.tpl", json!({"Name": "gernest"}))
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello gernest");
        assert_eq!(store.names(), vec!["hello.tpl", "sub/page.tpl"]);
        assert_eq!(store.generation(), 1);
        assert!(status.text().starts_with("loading... "));
    }

    #[test]
    fn test_execute_unknown_name_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.tpl"), "a").unwrap();
        let store = store_with(temp_dir.path(), Captured::default());

        let mut out = Vec::new();
        let result = store.execute(&mut out, "b.tpl", json!({}));
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_render_error_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.tpl"), "start {{ user.name }}").unwrap();
        let store = store_with(temp_dir.path(), Captured::default());

        let mut out = Vec::new();
        let result = store.execute(&mut out, "a.tpl", json!({}));
        assert!(matches!(result, Err(TemplateError::Render { .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn test_initial_load_failure() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.tpl"), "{% for %}").unwrap();

        let config = Config::new(temp_dir.path())
            .with_extensions([".tpl"])
            .with_status_sink(Captured::default());
        let result = TemplateStore::load(config);
        assert!(matches!(result, Err(TemplateError::Compile { .. })));
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hello.tpl");
        fs::write(&file, "hello {{ Name }}").unwrap();
        let store = store_with(temp_dir.path(), Captured::default());
        let mut events = store.subscribe();

        fs::write(&file, "hi {{ Name }}").unwrap();
        fs::write(temp_dir.path().join("new.tpl"), "new").unwrap();
        assert_eq!(store.reload().unwrap(), 2);

        assert_eq!(
            store.render("hello.tpl", json!({"Name": "gernest"})).unwrap(),
            "hi gernest"
        );
        assert!(store.contains("new.tpl"));
        let event = events.try_recv().unwrap();
        assert!(event.is_loaded());
        assert_eq!(event.generation(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_previous_set() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hello.tpl");
        fs::write(&file, "hello {{ Name }}").unwrap();
        let status = Captured::default();
        let store = store_with(temp_dir.path(), status.clone());
        let mut events = store.subscribe();

        fs::write(&file, "hi {{ Name }").unwrap();
        fs::write(temp_dir.path().join("other.tpl"), "other").unwrap();
        let result = store.reload();

        assert!(matches!(result, Err(TemplateError::Compile { .. })));
        assert_eq!(store.generation(), 1);
        assert!(!store.contains("other.tpl"));
        assert_eq!(
            store.render("hello.tpl", json!({"Name": "gernest"})).unwrap(),
            "hello gernest"
        );
        assert!(status.text().contains("failed to compile hello.tpl"));

        let event = events.try_recv().unwrap();
        assert!(!event.is_loaded());
        assert_eq!(event.generation(), 1);
    }

    #[test]
    fn test_reload_after_root_removed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("views");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.tpl"), "a").unwrap();
        let store = store_with(&root, Captured::default());

        fs::remove_dir_all(&root).unwrap();
        assert!(matches!(store.reload(), Err(TemplateError::RootNotFound(_))));
        assert_eq!(store.render("a.tpl", json!({})).unwrap(), "a");
    }
}
