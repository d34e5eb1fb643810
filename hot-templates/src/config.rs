//! Configuration types for the template store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use minijinja::Value;
use minijinja::functions::Function;
use minijinja::value::{FunctionArgs, FunctionResult};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};

/// Default left delimiter for template expressions.
pub const DEFAULT_LEFT_DELIM: &str = "{{";

/// Default right delimiter for template expressions.
pub const DEFAULT_RIGHT_DELIM: &str = "}}";

/// Configuration for a template store.
///
/// Supplied once at construction and read-only afterwards. The serializable
/// fields can be loaded from JSON or TOML; function bindings and the status
/// sink only exist at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the template tree.
    pub root: PathBuf,

    /// Name of the compiled template set.
    pub base_name: String,

    /// Recognized file extensions, including the leading dot.
    pub extensions: BTreeSet<String>,

    /// Expression delimiter override.
    pub delimiters: Option<Delimiters>,

    /// Whether to watch the root and reload on change.
    pub watch: bool,

    /// How undefined values behave while rendering.
    pub undefined: UndefinedMode,

    /// Window for coalescing bursts of change events into one reload.
    pub debounce_ms: Option<u64>,

    /// Functions callable from every template.
    #[serde(skip)]
    pub functions: Functions,

    /// Sink for status and diagnostic lines.
    #[serde(skip)]
    pub status: StatusSink,
}

impl Config {
    /// Create a new config rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_name: "hot".to_string(),
            extensions: [".tpl", ".html", ".tmpl"]
                .into_iter()
                .map(String::from)
                .collect(),
            delimiters: None,
            watch: false,
            undefined: UndefinedMode::default(),
            debounce_ms: None,
            functions: Functions::default(),
            status: StatusSink::default(),
        }
    }

    /// Parse a config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| TemplateError::Config(e.to_string()))
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TemplateError::Config(e.to_string()))
    }

    /// Load a config file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| TemplateError::Scan {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(TemplateError::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Set the template set name.
    pub fn with_base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = name.into();
        self
    }

    /// Replace the recognized extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Override the expression delimiters.
    pub fn with_delimiters(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.delimiters = Some(Delimiters {
            left: left.into(),
            right: right.into(),
        });
        self
    }

    /// Enable or disable watching.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Set the undefined value behavior.
    pub fn with_undefined(mut self, mode: UndefinedMode) -> Self {
        self.undefined = mode;
        self
    }

    /// Coalesce change events arriving within `window` into one reload.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = Some(u64::try_from(window.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Register a function callable from every template.
    pub fn with_function<F, Rv, Args>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.functions.insert(name, f);
        self
    }

    /// Send status lines to `writer` instead of stdout.
    pub fn with_status_sink(mut self, writer: impl Write + Send + 'static) -> Self {
        self.status = StatusSink::new(writer);
        self
    }

    /// The delimiter pair in effect.
    pub fn delimiters(&self) -> (&str, &str) {
        match &self.delimiters {
            Some(d) => (d.left.as_str(), d.right.as_str()),
            None => (DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM),
        }
    }

    /// The debounce window, if any.
    pub fn debounce(&self) -> Option<Duration> {
        self.debounce_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Check if a file name carries a recognized extension.
    ///
    /// The extension is everything from the last `.` of the base name.
    pub fn matches_extension(&self, file_name: &str) -> bool {
        file_name
            .rfind('.')
            .is_some_and(|idx| self.extensions.contains(&file_name[idx..]))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(TemplateError::Config("base name must not be empty".into()));
        }

        if self.extensions.is_empty() {
            return Err(TemplateError::Config(
                "at least one file extension is required".into(),
            ));
        }

        if let Some(ext) = self.extensions.iter().find(|e| !e.starts_with('.') || e.len() < 2) {
            return Err(TemplateError::Config(format!(
                "extension must start with '.': {ext:?}"
            )));
        }

        if let Some(d) = &self.delimiters {
            if d.left.is_empty() || d.right.is_empty() {
                return Err(TemplateError::Config(
                    "both delimiters must be set together".into(),
                ));
            }

            if d.left == d.right {
                return Err(TemplateError::Config(format!(
                    "left and right delimiters must differ: {:?}",
                    d.left
                )));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("templates")
    }
}

/// Expression delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    /// Opening delimiter.
    pub left: String,

    /// Closing delimiter.
    pub right: String,
}

/// How undefined values behave while rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedMode {
    /// Any use of an undefined value is a render error.
    #[default]
    Strict,

    /// Undefined values render as empty.
    Lenient,

    /// Attribute access on undefined values yields undefined.
    Chainable,
}

impl From<UndefinedMode> for minijinja::UndefinedBehavior {
    fn from(mode: UndefinedMode) -> Self {
        match mode {
            UndefinedMode::Strict => Self::Strict,
            UndefinedMode::Lenient => Self::Lenient,
            UndefinedMode::Chainable => Self::Chainable,
        }
    }
}

/// Named functions made available to every template.
#[derive(Clone, Default)]
pub struct Functions(BTreeMap<String, Value>);

impl Functions {
    /// Register a function under `name`, replacing any previous binding.
    pub fn insert<F, Rv, Args>(&mut self, name: impl Into<String>, f: F)
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.0.insert(name.into(), Value::from_function(f));
    }

    /// Iterate over the bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bound functions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no functions are bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Shared writer receiving human-readable status lines.
#[derive(Clone)]
pub struct StatusSink(Arc<Mutex<Box<dyn Write + Send>>>);

impl StatusSink {
    /// Wrap a writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Status sink writing to stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write one line. Failures to write status are ignored.
    pub fn line(&self, message: impl fmt::Display) {
        let mut out = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = Config::new("fixtures");

        assert_eq!(config.root, Path::new("fixtures"));
        assert_eq!(config.base_name, "hot");
        assert_eq!(config.delimiters(), ("{{", "}}"));
        assert!(!config.watch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_matches_extension_uses_last_dot() {
        let config = Config::new("fixtures").with_extensions([".tpl"]);

        assert!(config.matches_extension("page.tpl"));
        assert!(config.matches_extension("page.html.tpl"));
        assert!(config.matches_extension(".tpl"));
        assert!(!config.matches_extension("page.tpl.bak"));
        assert!(!config.matches_extension("tpl"));
    }

    #[test]
    fn test_validate_rejects_bad_extensions() {
        let empty = Config::new("fixtures").with_extensions(Vec::<String>::new());
        assert!(matches!(empty.validate(), Err(TemplateError::Config(_))));

        let no_dot = Config::new("fixtures").with_extensions(["tpl"]);
        assert!(matches!(no_dot.validate(), Err(TemplateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_half_delimiters() {
        let config = Config::new("fixtures").with_delimiters("[[", "");
        assert!(matches!(config.validate(), Err(TemplateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_identical_delimiters() {
        let config = Config::new("fixtures").with_delimiters("{{", "{{");
        assert!(matches!(config.validate(), Err(TemplateError::Config(_))));

        let config = Config::new("fixtures").with_delimiters("[[", "]]");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debounce_saturates() {
        let config = Config::new("fixtures").with_debounce(Duration::from_millis(50));
        assert_eq!(config.debounce_ms, Some(50));

        let config = Config::new("fixtures").with_debounce(Duration::MAX);
        assert_eq!(config.debounce_ms, Some(u64::MAX));
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            root = "views"
            base_name = "site"
            extensions = [".html"]
            watch = true
            debounce_ms = 50

            [delimiters]
            left = "[["
            right = "]]"
            "#,
        )
        .unwrap();

        assert_eq!(config.root, Path::new("views"));
        assert_eq!(config.base_name, "site");
        assert_eq!(config.delimiters(), ("[[", "]]"));
        assert_eq!(config.debounce(), Some(Duration::from_millis(50)));
        assert_eq!(config.undefined, UndefinedMode::Strict);
        assert!(config.watch);
    }

    #[test]
    fn test_from_json_uses_defaults() {
        let config = Config::from_json_str(r#"{"root": "views", "undefined": "lenient"}"#).unwrap();

        assert_eq!(config.base_name, "hot");
        assert_eq!(config.undefined, UndefinedMode::Lenient);
        assert!(config.extensions.contains(".tmpl"));
    }

    #[test]
    fn test_functions_debug_lists_names() {
        let config = Config::new("fixtures").with_function("shout", |s: String| s.to_uppercase());

        assert_eq!(config.functions.len(), 1);
        assert_eq!(format!("{:?}", config.functions), r#"{"shout"}"#);
    }
}
