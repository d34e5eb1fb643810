//! Template tree scanning.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, TemplateError};

/// A template source read from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Logical name, relative to the root with `/` separators.
    pub name: String,

    /// Path on disk.
    pub path: PathBuf,

    /// Raw template text.
    pub source: String,
}

/// Walks a template root and reads every file with a recognized extension.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: Config,
}

impl Scanner {
    /// Create a scanner for the config's root and extensions.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Scan the configured root.
    pub fn scan(&self) -> Result<Vec<SourceFile>> {
        self.scan_dir(&self.config.root)
    }

    /// Scan `root`.
    ///
    /// Any walk or read error aborts the scan; nothing read so far is
    /// returned.
    pub fn scan_dir(&self, root: &Path) -> Result<Vec<SourceFile>> {
        if !root.is_dir() {
            return Err(TemplateError::RootNotFound(root.to_path_buf()));
        }

        let mut files = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry?;

            if entry.file_type().is_dir() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !self.config.matches_extension(&file_name) {
                continue;
            }

            let path = entry.into_path();
            let source = std::fs::read_to_string(&path).map_err(|source| TemplateError::Scan {
                path: path.clone(),
                source,
            })?;
            let name = logical_name(root, &path);

            debug!("Scanned template {name}");
            files.push(SourceFile { name, path, source });
        }

        Ok(files)
    }
}

/// Derive the lookup name of `path` under `root`.
///
/// The root prefix is stripped and separators become `/`, so
/// `root/sub/page.tpl` is named `sub/page.tpl` on every platform.
pub fn logical_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);

    // Only normal components survive, which also drops any leading root.
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
