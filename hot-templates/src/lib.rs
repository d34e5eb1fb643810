//! # Hot Templates
//!
//! A compiled template store that follows a directory tree. Templates are
//! loaded once at startup, served from memory, and recompiled as a whole when
//! files under the root change. A failed rebuild never replaces the set being
//! served.
//!
//! ## Features
//!
//! - **Extension Filtering**: Only files with configured extensions are loaded
//! - **Path Names**: `root/sub/page.tpl` is looked up as `sub/page.tpl`
//! - **Atomic Swap**: Renders see either the old or the new set, never a mix
//! - **Fallback on Failure**: A broken edit keeps the last good set serving
//! - **Explicit Lifecycle**: Watching stops on `close` or a cancellation token
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Hot Templates                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Config ──► Scanner ──► Compiler ──► TemplateSet                │
//! │                                          │                      │
//! │                                          ▼                      │
//! │  WatchSession ──► reload() ──► TemplateStore ──► execute()      │
//! │       ▲                            │                            │
//! │  notify events                ReloadEvent                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod event;
pub mod scanner;
pub mod set;
pub mod store;
pub mod templates;
pub mod watcher;

pub use compiler::Compiler;
pub use config::{Config, Delimiters, Functions, StatusSink, UndefinedMode};
pub use error::{Result, TemplateError};
pub use event::{ChangeEvent, ChangeKind, ReloadEvent};
pub use scanner::{Scanner, SourceFile, logical_name};
pub use set::TemplateSet;
pub use store::TemplateStore;
pub use templates::HotTemplates;
pub use watcher::WatchSession;
