//! Change notifications consumed by the watch loop and reload outcomes
//! published by the store.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file system change under the watched root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The kind of change.
    pub kind: ChangeKind,

    /// Affected paths.
    pub paths: Vec<PathBuf>,

    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(kind: ChangeKind, paths: Vec<PathBuf>) -> Self {
        Self {
            kind,
            paths,
            timestamp: Utc::now(),
        }
    }

    /// Whether this change should trigger a reload.
    ///
    /// Reads do not change the tree, and reloading itself produces them.
    pub fn qualifies(&self) -> bool {
        self.kind != ChangeKind::Accessed
    }
}

impl From<notify::Event> for ChangeEvent {
    fn from(event: notify::Event) -> Self {
        Self::new(ChangeKind::from(event.kind), event.paths)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for path in &self.paths {
            write!(f, " {}", path.display())?;
        }
        Ok(())
    }
}

/// Kind of file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File or directory was created.
    Created,

    /// File contents changed.
    Modified,

    /// File or directory was removed.
    Removed,

    /// File or directory was renamed.
    Renamed,

    /// Metadata changed.
    MetadataChanged,

    /// File was opened or read.
    Accessed,

    /// Backend could not tell.
    Other,
}

impl From<notify::EventKind> for ChangeKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                notify::event::ModifyKind::Name(_) => Self::Renamed,
                notify::event::ModifyKind::Metadata(_) => Self::MetadataChanged,
                _ => Self::Modified,
            },
            notify::EventKind::Remove(_) => Self::Removed,
            notify::EventKind::Access(_) => Self::Accessed,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::MetadataChanged => "metadata",
            Self::Accessed => "accessed",
            Self::Other => "changed",
        };
        f.write_str(s)
    }
}

/// Outcome of a load or reload, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadEvent {
    /// A new template set became active.
    Loaded {
        generation: u64,
        templates: usize,
        at: DateTime<Utc>,
    },

    /// A reload failed; the previous set stays active.
    Failed {
        /// Generation still being served.
        generation: u64,
        error: String,
        at: DateTime<Utc>,
    },
}

impl ReloadEvent {
    /// Whether the attempt installed a new set.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    /// Generation active after this attempt.
    pub fn generation(&self) -> u64 {
        match self {
            Self::Loaded { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RenameMode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from(notify::EventKind::Create(CreateKind::File)),
            ChangeKind::Created
        );
        assert_eq!(
            ChangeKind::from(notify::EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            ChangeKind::Modified
        );
        assert_eq!(
            ChangeKind::from(notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            ChangeKind::Renamed
        );
        assert_eq!(
            ChangeKind::from(notify::EventKind::Any),
            ChangeKind::Other
        );
    }

    #[test]
    fn test_access_does_not_qualify() {
        let read = ChangeEvent::from(
            notify::Event::new(notify::EventKind::Access(AccessKind::Any))
                .add_path(PathBuf::from("/t/a.tpl")),
        );
        assert!(!read.qualifies());

        let removed = ChangeEvent::new(ChangeKind::Removed, vec![PathBuf::from("/t/a.tpl")]);
        assert!(removed.qualifies());
    }

    #[test]
    fn test_change_event_display() {
        let event = ChangeEvent::new(ChangeKind::Modified, vec![PathBuf::from("/t/a.tpl")]);
        assert_eq!(event.to_string(), "modified /t/a.tpl");
    }

    #[test]
    fn test_reload_event_serializes_tagged() {
        let event = ReloadEvent::Failed {
            generation: 3,
            error: "boom".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "failed");
        assert_eq!(event.generation(), 3);
        assert!(!event.is_loaded());
    }
}
