//! File system watcher feeding `workspace/didChangeWatchedFiles`.
//!
//! Watches the workspace recursively through a debouncer and keeps only
//! paths that match the synchronized glob relative to the workspace root.
//! Each debounced batch is translated into LSP file events and coalesced
//! so that a URI appears at most once per batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::GlobMatcher;
use lsp_types::{FileChangeType, FileEvent, Url};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ClientError;

use super::ClientResult;
use super::selector::compile_glob;

/// Keeps the underlying debounced watcher alive.
///
/// Dropping it stops the watch and closes the event channel.
pub struct FileSystemWatcher {
    root: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl std::fmt::Debug for FileSystemWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FileSystemWatcher {
    /// Starts watching `root` for files matching `glob`.
    ///
    /// Returns the watcher and a channel of coalesced event batches.
    /// ## Errors
    pub fn spawn(
        root: &Path,
        glob: &str,
        debounce: Duration,
    ) -> ClientResult<(Self, UnboundedReceiver<Vec<FileEvent>>)> {
        let (tx, rx) = unbounded_channel();
        let filter = EventFilter::new(root, glob)?;

        let mut debouncer: Debouncer<RecommendedWatcher, RecommendedCache> = new_debouncer(
            debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changes = coalesce(events.iter().flat_map(|e| filter.changes(&e.event)));
                    // Receiver gone means the client stopped.
                    if !changes.is_empty() && tx.send(changes).is_err() {
                        debug!("file event receiver closed");
                    }
                }
                Err(errors) => {
                    for error in errors {
                        warn!(error = %error, "file watcher error");
                    }
                }
            },
        )
        .map_err(|e| ClientError::Watcher(e.to_string()))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| ClientError::Watcher(format!("failed to watch {}: {e}", root.display())))?;

        debug!(root = %root.display(), glob, ?debounce, "watching workspace files");

        Ok((
            Self {
                root: root.to_path_buf(),
                _debouncer: debouncer,
            },
            rx,
        ))
    }

    /// The watched workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translates notify events into LSP file events for watched paths.
struct EventFilter {
    root: PathBuf,
    matcher: GlobMatcher,
}

impl EventFilter {
    fn new(root: &Path, glob: &str) -> ClientResult<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            matcher: compile_glob(glob)?,
        })
    }

    fn changes(&self, event: &Event) -> Vec<FileEvent> {
        let mut out = Vec::new();
        for (path, typ) in path_changes(event) {
            // Files written into a fresh directory can beat the recursive
            // watch on that directory, so created directories are scanned.
            if typ == FileChangeType::CREATED && path.is_dir() {
                self.scan_created_dir(path, &mut out);
            } else if self.is_watched(path) {
                self.push(path, typ, &mut out);
            }
        }
        out
    }

    fn scan_created_dir(&self, dir: &Path, out: &mut Vec<FileEvent>) {
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && self.is_watched(entry.path()) {
                self.push(entry.path(), FileChangeType::CREATED, out);
            }
        }
    }

    fn push(&self, path: &Path, typ: FileChangeType, out: &mut Vec<FileEvent>) {
        if let Ok(uri) = Url::from_file_path(path) {
            out.push(FileEvent { uri, typ });
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.matcher.is_match(relative)
    }
}

/// Pairs each path of a notify event with its LSP change type.
///
/// Renames are split into a deletion of the old name and a creation of the
/// new one.
fn path_changes(event: &Event) -> Vec<(&Path, FileChangeType)> {
    match &event.kind {
        EventKind::Create(_) => uniform(event, FileChangeType::CREATED),
        EventKind::Remove(_) => uniform(event, FileChangeType::DELETED),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            uniform(event, FileChangeType::DELETED)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            uniform(event, FileChangeType::CREATED)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let typ = if i == 0 {
                    FileChangeType::DELETED
                } else {
                    FileChangeType::CREATED
                };
                (p.as_path(), typ)
            })
            .collect(),
        // Backends that cannot tell the two sides of a rename apart.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let typ = if p.exists() {
                    FileChangeType::CREATED
                } else {
                    FileChangeType::DELETED
                };
                (p.as_path(), typ)
            })
            .collect(),
        EventKind::Modify(_) => uniform(event, FileChangeType::CHANGED),
        _ => Vec::new(),
    }
}

fn uniform(event: &Event, typ: FileChangeType) -> Vec<(&Path, FileChangeType)> {
    event.paths.iter().map(|p| (p.as_path(), typ)).collect()
}

/// Merges events so that each URI appears once, keeping first-seen order.
pub(crate) fn coalesce(events: impl IntoIterator<Item = FileEvent>) -> Vec<FileEvent> {
    let mut merged: Vec<FileEvent> = Vec::new();
    for event in events {
        let Some(pos) = merged.iter().position(|e| e.uri == event.uri) else {
            merged.push(event);
            continue;
        };
        match (merged[pos].typ, event.typ) {
            (FileChangeType::CREATED, FileChangeType::CHANGED) => {}
            (FileChangeType::CREATED, FileChangeType::DELETED) => {
                merged.remove(pos);
            }
            (FileChangeType::DELETED, FileChangeType::CREATED) => {
                merged[pos].typ = FileChangeType::CHANGED;
            }
            (_, next) => merged[pos].typ = next,
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn filter(root: &str) -> EventFilter {
        EventFilter::new(Path::new(root), "**/.clientrc").unwrap()
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    fn file_event(path: &str, typ: FileChangeType) -> FileEvent {
        FileEvent {
            uri: Url::from_file_path(path).unwrap(),
            typ,
        }
    }

    #[test]
    fn test_glob_matches_clientrc_at_any_depth() {
        let filter = filter("/work");
        assert!(filter.is_watched(Path::new("/work/.clientrc")));
        assert!(filter.is_watched(Path::new("/work/a/b/.clientrc")));
        assert!(!filter.is_watched(Path::new("/work/x.clientrc")));
        assert!(!filter.is_watched(Path::new("/work/.clientrc.bak")));
    }

    #[cfg(unix)]
    #[test]
    fn test_basic_kinds() {
        let filter = filter("/work");
        let created = event(EventKind::Create(CreateKind::File), &["/work/.clientrc"]);
        let modified = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/work/.clientrc"],
        );
        let removed = event(EventKind::Remove(RemoveKind::File), &["/work/.clientrc"]);

        assert_eq!(
            filter.changes(&created),
            vec![file_event("/work/.clientrc", FileChangeType::CREATED)]
        );
        assert_eq!(
            filter.changes(&modified),
            vec![file_event("/work/.clientrc", FileChangeType::CHANGED)]
        );
        assert_eq!(
            filter.changes(&removed),
            vec![file_event("/work/.clientrc", FileChangeType::DELETED)]
        );
        assert!(filter.changes(&event(EventKind::Any, &["/work/.clientrc"])).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_from_is_deletion() {
        let filter = filter("/work");
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/work/.clientrc"],
        );
        assert_eq!(
            filter.changes(&renamed),
            vec![file_event("/work/.clientrc", FileChangeType::DELETED)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_to_is_creation() {
        let filter = filter("/work");
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/work/.clientrc"],
        );
        assert_eq!(
            filter.changes(&renamed),
            vec![file_event("/work/.clientrc", FileChangeType::CREATED)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_both_splits_sides() {
        let filter = filter("/work");
        let away = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/work/.clientrc", "/work/old.bak"],
        );
        assert_eq!(
            filter.changes(&away),
            vec![file_event("/work/.clientrc", FileChangeType::DELETED)]
        );

        let into = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/work/draft", "/work/sub/.clientrc"],
        );
        assert_eq!(
            filter.changes(&into),
            vec![file_event("/work/sub/.clientrc", FileChangeType::CREATED)]
        );
    }

    #[test]
    fn test_ambiguous_rename_uses_existence() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let present = root.join(".clientrc");
        std::fs::write(&present, "").unwrap();
        let gone = root.join("sub").join(".clientrc");

        let filter = EventFilter::new(root, "**/.clientrc").unwrap();
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(present.clone())
            .add_path(gone.clone());

        let changes = filter.changes(&renamed);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].uri, Url::from_file_path(&present).unwrap());
        assert_eq!(changes[0].typ, FileChangeType::CREATED);
        assert_eq!(changes[1].uri, Url::from_file_path(&gone).unwrap());
        assert_eq!(changes[1].typ, FileChangeType::DELETED);
    }

    #[test]
    fn test_created_directory_is_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("sub").join("deeper");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join(".clientrc"), "").unwrap();
        std::fs::write(nested.join("main.mar"), "").unwrap();

        let filter = EventFilter::new(root, "**/.clientrc").unwrap();
        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("sub"));

        assert_eq!(
            filter.changes(&created),
            vec![FileEvent {
                uri: Url::from_file_path(nested.join(".clientrc")).unwrap(),
                typ: FileChangeType::CREATED,
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_coalesce_per_uri() {
        let a = "/work/.clientrc";
        let b = "/work/sub/.clientrc";
        let merged = coalesce([
            file_event(a, FileChangeType::CREATED),
            file_event(b, FileChangeType::CHANGED),
            file_event(a, FileChangeType::CHANGED),
            file_event(b, FileChangeType::DELETED),
        ]);
        assert_eq!(
            merged,
            vec![
                file_event(a, FileChangeType::CREATED),
                file_event(b, FileChangeType::DELETED),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_coalesce_create_then_delete_cancels() {
        let a = "/work/.clientrc";
        let merged = coalesce([
            file_event(a, FileChangeType::CREATED),
            file_event(a, FileChangeType::DELETED),
        ]);
        assert!(merged.is_empty());

        let replaced = coalesce([
            file_event(a, FileChangeType::DELETED),
            file_event(a, FileChangeType::CREATED),
        ]);
        assert_eq!(replaced, vec![file_event(a, FileChangeType::CHANGED)]);
    }
}
