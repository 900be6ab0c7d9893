use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::vec;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// File extensions recognised as spreadsheet documents.
pub const DOCUMENT_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];

/// A spreadsheet file found during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Absolute path of the document.
    pub path: PathBuf,
    /// Position in the parent directory's kept listing. Readable visible
    /// subdirectories take a position too, so documents may skip numbers.
    /// Restarts at 0 in every directory.
    pub dir_index: usize,
    /// Run-wide, monotonically increasing id.
    pub file_id: usize,
}

/// One directory whose entries are still being looked at.
struct Listing {
    dir: PathBuf,
    /// Canonical path, used to stop symlink loops.
    real: PathBuf,
    entries: vec::IntoIter<DirEntry>,
    /// Kept entries in listing order: `Some` for documents, `None` for
    /// readable subdirectories.
    kept: Vec<Option<PathBuf>>,
}

/// Lazily enumerates candidate documents below a root directory.
///
/// Every subdirectory is fully walked as soon as the listing reaches it, and
/// a directory's own documents are yielded only once its listing is done. So
/// the documents of a subtree always come before those of the directory
/// holding it. Hidden entries (names starting with `.`) are neither yielded
/// nor descended into. Unreadable directories are logged and contribute no
/// files; the walk carries on with their siblings.
pub struct DirectoryWalker {
    stack: Vec<Listing>,
    ready: VecDeque<DocumentRef>,
    excluded: Vec<PathBuf>,
    next_id: usize,
}

impl DirectoryWalker {
    /// Creates a walker rooted at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            stack: list_dir(root).into_iter().collect(),
            ready: VecDeque::new(),
            excluded: Vec::new(),
            next_id: 0,
        }
    }

    /// Skips `path` if the walk reaches it, e.g. the run's own report file.
    /// An excluded file takes no position in its directory.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    fn keep(&mut self, entry: Option<PathBuf>) {
        if let Some(top) = self.stack.last_mut() {
            top.kept.push(entry);
        }
    }

    fn finish(&mut self, listing: Listing) {
        debug!("Listed {} entries in {}", listing.kept.len(), listing.dir.display());
        for (dir_index, path) in listing.kept.into_iter().enumerate() {
            let Some(path) = path else { continue };
            let file_id = self.next_id;
            self.next_id += 1;
            debug!("Collected {} (dir index {})", path.display(), dir_index);
            self.ready.push_back(DocumentRef {
                path,
                dir_index,
                file_id,
            });
        }
    }
}

impl Iterator for DirectoryWalker {
    type Item = DocumentRef;

    fn next(&mut self) -> Option<DocumentRef> {
        loop {
            if let Some(doc) = self.ready.pop_front() {
                return Some(doc);
            }

            let Some(entry) = self.stack.last_mut()?.entries.next() else {
                if let Some(listing) = self.stack.pop() {
                    self.finish(listing);
                }
                continue;
            };

            if entry.file_type().is_dir() {
                if let Some(child) = list_dir(entry.path()) {
                    if self.stack.iter().any(|open| open.real == child.real) {
                        warn!("Skipping directory loop at {}", entry.path().display());
                        continue;
                    }
                    self.keep(None);
                    self.stack.push(child);
                }
            } else if entry.file_type().is_file() && is_document(entry.path()) {
                if self.excluded.iter().any(|ex| ex == entry.path()) {
                    debug!("Skipping excluded file {}", entry.path().display());
                    continue;
                }
                self.keep(Some(entry.into_path()));
            }
        }
    }
}

/// Returns `true` if `path` has one of the [`DOCUMENT_EXTENSIONS`].
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|os| os.to_str())
        .map(|s| DOCUMENT_EXTENSIONS.contains(&s.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Reads the visible entries of `dir`, or `None` when it cannot be listed.
fn list_dir(dir: &Path) -> Option<Listing> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        match entry {
            Ok(entry) if !is_hidden(&entry) => entries.push(entry),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                return None;
            }
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!("Skipping unreadable entry {}: {}", path, e);
            }
        }
    }
    Some(Listing {
        dir: dir.to_path_buf(),
        real: fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()),
        entries: entries.into_iter(),
        kept: Vec::new(),
    })
}
