use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Walks the documents sharing a directory, in name order, wrapping at both ends.
#[derive(Debug, Clone)]
pub struct DirectoryChain {
    extension: String,
}

impl Default for DirectoryChain {
    fn default() -> Self {
        Self::new("pdf")
    }
}

impl DirectoryChain {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    pub fn siblings(&self, path: &Path) -> Vec<PathBuf> {
        let resolved = resolve(path);
        let Some(parent) = resolved.parent() else {
            return Vec::new();
        };
        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(?err, dir = %parent.display(), "cannot list sibling documents");
                return Vec::new();
            }
        };

        let mut siblings: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|candidate| candidate.is_file() && self.matches(candidate))
            .map(|candidate| candidate.canonicalize().unwrap_or(candidate))
            .collect();
        siblings.sort();
        siblings.dedup();
        siblings
    }

    pub fn next(&self, path: &Path) -> Option<PathBuf> {
        self.step(path, Direction::Next)
    }

    pub fn previous(&self, path: &Path) -> Option<PathBuf> {
        self.step(path, Direction::Previous)
    }

    fn step(&self, path: &Path, direction: Direction) -> Option<PathBuf> {
        let siblings = self.siblings(path);
        let resolved = resolve(path);
        let position = siblings.iter().position(|candidate| *candidate == resolved)?;
        let len = siblings.len();
        let target = match direction {
            Direction::Next => (position + 1) % len,
            Direction::Previous => (position + len - 1) % len,
        };
        siblings.into_iter().nth(target)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Next,
    Previous,
}

/// Canonical form of `path`, keeping the directory canonical even when the
/// file itself cannot be resolved.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|dir| dir.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"dummy").unwrap();
        path
    }

    #[test]
    fn siblings_are_filtered_and_sorted() {
        let dir = tempdir().unwrap();
        let b = touch(dir.path(), "b.pdf");
        touch(dir.path(), "a.PDF");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("c.pdf")).unwrap();

        let names: Vec<String> = DirectoryChain::default()
            .siblings(&b)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn next_and_previous_wrap_around() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), "a.pdf");
        let b = touch(dir.path(), "b.pdf");
        let c = touch(dir.path(), "c.pdf");
        let chain = DirectoryChain::new("pdf");

        let name = |p: Option<PathBuf>| p.unwrap().file_name().unwrap().to_owned();
        assert_eq!(name(chain.next(&a)), "b.pdf");
        assert_eq!(name(chain.next(&c)), "a.pdf");
        assert_eq!(name(chain.previous(&a)), "c.pdf");
        assert_eq!(name(chain.previous(&b)), "a.pdf");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_documents_resolve_to_their_targets() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), "a.pdf");
        touch(dir.path(), "b.pdf");
        let link = dir.path().join("c.pdf");
        std::os::unix::fs::symlink(&a, &link).unwrap();
        let chain = DirectoryChain::default();

        assert_eq!(chain.siblings(&a).len(), 2);
        let name = |p: Option<PathBuf>| p.unwrap().file_name().unwrap().to_owned();
        assert_eq!(name(chain.next(&link)), "b.pdf");
        assert_eq!(name(chain.previous(&a)), "b.pdf");
    }

    #[test]
    fn unknown_document_has_no_neighbours() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.pdf");
        let outsider = dir.path().join("missing.pdf");
        let chain = DirectoryChain::default();
        assert!(chain.next(&outsider).is_none());
        assert!(chain.previous(&dir.path().join("nowhere").join("x.pdf")).is_none());
    }
}
