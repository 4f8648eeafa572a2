//! Directory traversal.
//!
//! The walker yields absolute paths of regular files below a root, lazily and
//! without caching: every [`TreeWalker::walk`] re-reads the filesystem. A
//! directory's entries are read in full when the walk enters it and yielded in
//! file-name order, so a pass is deterministic and files created later in an
//! already-listed directory are not picked up by that pass.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use foldervault_common::{Error, Result};

/// Produces the file sequence for one folder root.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
}

impl TreeWalker {
    /// Create a walker for `root`. Nothing is read until [`walk`](Self::walk).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The root as given.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh traversal.
    ///
    /// # Errors
    /// - `NotFound` if the root does not exist
    /// - `InvalidInput` if the root is not a directory
    /// - `Io` if the root cannot be read
    pub fn walk(&self) -> Result<FileWalk> {
        let root = std::fs::canonicalize(&self.root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("Folder not found: {}", self.root.display()))
            }
            _ => Error::Io(e),
        })?;

        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        // An unreadable root fails the walk up front.
        std::fs::read_dir(&root)?;

        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();

        Ok(FileWalk { inner })
    }

    /// Materialize one full traversal and count its files.
    ///
    /// The count can go stale if the tree changes before the next walk.
    pub fn count(&self) -> Result<usize> {
        self.walk()?
            .try_fold(0usize, |count, entry| entry.map(|_| count + 1))
    }
}

/// Lazy sequence of regular-file paths.
pub struct FileWalk {
    inner: walkdir::IntoIter,
}

impl Iterator for FileWalk {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) if entry.file_type().is_file() => return Some(Ok(entry.into_path())),
                Ok(_) => continue,
                Err(e) => return Some(Err(Error::Io(e.into()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn collect(walker: &TreeWalker) -> Vec<PathBuf> {
        walker.walk().unwrap().map(|p| p.unwrap()).collect()
    }

    #[test]
    fn test_walk_recurses_and_skips_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        touch(&root.join("b.txt"));
        touch(&root.join("a.txt"));
        touch(&root.join("nested/deeper/c.bin"));
        fs::create_dir_all(root.join("empty")).unwrap();

        let files = collect(&TreeWalker::new(&root));

        assert_eq!(
            files,
            vec![
                root.join("a.txt"),
                root.join("b.txt"),
                root.join("nested/deeper/c.bin"),
            ]
        );
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_walk_is_restartable() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one"));
        let walker = TreeWalker::new(dir.path());

        assert_eq!(walker.count().unwrap(), 1);
        touch(&dir.path().join("two"));
        assert_eq!(walker.count().unwrap(), 2);
    }

    #[test]
    fn test_relative_root_yields_absolute_paths() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("f"));

        let relative = dir.path().join(".");
        let files = collect(&TreeWalker::new(relative));
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_yielded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        touch(&root.join("real"));
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        assert_eq!(collect(&TreeWalker::new(&root)), vec![root.join("real")]);
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let walker = TreeWalker::new(dir.path().join("missing"));
        assert!(matches!(walker.walk(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_root_is_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        touch(&file);
        assert!(matches!(
            TreeWalker::new(&file).walk(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_walk_advances_across_threads() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<FileWalk>();

        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        touch(&root.join("a"));
        touch(&root.join("sub/b"));

        // Each step runs on a fresh thread, as on the blocking pool.
        let mut walk = TreeWalker::new(&root).walk().unwrap();
        let mut seen = Vec::new();
        loop {
            let (rest, entry) = std::thread::spawn(move || {
                let entry = walk.next();
                (walk, entry)
            })
            .join()
            .unwrap();
            walk = rest;
            match entry {
                Some(path) => seen.push(path.unwrap()),
                None => break,
            }
        }
        assert_eq!(seen, vec![root.join("a"), root.join("sub/b")]);
    }
}
