use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;
use walkdir::WalkDir;

use crate::config::{FileHashMode, QueryConfig};
use crate::util::hash::{DigestBuilder, FileHashError, Sha256Sum, hash_directory, hash_file};

/// Provides the hash of an input path.
///
/// Paths are relative to the project root. Implementations must be
/// deterministic for a fixed file-system state.
pub trait FileHashLoader: Send + Sync {
  fn hash(&self, path: &Path) -> Result<Sha256Sum, FileHashError>;
}

/// Hashes file contents, or the full contents of a directory tree.
#[derive(Debug, Clone)]
pub struct ContentFileHashLoader {
  root: PathBuf,
}

impl ContentFileHashLoader {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl FileHashLoader for ContentFileHashLoader {
  fn hash(&self, path: &Path) -> Result<Sha256Sum, FileHashError> {
    let full = self.root.join(path);
    if full.is_dir() {
      hash_directory(&full)
    } else {
      hash_file(&full)
    }
  }
}

/// Hashes path names only; file contents are never read.
///
/// Paths listed as modified (or containing a modified path) hash
/// differently, so callers can signal changes without touching content.
#[derive(Debug, Clone)]
pub struct PathFileHashLoader {
  root: PathBuf,
  modified: BTreeSet<PathBuf>,
}

impl PathFileHashLoader {
  pub fn new(root: impl Into<PathBuf>, modified: BTreeSet<PathBuf>) -> Self {
    Self {
      root: root.into(),
      modified,
    }
  }

  fn put_path(&self, builder: &mut DigestBuilder, path: &Path) {
    builder.str("path", &path.to_string_lossy().replace('\\', "/"));
    if self.modified.contains(path) {
      builder.str("modified", "1");
    }
  }
}

impl FileHashLoader for PathFileHashLoader {
  fn hash(&self, path: &Path) -> Result<Sha256Sum, FileHashError> {
    let mut builder = DigestBuilder::new("keyway.path");
    let full = self.root.join(path);

    if full.is_dir() {
      for entry in WalkDir::new(&full).sort_by_file_name() {
        let entry = entry.map_err(|e| FileHashError::WalkDir { message: e.to_string() })?;
        if entry.file_type().is_dir() {
          continue;
        }
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        self.put_path(&mut builder, relative);
      }
    } else {
      self.put_path(&mut builder, path);
    }

    Ok(builder.finish())
  }
}

/// Memoizes another loader per path, failures included.
pub struct CachedFileHashLoader {
  inner: Arc<dyn FileHashLoader>,
  cache: DashMap<PathBuf, Result<Sha256Sum, FileHashError>>,
}

impl CachedFileHashLoader {
  pub fn new(inner: Arc<dyn FileHashLoader>) -> Self {
    Self {
      inner,
      cache: DashMap::new(),
    }
  }
}

impl FileHashLoader for CachedFileHashLoader {
  fn hash(&self, path: &Path) -> Result<Sha256Sum, FileHashError> {
    if let Some(hit) = self.cache.get(path) {
      trace!(path = %path.display(), "file hash cache hit");
      return hit.value().clone();
    }
    // Hash outside the shard lock; a racing insert for the same path wins.
    let computed = self.inner.hash(path);
    self.cache.entry(path.to_path_buf()).or_insert(computed).value().clone()
  }
}

/// Build the loader selected by `config`, rooted at `root`.
pub fn loader_for(config: &QueryConfig, root: &Path) -> Arc<dyn FileHashLoader> {
  let inner: Arc<dyn FileHashLoader> = match config.file_hash_mode {
    FileHashMode::PathsAndContents => Arc::new(ContentFileHashLoader::new(root)),
    FileHashMode::PathsOnly => Arc::new(PathFileHashLoader::new(root, config.modified_paths.clone())),
  };
  Arc::new(CachedFileHashLoader::new(inner))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  #[test]
  fn content_loader_tracks_content() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "one").unwrap();
    let loader = ContentFileHashLoader::new(temp.path());

    let before = loader.hash(Path::new("a.txt")).unwrap();
    fs::write(temp.path().join("a.txt"), "two").unwrap();
    let after = loader.hash(Path::new("a.txt")).unwrap();
    assert_ne!(before, after);
  }

  #[test]
  fn content_loader_hashes_directories() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("res/values")).unwrap();
    fs::write(temp.path().join("res/values/strings.xml"), "<resources/>").unwrap();
    let loader = ContentFileHashLoader::new(temp.path());

    let before = loader.hash(Path::new("res")).unwrap();
    fs::write(temp.path().join("res/values/strings.xml"), "<resources></resources>").unwrap();
    assert_ne!(before, loader.hash(Path::new("res")).unwrap());
  }

  #[test]
  fn content_loader_missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let loader = ContentFileHashLoader::new(temp.path());
    assert!(matches!(
      loader.hash(Path::new("absent.txt")),
      Err(FileHashError::ReadFile { .. })
    ));
  }

  #[test]
  fn path_loader_ignores_content() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "one").unwrap();
    let loader = PathFileHashLoader::new(temp.path(), BTreeSet::new());

    let before = loader.hash(Path::new("a.txt")).unwrap();
    fs::write(temp.path().join("a.txt"), "two").unwrap();
    assert_eq!(before, loader.hash(Path::new("a.txt")).unwrap());
    assert_ne!(before, loader.hash(Path::new("b.txt")).unwrap());
  }

  #[test]
  fn path_loader_marks_modified_paths() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("dir")).unwrap();
    fs::write(temp.path().join("dir/x.txt"), "x").unwrap();

    let clean = PathFileHashLoader::new(temp.path(), BTreeSet::new());
    let modified: BTreeSet<PathBuf> = [PathBuf::from("dir/x.txt")].into_iter().collect();
    let dirty = PathFileHashLoader::new(temp.path(), modified);

    assert_ne!(
      clean.hash(Path::new("dir/x.txt")).unwrap(),
      dirty.hash(Path::new("dir/x.txt")).unwrap()
    );
    // A modified file also changes the hash of its enclosing directory input.
    assert_ne!(clean.hash(Path::new("dir")).unwrap(), dirty.hash(Path::new("dir")).unwrap());
  }

  struct CountingLoader(AtomicUsize);

  impl FileHashLoader for CountingLoader {
    fn hash(&self, path: &Path) -> Result<Sha256Sum, FileHashError> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(crate::util::hash::hash_bytes(path.to_string_lossy().as_bytes()))
    }
  }

  #[test]
  fn cached_loader_hashes_each_path_once() {
    let counting = Arc::new(CountingLoader(AtomicUsize::new(0)));
    let cached = CachedFileHashLoader::new(counting.clone());

    let first = cached.hash(Path::new("a")).unwrap();
    assert_eq!(first, cached.hash(Path::new("a")).unwrap());
    cached.hash(Path::new("b")).unwrap();
    assert_eq!(counting.0.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn loader_for_respects_mode() {
    let temp = TempDir::new().unwrap();
    let config = QueryConfig {
      file_hash_mode: FileHashMode::PathsOnly,
      ..Default::default()
    };
    // Path-only hashing succeeds for files that do not exist.
    assert!(loader_for(&config, temp.path()).hash(Path::new("absent.txt")).is_ok());
    assert!(
      loader_for(&QueryConfig::default(), temp.path())
        .hash(Path::new("absent.txt"))
        .is_err()
    );
  }
}
