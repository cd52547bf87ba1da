use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Referenced-file arguments split by whether they resolve under the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedFiles {
  /// Existing paths under the project root, relative to it.
  pub under_root: BTreeSet<PathBuf>,
  /// Paths that do not exist or resolve outside the project root, as given.
  pub outside_or_missing: BTreeSet<PathBuf>,
}

impl ReferencedFiles {
  /// Partition raw path arguments against `root`.
  ///
  /// Relative paths are resolved against `root`. Both sides are
  /// canonicalized so symlinked roots compare correctly.
  pub fn partition<P: AsRef<Path>>(root: &Path, paths: impl IntoIterator<Item = P>) -> Self {
    let canonical_root = match dunce::canonicalize(root) {
      Ok(p) => p,
      Err(e) => {
        warn!(root = %root.display(), error = %e, "cannot canonicalize project root");
        root.to_path_buf()
      }
    };

    let mut files = ReferencedFiles::default();
    for raw in paths {
      let raw = raw.as_ref();
      let absolute = if raw.is_absolute() {
        raw.to_path_buf()
      } else {
        canonical_root.join(raw)
      };

      let relative = dunce::canonicalize(&absolute)
        .ok()
        .and_then(|p| p.strip_prefix(&canonical_root).ok().map(Path::to_path_buf));

      match relative {
        Some(rel) => {
          debug!(path = %rel.display(), "referenced file under root");
          files.under_root.insert(rel);
        }
        None => {
          debug!(path = %raw.display(), "referenced file outside root or missing");
          files.outside_or_missing.insert(raw.to_path_buf());
        }
      }
    }
    files
  }

  pub fn is_empty(&self) -> bool {
    self.under_root.is_empty() && self.outside_or_missing.is_empty()
  }

  /// Files were referenced but none of them is usable.
  pub fn all_outside_root(&self) -> bool {
    !self.outside_or_missing.is_empty() && self.under_root.is_empty()
  }
}
