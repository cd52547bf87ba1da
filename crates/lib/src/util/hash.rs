//! Hashing primitives shared by rule keys and target hashes.
//!
//! This module provides:
//! - `Sha256Sum`: a fixed-size 32-byte SHA-256 digest rendered as lowercase hex
//! - `DigestBuilder`: a field-framed hasher for canonical, alias-free encodings
//! - `hash_directory()`: deterministic directory hashing
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// A 32-byte SHA-256 digest.
///
/// # Format
///
/// Displayed and serialized as a lowercase hexadecimal string (64 characters).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Sum(pub [u8; 32]);

impl Sha256Sum {
  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  pub fn to_hex(&self) -> String {
    hex::encode(self.0)
  }
}

impl fmt::Display for Sha256Sum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl fmt::Debug for Sha256Sum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Sha256Sum({})", self.to_hex())
  }
}

impl FromStr for Sha256Sum {
  type Err = hex::FromHexError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(s, &mut bytes)?;
    Ok(Sha256Sum(bytes))
  }
}

impl Serialize for Sha256Sum {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_hex())
  }
}

impl<'de> Deserialize<'de> for Sha256Sum {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Incremental hasher that frames every field as `tag | len | bytes`.
///
/// Framing keeps adjacent fields from aliasing: `("ab", "c")` and `("a", "bc")`
/// produce different digests. The domain string separates digest namespaces
/// (rule keys vs target hashes) so equal inputs never collide across them.
pub struct DigestBuilder {
  hasher: Sha256,
}

impl DigestBuilder {
  pub fn new(domain: &str) -> Self {
    let mut builder = Self { hasher: Sha256::new() };
    builder.put_frame(b"domain", domain.as_bytes());
    builder
  }

  fn put_frame(&mut self, tag: &[u8], bytes: &[u8]) {
    self.hasher.update((tag.len() as u64).to_le_bytes());
    self.hasher.update(tag);
    self.hasher.update((bytes.len() as u64).to_le_bytes());
    self.hasher.update(bytes);
  }

  pub fn bytes(&mut self, tag: &str, bytes: &[u8]) -> &mut Self {
    self.put_frame(tag.as_bytes(), bytes);
    self
  }

  pub fn str(&mut self, tag: &str, value: &str) -> &mut Self {
    self.bytes(tag, value.as_bytes())
  }

  pub fn digest(&mut self, tag: &str, value: &Sha256Sum) -> &mut Self {
    self.bytes(tag, value.as_bytes())
  }

  /// Frame a JSON value in compact form. Object keys serialize sorted.
  pub fn json(&mut self, tag: &str, value: &serde_json::Value) -> &mut Self {
    self.str(tag, &value.to_string())
  }

  pub fn finish(self) -> Sha256Sum {
    Sha256Sum(self.hasher.finalize().into())
  }
}

/// Error while hashing file-system content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Compute a deterministic hash of a directory's contents.
///
/// The hash covers file contents, directory structure and symlink targets,
/// never metadata such as timestamps or permissions. Entries are sorted by
/// relative path.
pub fn hash_directory(path: &Path) -> Result<Sha256Sum, FileHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|e| FileHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_line = if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| FileHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()))
    } else if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else {
      // Sockets, devices and the like carry no content.
      continue;
    };

    entries.push((rel_path, entry_line));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, line) in entries {
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(Sha256Sum(hasher.finalize().into()))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<Sha256Sum, FileHashError> {
  let read_error = |e: std::io::Error| FileHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_error)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_error)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(Sha256Sum(hasher.finalize().into()))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Sha256Sum {
  Sha256Sum(Sha256::digest(data).into())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn sha256sum_hex_roundtrip() {
    let sum = hash_bytes(b"hello world");
    assert_eq!(
      sum.to_hex(),
      "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    let parsed: Sha256Sum = sum.to_hex().parse().unwrap();
    assert_eq!(parsed, sum);
  }

  #[test]
  fn sha256sum_serializes_as_hex_string() {
    let sum = hash_bytes(b"x");
    let json = serde_json::to_string(&sum).unwrap();
    assert_eq!(json, format!("\"{}\"", sum.to_hex()));
  }

  #[test]
  fn builder_frames_fields() {
    let mut a = DigestBuilder::new("test");
    a.str("f", "ab").str("f", "c");
    let mut b = DigestBuilder::new("test");
    b.str("f", "a").str("f", "bc");
    assert_ne!(a.finish(), b.finish());
  }

  #[test]
  fn builder_json_ignores_key_order() {
    let x: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": [true, null]}"#).unwrap();
    let y: serde_json::Value = serde_json::from_str(r#"{"a": [true, null], "b": 1}"#).unwrap();

    let mut a = DigestBuilder::new("test");
    a.json("attr", &x);
    let mut b = DigestBuilder::new("test");
    b.json("attr", &y);
    assert_eq!(a.finish(), b.finish());
  }

  #[test]
  fn builder_domains_do_not_collide() {
    let mut a = DigestBuilder::new("rule-key");
    a.str("name", "//a:b");
    let mut b = DigestBuilder::new("target-hash");
    b.str("name", "//a:b");
    assert_ne!(a.finish(), b.finish());
  }

  #[test]
  fn hash_directory_is_deterministic() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.txt"), "content a").unwrap();
    fs::write(temp.path().join("b.txt"), "content b").unwrap();

    let hash1 = hash_directory(temp.path()).unwrap();
    let hash2 = hash_directory(temp.path()).unwrap();
    assert_eq!(hash1, hash2);
  }

  #[test]
  fn hash_directory_changes_with_content() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "original").unwrap();
    let hash1 = hash_directory(temp.path()).unwrap();

    fs::write(temp.path().join("file.txt"), "modified").unwrap();
    let hash2 = hash_directory(temp.path()).unwrap();

    assert_ne!(hash1, hash2);
  }

  #[test]
  fn hash_directory_covers_nested_entries() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "content").unwrap();
    let hash1 = hash_directory(temp.path()).unwrap();

    fs::create_dir(temp.path().join("nested")).unwrap();
    fs::write(temp.path().join("nested/inner.txt"), "ref").unwrap();
    let hash2 = hash_directory(temp.path()).unwrap();

    assert_ne!(hash1, hash2);
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "hello world").unwrap();

    assert_eq!(hash_file(&file_path).unwrap(), hash_bytes(b"hello world"));
  }

  #[test]
  fn hash_file_missing_is_error() {
    let temp = tempdir().unwrap();
    let err = hash_file(&temp.path().join("nope")).unwrap_err();
    assert!(matches!(err, FileHashError::ReadFile { .. }));
  }
}
