use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A build target could not be parsed or constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid build target '{target}': {reason}")]
pub struct InvalidTargetError {
  pub target: String,
  pub reason: String,
}

impl InvalidTargetError {
  fn new(target: &str, reason: &str) -> Self {
    Self {
      target: target.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// Identifies a build target: `[cell]//base/path:name[#flavor,...]`.
///
/// The canonical string form is computed once at construction. Equality,
/// hashing and ordering all go through it, which matches component-wise
/// equality because the canonical form is unambiguous (flavors are sorted).
#[derive(Clone)]
pub struct TargetId {
  cell: String,
  base_path: String,
  short_name: String,
  flavors: BTreeSet<String>,
  canonical: String,
}

impl TargetId {
  /// Build an unflavored target in the given cell (`""` for the default cell).
  pub fn new(cell: &str, base_path: &str, short_name: &str) -> Result<Self, InvalidTargetError> {
    Self::with_flavors(cell, base_path, short_name, BTreeSet::new())
  }

  pub fn with_flavors(
    cell: &str,
    base_path: &str,
    short_name: &str,
    flavors: BTreeSet<String>,
  ) -> Result<Self, InvalidTargetError> {
    let canonical = render(cell, base_path, short_name, &flavors);

    if cell.contains('/') || cell.contains(':') {
      return Err(InvalidTargetError::new(&canonical, "cell name cannot contain '/' or ':'"));
    }
    if base_path.starts_with('/') || base_path.ends_with('/') {
      return Err(InvalidTargetError::new(&canonical, "base path cannot start or end with '/'"));
    }
    if !base_path.is_empty() && base_path.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
      return Err(InvalidTargetError::new(
        &canonical,
        "base path cannot contain empty, '.' or '..' components",
      ));
    }
    if short_name.is_empty() {
      return Err(InvalidTargetError::new(&canonical, "target name cannot be empty"));
    }
    if short_name.contains(':') || short_name.contains('#') {
      return Err(InvalidTargetError::new(&canonical, "target name cannot contain ':' or '#'"));
    }
    if flavors.iter().any(|f| f.is_empty() || f.contains(',') || f.contains('#')) {
      return Err(InvalidTargetError::new(&canonical, "flavors must be non-empty and cannot contain ',' or '#'"));
    }

    Ok(Self {
      cell: cell.to_string(),
      base_path: base_path.to_string(),
      short_name: short_name.to_string(),
      flavors,
      canonical,
    })
  }

  pub fn cell(&self) -> &str {
    &self.cell
  }

  /// Package directory relative to the cell root, without the leading `//`.
  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  /// Package directory as a relative path (empty for the root package).
  pub fn base_path_buf(&self) -> PathBuf {
    PathBuf::from(&self.base_path)
  }

  pub fn short_name(&self) -> &str {
    &self.short_name
  }

  pub fn flavors(&self) -> &BTreeSet<String> {
    &self.flavors
  }

  pub fn is_flavored(&self) -> bool {
    !self.flavors.is_empty()
  }

  /// The canonical `cell//base/path:name#flavors` string.
  pub fn fully_qualified_name(&self) -> &str {
    &self.canonical
  }

  /// The same target with all flavors removed.
  pub fn unflavored(&self) -> TargetId {
    TargetId {
      cell: self.cell.clone(),
      base_path: self.base_path.clone(),
      short_name: self.short_name.clone(),
      flavors: BTreeSet::new(),
      canonical: render(&self.cell, &self.base_path, &self.short_name, &BTreeSet::new()),
    }
  }
}

fn render(cell: &str, base_path: &str, short_name: &str, flavors: &BTreeSet<String>) -> String {
  let mut out = format!("{}//{}:{}", cell, base_path, short_name);
  if !flavors.is_empty() {
    out.push('#');
    out.push_str(&flavors.iter().map(String::as_str).collect::<Vec<_>>().join(","));
  }
  out
}

impl FromStr for TargetId {
  type Err = InvalidTargetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let Some((cell, rest)) = s.split_once("//") else {
      return Err(InvalidTargetError::new(s, "expected '//' before the base path"));
    };
    let Some((base_path, name_and_flavors)) = rest.rsplit_once(':') else {
      return Err(InvalidTargetError::new(s, "expected ':' before the target name"));
    };

    let (short_name, flavors) = match name_and_flavors.split_once('#') {
      Some((name, flavor_list)) => {
        if flavor_list.is_empty() {
          return Err(InvalidTargetError::new(s, "empty flavor list after '#'"));
        }
        let flavors = flavor_list.split(',').map(str::to_string).collect();
        (name, flavors)
      }
      None => (name_and_flavors, BTreeSet::new()),
    };

    TargetId::with_flavors(cell, base_path, short_name, flavors).map_err(|e| InvalidTargetError::new(s, &e.reason))
  }
}

impl PartialEq for TargetId {
  fn eq(&self, other: &Self) -> bool {
    self.canonical == other.canonical
  }
}

impl Eq for TargetId {}

impl Hash for TargetId {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.canonical.hash(state);
  }
}

impl PartialOrd for TargetId {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for TargetId {
  fn cmp(&self, other: &Self) -> Ordering {
    self.canonical.cmp(&other.canonical)
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical)
  }
}

impl fmt::Debug for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TargetId({})", self.canonical)
  }
}

impl Serialize for TargetId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.canonical)
  }
}

impl<'de> Deserialize<'de> for TargetId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_default_cell() {
    let id: TargetId = "//java/com/example:lib".parse().unwrap();
    assert_eq!(id.cell(), "");
    assert_eq!(id.base_path(), "java/com/example");
    assert_eq!(id.short_name(), "lib");
    assert!(!id.is_flavored());
    assert_eq!(id.to_string(), "//java/com/example:lib");
  }

  #[test]
  fn parse_root_package() {
    let id: TargetId = "//:root".parse().unwrap();
    assert_eq!(id.base_path(), "");
    assert_eq!(id.base_path_buf(), PathBuf::new());
  }

  #[test]
  fn parse_cell_and_flavors() {
    let id: TargetId = "third_party//guava:guava#src,default".parse().unwrap();
    assert_eq!(id.cell(), "third_party");
    assert_eq!(id.flavors().len(), 2);
    // Flavors are rendered sorted.
    assert_eq!(id.fully_qualified_name(), "third_party//guava:guava#default,src");
    assert_eq!(id.unflavored().to_string(), "third_party//guava:guava");
  }

  #[test]
  fn flavor_order_does_not_affect_equality() {
    let a: TargetId = "//a:b#x,y".parse().unwrap();
    let b: TargetId = "//a:b#y,x".parse().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn ordering_follows_canonical_string() {
    let mut ids: Vec<TargetId> = ["//b:x", "//a/b:y", "//a:z", "cell//a:a"]
      .iter()
      .map(|s| s.parse().unwrap())
      .collect();
    ids.sort();
    let names: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
    assert_eq!(names, vec!["//a/b:y", "//a:z", "//b:x", "cell//a:a"]);
  }

  #[test]
  fn rejects_malformed_targets() {
    for bad in ["a:b", "//a", "//a:", "//a/:b", "///a:b", "//a/../b:c", "//a:b#", "//a:b#x,"] {
      assert!(bad.parse::<TargetId>().is_err(), "{} should not parse", bad);
    }
  }

  #[test]
  fn serde_uses_canonical_string() {
    let id: TargetId = "//a:b".parse().unwrap();
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"//a:b\"");
    let back: TargetId = serde_json::from_str("\"//a:b\"").unwrap();
    assert_eq!(back, id);
    assert!(serde_json::from_str::<TargetId>("\"nope\"").is_err());
  }
}
