use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An unrecognized rule type tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid build rule type: {0}")]
pub struct UnknownRuleType(pub String);

/// The kind of rule a target was declared with.
///
/// Closed set; the tag from the build file is resolved once when the graph is
/// loaded, so queries never dispatch on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleType {
  AndroidBinary,
  AndroidLibrary,
  AndroidResource,
  AppleBinary,
  AppleLibrary,
  AppleTest,
  CxxBinary,
  CxxLibrary,
  CxxTest,
  ExportFile,
  Filegroup,
  Genrule,
  GoBinary,
  GoLibrary,
  GoTest,
  JavaBinary,
  JavaLibrary,
  JavaTest,
  PrebuiltJar,
  PythonBinary,
  PythonLibrary,
  PythonTest,
  RemoteFile,
  RustBinary,
  RustLibrary,
  RustTest,
  ShBinary,
  ShTest,
  ZipFile,
}

impl RuleType {
  pub const ALL: &'static [RuleType] = &[
    RuleType::AndroidBinary,
    RuleType::AndroidLibrary,
    RuleType::AndroidResource,
    RuleType::AppleBinary,
    RuleType::AppleLibrary,
    RuleType::AppleTest,
    RuleType::CxxBinary,
    RuleType::CxxLibrary,
    RuleType::CxxTest,
    RuleType::ExportFile,
    RuleType::Filegroup,
    RuleType::Genrule,
    RuleType::GoBinary,
    RuleType::GoLibrary,
    RuleType::GoTest,
    RuleType::JavaBinary,
    RuleType::JavaLibrary,
    RuleType::JavaTest,
    RuleType::PrebuiltJar,
    RuleType::PythonBinary,
    RuleType::PythonLibrary,
    RuleType::PythonTest,
    RuleType::RemoteFile,
    RuleType::RustBinary,
    RuleType::RustLibrary,
    RuleType::RustTest,
    RuleType::ShBinary,
    RuleType::ShTest,
    RuleType::ZipFile,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      RuleType::AndroidBinary => "android_binary",
      RuleType::AndroidLibrary => "android_library",
      RuleType::AndroidResource => "android_resource",
      RuleType::AppleBinary => "apple_binary",
      RuleType::AppleLibrary => "apple_library",
      RuleType::AppleTest => "apple_test",
      RuleType::CxxBinary => "cxx_binary",
      RuleType::CxxLibrary => "cxx_library",
      RuleType::CxxTest => "cxx_test",
      RuleType::ExportFile => "export_file",
      RuleType::Filegroup => "filegroup",
      RuleType::Genrule => "genrule",
      RuleType::GoBinary => "go_binary",
      RuleType::GoLibrary => "go_library",
      RuleType::GoTest => "go_test",
      RuleType::JavaBinary => "java_binary",
      RuleType::JavaLibrary => "java_library",
      RuleType::JavaTest => "java_test",
      RuleType::PrebuiltJar => "prebuilt_jar",
      RuleType::PythonBinary => "python_binary",
      RuleType::PythonLibrary => "python_library",
      RuleType::PythonTest => "python_test",
      RuleType::RemoteFile => "remote_file",
      RuleType::RustBinary => "rust_binary",
      RuleType::RustLibrary => "rust_library",
      RuleType::RustTest => "rust_test",
      RuleType::ShBinary => "sh_binary",
      RuleType::ShTest => "sh_test",
      RuleType::ZipFile => "zip_file",
    }
  }

  /// Whether targets of this type are themselves tests.
  pub fn is_test(&self) -> bool {
    matches!(
      self,
      RuleType::AppleTest
        | RuleType::CxxTest
        | RuleType::GoTest
        | RuleType::JavaTest
        | RuleType::PythonTest
        | RuleType::RustTest
        | RuleType::ShTest
    )
  }
}

impl fmt::Display for RuleType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RuleType {
  type Err = UnknownRuleType;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    RuleType::ALL
      .iter()
      .copied()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| UnknownRuleType(s.to_string()))
  }
}

impl Serialize for RuleType {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for RuleType {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_tag_round_trips() {
    for ty in RuleType::ALL {
      assert_eq!(ty.as_str().parse::<RuleType>().unwrap(), *ty);
    }
  }

  #[test]
  fn unknown_tag_is_rejected() {
    let err = "java_libary".parse::<RuleType>().unwrap_err();
    assert_eq!(err.to_string(), "Invalid build rule type: java_libary");
  }

  #[test]
  fn test_rules_are_flagged() {
    assert!(RuleType::JavaTest.is_test());
    assert!(RuleType::ShTest.is_test());
    assert!(!RuleType::JavaLibrary.is_test());
    assert!(!RuleType::Genrule.is_test());
  }
}
