//! JSON manifest form of a parsed target graph.
//!
//! ```json
//! {
//!   "targets": [
//!     {
//!       "name": "//java/com/example:lib",
//!       "type": "java_library",
//!       "deps": ["//third_party:guava"],
//!       "parse_deps": [],
//!       "tests": ["//javatests/com/example:lib-test"],
//!       "inputs": ["java/com/example/Lib.java"],
//!       "attributes": { "visibility": ["PUBLIC"] }
//!     }
//!   ]
//! }
//! ```
//!
//! `parse_deps` lists only the extra parse-time dependencies; `deps` are
//! always included in the parse dependencies.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{GraphError, TargetGraph};
use crate::target::{RuleType, TargetId, TargetNode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphManifest {
  pub targets: Vec<TargetDecl>,
}

/// One target as written in the manifest. Names and rule types stay raw
/// strings until the graph is built, so a bad entry is reported as an
/// invalid target or unknown rule type rather than a JSON error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDecl {
  pub name: String,
  #[serde(rename = "type")]
  pub rule_type: String,
  #[serde(default)]
  pub deps: BTreeSet<String>,
  #[serde(default)]
  pub parse_deps: BTreeSet<String>,
  #[serde(default)]
  pub tests: BTreeSet<String>,
  #[serde(default)]
  pub inputs: BTreeSet<PathBuf>,
  #[serde(default)]
  pub attributes: BTreeMap<String, serde_json::Value>,
}

fn parse_ids(raw: BTreeSet<String>) -> Result<Vec<TargetId>, GraphError> {
  raw.iter().map(|s| s.parse::<TargetId>().map_err(GraphError::from)).collect()
}

impl TryFrom<TargetDecl> for TargetNode {
  type Error = GraphError;

  fn try_from(decl: TargetDecl) -> Result<Self, Self::Error> {
    let id: TargetId = decl.name.parse()?;
    let rule_type: RuleType = decl.rule_type.parse()?;

    let mut node = TargetNode::new(id, rule_type)
      .with_build_deps(parse_ids(decl.deps)?)
      .with_parse_deps(parse_ids(decl.parse_deps)?)
      .with_tests(parse_ids(decl.tests)?)
      .with_inputs(decl.inputs);
    node.attributes = decl.attributes;
    Ok(node)
  }
}

impl GraphManifest {
  pub fn from_json(json: &str) -> Result<Self, GraphError> {
    serde_json::from_str(json).map_err(|e| GraphError::Manifest {
      path: "<inline>".to_string(),
      message: e.to_string(),
    })
  }

  pub fn load(path: &Path) -> Result<Self, GraphError> {
    let manifest_err = |message: String| GraphError::Manifest {
      path: path.display().to_string(),
      message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| manifest_err(e.to_string()))?;
    let manifest: GraphManifest = serde_json::from_str(&content).map_err(|e| manifest_err(e.to_string()))?;

    info!(path = %path.display(), targets = manifest.targets.len(), "loaded graph manifest");
    Ok(manifest)
  }

  pub fn into_graph(self) -> Result<TargetGraph, GraphError> {
    let nodes = self
      .targets
      .into_iter()
      .map(TargetNode::try_from)
      .collect::<Result<Vec<_>, _>>()?;
    TargetGraph::new(nodes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::UnknownRuleType;
  use tempfile::TempDir;

  const MANIFEST: &str = r#"{
    "targets": [
      {
        "name": "//app:app",
        "type": "java_binary",
        "deps": ["//lib:lib"],
        "inputs": ["app/Main.java"]
      },
      {
        "name": "//lib:lib",
        "type": "java_library",
        "parse_deps": ["//tools:gen"],
        "tests": ["//lib:lib-test"],
        "attributes": { "visibility": ["PUBLIC"] }
      },
      { "name": "//lib:lib-test", "type": "java_test", "deps": ["//lib:lib"] },
      { "name": "//tools:gen", "type": "genrule" }
    ]
  }"#;

  #[test]
  fn loads_inline_manifest() {
    let graph = GraphManifest::from_json(MANIFEST).unwrap().into_graph().unwrap();
    assert_eq!(graph.len(), 4);

    let lib = graph.node(&"//lib:lib".parse().unwrap()).unwrap();
    assert!(lib.build_deps.is_empty());
    assert_eq!(lib.parse_deps.len(), 1);
    assert!(lib.declares_tests());
    assert_eq!(lib.attributes["visibility"], serde_json::json!(["PUBLIC"]));

    let app = graph.node(&"//app:app".parse().unwrap()).unwrap();
    assert_eq!(app.rule_type, RuleType::JavaBinary);
    assert!(app.parse_deps.contains(&"//lib:lib".parse().unwrap()));
    assert!(app.inputs.contains(Path::new("app/Main.java")));
  }

  #[test]
  fn loads_manifest_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("graph.json");
    std::fs::write(&path, MANIFEST).unwrap();

    let graph = TargetGraph::load(&path).unwrap();
    assert_eq!(graph.len(), 4);
  }

  fn build(json: &str) -> Result<TargetGraph, GraphError> {
    GraphManifest::from_json(json)?.into_graph()
  }

  #[test]
  fn unknown_rule_type_is_reported() {
    let err = build(r#"{"targets":[{"name":"//a:a","type":"cobol_library"}]}"#).unwrap_err();
    assert_eq!(err, GraphError::UnknownRuleType(UnknownRuleType("cobol_library".to_string())));
    assert_eq!(err.to_string(), "Invalid build rule type: cobol_library");
  }

  #[test]
  fn malformed_target_is_reported() {
    let err = build(r#"{"targets":[{"name":"a:a","type":"genrule"}]}"#).unwrap_err();
    match err {
      GraphError::InvalidTarget(e) => assert_eq!(e.target, "a:a"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn malformed_dependency_is_reported() {
    let err = build(r#"{"targets":[{"name":"//a:a","type":"genrule","deps":["//b"]}]}"#).unwrap_err();
    assert!(matches!(err, GraphError::InvalidTarget(_)));
  }

  #[test]
  fn invalid_json_is_a_manifest_error() {
    let err = GraphManifest::from_json(r#"{"targets": [}"#).unwrap_err();
    assert!(matches!(err, GraphError::Manifest { .. }));
  }

  #[test]
  fn missing_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let err = GraphManifest::load(&temp.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, GraphError::Manifest { .. }));
  }
}
