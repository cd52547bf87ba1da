//! `keyway targets`: print the targets affected by a change.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use petgraph::graph::DiGraph;
use serde_json::{Map, Value};
use tracing::{debug, info};

use keyway_lib::config::{DEFAULT_BUILD_FILE_NAME, FileHashMode, QueryConfig};
use keyway_lib::graph::{DepKind, TargetGraph};
use keyway_lib::query::{MatchFilter, ReferencedFiles, select_matching_targets};
use keyway_lib::show::{ShowMode, TargetResult, compute_show_results};
use keyway_lib::target::{RuleType, TargetId, TargetNode};

use crate::output::{print_json, print_warning, write_null_delimited};

#[derive(Args, Debug)]
pub struct TargetsArgs {
  /// Target graph manifest (JSON)
  #[arg(long, value_name = "FILE")]
  pub graph: PathBuf,

  /// Only report these targets
  #[arg(value_name = "TARGETS")]
  pub targets: Vec<String>,

  /// Project root that referenced files and inputs are resolved against
  #[arg(long, default_value = ".")]
  pub root: PathBuf,

  /// Report targets owning (or depending on owners of) this file
  #[arg(long = "referenced-file", value_name = "PATH")]
  pub referenced_files: Vec<PathBuf>,

  /// Only report targets of this rule type
  #[arg(long = "type", value_name = "RULE_TYPE")]
  pub rule_types: Vec<RuleType>,

  /// Treat tests as dependents of the targets they test
  #[arg(long)]
  pub detect_test_changes: bool,

  /// Print the rule key of each target
  #[arg(long)]
  pub show_rulekey: bool,

  /// Print rule keys for all transitive build dependencies too
  #[arg(long)]
  pub show_transitive_rulekeys: bool,

  /// Print the target hash of each target
  #[arg(long)]
  pub show_target_hash: bool,

  /// How input files contribute to target hashes (PATHS_AND_CONTENTS or PATHS_ONLY)
  #[arg(long, default_value_t = FileHashMode::PathsAndContents)]
  pub target_hash_file_mode: FileHashMode,

  /// Paths to treat as modified when hashing PATHS_ONLY
  #[arg(long = "target-hash-modified-paths", value_name = "PATH")]
  pub modified_paths: Vec<PathBuf>,

  /// Name of the build file in each package
  #[arg(long, default_value = DEFAULT_BUILD_FILE_NAME)]
  pub build_file_name: String,

  /// Maximum number of targets hashed in parallel
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Print results as JSON
  #[arg(long, conflicts_with_all = ["print0", "dot"])]
  pub json: bool,

  /// Print target names separated by NUL bytes
  #[arg(long, conflicts_with = "dot")]
  pub print0: bool,

  /// Print the dependency graph of the results in DOT format
  #[arg(long)]
  pub dot: bool,
}

impl TargetsArgs {
  fn config(&self) -> QueryConfig {
    let mut config = QueryConfig {
      build_file_name: self.build_file_name.clone(),
      detect_test_changes: self.detect_test_changes,
      file_hash_mode: self.target_hash_file_mode,
      modified_paths: self
        .modified_paths
        .iter()
        .map(|p| p.strip_prefix(&self.root).unwrap_or(p).to_path_buf())
        .collect(),
      ..Default::default()
    };
    if let Some(jobs) = self.jobs {
      config.parallelism = jobs;
    }
    config
  }
}

/// Execute the targets command.
pub fn cmd_targets(args: TargetsArgs) -> Result<()> {
  let mode = ShowMode::from_flags(args.show_rulekey, args.show_transitive_rulekeys, args.show_target_hash)?;
  if args.dot && !matches!(mode, ShowMode::RuleKeys { .. }) {
    bail!("--dot requires --show-rulekey or --show-transitive-rulekeys");
  }

  let config = args.config();
  let graph = TargetGraph::load(&args.graph)
    .with_context(|| format!("Failed to load target graph from {}", args.graph.display()))?;
  info!(targets = graph.len(), "loaded target graph");

  let referenced = if args.referenced_files.is_empty() {
    None
  } else {
    let files = ReferencedFiles::partition(&args.root, &args.referenced_files);
    for path in &files.outside_or_missing {
      print_warning(&format!(
        "Ignoring {}: not found or outside the project root",
        path.display()
      ));
    }
    Some(files)
  };

  let mut explicit = Vec::new();
  for raw in &args.targets {
    let id: TargetId = raw.parse().with_context(|| format!("Invalid target '{}'", raw))?;
    graph.node(&id)?;
    explicit.push(id);
  }

  let filter = MatchFilter::new()
    .with_targets(explicit)
    .with_rule_types(args.rule_types.iter().copied());
  let matching: Vec<TargetId> = select_matching_targets(&graph, referenced.as_ref(), &filter, &config)?
    .into_values()
    .map(|node| node.id.clone())
    .collect();
  debug!(matching = matching.len(), "matching targets");

  let graph = Arc::new(graph);
  let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
  let results = runtime.block_on(compute_show_results(
    graph.clone(),
    &matching,
    mode,
    &config,
    &args.root,
  ))?;

  if args.dot {
    let ids: BTreeSet<TargetId> = results.keys().cloned().collect();
    let deps = graph.dependency_graph(&ids, DepKind::Build)?;
    print!("{}", render_dot(&deps, &results));
  } else if args.json {
    let mut entries = Vec::with_capacity(results.len());
    for (id, result) in &results {
      entries.push(json_entry(graph.node(id)?, result));
    }
    print_json(&entries)?;
  } else if args.print0 {
    let mut stdout = std::io::stdout().lock();
    write_null_delimited(&mut stdout, results.keys().map(TargetId::fully_qualified_name))?;
  } else {
    let mut stdout = std::io::stdout().lock();
    for (id, result) in &results {
      writeln!(stdout, "{}", plain_line(id, result)).context("Failed to write output")?;
    }
  }

  Ok(())
}

fn plain_line(id: &TargetId, result: &TargetResult) -> String {
  let name = id.fully_qualified_name();
  match (&result.rule_key, &result.target_hash) {
    (Some(key), _) => format!("{} {}", name, key),
    (None, Some(hash)) => format!("{} {}", name, hash),
    (None, None) => name.to_string(),
  }
}

/// The node's attributes plus the computed `buck.*` fields.
fn json_entry(node: &TargetNode, result: &TargetResult) -> Value {
  let mut map: Map<String, Value> = node.attributes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
  map.insert(
    "fully_qualified_name".to_string(),
    Value::String(node.id.fully_qualified_name().to_string()),
  );
  map.insert("buck.ruleType".to_string(), Value::String(result.rule_type.to_string()));
  if let Some(key) = &result.rule_key {
    map.insert("buck.ruleKey".to_string(), Value::String(key.to_string()));
  }
  if let Some(hash) = &result.target_hash {
    map.insert("buck.targetHash".to_string(), Value::String(hash.to_string()));
  }
  Value::Object(map)
}

/// Render the dependency graph with each node labelled by its rule key.
fn render_dot(deps: &DiGraph<TargetId, ()>, results: &BTreeMap<TargetId, TargetResult>) -> String {
  let mut out = String::from("digraph targets {\n");
  for index in deps.node_indices() {
    let id = &deps[index];
    let _ = write!(out, "  {}", dot_quote(id.fully_qualified_name()));
    if let Some(key) = results.get(id).and_then(|r| r.rule_key.as_ref()) {
      let _ = write!(out, " [rule_key=\"{}\"]", key);
    }
    out.push_str(";\n");
  }
  for edge in deps.raw_edges() {
    let _ = writeln!(
      out,
      "  {} -> {};",
      dot_quote(deps[edge.source()].fully_qualified_name()),
      dot_quote(deps[edge.target()].fully_qualified_name())
    );
  }
  out.push_str("}\n");
  out
}

/// A DOT quoted identifier; `"` and `\` are escaped.
fn dot_quote(name: &str) -> String {
  let mut quoted = String::with_capacity(name.len() + 2);
  quoted.push('"');
  for c in name.chars() {
    if c == '"' || c == '\\' {
      quoted.push('\\');
    }
    quoted.push(c);
  }
  quoted.push('"');
  quoted
}

#[cfg(test)]
mod tests {
  use super::*;
  use keyway_lib::rulekey::RuleKey;
  use keyway_lib::util::hash::hash_bytes;

  fn id(s: &str) -> TargetId {
    s.parse().unwrap()
  }

  fn result(rule_type: RuleType, rule_key: Option<RuleKey>) -> TargetResult {
    TargetResult {
      rule_type,
      rule_key,
      target_hash: None,
    }
  }

  #[test]
  fn test_plain_line() {
    let plain = result(RuleType::JavaLibrary, None);
    assert_eq!(plain_line(&id("//a:a"), &plain), "//a:a");

    let key = RuleKey(hash_bytes(b"a"));
    let keyed = result(RuleType::JavaLibrary, Some(key));
    assert_eq!(plain_line(&id("//a:a"), &keyed), format!("//a:a {}", key));
  }

  #[test]
  fn test_json_entry_merges_attributes() {
    let node = TargetNode::new(id("//a:a"), RuleType::JavaLibrary).with_attribute("visibility", serde_json::json!(["PUBLIC"]));
    let entry = json_entry(&node, &result(RuleType::JavaLibrary, None));

    assert_eq!(entry["fully_qualified_name"], "//a:a");
    assert_eq!(entry["buck.ruleType"], "java_library");
    assert_eq!(entry["visibility"], serde_json::json!(["PUBLIC"]));
    assert!(entry.get("buck.ruleKey").is_none());
  }

  #[test]
  fn test_render_dot() {
    let graph = TargetGraph::new([
      TargetNode::new(id("//a:a"), RuleType::JavaBinary).with_build_deps([id("//b:b")]),
      TargetNode::new(id("//b:b"), RuleType::JavaLibrary),
    ])
    .unwrap();
    let ids: BTreeSet<TargetId> = [id("//a:a"), id("//b:b")].into_iter().collect();
    let deps = graph.dependency_graph(&ids, DepKind::Build).unwrap();

    let key = RuleKey(hash_bytes(b"b"));
    let mut results = BTreeMap::new();
    results.insert(id("//a:a"), result(RuleType::JavaBinary, None));
    results.insert(id("//b:b"), result(RuleType::JavaLibrary, Some(key)));

    let dot = render_dot(&deps, &results);
    assert!(dot.starts_with("digraph targets {\n"));
    assert!(dot.contains("  \"//a:a\";\n"));
    assert!(dot.contains(&format!("  \"//b:b\" [rule_key=\"{}\"];\n", key)));
    assert!(dot.contains("  \"//a:a\" -> \"//b:b\";\n"));
    assert!(dot.ends_with("}\n"));
  }

  #[test]
  fn test_render_dot_escapes_names() {
    let graph = TargetGraph::new([
      TargetNode::new(id(r#"//a"b:x"#), RuleType::Genrule).with_build_deps([id(r"//c\d:y")]),
      TargetNode::new(id(r"//c\d:y"), RuleType::Genrule),
    ])
    .unwrap();
    let ids: BTreeSet<TargetId> = [id(r#"//a"b:x"#), id(r"//c\d:y")].into_iter().collect();
    let deps = graph.dependency_graph(&ids, DepKind::Build).unwrap();

    let dot = render_dot(&deps, &BTreeMap::new());
    assert!(dot.contains(r#"  "//a\"b:x";"#));
    assert!(dot.contains(r#"  "//c\\d:y";"#));
    assert!(dot.contains(r#"  "//a\"b:x" -> "//c\\d:y";"#));
  }
}
