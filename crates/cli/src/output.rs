//! CLI output formatting utilities.
//!
//! Query results go to stdout; diagnostics go to stderr with colored
//! status symbols when the terminal supports them.

use std::io::Write;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Write each name followed by a NUL byte, for `xargs -0`.
pub fn write_null_delimited<'a>(out: &mut impl Write, names: impl IntoIterator<Item = &'a str>) -> anyhow::Result<()> {
  for name in names {
    out.write_all(name.as_bytes()).context("Failed to write output")?;
    out.write_all(b"\0").context("Failed to write output")?;
  }
  out.flush().context("Failed to flush output")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_null_delimited() {
    let mut out = Vec::new();
    write_null_delimited(&mut out, ["//a:a", "//b:b"]).unwrap();
    assert_eq!(out, b"//a:a\0//b:b\0");
  }

  #[test]
  fn test_null_delimited_empty() {
    let mut out = Vec::new();
    write_null_delimited(&mut out, Vec::<&str>::new()).unwrap();
    assert!(out.is_empty());
  }
}
