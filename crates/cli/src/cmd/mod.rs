mod targets;

pub use targets::{TargetsArgs, cmd_targets};
