//! Build targets.
//!
//! A target is one rule instance declared in a build file. Each target is
//! addressed by a [`TargetId`], tagged with a [`RuleType`] and carried through
//! the engine as an immutable [`TargetNode`].

mod id;
mod node;
mod rule_type;

pub use id::{InvalidTargetError, TargetId};
pub use node::TargetNode;
pub use rule_type::{RuleType, UnknownRuleType};
