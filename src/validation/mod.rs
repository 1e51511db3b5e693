mod engine;
mod messages;
pub mod rules;

pub use engine::{RuleSet, Validation, ValidationBuilder};
pub use messages::{Message, MessageFn, MessageResolver, Messages};
pub use rules::{BoxedRuleFuture, RuleError, RuleFn, RuleResult};
