use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;

use super::messages::{Message, MessageResolver, Messages};
use super::rules::{
    EMAIL, FILE_SIZE, MAX, MAX_LENGTH, MIN, MIN_LENGTH, REQUIRED, RuleError, RuleFn, RuleResult,
    URL, async_rule, builtin_rules, sync_rule,
};
use crate::form::{FieldError, FormValues, Validate};
use crate::i18n::Translator;
use crate::value::Value;

/// Ordered rule name to parameter mapping. A `false` parameter disables the rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    rules: IndexMap<String, Value>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `rule`, keeping its original position when it was already present.
    pub fn rule(mut self, rule: impl Into<String>, param: impl Into<Value>) -> Self {
        self.rules.insert(rule.into(), param.into());
        self
    }

    pub fn required(self) -> Self {
        self.rule(REQUIRED, true)
    }

    pub fn email(self) -> Self {
        self.rule(EMAIL, true)
    }

    pub fn url(self) -> Self {
        self.rule(URL, true)
    }

    pub fn min_length(self, min: usize) -> Self {
        self.rule(MIN_LENGTH, min)
    }

    pub fn max_length(self, max: usize) -> Self {
        self.rule(MAX_LENGTH, max)
    }

    pub fn min(self, bound: impl Into<Value>) -> Self {
        self.rule(MIN, bound)
    }

    pub fn max(self, bound: impl Into<Value>) -> Self {
        self.rule(MAX, bound)
    }

    pub fn file_size(self, max_bytes: u64) -> Self {
        self.rule(FILE_SIZE, max_bytes)
    }

    pub fn disable(self, rule: impl Into<String>) -> Self {
        self.rule(rule, false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.rules.iter().map(|(rule, param)| (rule.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub struct ValidationBuilder {
    rules: IndexMap<String, RuleFn>,
    resolver: MessageResolver,
}

impl ValidationBuilder {
    pub fn rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value, &Value) -> RuleResult + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), sync_rule(rule));
        self
    }

    pub fn async_rule<F, Fut>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleResult> + Send + 'static,
    {
        self.rules.insert(name.into(), async_rule(rule));
        self
    }

    pub fn message(mut self, rule: impl Into<String>, message: impl Into<Message>) -> Self {
        self.resolver = self
            .resolver
            .with_messages(Messages::from([(rule.into(), message.into())]));
        self
    }

    pub fn build(self) -> Validation {
        Validation {
            rules: Arc::new(self.rules),
            resolver: Arc::new(self.resolver),
        }
    }
}

/// Runs rule-sets against values and resolves the first failure into a message.
#[derive(Clone)]
pub struct Validation {
    rules: Arc<IndexMap<String, RuleFn>>,
    resolver: Arc<MessageResolver>,
}

impl Validation {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self::builder(translator).build()
    }

    pub fn builder(translator: Arc<dyn Translator>) -> ValidationBuilder {
        ValidationBuilder {
            rules: builtin_rules()
                .into_iter()
                .map(|(name, rule)| (name.to_string(), rule))
                .collect(),
            resolver: MessageResolver::new(translator),
        }
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Evaluates enabled rules in order and stops at the first failure.
    ///
    /// Returns `Ok(None)` when every enabled rule passes. Rule configuration faults are
    /// returned as `Err` and never turned into a message.
    pub async fn apply_rules(
        &self,
        value: &Value,
        rules: &RuleSet,
        overrides: Option<&Messages>,
    ) -> Result<Option<String>, RuleError> {
        for (name, param) in rules.iter() {
            if matches!(param, Value::Bool(false)) {
                continue;
            }
            let rule = self
                .rules
                .get(name)
                .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;

            if !rule(value, param).await? {
                tracing::trace!(rule = name, "validation rule failed");
                return Ok(Some(self.resolver.resolve(name, value, param, overrides)));
            }
        }
        Ok(None)
    }

    /// Field validator backed by `rules`.
    pub fn validator(&self, rules: RuleSet) -> Validate {
        self.validator_with_messages(rules, Messages::new())
    }

    pub fn validator_with_messages(&self, rules: RuleSet, overrides: Messages) -> Validate {
        let validation = self.clone();
        let rules = Arc::new(rules);
        let overrides = Arc::new(overrides);
        Validate::future(move |value: Value, _form: FormValues| {
            let validation = validation.clone();
            let rules = rules.clone();
            let overrides = overrides.clone();
            async move {
                let message = validation
                    .apply_rules(&value, &rules, Some(&overrides))
                    .await?;
                Ok(message.map_or(FieldError::Cleared, FieldError::Message))
            }
        })
    }
}
