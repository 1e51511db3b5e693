use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use crate::value::Value;

pub const REQUIRED: &str = "required";
pub const MIN_LENGTH: &str = "minLength";
pub const MAX_LENGTH: &str = "maxLength";
pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const FILE_SIZE: &str = "fileSize";
pub const EMAIL: &str = "email";
pub const URL: &str = "url";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern is valid")
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)[\w.\-]+(\.[\w.\-]+)+[\w\-._~:/?#\[\]@!$\&'()*+,;=.]+$")
        .expect("url pattern is valid")
});

/// Misconfigured rule input. Never a user-facing validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("{rule} validation only allows values of type {expected}, got `{actual}`")]
    UnsupportedValue {
        rule: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{rule} rule expects a {expected} parameter, got `{actual}`")]
    InvalidParameter {
        rule: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{rule} compares a `{value}` value against a `{bound}` bound")]
    BoundMismatch {
        rule: String,
        value: &'static str,
        bound: &'static str,
    },
    #[error("no rule named `{0}` is registered")]
    UnknownRule(String),
}

pub type RuleResult = Result<bool, RuleError>;

pub type BoxedRuleFuture = Pin<Box<dyn Future<Output = RuleResult> + Send + 'static>>;

/// A rule predicate: `(value, parameter) -> passes`.
pub type RuleFn = Arc<dyn Fn(&Value, &Value) -> BoxedRuleFuture + Send + Sync>;

pub fn sync_rule<F>(rule: F) -> RuleFn
where
    F: Fn(&Value, &Value) -> RuleResult + Send + Sync + 'static,
{
    Arc::new(move |value: &Value, param: &Value| -> BoxedRuleFuture {
        let result = rule(value, param);
        Box::pin(futures::future::ready(result))
    })
}

pub fn async_rule<F, Fut>(rule: F) -> RuleFn
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RuleResult> + Send + 'static,
{
    Arc::new(move |value: &Value, param: &Value| -> BoxedRuleFuture {
        Box::pin(rule(value.clone(), param.clone()))
    })
}

pub(crate) fn builtin_rules() -> Vec<(&'static str, RuleFn)> {
    vec![
        (REQUIRED, sync_rule(|value, _| Ok(required(value)))),
        (MIN_LENGTH, sync_rule(min_length)),
        (MAX_LENGTH, sync_rule(max_length)),
        (MIN, sync_rule(min)),
        (MAX, sync_rule(max)),
        (FILE_SIZE, sync_rule(file_size)),
        (EMAIL, sync_rule(|value, _| email(value))),
        (URL, sync_rule(|value, _| url(value))),
    ]
}

pub fn required(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Text(text) => !text.trim().is_empty(),
        Value::Bool(flag) => *flag,
        Value::List(items) => !items.is_empty(),
        other => other.is_truthy(),
    }
}

pub fn min_length(value: &Value, min: &Value) -> RuleResult {
    let bound = count_param(MIN_LENGTH, min)?;
    Ok(measure_length(MIN_LENGTH, value)?.is_none_or(|length| length >= bound))
}

pub fn max_length(value: &Value, max: &Value) -> RuleResult {
    let bound = count_param(MAX_LENGTH, max)?;
    Ok(measure_length(MAX_LENGTH, value)?.is_none_or(|length| length <= bound))
}

pub fn min(value: &Value, bound: &Value) -> RuleResult {
    compare_bound(MIN, value, bound, |ordering| ordering.is_ge())
}

pub fn max(value: &Value, bound: &Value) -> RuleResult {
    compare_bound(MAX, value, bound, |ordering| ordering.is_le())
}

pub fn file_size(file: &Value, max_bytes: &Value) -> RuleResult {
    let bound = count_param(FILE_SIZE, max_bytes)?;
    match file {
        Value::Null => Ok(true),
        Value::File(file) => Ok(file.size <= bound),
        other => Err(RuleError::UnsupportedValue {
            rule: FILE_SIZE.to_string(),
            expected: "`file`",
            actual: other.kind(),
        }),
    }
}

pub fn email(value: &Value) -> RuleResult {
    match_pattern(EMAIL, value, &EMAIL_PATTERN)
}

pub fn url(value: &Value) -> RuleResult {
    match_pattern(URL, value, &URL_PATTERN)
}

/// Trimmed character count or element count; `None` for null, empty text or an empty list.
fn measure_length(rule: &str, value: &Value) -> Result<Option<u64>, RuleError> {
    let length = match value {
        Value::Null => return Ok(None),
        Value::Text(text) if text.is_empty() => return Ok(None),
        Value::List(items) if items.is_empty() => return Ok(None),
        Value::Text(text) => text.trim().chars().count(),
        Value::List(items) => items.len(),
        other => {
            return Err(RuleError::UnsupportedValue {
                rule: rule.to_string(),
                expected: "`text`, `list`",
                actual: other.kind(),
            });
        }
    };
    Ok(Some(length as u64))
}

fn count_param(rule: &str, param: &Value) -> Result<u64, RuleError> {
    param.as_count().ok_or_else(|| RuleError::InvalidParameter {
        rule: rule.to_string(),
        expected: "non-negative whole number",
        actual: param.kind(),
    })
}

fn compare_bound(
    rule: &str,
    value: &Value,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> RuleResult {
    match (value, bound) {
        (Value::Null, _) => Ok(true),
        (Value::Number(value), Value::Number(bound)) => Ok(accept(value.cmp(bound))),
        (Value::Date(value), Value::Date(bound)) => Ok(accept(value.cmp(bound))),
        (Value::Number(_) | Value::Date(_), bound) => Err(RuleError::BoundMismatch {
            rule: rule.to_string(),
            value: value.kind(),
            bound: bound.kind(),
        }),
        (other, _) => Err(RuleError::UnsupportedValue {
            rule: rule.to_string(),
            expected: "`number`, `date`",
            actual: other.kind(),
        }),
    }
}

fn match_pattern(rule: &str, value: &Value, pattern: &Regex) -> RuleResult {
    match value {
        Value::Null => Ok(true),
        Value::Text(text) if text.is_empty() => Ok(true),
        Value::Text(text) => Ok(pattern.is_match(text)),
        other => Err(RuleError::UnsupportedValue {
            rule: rule.to_string(),
            expected: "`text`",
            actual: other.kind(),
        }),
    }
}
