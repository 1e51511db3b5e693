use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;

use super::rules::{EMAIL, FILE_SIZE, MAX, MAX_LENGTH, MIN, MIN_LENGTH, REQUIRED, URL};
use crate::format::{format_bytes, readable_date};
use crate::i18n::Translator;
use crate::value::Value;

pub type MessageFn = Arc<dyn Fn(&Value, &Value) -> String + Send + Sync>;

/// Error text for a failed rule: fixed, or built from `(value, parameter)`.
#[derive(Clone)]
pub enum Message {
    Text(String),
    Format(MessageFn),
}

impl Message {
    pub fn format<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> String + Send + Sync + 'static,
    {
        Self::Format(Arc::new(f))
    }

    pub fn render(&self, value: &Value, param: &Value) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Format(f) => f(value, param),
        }
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Format(_) => f.write_str("Format(..)"),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Per-rule message table, keyed by rule name.
pub type Messages = IndexMap<String, Message>;

#[derive(Clone)]
pub struct MessageResolver {
    translator: Arc<dyn Translator>,
    custom: Messages,
}

impl MessageResolver {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            custom: Messages::new(),
        }
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.custom.extend(messages);
        self
    }

    /// Call overrides win over configured messages, which win over the built-in defaults.
    pub fn resolve(
        &self,
        rule: &str,
        value: &Value,
        param: &Value,
        overrides: Option<&Messages>,
    ) -> String {
        if let Some(message) = overrides
            .and_then(|overrides| overrides.get(rule))
            .or_else(|| self.custom.get(rule))
        {
            return message.render(value, param);
        }
        self.default_message(rule, value, param)
            .unwrap_or_else(|| format!("{rule} error"))
    }

    fn default_message(&self, rule: &str, value: &Value, param: &Value) -> Option<String> {
        let t = |key: &str, params: &[(&str, &str)]| self.translator.translate(key, params);
        let bound = param.to_string();

        let message = match rule {
            REQUIRED => t("validation.required", &[]),
            EMAIL => t("validation.email", &[]),
            URL => t("validation.url", &[]),
            MIN_LENGTH => match value {
                Value::List(_) => t("validation.min_items", &[("min", &bound)]),
                _ => t("validation.min_length", &[("min", &bound)]),
            },
            MAX_LENGTH => match value {
                Value::List(_) => t("validation.max_items", &[("max", &bound)]),
                _ => t("validation.max_length", &[("max", &bound)]),
            },
            MIN => match param {
                Value::Date(date) => t("validation.min_date", &[("date", &readable_date(*date))]),
                _ => t("validation.min", &[("min", &bound)]),
            },
            MAX => match param {
                Value::Date(date) => t("validation.max_date", &[("date", &readable_date(*date))]),
                _ => t("validation.max", &[("max", &bound)]),
            },
            FILE_SIZE => {
                let size = param.as_count().map(format_bytes).unwrap_or(bound);
                t("validation.file_size", &[("maxFileSize", &size)])
            }
            _ => return None,
        };
        Some(message)
    }
}
