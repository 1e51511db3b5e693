use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::validation::RuleError;
use crate::value::Value;

/// Plain field name to value mapping, in form order.
pub type FormValues = IndexMap<String, Value>;

/// What a validator reports for a field.
///
/// `Message` and `Flag(false)` count as failures. `Flag(true)` and `Cleared` count as
/// passing; only `Message` carries text to display.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldError {
    Message(String),
    Flag(bool),
    Cleared,
}

impl FieldError {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Message(_) | Self::Flag(false))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(message),
            Self::Flag(_) | Self::Cleared => None,
        }
    }
}

impl From<&str> for FieldError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<String> for FieldError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<bool> for FieldError {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl<T> From<Option<T>> for FieldError
where
    T: Into<FieldError>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Cleared, Into::into)
    }
}

pub type ValidatorResult = Result<FieldError, RuleError>;

pub type BoxedValidatorFuture = Pin<Box<dyn Future<Output = ValidatorResult> + Send + 'static>>;

pub type ValidatorFn = Arc<dyn Fn(Value, FormValues) -> BoxedValidatorFuture + Send + Sync>;

pub type GetterFn = Arc<dyn Fn(&Value, &FormValues) -> Value + Send + Sync>;

pub type BoxedSetterFuture = Pin<Box<dyn Future<Output = Value> + Send + 'static>>;

pub type SetterFn = Arc<dyn Fn(Value, FormValues) -> BoxedSetterFuture + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValidatorOptions {
    /// Re-run the validator whenever the field (or a field it depends on) changes.
    pub watch: bool,
    /// Run the validator when the form is created instead of starting out invalid.
    pub immediate: bool,
    /// Wait this long after a change before validating; newer changes supersede older ones.
    pub debounce: Duration,
}

impl ValidatorOptions {
    pub fn watched() -> Self {
        Self {
            watch: true,
            ..Self::default()
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }
}

/// A field validator. `Simple` validators are watched and run immediately.
#[derive(Clone)]
pub enum Validate {
    Simple(ValidatorFn),
    Configured {
        handler: ValidatorFn,
        options: ValidatorOptions,
    },
}

impl Validate {
    pub fn sync<F, R>(validator: F) -> Self
    where
        F: Fn(&Value, &FormValues) -> R + Send + Sync + 'static,
        R: Into<FieldError>,
    {
        Self::try_sync(move |value, form| Ok(validator(value, form).into()))
    }

    pub fn try_sync<F>(validator: F) -> Self
    where
        F: Fn(&Value, &FormValues) -> ValidatorResult + Send + Sync + 'static,
    {
        Self::Simple(Arc::new(move |value: Value, form: FormValues| -> BoxedValidatorFuture {
            let result = validator(&value, &form);
            Box::pin(futures::future::ready(result))
        }))
    }

    pub fn future<F, Fut>(validator: F) -> Self
    where
        F: Fn(Value, FormValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidatorResult> + Send + 'static,
    {
        Self::Simple(Arc::new(move |value: Value, form: FormValues| -> BoxedValidatorFuture {
            Box::pin(validator(value, form))
        }))
    }

    pub fn with_options(self, options: ValidatorOptions) -> Self {
        Self::Configured {
            handler: self.handler(),
            options,
        }
    }

    pub fn handler(&self) -> ValidatorFn {
        match self {
            Self::Simple(handler) | Self::Configured { handler, .. } => handler.clone(),
        }
    }

    pub(crate) fn normalize(&self) -> ValidatorEntry {
        match self {
            Self::Simple(handler) => ValidatorEntry {
                handler: handler.clone(),
                watch: true,
                immediate: true,
                debounce: Duration::ZERO,
            },
            Self::Configured { handler, options } => ValidatorEntry {
                handler: handler.clone(),
                watch: options.watch,
                immediate: options.immediate,
                debounce: options.debounce,
            },
        }
    }
}

impl Debug for Validate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Simple(..)"),
            Self::Configured { options, .. } => f
                .debug_struct("Configured")
                .field("options", options)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ValidatorEntry {
    pub(crate) handler: ValidatorFn,
    pub(crate) watch: bool,
    pub(crate) immediate: bool,
    pub(crate) debounce: Duration,
}

/// Descriptor for a single form field.
#[derive(Clone, Default)]
pub struct Field {
    pub value: Value,
    pub error: Option<FieldError>,
    pub(crate) getter: Option<GetterFn>,
    pub(crate) setter: Option<SetterFn>,
    pub(crate) validate: Option<Validate>,
    pub(crate) depends_on: Vec<String>,
}

impl Field {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Value, &FormValues) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(Value, &FormValues) -> Value + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(move |input: Value, form: FormValues| -> BoxedSetterFuture {
            let value = setter(input, &form);
            Box::pin(futures::future::ready(value))
        }));
        self
    }

    pub fn async_setter<F, Fut>(mut self, setter: F) -> Self
    where
        F: Fn(Value, FormValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.setter = Some(Arc::new(move |input: Value, form: FormValues| -> BoxedSetterFuture {
            Box::pin(setter(input, form))
        }));
        self
    }

    pub fn validate(mut self, validate: Validate) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Watched validation of this field also re-runs when any of `fields` changes.
    pub fn depends_on<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(fields.into_iter().map(Into::into));
        self
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("value", &self.value)
            .field("error", &self.error)
            .field("has_getter", &self.getter.is_some())
            .field("has_setter", &self.setter.is_some())
            .field("validate", &self.validate)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Field descriptors keyed by unique name, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct FormObject {
    pub(crate) fields: IndexMap<String, Field>,
}

impl FormObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K> FromIterator<(K, Field)> for FormObject
where
    K: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, Field)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, field)| (name.into(), field))
                .collect(),
        }
    }
}
