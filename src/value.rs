use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use time::OffsetDateTime;

/// A file picked by the user, reduced to what validation needs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    pub mime: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Raw value held by a form field.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    Date(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    File(FileRef),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::File(_) => "file",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRef> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whole, non-negative numbers only; used for length and byte bounds.
    pub fn as_count(&self) -> Option<u64> {
        let number = self.as_number()?;
        if number.is_sign_negative() || !number.fract().is_zero() {
            return None;
        }
        number.to_u64()
    }

    /// Loose truthiness: null, `false`, zero and empty text are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Number(number) => !number.is_zero(),
            Self::Text(text) => !text.is_empty(),
            Self::Date(_) | Self::File(_) | Self::List(_) | Self::Map(_) => true,
        }
    }

    /// Serialized form used to compare values structurally. Numbers are normalized first, so
    /// `5` and `5.0` serialize the same.
    pub fn canonical(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.normalized())
    }

    fn normalized(&self) -> Self {
        match self {
            Self::Number(number) => Self::Number(number.normalize()),
            Self::List(items) => Self::List(items.iter().map(Self::normalized).collect()),
            Self::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.normalized()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
            Self::Date(date) => write!(f, "{date}"),
            Self::File(file) => write!(f, "{} ({} bytes)", file.name, file.size),
            Self::List(_) | Self::Map(_) => match self.canonical() {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(std::fmt::Error),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Number(Decimal::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Self::Date(value)
    }
}

impl From<FileRef> for Value {
    fn from(value: FileRef) -> Self {
        Self::File(value)
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(entries: IndexMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}
