use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const DEFAULT_LOCALE: &str = "en-US";

const BUILTIN_LOCALES: &[(&str, &[(&str, &str)])] = &[
    (
        "en-US",
        &[
            ("validation.required", "This field is required"),
            ("validation.email", "Enter a valid email address"),
            ("validation.url", "Enter a valid URL"),
            ("validation.min_length", "Must be at least {min} characters"),
            ("validation.max_length", "Must be at most {max} characters"),
            ("validation.min_items", "Select at least {min} items"),
            ("validation.max_items", "Select at most {max} items"),
            ("validation.min", "Must be at least {min}"),
            ("validation.max", "Must be at most {max}"),
            ("validation.min_date", "Must be on or after {date}"),
            ("validation.max_date", "Must be on or before {date}"),
            (
                "validation.file_size",
                "File must not be larger than {maxFileSize}",
            ),
        ],
    ),
    (
        "nl-NL",
        &[
            ("validation.required", "Dit veld is verplicht"),
            ("validation.email", "Vul een geldig e-mailadres in"),
            ("validation.url", "Vul een geldige URL in"),
            ("validation.min_length", "Moet minstens {min} tekens bevatten"),
            ("validation.max_length", "Mag maximaal {max} tekens bevatten"),
            ("validation.min_items", "Selecteer minstens {min} items"),
            ("validation.max_items", "Selecteer maximaal {max} items"),
            ("validation.min", "Moet minstens {min} zijn"),
            ("validation.max", "Mag maximaal {max} zijn"),
            ("validation.min_date", "Moet op of na {date} vallen"),
            ("validation.max_date", "Moet op of voor {date} vallen"),
            (
                "validation.file_size",
                "Bestand mag niet groter zijn dan {maxFileSize}",
            ),
        ],
    ),
];

/// Message lookup service consumed by the validation messages.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String;
}

impl<F> Translator for F
where
    F: Fn(&str, &[(&str, &str)]) -> String + Send + Sync,
{
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        (self)(key, params)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

#[derive(Clone)]
pub struct I18nManager {
    catalog: Arc<RwLock<I18nCatalog>>,
    locale: Arc<RwLock<Locale>>,
}

impl Default for I18nManager {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nManager {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(I18nCatalog::builtin())),
            locale: Arc::new(RwLock::new(Locale::System)),
        }
    }

    pub fn with_locale(locale: impl Into<Locale>) -> Self {
        let manager = Self::new();
        manager.set_locale(locale);
        manager
    }

    /// Adds or replaces catalog entries for `locale`.
    pub fn with_messages<K, V>(self, locale: &str, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut catalog = match self.catalog.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            catalog.extend(locale, entries);
        }
        self
    }

    pub fn locale(&self) -> Locale {
        match self.locale.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_locale(&self, locale: impl Into<Locale>) {
        let mut current = match self.locale.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = locale.into();
    }

    pub fn resolved_locale(&self) -> String {
        let requested = self.requested_locale();
        let catalog = match self.catalog.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        catalog.resolve_locale(requested.as_deref())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn t(&self, key: &str) -> String {
        self.t_with(key, &[])
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        match self.lookup(key) {
            Some(template) => format_template(&template, params),
            None => key.to_string(),
        }
    }

    fn requested_locale(&self) -> Option<String> {
        match self.locale() {
            Locale::System => system_locale(),
            Locale::Tag(tag) => Some(tag),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let resolved = self.resolved_locale();
        let catalog = match self.catalog.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        catalog.lookup(&resolved, key).map(str::to_string)
    }
}

impl Translator for I18nManager {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        self.t_with(key, params)
    }
}

#[cfg(feature = "i18n")]
fn system_locale() -> Option<String> {
    sys_locale::get_locale()
}

#[cfg(not(feature = "i18n"))]
fn system_locale() -> Option<String> {
    None
}

struct I18nCatalog {
    locales: HashMap<String, HashMap<String, String>>,
}

impl I18nCatalog {
    fn builtin() -> Self {
        let mut catalog = Self {
            locales: HashMap::new(),
        };
        for (locale, entries) in BUILTIN_LOCALES.iter().copied() {
            catalog.extend(locale, entries.iter().copied());
        }
        catalog
    }

    fn extend<K, V>(&mut self, locale: &str, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tag = self.resolve_exact(locale).unwrap_or_else(|| locale.trim().to_string());
        let table = self.locales.entry(tag).or_default();
        for (key, value) in entries {
            table.insert(key.into(), value.into());
        }
    }

    fn resolve_exact(&self, requested: &str) -> Option<String> {
        let normalized = normalize_locale_tag(requested);
        self.locales
            .keys()
            .find(|locale| normalize_locale_tag(locale) == normalized)
            .cloned()
    }

    fn resolve_locale(&self, requested: Option<&str>) -> String {
        let Some(requested) = requested else {
            return DEFAULT_LOCALE.to_string();
        };
        if let Some(locale) = self.resolve_exact(requested) {
            return locale;
        }

        // Fall back to a unique locale sharing the language subtag.
        let normalized = normalize_locale_tag(requested);
        let language = normalized.split('-').next().unwrap_or_default();
        let mut candidates = self.locales.keys().filter(|locale| {
            normalize_locale_tag(locale).split('-').next().unwrap_or_default() == language
        });
        match (candidates.next(), candidates.next()) {
            (Some(locale), None) => locale.clone(),
            _ => DEFAULT_LOCALE.to_string(),
        }
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key))
            .or_else(|| {
                self.locales
                    .get(DEFAULT_LOCALE)
                    .and_then(|entries| entries.get(key))
            })
            .map(String::as_str)
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split(['.', '@']).next().unwrap_or(trimmed);
    without_encoding
        .split(['_', '-'])
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Replaces `{name}` placeholders; unknown or unterminated placeholders are kept verbatim.
pub fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let token = &after_open[..close];
        match params.iter().find(|(name, _)| *name == token) {
            Some((_, value)) => output.push_str(value),
            None => output.push_str(&rest[open..open + close + 2]),
        }
        rest = &after_open[close + 1..];
    }

    output.push_str(rest);
    output
}
