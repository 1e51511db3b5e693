use indexmap::IndexMap;

use super::controller::{FormController, FormError, FormResult, read_lock, write_lock};
use super::field::{FieldError, FormValues};
use crate::value::Value;

/// Selects which fields `get_data` returns and whether getters are applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataOptions {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    use_return_value: bool,
}

impl DataOptions {
    /// Raw field values.
    pub fn raw() -> Self {
        Self {
            include: None,
            exclude: None,
            use_return_value: false,
        }
    }

    /// Values passed through each field's getter, where one is set.
    pub fn returned() -> Self {
        Self {
            use_return_value: true,
            ..Self::raw()
        }
    }

    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn selects(&self, field: &str) -> bool {
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.iter().any(|name| name == field));
        let included = self
            .include
            .as_ref()
            .is_none_or(|include| include.iter().any(|name| name == field));
        !excluded && included
    }
}

impl FormController {
    pub fn get_data(&self, options: &DataOptions) -> FormResult<FormValues> {
        if options.include.is_some() && options.exclude.is_some() {
            return Err(FormError::ConflictingProjection);
        }

        let (selected, values) = {
            let state = read_lock(&self.state, "projecting form values")?;
            let selected = state
                .fields
                .iter()
                .filter(|(name, _)| options.selects(name))
                .map(|(name, slot)| {
                    let getter = options
                        .use_return_value
                        .then(|| slot.getter.clone())
                        .flatten();
                    (name.clone(), slot.value.clone(), getter)
                })
                .collect::<Vec<_>>();
            (selected, state.values())
        };

        Ok(selected
            .into_iter()
            .map(|(name, value, getter)| {
                let projected = match getter {
                    Some(getter) => getter(&value, &values),
                    None => value,
                };
                (name, projected)
            })
            .collect())
    }

    pub fn get_values(&self) -> FormResult<FormValues> {
        self.get_data(&DataOptions::raw())
    }

    /// Assigns the supplied fields, through their setters where present, in form order.
    /// Keys that name no field are ignored; omitted fields are untouched. Only fields whose
    /// value actually changed are propagated.
    pub async fn set_data<I, K, V>(&self, values: I) -> FormResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut input = values
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect::<IndexMap<String, Value>>();

        let plan = {
            let state = read_lock(&self.state, "planning form value update")?;
            state
                .fields
                .iter()
                .filter(|(name, _)| input.contains_key(name.as_str()))
                .map(|(name, slot)| (name.clone(), slot.setter.clone()))
                .collect::<Vec<_>>()
        };

        let mut changed = Vec::with_capacity(plan.len());
        for (name, setter) in plan {
            let Some(raw) = input.shift_remove(&name) else {
                continue;
            };
            let next = match setter {
                Some(setter) => setter(raw, self.values()?).await,
                None => raw,
            };
            let mut state = write_lock(&self.state, "writing form value")?;
            if state.slot(&name)?.value == next {
                continue;
            }
            self.replace_value(&mut state, &name, next)?;
            changed.push(name);
        }

        if !input.is_empty() {
            tracing::debug!(
                ignored = ?input.keys().collect::<Vec<_>>(),
                "ignoring values for unknown fields"
            );
        }

        for name in changed {
            self.field_changed(&name).await?;
        }
        Ok(())
    }

    /// Overwrites displayed errors. Form validity is not affected.
    pub fn set_errors<I, K, E>(&self, errors: I) -> FormResult<()>
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: Into<FieldError>,
    {
        let errors = errors
            .into_iter()
            .map(|(name, error)| (name.into(), error.into()))
            .collect::<Vec<(String, FieldError)>>();

        let mut state = write_lock(&self.state, "writing external errors")?;
        if let Some((name, _)) = errors.iter().find(|(name, _)| !state.fields.contains_key(name)) {
            return Err(FormError::UnknownField(name.clone()));
        }
        for (name, error) in errors {
            self.replace_error(&mut state, &name, Some(error))?;
        }
        Ok(())
    }
}
