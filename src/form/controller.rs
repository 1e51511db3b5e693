use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_timer::Delay;
use indexmap::IndexMap;
use thiserror::Error;

use super::field::{
    FieldError, FormObject, FormValues, GetterFn, SetterFn, ValidatorEntry, ValidatorFn,
};
use super::submit::SubmitStatus;
use crate::validation::RuleError;
use crate::value::Value;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form has no field named `{0}`")]
    UnknownField(String),
    #[error("`include` and `exclude` cannot be used together")]
    ConflictingProjection,
    #[error("validator for `{field}` failed")]
    Validator {
        field: String,
        #[source]
        source: RuleError,
    },
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitStatus, to: SubmitStatus },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("failed to serialize field value: {0}")]
    Serialization(String),
    #[error("form handler failed: {0}")]
    Handler(String),
}

impl From<serde_json::Error> for FormError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(u64);

pub type FieldListener = Arc<dyn Fn(&str, &FormValues) + Send + Sync>;

type DeferFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Waits until pending reactive work has settled. Defaults to one timer tick.
#[derive(Clone)]
pub struct Defer(DeferFn);

impl Defer {
    pub fn new<F, Fut>(defer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(defer())
        }))
    }

    pub fn next_tick() -> Self {
        Self::new(|| Delay::new(Duration::ZERO))
    }

    pub async fn wait(&self) {
        (self.0)().await
    }
}

impl Default for Defer {
    fn default() -> Self {
        Self::next_tick()
    }
}

impl Debug for Defer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Defer(..)")
    }
}

#[derive(Clone, Debug, Default)]
pub struct FormOptions {
    /// Log every field value and error change at debug level.
    pub debug: bool,
    pub defer: Defer,
}

pub(super) struct FieldSlot {
    pub(super) value: Value,
    pub(super) error: Option<FieldError>,
    pub(super) getter: Option<GetterFn>,
    pub(super) setter: Option<SetterFn>,
    pub(super) validator: Option<ValidatorEntry>,
    pub(super) depends_on: Vec<String>,
}

pub(super) struct FormState {
    pub(super) fields: IndexMap<String, FieldSlot>,
    pub(super) initial: FormValues,
    /// `true` marks a field invalid. Only validator outcomes write here.
    pub(super) error_map: IndexMap<String, bool>,
    pub(super) tickets: HashMap<String, ValidationTicket>,
}

impl FormState {
    pub(super) fn values(&self) -> FormValues {
        self.fields
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    pub(super) fn slot(&self, name: &str) -> FormResult<&FieldSlot> {
        self.fields
            .get(name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    pub(super) fn slot_mut(&mut self, name: &str) -> FormResult<&mut FieldSlot> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    fn next_ticket(&mut self, name: &str) -> ValidationTicket {
        let next = ValidationTicket(
            self.tickets
                .get(name)
                .copied()
                .unwrap_or(ValidationTicket(0))
                .0
                + 1,
        );
        self.tickets.insert(name.to_string(), next);
        next
    }
}

/// Outcome of a `validate` call, in the order the fields were validated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationReport {
    pub results: Vec<(String, Option<FieldError>)>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self
            .results
            .iter()
            .any(|(_, error)| error.as_ref().is_some_and(FieldError::is_failure))
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.results
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, error)| error.as_ref())
    }
}

/// Shared handle to form state. Clones observe and mutate the same form.
#[derive(Clone)]
pub struct FormController {
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormState>>,
    listeners: Arc<RwLock<Vec<(ListenerId, FieldListener)>>>,
    next_listener: Arc<AtomicU64>,
}

impl FormController {
    /// Takes ownership of `form`, snapshots it and runs the initial validation pass.
    pub async fn new(form: FormObject, options: FormOptions) -> FormResult<Self> {
        let fields = form
            .fields
            .into_iter()
            .map(|(name, field)| {
                let slot = FieldSlot {
                    value: field.value,
                    error: field.error,
                    getter: field.getter,
                    setter: field.setter,
                    validator: field.validate.as_ref().map(|validate| validate.normalize()),
                    depends_on: field.depends_on,
                };
                (name, slot)
            })
            .collect::<IndexMap<_, _>>();
        let error_map = fields.keys().map(|name| (name.clone(), false)).collect();
        let initial = fields
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect();

        let controller = Self {
            options,
            state: Arc::new(RwLock::new(FormState {
                fields,
                initial,
                error_map,
                tickets: HashMap::new(),
            })),
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener: Arc::new(AtomicU64::new(1)),
        };
        controller.set_initial_errors().await?;
        Ok(controller)
    }

    async fn set_initial_errors(&self) -> FormResult<()> {
        let pending = {
            let state = read_lock(&self.state, "reading fields for initial validation")?;
            state
                .fields
                .iter()
                .filter_map(|(name, slot)| {
                    slot.validator
                        .as_ref()
                        .map(|entry| (name.clone(), entry.clone(), slot.value.clone()))
                })
                .collect::<Vec<_>>()
        };

        for (name, entry, value) in pending {
            let invalid = if entry.immediate {
                let values = self.values()?;
                let outcome = (entry.handler)(value, values)
                    .await
                    .map_err(|source| FormError::Validator {
                        field: name.clone(),
                        source,
                    })?;
                outcome.is_failure()
            } else {
                true
            };
            tracing::trace!(field = %name, invalid, "initial validation state");
            let mut state = write_lock(&self.state, "seeding initial validation state")?;
            state.error_map.insert(name, invalid);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading form validity")?
            .error_map
            .values()
            .all(|invalid| !invalid))
    }

    pub fn is_valid_field(&self, name: &str) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading field validity")?;
        state.slot(name)?;
        Ok(!state.error_map.get(name).copied().unwrap_or(false))
    }

    pub fn field_names(&self) -> FormResult<Vec<String>> {
        Ok(read_lock(&self.state, "reading field names")?
            .fields
            .keys()
            .cloned()
            .collect())
    }

    pub fn value(&self, name: &str) -> FormResult<Value> {
        Ok(read_lock(&self.state, "reading field value")?
            .slot(name)?
            .value
            .clone())
    }

    pub fn error(&self, name: &str) -> FormResult<Option<FieldError>> {
        Ok(read_lock(&self.state, "reading field error")?
            .slot(name)?
            .error
            .clone())
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?.values())
    }

    /// Runs validators concurrently and, when `set_error` is true, writes every outcome back
    /// once all of them have settled.
    ///
    /// An empty `fields` slice validates every field that has a validator. Named fields
    /// without a validator report `None`, which clears their error when written back.
    pub async fn validate(&self, fields: &[&str], set_error: bool) -> FormResult<ValidationReport> {
        let (targets, values) = {
            let state = read_lock(&self.state, "collecting validators")?;
            let targets = if fields.is_empty() {
                state
                    .fields
                    .iter()
                    .filter_map(|(name, slot)| {
                        slot.validator.as_ref().map(|entry| {
                            (name.clone(), Some(entry.handler.clone()), slot.value.clone())
                        })
                    })
                    .collect::<Vec<_>>()
            } else {
                fields
                    .iter()
                    .map(|name| {
                        let slot = state.slot(name)?;
                        let handler = slot.validator.as_ref().map(|entry| entry.handler.clone());
                        Ok((name.to_string(), handler, slot.value.clone()))
                    })
                    .collect::<FormResult<Vec<_>>>()?
            };
            (targets, state.values())
        };

        let pending = targets.iter().map(|(name, handler, value)| {
            let field = name.clone();
            let run = handler
                .as_ref()
                .map(|handler: &ValidatorFn| handler(value.clone(), values.clone()));
            async move {
                match run {
                    Some(run) => run
                        .await
                        .map(Some)
                        .map_err(|source| FormError::Validator { field, source }),
                    None => Ok(None),
                }
            }
        });
        let outcomes = futures::future::try_join_all(pending).await?;

        let results = targets
            .into_iter()
            .map(|(name, _, _)| name)
            .zip(outcomes)
            .collect::<Vec<_>>();

        if set_error {
            let mut state = write_lock(&self.state, "writing validation errors")?;
            for (name, error) in &results {
                self.replace_error(&mut state, name, error.clone())?;
            }
        }
        Ok(ValidationReport { results })
    }

    /// Assigns a raw value and reacts to the change.
    pub async fn set_value(&self, name: &str, value: impl Into<Value>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "writing field value")?;
            self.replace_value(&mut state, name, value.into())?;
        }
        self.field_changed(name).await
    }

    /// Propagates a change of `name`: notifies listeners, then re-runs the watched validators
    /// of the field and of fields depending on it.
    pub async fn field_changed(&self, name: &str) -> FormResult<()> {
        let (values, watched) = {
            let state = read_lock(&self.state, "collecting watched validators")?;
            state.slot(name)?;
            let watched = state
                .fields
                .iter()
                .filter(|(field, slot)| {
                    slot.validator.as_ref().is_some_and(|entry| entry.watch)
                        && (field.as_str() == name || slot.depends_on.iter().any(|dep| dep == name))
                })
                .map(|(field, _)| field.clone())
                .collect::<Vec<_>>();
            (state.values(), watched)
        };

        self.notify(name, &values)?;
        for field in watched {
            self.revalidate(&field).await?;
        }
        Ok(())
    }

    pub fn on_field_changed<F>(&self, listener: F) -> FormResult<ListenerId>
    where
        F: Fn(&str, &FormValues) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        write_lock(&self.listeners, "registering field listener")?.push((id, Arc::new(listener)));
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "removing field listener")?;
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        Ok(listeners.len() != before)
    }

    /// Restores every value from the initial snapshot and returns the fields that changed.
    pub fn reset_values(&self) -> FormResult<Vec<String>> {
        let mut state = write_lock(&self.state, "resetting field values")?;
        let initial = state.initial.clone();
        let mut changed = Vec::new();
        for (name, value) in initial {
            if state.slot(&name)?.value != value {
                self.replace_value(&mut state, &name, value)?;
                changed.push(name);
            }
        }
        Ok(changed)
    }

    /// Clears every displayed error. Validity is left untouched.
    pub fn clear_errors(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing field errors")?;
        let names = state.fields.keys().cloned().collect::<Vec<_>>();
        for name in names {
            self.replace_error(&mut state, &name, Some(FieldError::Cleared))?;
        }
        Ok(())
    }

    /// Resets values, lets watched validation settle, then clears displayed errors.
    pub async fn reset_to_initial_state(&self) -> FormResult<()> {
        let changed = self.reset_values()?;
        tracing::debug!(changed = changed.len(), "form reset to initial state");
        for name in &changed {
            self.field_changed(name).await?;
        }
        self.options.defer.wait().await;
        self.clear_errors()
    }

    /// Makes the current values the target of `reset_values`.
    pub fn snapshot_initial_state(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "snapshotting initial state")?;
        state.initial = state.values();
        Ok(())
    }

    async fn revalidate(&self, name: &str) -> FormResult<()> {
        let (entry, ticket) = {
            let mut state = write_lock(&self.state, "starting watched validation")?;
            let Some(entry) = state.slot(name)?.validator.clone() else {
                return Ok(());
            };
            let ticket = state.next_ticket(name);
            state.error_map.insert(name.to_string(), true);
            (entry, ticket)
        };

        if !entry.debounce.is_zero() {
            Delay::new(entry.debounce).await;
            if !self.is_latest_ticket(name, ticket)? {
                tracing::trace!(field = name, ticket = ticket.0, "debounced validation superseded");
                return Ok(());
            }
        }

        let (value, values) = {
            let state = read_lock(&self.state, "reading value for watched validation")?;
            (state.slot(name)?.value.clone(), state.values())
        };
        let outcome = (entry.handler)(value, values)
            .await
            .map_err(|source| FormError::Validator {
                field: name.to_string(),
                source,
            })?;

        let mut state = write_lock(&self.state, "finishing watched validation")?;
        if state.tickets.get(name).copied() != Some(ticket) {
            tracing::trace!(field = name, ticket = ticket.0, "dropping stale validation result");
            return Ok(());
        }
        state
            .error_map
            .insert(name.to_string(), outcome.is_failure());
        self.replace_error(&mut state, name, Some(outcome))
    }

    fn is_latest_ticket(&self, name: &str, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(name)
            .copied()
            == Some(ticket))
    }

    fn notify(&self, name: &str, values: &FormValues) -> FormResult<()> {
        let listeners = read_lock(&self.listeners, "reading field listeners")?
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(name, values);
        }
        Ok(())
    }

    pub(super) fn replace_value(
        &self,
        state: &mut FormState,
        name: &str,
        value: Value,
    ) -> FormResult<()> {
        let slot = state.slot_mut(name)?;
        let previous = std::mem::replace(&mut slot.value, value);
        if self.options.debug && previous != slot.value {
            tracing::debug!(field = name, old = %previous, new = %slot.value, "field value changed");
        }
        Ok(())
    }

    pub(super) fn replace_error(
        &self,
        state: &mut FormState,
        name: &str,
        error: Option<FieldError>,
    ) -> FormResult<()> {
        let slot = state.slot_mut(name)?;
        let previous = std::mem::replace(&mut slot.error, error);
        if self.options.debug && previous != slot.error {
            tracing::debug!(field = name, old = ?previous, new = ?slot.error, "field error changed");
        }
        Ok(())
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
