use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use super::controller::{FormController, FormError, FormResult, ListenerId, read_lock, write_lock};
use super::field::FormValues;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitStatus {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    /// Validation failed; errors were written to the fields.
    Invalid,
    /// Nothing changed since the last baseline and pristine submits are not allowed.
    Pristine,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitOptions {
    pub allow_pristine_submit: bool,
}

pub type BoxedHandlerFuture = Pin<Box<dyn Future<Output = FormResult<()>> + Send + 'static>>;

pub type FormHandler = Arc<dyn Fn(FormController) -> BoxedHandlerFuture + Send + Sync>;

struct SubmitState {
    is_ready: bool,
    is_dirty: bool,
    is_submitting: bool,
    baseline: FormValues,
    status: SubmitStatus,
    submit_count: u32,
}

/// Submit workflow over a form: dirty tracking, an optional prepare step and gated submits.
#[derive(Clone)]
pub struct SubmitController {
    form: FormController,
    options: SubmitOptions,
    state: Arc<RwLock<SubmitState>>,
    on_submit: FormHandler,
    on_prepare: Option<FormHandler>,
    listener: ListenerId,
}

impl SubmitController {
    pub fn new<F, Fut>(form: FormController, options: SubmitOptions, on_submit: F) -> FormResult<Self>
    where
        F: Fn(FormController) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FormResult<()>> + Send + 'static,
    {
        let state = Arc::new(RwLock::new(SubmitState {
            is_ready: true,
            is_dirty: false,
            is_submitting: false,
            baseline: form.values()?,
            status: SubmitStatus::Idle,
            submit_count: 0,
        }));

        let observed = state.clone();
        let listener = form.on_field_changed(move |_field, values| {
            let mut state = match observed.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !state.is_ready {
                return;
            }
            match is_dirty(&state.baseline, values) {
                Ok(dirty) => state.is_dirty = dirty,
                Err(error) => tracing::warn!(%error, "could not compare form values"),
            }
        })?;

        Ok(Self {
            form,
            options,
            state,
            on_submit: Arc::new(move |form: FormController| -> BoxedHandlerFuture {
                Box::pin(on_submit(form))
            }),
            on_prepare: None,
            listener,
        })
    }

    /// Adds a prepare step; the workflow is not ready until `prepare` has completed.
    pub fn with_prepare<F, Fut>(mut self, on_prepare: F) -> FormResult<Self>
    where
        F: Fn(FormController) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FormResult<()>> + Send + 'static,
    {
        self.on_prepare = Some(Arc::new(move |form: FormController| -> BoxedHandlerFuture {
            Box::pin(on_prepare(form))
        }));
        write_lock(&self.state, "waiting for prepare")?.is_ready = false;
        Ok(self)
    }

    pub fn form(&self) -> &FormController {
        &self.form
    }

    pub fn is_ready(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading ready flag")?.is_ready)
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading dirty flag")?.is_dirty)
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submitting flag")?.is_submitting)
    }

    pub fn status(&self) -> FormResult<SubmitStatus> {
        Ok(read_lock(&self.state, "reading submit status")?.status)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.state, "reading submit count")?.submit_count)
    }

    pub async fn prepare(&self) -> FormResult<()> {
        if let Some(on_prepare) = &self.on_prepare {
            on_prepare(self.form.clone()).await?;
        }
        self.rebaseline("marking form ready", true)?;
        tracing::debug!("form prepared");
        Ok(())
    }

    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.is_submitting
                || matches!(
                    state.status,
                    SubmitStatus::Validating | SubmitStatus::Submitting
                )
            {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_status(&mut state, SubmitStatus::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        let report = match self.form.validate(&[], false).await {
            Ok(report) => report,
            Err(error) => return self.fail(error),
        };
        if !report.is_valid() {
            if let Err(error) = self.form.validate(&[], true).await {
                return self.fail(error);
            }
            let mut state = write_lock(&self.state, "handling submit validation failure")?;
            transition_submit_status(&mut state, SubmitStatus::Failed)?;
            tracing::debug!("submit blocked by validation");
            return Ok(SubmitOutcome::Invalid);
        }

        {
            let mut state = write_lock(&self.state, "moving submit state to submitting")?;
            if !state.is_dirty && !self.options.allow_pristine_submit {
                transition_submit_status(&mut state, SubmitStatus::Idle)?;
                tracing::debug!("skipping submit of pristine form");
                return Ok(SubmitOutcome::Pristine);
            }
            transition_submit_status(&mut state, SubmitStatus::Submitting)?;
            state.is_submitting = true;
        }

        if let Err(error) = (self.on_submit)(self.form.clone()).await {
            return self.fail(error);
        }

        self.rebaseline("completing submit", false)?;
        let mut state = write_lock(&self.state, "completing submit")?;
        state.is_submitting = false;
        transition_submit_status(&mut state, SubmitStatus::Succeeded)?;
        Ok(SubmitOutcome::Submitted)
    }

    /// Stops tracking form changes. Clones of this controller stop tracking too.
    pub fn detach(&self) -> FormResult<bool> {
        self.form.remove_listener(self.listener)
    }

    fn rebaseline(&self, context: &'static str, mark_ready: bool) -> FormResult<()> {
        let values = self.form.values()?;
        self.form.snapshot_initial_state()?;
        let mut state = write_lock(&self.state, context)?;
        if mark_ready {
            state.is_ready = true;
        }
        state.baseline = values;
        state.is_dirty = false;
        Ok(())
    }

    fn fail(&self, error: FormError) -> FormResult<SubmitOutcome> {
        let mut state = write_lock(&self.state, "handling submit failure")?;
        state.is_submitting = false;
        transition_submit_status(&mut state, SubmitStatus::Failed)?;
        Err(error)
    }
}

/// A field is dirty when its serialized value differs from the baseline. A `null` baseline
/// and an empty text value are treated as equal.
pub fn is_dirty(baseline: &FormValues, current: &FormValues) -> FormResult<bool> {
    for (name, value) in current {
        let Some(original) = baseline.get(name) else {
            return Ok(true);
        };
        if original.is_null() && matches!(value, Value::Text(text) if text.is_empty()) {
            continue;
        }
        if original.canonical()? != value.canonical()? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn transition_submit_status(state: &mut SubmitState, next: SubmitStatus) -> FormResult<()> {
    let current = state.status;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitStatus::Idle, SubmitStatus::Validating)
            | (SubmitStatus::Validating, SubmitStatus::Submitting)
            | (SubmitStatus::Validating, SubmitStatus::Failed)
            | (SubmitStatus::Submitting, SubmitStatus::Succeeded)
            | (SubmitStatus::Submitting, SubmitStatus::Failed)
            | (SubmitStatus::Succeeded, SubmitStatus::Validating)
            | (SubmitStatus::Failed, SubmitStatus::Validating)
            | (_, SubmitStatus::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.status = next;
    Ok(())
}
