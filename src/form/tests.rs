use super::*;
use crate::i18n::I18nManager;
use crate::validation::{RuleError, RuleSet, Validation};
use crate::value::Value;
use futures::executor::block_on;
use futures_timer::Delay;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn must_be_foo() -> Validate {
    Validate::sync(|value: &Value, _: &FormValues| {
        (value != &Value::from("Foo")).then_some("Value must be foo")
    })
}

fn truthy() -> Validate {
    Validate::sync(|value: &Value, _: &FormValues| value.is_truthy())
}

fn profile_form() -> FormObject {
    FormObject::new()
        .field("name", Field::new("Foo").validate(must_be_foo()))
        .field("email", Field::new("user@example.com"))
        .field("age", Field::new(30))
}

fn controller(form: FormObject) -> FormController {
    block_on(FormController::new(form, FormOptions::default())).expect("form controller")
}

#[test]
fn get_data_projects_every_field_in_order() {
    let form = controller(profile_form());
    let values = form.get_values().expect("values");
    assert_eq!(
        values.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["name", "email", "age"]
    );
    assert_eq!(values.get("name"), Some(&Value::from("Foo")));
    assert_eq!(values.get("age"), Some(&Value::from(30)));
}

#[test]
fn get_data_include_and_exclude_select_fields() {
    let form = controller(profile_form());

    let included = form
        .get_data(&DataOptions::raw().include(["name"]))
        .expect("include");
    assert_eq!(included.keys().collect::<Vec<_>>(), vec!["name"]);

    let excluded = form
        .get_data(&DataOptions::raw().exclude(["name"]))
        .expect("exclude");
    assert_eq!(excluded.keys().collect::<Vec<_>>(), vec!["email", "age"]);

    let conflict = form.get_data(&DataOptions::raw().include(["name"]).exclude(["age"]));
    assert_eq!(conflict, Err(FormError::ConflictingProjection));
}

#[test]
fn set_data_only_touches_named_fields() {
    let form = controller(profile_form());
    block_on(form.set_data([("name", "Bar"), ("missing", "ignored")])).expect("set data");

    assert_eq!(form.value("name").expect("name"), Value::from("Bar"));
    assert_eq!(form.value("email").expect("email"), Value::from("user@example.com"));
    assert_eq!(form.value("age").expect("age"), Value::from(30));
    assert_eq!(
        form.field_names().expect("names"),
        vec!["name", "email", "age"]
    );
}

#[test]
fn set_data_skips_unchanged_fields() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        Validate::sync(move |value: &Value, _: &FormValues| {
            calls.fetch_add(1, Ordering::SeqCst);
            value.is_truthy()
        })
    };
    let form = controller(
        FormObject::new()
            .field("name", Field::new("Ada").validate(counted))
            .field("age", Field::new(30)),
    );
    let notified = Arc::new(Mutex::new(Vec::new()));
    {
        let notified = notified.clone();
        form.on_field_changed(move |field, _| {
            notified.lock().expect("notified lock").push(field.to_string());
        })
        .expect("listener");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    block_on(form.set_data([("name", Value::from("Ada")), ("age", Value::from(31))]))
        .expect("set data");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*notified.lock().expect("notified lock"), vec!["age".to_string()]);
}

#[test]
fn external_errors_do_not_gate_validity() {
    let form = controller(FormObject::new().field("name", Field::new("Foo").validate(must_be_foo())));
    assert!(form.is_valid().expect("valid"));

    form.set_errors([("name", "Error")]).expect("set errors");
    assert!(form.is_valid().expect("still valid"));
    assert_eq!(
        form.error("name").expect("error"),
        Some(FieldError::from("Error"))
    );

    block_on(form.set_data([("name", "Bar")])).expect("set data");
    assert!(!form.is_valid().expect("invalid"));
    assert!(!form.is_valid_field("name").expect("field validity"));
    assert_eq!(
        form.error("name").expect("error"),
        Some(FieldError::from("Value must be foo"))
    );
}

#[test]
fn set_errors_rejects_unknown_fields_without_writing() {
    let form = controller(profile_form());
    let result = form.set_errors([("name", "Error"), ("nope", "Other")]);
    assert_eq!(result, Err(FormError::UnknownField("nope".into())));
    assert_eq!(form.error("name").expect("error"), None);
}

#[test]
fn validate_named_fields_leaves_others_untouched() {
    let form = controller(
        FormObject::new()
            .field("name", Field::new("Bar").validate(must_be_foo()))
            .field("email", Field::new(Value::Null).validate(truthy())),
    );

    let report = block_on(form.validate(&["name"], true)).expect("validate name");
    assert!(!report.is_valid());
    assert_eq!(
        form.error("name").expect("name error"),
        Some(FieldError::from("Value must be foo"))
    );
    assert_eq!(form.error("email").expect("email error"), None);

    block_on(form.validate(&[], true)).expect("validate all");
    assert_eq!(
        form.error("name").expect("name error"),
        Some(FieldError::from("Value must be foo"))
    );
    assert_eq!(
        form.error("email").expect("email error"),
        Some(FieldError::Flag(false))
    );
}

#[test]
fn validate_without_set_error_only_reports() {
    let form = controller(FormObject::new().field("name", Field::new("Bar").validate(must_be_foo())));
    let report = block_on(form.validate(&[], false)).expect("validate");
    assert_eq!(
        report.get("name"),
        Some(&FieldError::from("Value must be foo"))
    );
    assert_eq!(form.error("name").expect("error"), None);
}

#[test]
fn validate_reports_none_for_fields_without_validator() {
    let form = controller(profile_form());
    form.set_errors([("email", "stale")]).expect("set errors");
    let report = block_on(form.validate(&["email"], true)).expect("validate");
    assert_eq!(report.results, vec![("email".to_string(), None)]);
    assert_eq!(form.error("email").expect("error"), None);

    let unknown = block_on(form.validate(&["nope"], true));
    assert_eq!(unknown, Err(FormError::UnknownField("nope".into())));
}

#[test]
fn deferred_validators_start_invalid_and_skip_watching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        Validate::sync(move |value: &Value, _: &FormValues| {
            calls.fetch_add(1, Ordering::SeqCst);
            value.is_truthy()
        })
    };
    let form = controller(FormObject::new().field(
        "terms",
        Field::new(false).validate(counted.with_options(ValidatorOptions::default())),
    ));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!form.is_valid().expect("pending field is invalid"));

    block_on(form.set_value("terms", true)).expect("set value");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!form.is_valid().expect("unwatched field stays pending"));

    let report = block_on(form.validate(&["terms"], true)).expect("validate");
    assert!(report.is_valid());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn watched_immediate_validator_seeds_registry() {
    let form = controller(FormObject::new().field(
        "code",
        Field::new("").validate(truthy().with_options(ValidatorOptions::watched().immediate())),
    ));
    assert!(!form.is_valid().expect("empty code is invalid"));
    assert_eq!(form.error("code").expect("error"), None);

    block_on(form.set_value("code", "A1")).expect("set code");
    assert!(form.is_valid().expect("valid"));
    assert_eq!(form.error("code").expect("error"), Some(FieldError::Flag(true)));
}

#[test]
fn dependent_fields_revalidate_on_source_change() {
    let matches_password = Validate::sync(|value: &Value, form: &FormValues| {
        (Some(value) != form.get("password")).then_some("password mismatch")
    });
    let form = controller(
        FormObject::new()
            .field("password", Field::new("pass"))
            .field(
                "confirm",
                Field::new("pass")
                    .validate(matches_password)
                    .depends_on(["password"]),
            ),
    );
    assert!(form.is_valid().expect("valid"));

    block_on(form.set_value("password", "new-pass")).expect("set password");
    assert_eq!(
        form.error("confirm").expect("confirm error"),
        Some(FieldError::from("password mismatch"))
    );
    assert!(!form.is_valid().expect("invalid"));
}

#[test]
fn debounced_validation_keeps_latest_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let validate = {
        let calls = calls.clone();
        Validate::sync(move |value: &Value, _: &FormValues| {
            calls.fetch_add(1, Ordering::SeqCst);
            value
                .as_str()
                .is_some_and(|text| text.contains("bad"))
                .then_some("email invalid")
        })
        .with_options(ValidatorOptions::watched().debounce(Duration::from_millis(30)))
    };
    let form = controller(
        FormObject::new().field("email", Field::new("user@example.com").validate(validate)),
    );

    let first = {
        let form = form.clone();
        thread::spawn(move || {
            block_on(form.set_value("email", "bad@example.com")).expect("first set");
        })
    };
    thread::sleep(Duration::from_millis(5));
    let second = {
        let form = form.clone();
        thread::spawn(move || {
            block_on(form.set_value("email", "good@example.com")).expect("second set");
        })
    };

    first.join().expect("first thread joins");
    second.join().expect("second thread joins");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(form.error("email").expect("error"), Some(FieldError::Cleared));
    assert_eq!(
        form.value("email").expect("value"),
        Value::from("good@example.com")
    );
}

#[test]
fn stale_validation_result_is_dropped() {
    let validate = Validate::future(|value: Value, _: FormValues| async move {
        if value == Value::from("slow") {
            thread::sleep(Duration::from_millis(70));
            return Ok(FieldError::from("slow failure"));
        }
        Ok(FieldError::Cleared)
    });
    let form = controller(FormObject::new().field("handle", Field::new("").validate(validate)));

    let slow = {
        let form = form.clone();
        thread::spawn(move || {
            block_on(form.set_value("handle", "slow")).expect("slow set");
        })
    };
    thread::sleep(Duration::from_millis(10));
    let fast = {
        let form = form.clone();
        thread::spawn(move || {
            block_on(form.set_value("handle", "fast")).expect("fast set");
        })
    };

    slow.join().expect("slow thread joins");
    fast.join().expect("fast thread joins");

    assert_eq!(form.error("handle").expect("error"), Some(FieldError::Cleared));
    assert!(form.is_valid().expect("valid"));
}

#[test]
fn getters_and_setters_transform_values() {
    let form = controller(
        FormObject::new()
            .field(
                "first",
                Field::new("ada").setter(|input: Value, _: &FormValues| {
                    Value::from(input.as_str().unwrap_or_default().trim().to_string())
                }),
            )
            .field(
                "display",
                Field::new("")
                    .async_setter(|input: Value, form: FormValues| async move {
                        let first = form.get("first").cloned().unwrap_or_default();
                        Value::from(format!("{input} ({first})"))
                    })
                    .getter(|value: &Value, _: &FormValues| {
                        Value::from(value.to_string().to_uppercase())
                    }),
            ),
    );

    block_on(form.set_data([("first", "  grace  "), ("display", "hopper")])).expect("set data");
    assert_eq!(form.value("first").expect("first"), Value::from("grace"));
    assert_eq!(
        form.value("display").expect("display"),
        Value::from("hopper (grace)")
    );

    let returned = form.get_data(&DataOptions::returned()).expect("returned");
    assert_eq!(returned.get("display"), Some(&Value::from("HOPPER (GRACE)")));
    assert_eq!(returned.get("first"), Some(&Value::from("grace")));
}

#[test]
fn reset_restores_values_then_clears_errors_after_defer() {
    let deferred = Arc::new(AtomicUsize::new(0));
    let defer = {
        let deferred = deferred.clone();
        Defer::new(move || {
            deferred.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        })
    };
    let form = block_on(FormController::new(
        profile_form(),
        FormOptions {
            defer,
            ..FormOptions::default()
        },
    ))
    .expect("form controller");

    block_on(form.set_data([("name", "Bar"), ("email", "other@example.com")])).expect("set data");
    assert!(!form.is_valid().expect("invalid"));

    block_on(form.reset_to_initial_state()).expect("reset");
    assert_eq!(deferred.load(Ordering::SeqCst), 1);
    assert_eq!(form.value("name").expect("name"), Value::from("Foo"));
    assert_eq!(
        form.value("email").expect("email"),
        Value::from("user@example.com")
    );
    assert!(form.is_valid().expect("valid after revalidation"));
    assert_eq!(form.error("name").expect("error"), Some(FieldError::Cleared));
}

#[test]
fn reset_values_reports_changed_fields() {
    let form = controller(profile_form());
    block_on(form.set_value("age", 31)).expect("set age");
    assert_eq!(form.reset_values().expect("reset"), vec!["age"]);
    assert!(form.reset_values().expect("second reset").is_empty());

    block_on(form.set_value("age", 40)).expect("set age");
    form.snapshot_initial_state().expect("snapshot");
    assert!(form.reset_values().expect("reset to snapshot").is_empty());
    assert_eq!(form.value("age").expect("age"), Value::from(40));
}

#[test]
fn listeners_observe_changes_until_removed() {
    let form = controller(profile_form());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = {
        let seen = seen.clone();
        form.on_field_changed(move |field, values| {
            let value = values.get(field).cloned().unwrap_or_default();
            seen.lock().expect("seen lock").push((field.to_string(), value));
        })
        .expect("listener")
    };

    block_on(form.set_value("age", 31)).expect("set age");
    assert!(form.remove_listener(id).expect("remove"));
    assert!(!form.remove_listener(id).expect("second remove"));
    block_on(form.set_value("age", 32)).expect("set age");

    let seen = seen.lock().expect("seen lock");
    assert_eq!(*seen, vec![("age".to_string(), Value::from(31))]);
}

#[test]
fn validator_configuration_errors_propagate() {
    let validation = Validation::new(Arc::new(I18nManager::with_locale("en-US")));
    let form = controller(FormObject::new().field(
        "age",
        Field::new("ten").validate(
            validation
                .validator(RuleSet::new().min(18))
                .with_options(ValidatorOptions::watched()),
        ),
    ));

    let result = block_on(form.validate(&["age"], true));
    assert!(matches!(
        result,
        Err(FormError::Validator {
            ref field,
            source: RuleError::UnsupportedValue { .. },
        }) if field == "age"
    ));
    assert_eq!(form.error("age").expect("error"), None);
}

#[test]
fn rule_backed_validators_resolve_localized_messages() {
    let validation = Validation::new(Arc::new(I18nManager::with_locale("en-US")));
    let form = controller(FormObject::new().field(
        "email",
        Field::new("").validate(validation.validator(RuleSet::new().required().email())),
    ));
    assert!(!form.is_valid().expect("invalid"));

    block_on(form.set_value("email", "foo@bar")).expect("set email");
    assert_eq!(
        form.error("email").expect("error"),
        Some(FieldError::from("Enter a valid email address"))
    );

    block_on(form.set_value("email", "foo@bar.com")).expect("set email");
    assert_eq!(form.error("email").expect("error"), Some(FieldError::Cleared));
    assert!(form.is_valid().expect("valid"));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn debug_flag_logs_value_and_error_changes() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let form = block_on(FormController::new(
            profile_form(),
            FormOptions {
                debug: true,
                ..FormOptions::default()
            },
        ))
        .expect("form controller");
        block_on(form.set_value("name", "Bar")).expect("set name");
    });

    let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8");
    assert!(output.contains("field value changed"));
    assert!(output.contains("field error changed"));
    assert!(output.contains("name"));
}

fn signup_form() -> FormObject {
    FormObject::new()
        .field("name", Field::new(Value::Null).validate(truthy()))
        .field("newsletter", Field::new(false))
}

fn submit_controller(
    form: &FormController,
    options: SubmitOptions,
    submitted: Arc<Mutex<Vec<FormValues>>>,
) -> SubmitController {
    SubmitController::new(form.clone(), options, move |form: FormController| {
        let submitted = submitted.clone();
        async move {
            submitted
                .lock()
                .expect("submitted lock")
                .push(form.get_values().expect("submitted values"));
            Ok(())
        }
    })
    .expect("submit controller")
}

#[test]
fn submit_blocks_invalid_form_and_writes_errors() {
    let form = controller(signup_form());
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let submit = submit_controller(&form, SubmitOptions::default(), submitted.clone());

    assert_eq!(form.error("name").expect("error"), None);
    let outcome = block_on(submit.submit()).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(form.error("name").expect("error"), Some(FieldError::Flag(false)));
    assert_eq!(submit.status().expect("status"), SubmitStatus::Failed);
    assert!(submitted.lock().expect("submitted lock").is_empty());
    assert_eq!(submit.submit_count().expect("count"), 1);
}

#[test]
fn pristine_submit_is_skipped_unless_allowed() {
    let form = controller(profile_form());
    let submitted = Arc::new(Mutex::new(Vec::new()));

    let submit = submit_controller(&form, SubmitOptions::default(), submitted.clone());
    assert_eq!(block_on(submit.submit()).expect("submit"), SubmitOutcome::Pristine);
    assert_eq!(submit.status().expect("status"), SubmitStatus::Idle);
    assert!(submitted.lock().expect("submitted lock").is_empty());
    submit.detach().expect("detach");

    let allowed = submit_controller(
        &form,
        SubmitOptions {
            allow_pristine_submit: true,
        },
        submitted.clone(),
    );
    assert_eq!(
        block_on(allowed.submit()).expect("submit"),
        SubmitOutcome::Submitted
    );
    assert_eq!(submitted.lock().expect("submitted lock").len(), 1);
}

#[test]
fn dirty_submit_runs_handler_and_rebaselines() {
    let form = controller(signup_form());
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let submit = submit_controller(&form, SubmitOptions::default(), submitted.clone());

    block_on(form.set_value("name", "")).expect("set empty name");
    assert!(!submit.is_dirty().expect("null baseline equals empty text"));

    block_on(form.set_value("name", "Ada")).expect("set name");
    assert!(submit.is_dirty().expect("dirty"));

    assert_eq!(block_on(submit.submit()).expect("submit"), SubmitOutcome::Submitted);
    assert_eq!(submit.status().expect("status"), SubmitStatus::Succeeded);
    assert!(!submit.is_dirty().expect("clean after submit"));
    assert!(!submit.is_submitting().expect("not submitting"));
    assert_eq!(
        submitted.lock().expect("submitted lock")[0].get("name"),
        Some(&Value::from("Ada"))
    );

    assert_eq!(form.reset_values().expect("reset"), Vec::<String>::new());
    block_on(form.set_value("newsletter", true)).expect("set newsletter");
    assert!(submit.is_dirty().expect("dirty again"));
}

#[test]
fn prepare_gates_dirty_tracking() {
    let form = controller(signup_form());
    let submit = SubmitController::new(form.clone(), SubmitOptions::default(), |_form| async {
        Ok(())
    })
    .expect("submit controller")
    .with_prepare(|form: FormController| async move {
        form.set_data([("name", "Loaded")]).await
    })
    .expect("prepare");

    assert!(!submit.is_ready().expect("not ready"));
    block_on(form.set_value("newsletter", true)).expect("set before ready");
    assert!(!submit.is_dirty().expect("changes before ready are ignored"));

    block_on(submit.prepare()).expect("prepare");
    assert!(submit.is_ready().expect("ready"));
    assert!(!submit.is_dirty().expect("prepared values are the baseline"));
    assert_eq!(form.value("name").expect("name"), Value::from("Loaded"));

    block_on(form.set_value("name", "Edited")).expect("edit");
    assert!(submit.is_dirty().expect("dirty"));
    assert_eq!(form.reset_values().expect("reset"), vec!["name"]);
    assert_eq!(form.value("name").expect("name"), Value::from("Loaded"));
}

#[test]
fn concurrent_submit_is_rejected() {
    let form = controller(signup_form());
    let submit = SubmitController::new(form.clone(), SubmitOptions::default(), |_form| async {
        thread::sleep(Duration::from_millis(60));
        Ok(())
    })
    .expect("submit controller");
    block_on(form.set_value("name", "Ada")).expect("set name");

    let first = {
        let submit = submit.clone();
        thread::spawn(move || block_on(submit.submit()))
    };
    thread::sleep(Duration::from_millis(15));
    let second = block_on(submit.submit());

    assert_eq!(second, Err(FormError::AlreadySubmitting));
    assert_eq!(
        first.join().expect("first submit joins"),
        Ok(SubmitOutcome::Submitted)
    );
    assert_eq!(submit.submit_count().expect("count"), 1);
}

#[test]
fn submit_during_validation_is_rejected() {
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let slow_truthy = Validate::future(|value: Value, _: FormValues| async move {
        Delay::new(Duration::from_millis(5)).await;
        Ok(FieldError::from(value.is_truthy()))
    });
    let form = controller(FormObject::new().field("name", Field::new(Value::Null).validate(slow_truthy)));
    let submit = {
        let handler_calls = handler_calls.clone();
        SubmitController::new(form.clone(), SubmitOptions::default(), move |_form| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .expect("submit controller")
    };
    block_on(form.set_value("name", "Ada")).expect("set name");

    let (first, second) = block_on(futures::future::join(submit.submit(), submit.submit()));

    assert_eq!(first, Ok(SubmitOutcome::Submitted));
    assert_eq!(second, Err(FormError::AlreadySubmitting));
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(submit.submit_count().expect("count"), 1);
    assert_eq!(submit.status().expect("status"), SubmitStatus::Succeeded);
}

#[test]
fn failed_handler_marks_submit_failed() {
    let form = controller(signup_form());
    let submit = SubmitController::new(form.clone(), SubmitOptions::default(), |_form| async {
        Err(FormError::Handler("backend unavailable".into()))
    })
    .expect("submit controller");
    block_on(form.set_value("name", "Ada")).expect("set name");

    let result = block_on(submit.submit());
    assert_eq!(
        result,
        Err(FormError::Handler("backend unavailable".into()))
    );
    assert_eq!(submit.status().expect("status"), SubmitStatus::Failed);
    assert!(!submit.is_submitting().expect("not submitting"));
    assert!(submit.is_dirty().expect("still dirty"));
}
